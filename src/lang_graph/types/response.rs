use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::state::PipelineState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub field: String,
    /// One value per subject, in subject order; `""` marks "not found".
    pub values: Vec<String>,
}

/// Final `field -> per-subject values` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultTable {
    pub subjects: Vec<String>,
    pub columns: Vec<ResultColumn>,
}

impl ResultTable {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.field.as_str())
    }

    pub fn column(&self, field: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.values.as_slice())
    }

    /// Value of `field` for the subject at `index`.
    pub fn value(&self, field: &str, index: usize) -> Option<&str> {
        self.column(field)
            .and_then(|values| values.get(index))
            .map(String::as_str)
    }

    /// The table as a JSON object, `field -> [values]`, in column order.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .columns
            .iter()
            .map(|c| {
                let values = c.values.iter().cloned().map(Value::String).collect();
                (c.field.clone(), Value::Array(values))
            })
            .collect();
        Value::Object(map)
    }
}

/// Everything a run produced: the table plus the state it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub table: ResultTable,
    pub state: PipelineState,
}
