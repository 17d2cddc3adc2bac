//! Turning the formatter's JSON into the final table.

use serde_json::{Map, Value};

use crate::{
    error::{PipelineError, Warning},
    lang_graph::types::{
        records::{SubjectRecord, SubjectRecords},
        response::{ResultColumn, ResultTable},
    },
};

pub type Record = Map<String, Value>;

/// Layout of a free-form formatter answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    /// Top-level keys are exactly the subjects, in order.
    Flat,
    /// The first top-level key holds a list of per-subject objects.
    Nested,
}

pub fn detect_shape(json: &Map<String, Value>, subjects: &[String]) -> JsonShape {
    if json.len() == subjects.len() && json.keys().zip(subjects).all(|(key, s)| key == s) {
        JsonShape::Flat
    } else {
        JsonShape::Nested
    }
}

/// Per-subject records of a free-form answer, in answer order. Entries that
/// are not objects become empty records and are reported.
pub fn information_list(
    json: Map<String, Value>,
    subjects: &[String],
) -> Result<(Vec<Record>, Vec<Warning>), PipelineError> {
    let entries: Vec<Value> = match detect_shape(&json, subjects) {
        JsonShape::Flat => json.into_iter().map(|(_, value)| value).collect(),
        JsonShape::Nested => {
            let Some((key, value)) = json.into_iter().next() else {
                return Err(PipelineError::UnexpectedShape(
                    "the JSON object is empty".to_string(),
                ));
            };
            match value {
                Value::Array(items) => items,
                other => {
                    return Err(PipelineError::UnexpectedShape(format!(
                        "expected a list of subject objects under {key:?}, found {}",
                        kind(&other)
                    )))
                }
            }
        }
    };

    let mut warnings = Vec::new();
    let records = entries
        .into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::Object(map) => map,
            other => {
                warnings.push(Warning::MalformedRecord {
                    index,
                    found: kind(&other).to_string(),
                });
                Record::new()
            }
        })
        .collect();
    Ok((records, warnings))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn same_subject(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Aligns strict-mode records to `subjects`, by name first and by position
/// when the name matches no subject.
pub fn align_records(subjects: &[String], records: SubjectRecords) -> (Vec<Record>, Vec<Warning>) {
    let mut warnings = Vec::new();
    if records.subjects.len() != subjects.len() {
        warnings.push(Warning::RecordCountMismatch {
            expected: subjects.len(),
            found: records.subjects.len(),
        });
    }

    let mut pending: Vec<Option<SubjectRecord>> =
        records.subjects.into_iter().map(Some).collect();
    let aligned = subjects
        .iter()
        .enumerate()
        .map(|(index, subject)| {
            let by_name = pending.iter().position(|slot| {
                slot.as_ref()
                    .is_some_and(|record| same_subject(&record.subject, subject))
            });
            let by_position = pending.get(index).and_then(Option::as_ref).and_then(|record| {
                let named_elsewhere = subjects.iter().any(|s| same_subject(&record.subject, s));
                (!named_elsewhere).then_some(index)
            });
            by_name
                .or(by_position)
                .and_then(|slot| pending[slot].take())
                .map(|record| {
                    record
                        .fields
                        .into_iter()
                        .map(|field| (field.name, Value::String(field.value)))
                        .collect::<Record>()
                })
                .unwrap_or_default()
        })
        .collect();
    (aligned, warnings)
}

/// Subject-keyed view of aligned records, shown to the relevance classifier.
pub fn records_to_json(subjects: &[String], records: &[Record]) -> Value {
    let map: Map<String, Value> = subjects
        .iter()
        .zip(records)
        .map(|(subject, record)| (subject.clone(), Value::Object(record.clone())))
        .collect();
    Value::Object(map)
}

/// Cell text for a JSON value. Lists become their comma-joined items.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Object(_) => value.to_string(),
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(", "),
    }
}

/// Keeps the first occurrence of each key, dropping blanks.
pub fn dedupe_keys(keys: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let key = key.trim().to_string();
        if !key.is_empty() && !seen.contains(&key) {
            seen.push(key);
        }
    }
    seen
}

/// Builds one column per field with exactly one value per subject.
pub fn build_table(
    subjects: &[String],
    mut records: Vec<Record>,
    fields: &[String],
) -> (ResultTable, Vec<Warning>) {
    let mut warnings = Vec::new();
    if records.len() != subjects.len() {
        warnings.push(Warning::RecordCountMismatch {
            expected: subjects.len(),
            found: records.len(),
        });
        records.resize_with(subjects.len(), Record::new);
    }

    let columns = fields
        .iter()
        .map(|field| {
            if !records.iter().any(|record| record.contains_key(field)) {
                warnings.push(Warning::UnknownField {
                    field: field.clone(),
                });
            }
            let values = records
                .iter()
                .map(|record| record.get(field).map(stringify).unwrap_or_default())
                .collect();
            ResultColumn {
                field: field.clone(),
                values,
            }
        })
        .collect();

    let table = ResultTable {
        subjects: subjects.to_vec(),
        columns,
    };
    (table, warnings)
}
