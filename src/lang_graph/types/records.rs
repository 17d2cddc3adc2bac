use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Schema the formatter must emit in strict mode: one record per subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubjectRecords {
    pub subjects: Vec<SubjectRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SubjectRecord {
    /// The subject exactly as it was given.
    pub subject: String,
    pub fields: Vec<FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldValue {
    pub name: String,
    /// Empty when the value was not found.
    pub value: String,
}
