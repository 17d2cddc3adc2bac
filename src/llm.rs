//! Language-model boundary.
//!
//! Pipeline tasks talk to a [`LanguageModel`] only; concrete backends live in
//! [`openai`] and [`ollama`].

pub mod ollama;
pub mod openai;

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::{gen::SchemaSettings, JsonSchema};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// How the completion must be shaped.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    /// Any JSON object.
    Json,
    /// JSON matching `schema`.
    Schema { name: String, schema: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub format: ResponseFormat,
}

impl CompletionRequest {
    pub fn text(messages: Vec<Message>) -> Self {
        Self {
            messages,
            format: ResponseFormat::Text,
        }
    }

    pub fn json(messages: Vec<Message>) -> Self {
        Self {
            messages,
            format: ResponseFormat::Json,
        }
    }

    /// Request output constrained to the JSON schema of `T`.
    pub fn structured<T: JsonSchema>(name: &str, messages: Vec<Message>) -> Result<Self> {
        Ok(Self {
            messages,
            format: ResponseFormat::Schema {
                name: name.to_string(),
                schema: schema_for::<T>()?,
            },
        })
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Runs one chat completion and returns the assistant's text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// JSON schema for `T` with every subschema inlined, since not every backend
/// resolves `$ref`.
pub fn schema_for<T: JsonSchema>() -> Result<Value> {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    serde_json::to_value(schema).context("Failed to serialize JSON schema")
}

/// Sends a schema-constrained request and decodes the reply into `T`.
pub async fn complete_structured<T>(
    llm: &dyn LanguageModel,
    name: &str,
    messages: Vec<Message>,
) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let request = CompletionRequest::structured::<T>(name, messages)?;
    let response = llm.complete(&request).await?;
    serde_json::from_str(&response)
        .with_context(|| format!("Structured response did not match `{name}`: {response}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Outer {
        items: Vec<Inner>,
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Inner {
        name: String,
    }

    #[test]
    fn schema_is_inlined() {
        let schema = schema_for::<Outer>().unwrap();
        let text = schema.to_string();
        assert!(!text.contains("$ref"));
        assert!(schema.get("$schema").is_none());
        assert_eq!(
            schema["properties"]["items"]["items"]["properties"]["name"]["type"],
            "string"
        );
    }

    #[test]
    fn roles_serialize_lowercase() {
        let value = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "hi");
    }
}
