use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::{
        chat::{request::ChatMessageRequest, ChatMessage},
        parameters::FormatType,
    },
    Ollama,
};
use tracing::{debug, info};

use super::{CompletionRequest, LanguageModel, Message, ResponseFormat, Role};
use crate::settings::LlmSettings;

/// Chat completions against a local Ollama server.
pub struct OllamaChat {
    client: Ollama,
    model: String,
}

impl OllamaChat {
    pub fn new(settings: &LlmSettings) -> Self {
        let client = Ollama::new(settings.ollama_host.clone(), settings.ollama_port);
        Self {
            client,
            model: settings.model.clone(),
        }
    }
}

fn to_ollama(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::User => ChatMessage::user(message.content.clone()),
        Role::Assistant => ChatMessage::assistant(message.content.clone()),
    }
}

/// The schema also goes into the prompt; Ollama grounds better with both.
fn schema_instruction(schema: &serde_json::Value) -> String {
    format!(
        "Respond only with a JSON document that conforms to this JSON schema:\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

/// Ollama `format` for a request. Schemas become structured outputs, which
/// constrain decoding to the schema.
fn format_type(format: &ResponseFormat) -> Result<Option<FormatType>> {
    match format {
        ResponseFormat::Text => Ok(None),
        ResponseFormat::Json => Ok(Some(FormatType::Json)),
        ResponseFormat::Schema { name, schema } => serde_json::from_value(schema.clone())
            .map(Some)
            .with_context(|| format!("Schema `{name}` is not usable as an Ollama format")),
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut messages: Vec<ChatMessage> = request.messages.iter().map(to_ollama).collect();

        if let ResponseFormat::Schema { schema, .. } = &request.format {
            messages.push(ChatMessage::system(schema_instruction(schema)));
        }
        let format = format_type(&request.format)?;

        let mut chat = ChatMessageRequest::new(self.model.clone(), messages);
        if let Some(format) = format {
            chat = chat.format(format);
        }

        debug!(model = %self.model, "Sending Ollama chat request");
        let response = self
            .client
            .send_chat_messages(chat)
            .await
            .context("Ollama chat request failed")?;

        let content = response.message.content;
        info!(
            model = %self.model,
            response_length = content.len(),
            "Ollama chat response received"
        );
        Ok(content)
    }
}
