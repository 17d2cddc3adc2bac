//! Versioned prompt templates and few-shot exemplars.
//!
//! The built-in set is `prompts/default.toml`; a deployment can point
//! `pipeline.prompts_path` at its own file with the same layout.

use std::{path::Path, sync::LazyLock};

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::Deserialize;

use crate::llm::Message;

const BUILTIN_PROMPTS: &str = include_str!("../../prompts/default.toml");

static SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("slot pattern is valid"));

#[derive(Debug, Clone, Deserialize)]
pub struct PromptSet {
    pub version: String,
    pub query_rewrite: FewShotPrompt,
    pub extraction: Prompt,
    pub aggregation: FewShotPrompt,
    pub formatting: FormattingPrompt,
    pub relevance: Prompt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FewShotPrompt {
    pub system: String,
    pub user: String,
    #[serde(default)]
    pub examples: Vec<Exchange>,
}

/// One worked user/assistant turn shown to the model before the real request.
#[derive(Debug, Clone, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormattingPrompt {
    pub system: String,
    /// Free-form JSON request.
    pub user: String,
    /// Request for schema-constrained subject records.
    pub strict_user: String,
}

impl PromptSet {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_PROMPTS).context("Built-in prompt set is invalid")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt set {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Failed to parse prompt set {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

impl Prompt {
    pub fn messages(&self, vars: &[(&str, &str)]) -> Vec<Message> {
        vec![
            Message::system(self.system.trim()),
            Message::user(render(&self.user, vars)),
        ]
    }
}

impl FewShotPrompt {
    /// System prompt, every exemplar exchange in order, then the rendered request.
    pub fn messages(&self, vars: &[(&str, &str)]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.examples.len() * 2 + 2);
        messages.push(Message::system(self.system.trim()));
        for example in &self.examples {
            messages.push(Message::user(example.user.trim()));
            messages.push(Message::assistant(example.assistant.trim()));
        }
        messages.push(Message::user(render(&self.user, vars)));
        messages
    }
}

impl FormattingPrompt {
    pub fn messages(&self, strict: bool, vars: &[(&str, &str)]) -> Vec<Message> {
        let user = if strict { &self.strict_user } else { &self.user };
        vec![
            Message::system(self.system.trim()),
            Message::user(render(user, vars)),
        ]
    }
}

/// Fills `{name}` slots in one pass. Unknown slots and other braces are kept,
/// and substituted values are never re-scanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    SLOT.replace_all(template.trim(), |caps: &Captures| {
        let name = &caps[1];
        vars.iter()
            .find(|(key, _)| *key == name)
            .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn builtin_set_loads() {
        let prompts = PromptSet::builtin().unwrap();
        assert!(!prompts.version.is_empty());
        assert_eq!(prompts.query_rewrite.examples.len(), 2);
        assert_eq!(prompts.aggregation.examples.len(), 1);
        assert!(prompts.query_rewrite.examples[0]
            .assistant
            .contains("Modified Search:"));
        assert!(prompts.aggregation.examples[0]
            .assistant
            .contains("1600 Amphitheatre Parkway"));
    }

    #[test]
    fn render_fills_known_slots_once() {
        let rendered = render(
            "query {query} with {results} and {unknown}",
            &[("query", "q"), ("results", "{query}")],
        );
        assert_eq!(rendered, "query q with {query} and {unknown}");
    }

    #[test]
    fn render_keeps_json_braces() {
        let rendered = render(r#"{ "Address" : [] } {query}"#, &[("query", "x")]);
        assert_eq!(rendered, r#"{ "Address" : [] } x"#);
    }

    #[test]
    fn few_shot_messages_alternate_roles() {
        let prompts = PromptSet::builtin().unwrap();
        let messages = prompts
            .query_rewrite
            .messages(&[("query", "Find the CEO of Meta")]);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User
            ]
        );
        assert_eq!(messages.last().unwrap().content, "Find the CEO of Meta");
    }

    #[test]
    fn custom_prompt_file() {
        let text = r#"
            version = "test"
            [query_rewrite]
            system = "s"
            user = "{query}"
            [extraction]
            system = "s"
            user = "{query} {results}"
            [aggregation]
            system = "s"
            user = "{query} {syntheses}"
            [formatting]
            system = "s"
            user = "{synthesis}"
            strict_user = "{subjects}"
            [relevance]
            system = "s"
            user = "{json}"
        "#;
        let prompts = PromptSet::from_toml_str(text).unwrap();
        assert_eq!(prompts.version, "test");
        assert!(prompts.query_rewrite.examples.is_empty());
        let messages = prompts.formatting.messages(true, &[("subjects", "A, B")]);
        assert_eq!(messages[1].content, "A, B");
    }
}
