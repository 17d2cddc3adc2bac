// src/settings.rs

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-2024-08-06";
const DEFAULT_SERPAPI_URL: &str = "https://serpapi.com/search.json";

#[derive(Parser, Debug)]
#[command(version, about = "Look up the same facts for a handful of subjects")]
pub struct Args {
    /// Path to the local configuration TOML file.
    #[arg(short, value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query for the given subjects and print the result table as JSON.
    Query {
        /// A subject to look up; repeat for up to five subjects.
        #[arg(short, long = "subject", required = true)]
        subjects: Vec<String>,

        /// The request, e.g. "Find the headquarters address of {company}".
        prompt: String,
    },
    /// Take subjects from a CSV column and write the CSV back with the results appended.
    Csv {
        #[arg(long, value_name = "INPUT_CSV")]
        input: PathBuf,

        /// Header of the column holding the subjects.
        #[arg(long)]
        column: String,

        #[arg(long, value_name = "OUTPUT_CSV")]
        output: PathBuf,

        prompt: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    /// Base URL of an OpenAI-compatible chat completions API.
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub engine: String,
    pub language: String,
    pub country: String,
    pub domain: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatMode {
    /// Schema-constrained subject records.
    #[default]
    Strict,
    /// Any JSON object, with flat/nested shape detection.
    Freeform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub rewrite_per_subject: bool,
    pub format_mode: FormatMode,
    /// Prompt set to use instead of the built-in one.
    #[serde(default)]
    pub prompts_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub pipeline: PipelineSettings,
}

impl Settings {
    /// Load settings with sane defaults, the optional TOML file, and
    /// `SEARCH_AGENT__SECTION__KEY` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::<DefaultState>::default()
            .set_default("llm.provider", "openai")?
            .set_default("llm.model", DEFAULT_MODEL)?
            .set_default("llm.base_url", DEFAULT_OPENAI_URL)?
            .set_default("llm.ollama_host", "http://127.0.0.1")?
            .set_default("llm.ollama_port", 11434)?
            .set_default("llm.timeout_secs", 60)?
            .set_default("search.endpoint", DEFAULT_SERPAPI_URL)?
            .set_default("search.engine", "google")?
            .set_default("search.language", "en")?
            .set_default("search.country", "us")?
            .set_default("search.domain", "google.com")?
            .set_default("search.timeout_secs", 30)?
            .set_default("pipeline.rewrite_per_subject", false)?
            .set_default("pipeline.format_mode", "strict")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("SEARCH_AGENT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut settings: Settings = cfg.try_deserialize()?;
        settings.fill_api_keys_from_env();
        Ok(settings)
    }

    /// Pick up the conventional provider variables when the config left the keys out.
    fn fill_api_keys_from_env(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.search.api_key.is_none() {
            self.search.api_key = std::env::var("SERPAPI_API_KEY").ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.llm.provider, LlmProvider::OpenAi);
        assert_eq!(settings.llm.model, DEFAULT_MODEL);
        assert_eq!(settings.search.language, "en");
        assert_eq!(settings.search.country, "us");
        assert_eq!(settings.search.domain, "google.com");
        assert!(!settings.pipeline.rewrite_per_subject);
        assert_eq!(settings.pipeline.format_mode, FormatMode::Strict);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [llm]
            provider = "ollama"
            model = "llama3.1:8b"

            [pipeline]
            rewrite_per_subject = true
            format_mode = "freeform"
            "#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.llm.provider, LlmProvider::Ollama);
        assert_eq!(settings.llm.model, "llama3.1:8b");
        assert_eq!(settings.llm.ollama_port, 11434);
        assert!(settings.pipeline.rewrite_per_subject);
        assert_eq!(settings.pipeline.format_mode, FormatMode::Freeform);
        assert_eq!(settings.search.engine, "google");
    }

    #[test]
    fn cli_parses_query_subjects() {
        let args = Args::parse_from([
            "search-agent",
            "query",
            "-s",
            "Google",
            "--subject",
            "Meta",
            "Find the address of {company}",
        ]);
        match args.command {
            Command::Query { subjects, prompt } => {
                assert_eq!(subjects, ["Google", "Meta"]);
                assert_eq!(prompt, "Find the address of {company}");
            }
            Command::Csv { .. } => panic!("expected query command"),
        }
    }
}
