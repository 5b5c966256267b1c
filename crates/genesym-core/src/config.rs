//! genesym Configuration Management
//!
//! Handles configuration from environment variables, config files,
//! and command-line arguments with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{FailurePolicy, LookupField, ResolutionStrategy};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Gene registry configuration
    pub registry: RegistryConfig,

    /// Row processing and output configuration
    pub pipeline: PipelineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_override()
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        // LLM
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.openai_api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(secs) = std::env::var("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "LLM_TIMEOUT_SECS".to_string(),
                value: secs,
            })?;
        }

        // Registry
        if let Ok(url) = std::env::var("HGNC_BASE_URL") {
            self.registry.base_url = url;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(self)
    }

    /// Check values that would otherwise fail mid-run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.lookup_fields.is_empty() {
            return Err(ConfigError::MissingRequired(
                "registry.lookup_fields must name at least one field".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::MissingRequired("llm.model".to_string()));
        }
        if self.llm.timeout_secs == 0 || self.registry.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI API key
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,

    /// API base URL (OpenAI or a compatible endpoint)
    pub base_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion; API default when unset
    pub max_tokens: Option<u32>,

    /// Sampling temperature; API default when unset
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry policy for transient failures
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo".to_string(),
            max_tokens: None,
            temperature: None,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Gene registry (HGNC REST) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// REST base URL
    pub base_url: String,

    /// Fields to search, in order, until one matches
    pub lookup_fields: Vec<LookupField>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Retry policy for transient failures
    pub retry: RetryConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://rest.genenames.org".to_string(),
            lookup_fields: vec![LookupField::PrevSymbol],
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings shared by outbound clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,

    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Row processing and output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which candidates of a row are resolved
    pub strategy: ResolutionStrategy,

    /// What failed rows contribute to the output
    pub on_unresolved: FailurePolicy,

    /// Drop candidates that do not appear as a whole word in the definition
    pub require_in_definition: bool,

    /// Column holding the class IRI
    pub iri_column: String,

    /// Column holding the gene label
    pub label_column: String,

    /// Column holding the definition text
    pub definition_column: String,

    /// Spreadsheet written in export mode
    pub output_path: PathBuf,

    /// Print records instead of exporting
    pub print_only: bool,

    /// Show a progress bar while processing rows
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: ResolutionStrategy::All,
            on_unresolved: FailurePolicy::Drop,
            require_in_definition: true,
            iri_column: "?cls".to_string(),
            label_column: "?gene_label".to_string(),
            definition_column: "?definition".to_string(),
            output_path: PathBuf::from("./data/output/all_results.xlsx"),
            print_only: false,
            show_progress: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
