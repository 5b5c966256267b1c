//! genesym Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout genesym:
//! - Table rows and output records for the enrichment pass
//! - Gene-symbol resolutions and per-row outcomes
//! - Common error types
//! - Shared traits for the LLM and gene-registry backends
//! - Configuration management and retry policy
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod retry;

pub use config::{
    AppConfig, ConfigError, LlmConfig, LoggingConfig, PipelineConfig, RegistryConfig, RetryConfig,
};
pub use retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for genesym operations
#[derive(Error, Debug)]
pub enum GenesymError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM returned HTTP {status}: {message}")]
    LlmStatus { status: u16, message: String },

    #[error("Registry returned HTTP {status} for symbol {symbol}")]
    RegistryStatus { symbol: String, status: u16 },

    #[error("No registry match for symbol: {0}")]
    NoMatch(String),

    #[error("Invalid gene symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenesymError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::LlmStatus { status, .. } | Self::RegistryStatus { status, .. } => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenesymError>;

// ============================================================================
// Table Rows
// ============================================================================

/// Old-symbol text recorded when the model names no gene symbol
pub const NO_SYMBOL_SENTINEL: &str = "No gene symbol found in definition.";

/// Prefix of the old-symbol text under [`FailurePolicy::ErrorSentinel`]
pub const LOOKUP_FAILED_PREFIX: &str = "Lookup failed: ";

/// One ontology class read from the input table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRow {
    /// Class IRI, the join key
    pub iri: String,

    /// Gene label attached to the class
    pub gene_label: String,

    /// Free-text definition to scan for gene symbols
    pub definition: String,
}

impl InputRow {
    pub fn new(
        iri: impl Into<String>,
        gene_label: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        Self {
            iri: iri.into(),
            gene_label: gene_label.into(),
            definition: definition.into(),
        }
    }
}

/// Enrichment result for one input row
///
/// Field names serialize to the column names used in the exported table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(rename = "?cls")]
    pub iri: String,

    #[serde(rename = "old_def_gene_symbol")]
    pub old_symbol: String,

    #[serde(rename = "updated_gene_symbol")]
    pub resolved_symbol: String,

    pub updated_definition: String,
}

impl OutputRecord {
    /// Columns appended to the input table on export
    pub const COLUMNS: [&'static str; 3] = [
        "old_def_gene_symbol",
        "updated_gene_symbol",
        "updated_definition",
    ];

    /// Record for a row whose definition names no gene symbol
    pub fn no_symbol(iri: impl Into<String>) -> Self {
        Self {
            iri: iri.into(),
            old_symbol: NO_SYMBOL_SENTINEL.to_string(),
            resolved_symbol: String::new(),
            updated_definition: String::new(),
        }
    }

    /// Values for [`Self::COLUMNS`], in order
    pub fn column_values(&self) -> [&str; 3] {
        [
            &self.old_symbol,
            &self.resolved_symbol,
            &self.updated_definition,
        ]
    }
}

// ============================================================================
// Registry Lookups
// ============================================================================

/// HGNC field searched for a candidate symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupField {
    /// Symbols superseded by a renaming
    PrevSymbol,
    /// Alternative names still in use
    AliasSymbol,
    /// Current approved symbols
    Symbol,
}

impl LookupField {
    /// Path segment used by the registry search endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrevSymbol => "prev_symbol",
            Self::AliasSymbol => "alias_symbol",
            Self::Symbol => "symbol",
        }
    }
}

impl std::fmt::Display for LookupField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LookupField {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "prev_symbol" | "previous" => Ok(Self::PrevSymbol),
            "alias_symbol" | "alias" => Ok(Self::AliasSymbol),
            "symbol" => Ok(Self::Symbol),
            _ => Err(ConfigError::InvalidValue {
                key: "lookup_field".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// A candidate symbol mapped to its current approved symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Symbol as extracted from the definition
    pub candidate: String,

    /// Approved symbol returned by the registry
    pub resolved: String,

    /// HGNC identifier of the matched gene, when reported
    pub hgnc_id: Option<String>,

    /// Field the match was found on
    pub matched_field: LookupField,
}

impl Resolution {
    /// Whether the registry returned a different symbol than the candidate
    pub fn is_rename(&self) -> bool {
        self.candidate != self.resolved
    }
}

// ============================================================================
// Row Outcomes
// ============================================================================

/// Which candidates of a row are sent to the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    First,
    Last,
    #[default]
    All,
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "all" => Ok(Self::All),
            _ => Err(ConfigError::InvalidValue {
                key: "strategy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// What a row contributes to the output when extraction or resolution fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// No record; the inner join drops the row
    #[default]
    Drop,
    /// Record the unresolved candidates with empty resolution fields
    Unresolved,
    /// Record an explicit "Lookup failed" sentinel
    ErrorSentinel,
}

impl std::str::FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "drop" => Ok(Self::Drop),
            "unresolved" => Ok(Self::Unresolved),
            "error-sentinel" | "error" => Ok(Self::ErrorSentinel),
            _ => Err(ConfigError::InvalidValue {
                key: "on_unresolved".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Typed result of processing one input row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The model's answer contained no symbol-like token
    NoSymbol { iri: String },

    /// At least one candidate was resolved and substituted
    Resolved(OutputRecord),

    /// Candidates were found but none could be resolved
    Unresolved {
        iri: String,
        candidates: Vec<String>,
        reason: String,
    },

    /// The LLM call failed for this row
    ExtractionFailed { iri: String, reason: String },
}

impl RowOutcome {
    /// Map this outcome to at most one output record
    pub fn into_record(self, policy: FailurePolicy) -> Option<OutputRecord> {
        match self {
            Self::NoSymbol { iri } => Some(OutputRecord::no_symbol(iri)),
            Self::Resolved(record) => Some(record),
            Self::Unresolved {
                iri,
                candidates,
                reason,
            } => Self::failure_record(policy, iri, candidates.join("; "), reason),
            Self::ExtractionFailed { iri, reason } => {
                Self::failure_record(policy, iri, String::new(), reason)
            }
        }
    }

    fn failure_record(
        policy: FailurePolicy,
        iri: String,
        old_symbol: String,
        reason: String,
    ) -> Option<OutputRecord> {
        let old_symbol = match policy {
            FailurePolicy::Drop => return None,
            FailurePolicy::Unresolved => old_symbol,
            FailurePolicy::ErrorSentinel => format!("{LOOKUP_FAILED_PREFIX}{reason}"),
        };

        Some(OutputRecord {
            iri,
            old_symbol,
            resolved_symbol: String::new(),
            updated_definition: String::new(),
        })
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A single message in a chat-completion conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for LLM chat-completion clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a conversation and return the first completion's text
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

/// Trait for gene-nomenclature registries
#[async_trait::async_trait]
pub trait SymbolRegistry: Send + Sync {
    /// Search one registry field for `symbol`
    async fn lookup(&self, field: LookupField, symbol: &str) -> Result<Resolution>;

    /// Resolve a previous (superseded) symbol to its current approved symbol
    async fn resolve_previous_symbol(&self, symbol: &str) -> Result<Resolution> {
        self.lookup(LookupField::PrevSymbol, symbol).await
    }

    /// Try each field in order and return the first match
    ///
    /// `NoMatch` moves on to the next field; any other error stops the walk.
    async fn resolve(&self, symbol: &str, fields: &[LookupField]) -> Result<Resolution> {
        for field in fields {
            match self.lookup(*field, symbol).await {
                Ok(resolution) => return Ok(resolution),
                Err(GenesymError::NoMatch(_)) => {
                    tracing::debug!("No {} match for {}", field, symbol);
                }
                Err(e) => return Err(e),
            }
        }

        Err(GenesymError::NoMatch(symbol.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
