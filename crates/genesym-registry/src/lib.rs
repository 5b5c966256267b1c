//! HGNC registry client
//!
//! Resolves gene symbols against the HGNC REST search API
//! (`/search/{field}/{symbol}`). A lookup on `prev_symbol` maps a
//! superseded symbol such as `SCA12` to its current approved symbol
//! (`PPP2R2B`).
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use async_trait::async_trait;
use genesym_core::{
    GenesymError, LookupField, RegistryConfig, Resolution, Result, RetryPolicy, SymbolRegistry,
};
use reqwest::{header::ACCEPT, Client};
use serde::Deserialize;

/// Longest symbol accepted as a path segment
const MAX_SYMBOL_LEN: usize = 64;

/// HGNC REST client
pub struct HgncClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    #[serde(rename = "numFound", default)]
    num_found: u64,
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    symbol: String,
    hgnc_id: Option<String>,
}

impl HgncClient {
    /// Create a client for the public HGNC endpoint
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: "https://rest.genenames.org".to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Create from config
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenesymError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Search URL for `symbol` on `field`
    pub fn search_url(&self, field: LookupField, symbol: &str) -> String {
        format!("{}/search/{}/{}", self.base_url, field.as_str(), symbol)
    }

    async fn fetch_once(&self, field: LookupField, symbol: &str) -> Result<Resolution> {
        let url = self.search_url(field, symbol);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| map_transport_error(symbol, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenesymError::RegistryStatus {
                symbol: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| map_transport_error(symbol, e))?;
        parse_search(field, symbol, &body)
    }
}

impl Default for HgncClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SymbolRegistry for HgncClient {
    async fn lookup(&self, field: LookupField, symbol: &str) -> Result<Resolution> {
        validate_symbol(symbol)?;

        let label = format!("HGNC {field} lookup for {symbol}");
        self.retry
            .run(&label, move || self.fetch_once(field, symbol))
            .await
    }
}

/// Reject anything that is not a bare symbol token before it reaches a URL
pub fn validate_symbol(symbol: &str) -> Result<()> {
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(GenesymError::InvalidSymbol(symbol.to_string()))
    }
}

/// Take the first document's symbol from a search response body
fn parse_search(field: LookupField, symbol: &str, body: &str) -> Result<Resolution> {
    let parsed: SearchResponse = serde_json::from_str(body).map_err(|e| {
        GenesymError::RegistryError(format!("Malformed response for {symbol}: {e}"))
    })?;

    let SearchBody { num_found, docs } = parsed.response;
    let doc = docs
        .into_iter()
        .next()
        .ok_or_else(|| GenesymError::NoMatch(symbol.to_string()))?;

    if num_found > 1 {
        tracing::warn!(
            "{} matched {} HGNC entries on {}; using {}",
            symbol,
            num_found,
            field,
            doc.symbol
        );
    }

    Ok(Resolution {
        candidate: symbol.to_string(),
        resolved: doc.symbol,
        hgnc_id: doc.hgnc_id,
        matched_field: field,
    })
}

fn map_transport_error(symbol: &str, e: reqwest::Error) -> GenesymError {
    if e.is_timeout() {
        GenesymError::Timeout(format!("HGNC lookup for {symbol}: {e}"))
    } else {
        GenesymError::Transport(format!("HGNC lookup for {symbol} failed: {e}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
