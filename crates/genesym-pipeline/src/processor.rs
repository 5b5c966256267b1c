//! Row Processor
//!
//! Turns one input row into a typed [`RowOutcome`]: extract candidates,
//! resolve the ones selected by the [`ResolutionStrategy`], and rewrite
//! the definition with every resolved symbol.

use std::sync::Arc;

use genesym_core::{
    GenesymError, InputRow, LookupField, OutputRecord, ResolutionStrategy, RowOutcome,
    SymbolRegistry,
};
use genesym_extractor::{replace_symbols, SymbolExtractor};

/// Processes one row at a time; holds no cross-row state
pub struct RowProcessor {
    extractor: SymbolExtractor,
    registry: Arc<dyn SymbolRegistry>,
    lookup_fields: Vec<LookupField>,
    strategy: ResolutionStrategy,
}

impl RowProcessor {
    pub fn new(extractor: SymbolExtractor, registry: Arc<dyn SymbolRegistry>) -> Self {
        Self {
            extractor,
            registry,
            lookup_fields: vec![LookupField::PrevSymbol],
            strategy: ResolutionStrategy::default(),
        }
    }

    /// Registry fields to try, in order
    pub fn with_lookup_fields(mut self, fields: Vec<LookupField>) -> Self {
        self.lookup_fields = fields;
        self
    }

    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Process a single row
    ///
    /// Never fails: extraction and lookup errors are folded into the outcome.
    pub async fn process_row(&self, row: &InputRow) -> RowOutcome {
        let candidates = match self.extractor.extract_candidates(&row.definition).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", row.iri, e);
                return RowOutcome::ExtractionFailed {
                    iri: row.iri.clone(),
                    reason: e.to_string(),
                };
            }
        };

        if candidates.is_empty() {
            return RowOutcome::NoSymbol {
                iri: row.iri.clone(),
            };
        }

        let selected = self.select(&candidates);
        tracing::debug!("{}: resolving {:?}", row.iri, selected);

        let mut renames = Vec::new();
        let mut old_symbols = Vec::new();
        let mut new_symbols = Vec::new();
        let mut failures = Vec::new();

        for candidate in &selected {
            match self.registry.resolve(candidate, &self.lookup_fields).await {
                Ok(resolution) => {
                    tracing::debug!(
                        "{}: {} -> {} ({}) via {}",
                        row.iri,
                        resolution.candidate,
                        resolution.resolved,
                        resolution.hgnc_id.as_deref().unwrap_or("no HGNC id"),
                        resolution.matched_field
                    );
                    if resolution.is_rename() {
                        renames.push((
                            resolution.candidate.clone(),
                            resolution.resolved.clone(),
                        ));
                    }
                    old_symbols.push(resolution.candidate);
                    new_symbols.push(resolution.resolved);
                }
                Err(e) => {
                    if matches!(e, GenesymError::NoMatch(_)) {
                        tracing::debug!("{}: {}", row.iri, e);
                    } else {
                        tracing::warn!("Lookup failed for {} in {}: {}", candidate, row.iri, e);
                    }
                    failures.push(e.to_string());
                }
            }
        }

        if old_symbols.is_empty() {
            return RowOutcome::Unresolved {
                iri: row.iri.clone(),
                candidates: selected,
                reason: failures.join("; "),
            };
        }

        RowOutcome::Resolved(OutputRecord {
            iri: row.iri.clone(),
            old_symbol: old_symbols.join("; "),
            resolved_symbol: new_symbols.join("; "),
            updated_definition: replace_symbols(&row.definition, &renames),
        })
    }

    fn select(&self, candidates: &[String]) -> Vec<String> {
        match self.strategy {
            ResolutionStrategy::First => candidates.first().cloned().into_iter().collect(),
            ResolutionStrategy::Last => candidates.last().cloned().into_iter().collect(),
            ResolutionStrategy::All => candidates.to_vec(),
        }
    }
}
