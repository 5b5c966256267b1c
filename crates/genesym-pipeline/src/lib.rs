//! genesym Pipeline - Gene symbol enrichment driver
//!
//! Reads an ontology table, runs every row through the [`RowProcessor`]
//! in file order, and either prints the resulting records or inner-joins
//! them back onto the input table for export.
//!
//! Rows are processed strictly one at a time. A failure on one row is
//! recorded in its [`RowOutcome`] and never stops the batch.
//!
//! Author: hephaex@gmail.com

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use genesym_core::{
    AppConfig, FailurePolicy, InputRow, OutputRecord, Result, RowOutcome, SymbolRegistry,
};
use genesym_extractor::SymbolExtractor;
use genesym_llm::OpenAiClient;
use genesym_registry::HgncClient;
use genesym_table::Table;
use serde::Serialize;

pub mod processor;

pub use processor::RowProcessor;

// ============================================================================
// Run statistics
// ============================================================================

/// Per-run counters, one bucket per outcome kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub rows: usize,
    pub no_symbol: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub extraction_failed: usize,
    /// Records emitted after the failure policy was applied
    pub records: usize,
}

impl RunStats {
    fn observe(&mut self, outcome: &RowOutcome) {
        self.rows += 1;
        match outcome {
            RowOutcome::NoSymbol { .. } => self.no_symbol += 1,
            RowOutcome::Resolved(_) => self.resolved += 1,
            RowOutcome::Unresolved { .. } => self.unresolved += 1,
            RowOutcome::ExtractionFailed { .. } => self.extraction_failed += 1,
        }
    }

    /// Rows that produced no record
    pub fn dropped(&self) -> usize {
        self.rows - self.records
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows: {} resolved, {} without symbol, {} unresolved, {} extraction failures; {} records",
            self.rows,
            self.resolved,
            self.no_symbol,
            self.unresolved,
            self.extraction_failed,
            self.records
        )
    }
}

/// Records and statistics of one run
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub records: Vec<OutputRecord>,
    pub stats: RunStats,
}

// ============================================================================
// Pipeline
// ============================================================================

/// Sequential enrichment pipeline
pub struct Pipeline {
    processor: RowProcessor,
    failure_policy: FailurePolicy,
}

impl Pipeline {
    pub fn new(processor: RowProcessor, failure_policy: FailurePolicy) -> Self {
        Self {
            processor,
            failure_policy,
        }
    }

    /// Build the pipeline with the OpenAI and HGNC clients described by `config`
    ///
    /// Credentials are read from `config` once here, not per call.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = Arc::new(OpenAiClient::from_config(&config.llm)?);
        let registry: Arc<dyn SymbolRegistry> =
            Arc::new(HgncClient::from_config(&config.registry)?);

        tracing::info!(
            "Using model {} and registry {}",
            config.llm.model,
            config.registry.base_url
        );

        let extractor = SymbolExtractor::new(llm)
            .with_require_in_definition(config.pipeline.require_in_definition);
        let processor = RowProcessor::new(extractor, registry)
            .with_lookup_fields(config.registry.lookup_fields.clone())
            .with_strategy(config.pipeline.strategy);

        Ok(Self::new(processor, config.pipeline.on_unresolved))
    }

    /// Process all rows in order
    pub async fn run(&self, rows: &[InputRow]) -> PipelineOutput {
        self.run_with_progress(rows, |_, _| {}).await
    }

    /// Process all rows in order, calling `on_row` after each one
    pub async fn run_with_progress<F>(&self, rows: &[InputRow], mut on_row: F) -> PipelineOutput
    where
        F: FnMut(&InputRow, &RowOutcome),
    {
        let start = Instant::now();
        let mut output = PipelineOutput::default();

        for row in rows {
            tracing::debug!("Processing {} ({})", row.iri, row.gene_label);

            let outcome = self.processor.process_row(row).await;
            output.stats.observe(&outcome);
            on_row(row, &outcome);

            if let Some(record) = outcome.into_record(self.failure_policy) {
                output.records.push(record);
            }
        }

        output.stats.records = output.records.len();
        tracing::info!("Processed {} in {:?}", output.stats, start.elapsed());
        output
    }
}

// ============================================================================
// Terminal steps
// ============================================================================

/// Write each record as one JSON line
pub fn print_records<W: Write>(records: &[OutputRecord], mut out: W) -> std::io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    out.flush()
}

/// Inner-join `records` onto `table` and write the result to `path`
///
/// Returns the number of rows written.
pub fn export_results(
    table: &Table,
    records: &[OutputRecord],
    key_column: &str,
    path: &Path,
) -> genesym_table::Result<usize> {
    let joined = table.inner_join(records, key_column)?;
    genesym_table::write_table(&joined, path)?;
    tracing::info!("Wrote {} rows to {}", joined.len(), path.display());
    Ok(joined.len())
}
