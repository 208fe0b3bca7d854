//! Transformation stages.
//!
//! - Period: year/quarter inference from archive paths
//! - Archive: statement archive discovery and extraction
//! - Consolidate: archives to per-operator quarterly totals
//! - Enrich: validated rows joined with the resolved registry
//! - Aggregate: per (legal name, region) summary
//! - Pipeline: all stages in order, plus the run report

pub mod aggregate;
pub mod archive;
pub mod consolidate;
pub mod enrich;
pub mod period;
pub mod pipeline;

pub use aggregate::{aggregate, aggregate_enriched, aggregate_table, run_aggregation, AggregationReport};
pub use archive::{discover_archives, read_archive_table};
pub use consolidate::{
    consolidate_archives, run_consolidation, sum_statement_table, Consolidation, ConsolidationReport,
    EXPENSE_ACCOUNT_CODE,
};
pub use enrich::{dedup_registry, detect_conflicts, enrich_rows, run_enrichment, Enrichment, EnrichmentReport};
pub use period::infer_period;
pub use pipeline::{package_outputs, require_input, run_pipeline, write_run_report, PipelineReport, RegistryReport};
