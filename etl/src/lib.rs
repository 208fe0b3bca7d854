//! # ans-etl - Health-plan operator expense consolidation
//!
//! Turns the regulator's quarterly accounting statements and operator
//! registry into validated, enriched and aggregated expense tables.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐
//! │  Statement  │──▶│ Consolidate │──▶│ Validate │──▶│  Enrich  │──▶│ Aggregate │
//! │  archives   │   │ (sum 411)   │   │ (CNPJ…)  │   │ (dedup)  │   │ (rank)    │
//! └─────────────┘   └──────▲──────┘   └──────────┘   └────▲─────┘   └───────────┘
//!                          │                              │
//!                   ┌──────┴──────────────────────────────┴─┐
//!                   │           Operator registry           │
//!                   └───────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ans_etl::{run_pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?;
//! let report = run_pipeline(&config)?;
//! println!("{} valid rows", report.validation.valid_rows);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`logs`] - Stage-aware log broadcast
//! - [`config`] - Data layout, parse policy, cache settings
//! - [`models`] - Domain rows and tax id rules
//! - [`parser`] - Table reading with auto-detection
//! - [`output`] - Table writing and zip packaging
//! - [`registry`] - Operator registry loader
//! - [`transform`] - Consolidation, enrichment, aggregation, pipeline
//! - [`validation`] - Row validator
//! - [`cache`] - TTL cache
//! - [`stats`] - Dataset statistics
//! - [`query`] - Operator directory lookups

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Table I/O
pub mod output;
pub mod parser;

// Stages
pub mod registry;
pub mod transform;
pub mod validation;

// Read side
pub mod cache;
pub mod query;
pub mod stats;

// =============================================================================
// Re-exports - Errors
// =============================================================================

pub use error::{
    ArchiveError, ConfigError, PipelineError, PipelineResult, QueryError, TableError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{CacheConfig, OutputPaths, ParsePolicy, PipelineConfig};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AggregateRow, Anomaly, AnomalyKind, ConsolidatedRow, EnrichedRow, InvalidReason, InvalidRow,
    QuarterPeriod, RegistryConflict, RegistryRecord, TableRow, ValidatedRow,
};

// =============================================================================
// Re-exports - Table I/O
// =============================================================================

pub use output::{package_single_file, write_table};
pub use parser::{read_table_file, DecimalFormat, Table};

// =============================================================================
// Re-exports - Stages
// =============================================================================

pub use registry::{load_registry_file, Registry};
pub use transform::{
    package_outputs, run_aggregation, run_consolidation, run_enrichment, run_pipeline, PipelineReport,
};
pub use validation::{run_validation, validate_table, ValidationOutcome};

// =============================================================================
// Re-exports - Read side
// =============================================================================

pub use cache::TtlCache;
pub use query::{OperatorDirectory, Page};
pub use stats::{DatasetStatistics, StatisticsService};
