//! End-to-end pipeline: registry → consolidate → validate → enrich → aggregate.
//!
//! Each stage reads the file written by the previous one and fully recomputes
//! its own outputs. A stage failure aborts the run; per-row and per-archive
//! issues are absorbed according to the configured [`ParsePolicy`] and end up
//! in the run report.
//!
//! # Example
//!
//! ```rust,ignore
//! use ans_etl::{run_pipeline, PipelineConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_env()?;
//!     let report = run_pipeline(&config)?;
//!     println!("run {} wrote {} groups", report.run_id, report.aggregation.groups);
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{OutputPaths, ParsePolicy, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::logs::{log_error, log_info, log_success};
use crate::models::Anomaly;
use crate::output::package_single_file;
use crate::registry::{load_registry_file, Registry};

use super::aggregate::{run_aggregation, AggregationReport};
use super::consolidate::{run_consolidation, ConsolidationReport};
use super::enrich::{run_enrichment, EnrichmentReport};
use crate::validation::{run_validation, ValidationReport};

const STAGE: &str = "pipeline";

/// Counts reported for the registry load.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryReport {
    pub path: PathBuf,
    pub records: usize,
    pub anomalies: Vec<Anomaly>,
}

impl RegistryReport {
    fn new(path: &Path, registry: &Registry) -> Self {
        Self {
            path: path.to_path_buf(),
            records: registry.len(),
            anomalies: registry.anomalies.clone(),
        }
    }
}

/// Everything one run did, written as `run_report.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub policy: ParsePolicy,
    pub registry: RegistryReport,
    pub consolidation: ConsolidationReport,
    pub validation: ValidationReport,
    pub enrichment: EnrichmentReport,
    pub aggregation: AggregationReport,
    /// Zipped deliverables
    pub artifacts: Vec<PathBuf>,
}

impl PipelineReport {
    /// Anomalies recorded by every stage, in stage order.
    pub fn anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.registry
            .anomalies
            .iter()
            .chain(&self.consolidation.anomalies)
            .chain(&self.enrichment.anomalies)
            .chain(&self.aggregation.anomalies)
    }
}

/// Fail with [`PipelineError::MissingInput`] unless `path` exists.
pub fn require_input(stage: &str, path: &Path) -> PipelineResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput {
            stage: stage.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Zip the consolidated and aggregated tables into the artifacts directory.
pub fn package_outputs(outputs: &OutputPaths) -> PipelineResult<Vec<PathBuf>> {
    let pairs = [
        (&outputs.consolidated_csv, &outputs.consolidated_zip),
        (&outputs.aggregated_csv, &outputs.aggregated_zip),
    ];

    let mut artifacts = Vec::with_capacity(pairs.len());
    for (table, zip_path) in pairs {
        require_input("package", table)?;
        package_single_file(table, zip_path, None)?;
        log_success(STAGE, format!("Packaged {}", zip_path.display()));
        artifacts.push(zip_path.clone());
    }
    Ok(artifacts)
}

/// Serialize `report` as pretty JSON at `path`.
pub fn write_run_report(report: &PipelineReport, path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    Ok(())
}

/// Run every stage with `config`, then write the run report.
pub fn run_pipeline(config: &PipelineConfig) -> PipelineResult<PipelineReport> {
    let run_id = Uuid::new_v4();
    log_info(STAGE, format!("Run {} started (policy: {:?})", run_id, config.policy));

    match run_stages(config, run_id) {
        Ok(report) => {
            log_success(
                STAGE,
                format!(
                    "Run {} finished: {} consolidated, {} valid, {} matched, {} groups",
                    run_id,
                    report.consolidation.rows,
                    report.validation.valid_rows,
                    report.enrichment.matched_rows,
                    report.aggregation.groups
                ),
            );
            Ok(report)
        }
        Err(err) => {
            log_error(STAGE, format!("Run {} aborted: {}", run_id, err));
            Err(err)
        }
    }
}

fn run_stages(config: &PipelineConfig, run_id: Uuid) -> PipelineResult<PipelineReport> {
    let started_at = Utc::now();
    let outputs = config.outputs();
    let policy = config.policy;

    log_info(STAGE, "Step 1/5: loading operator registry");
    require_input("registry", &config.registry_path)?;
    let registry = load_registry_file(&config.registry_path, policy)?;

    log_info(STAGE, "Step 2/5: consolidating statement archives");
    require_input("consolidate", &config.raw_dir)?;
    let consolidation = run_consolidation(&config.raw_dir, &registry, &outputs.consolidated_csv, policy)?;
    package_single_file(&outputs.consolidated_csv, &outputs.consolidated_zip, None)?;

    log_info(STAGE, "Step 3/5: validating consolidated rows");
    require_input("validate", &outputs.consolidated_csv)?;
    let validation = run_validation(
        &outputs.consolidated_csv,
        &outputs.validated_csv,
        &outputs.invalid_rows_csv,
    )?;

    log_info(STAGE, "Step 4/5: enriching with registry data");
    require_input("enrich", &outputs.validated_csv)?;
    let enrichment = run_enrichment(
        &outputs.validated_csv,
        &registry,
        &outputs.enriched_csv,
        &outputs.unmatched_csv,
        &outputs.conflicts_csv,
        policy,
    )?;

    log_info(STAGE, "Step 5/5: aggregating by operator and region");
    require_input("aggregate", &outputs.enriched_csv)?;
    let aggregation = run_aggregation(&outputs.enriched_csv, &outputs.aggregated_csv, policy)?;
    package_single_file(&outputs.aggregated_csv, &outputs.aggregated_zip, None)?;

    let report = PipelineReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        policy,
        registry: RegistryReport::new(&config.registry_path, &registry),
        consolidation,
        validation,
        enrichment,
        aggregation,
        artifacts: vec![outputs.consolidated_zip.clone(), outputs.aggregated_zip.clone()],
    };
    write_run_report(&report, &outputs.run_report_json)?;
    log_info(STAGE, format!("Run report → {}", outputs.run_report_json.display()));

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::super::archive::fixtures::write_zip;
    use super::*;
    use tempfile::tempdir;

    const STATEMENT_HEADER: &str = "DATA;REG_ANS;CD_CONTA_CONTABIL;DESCRICAO;VL_SALDO_INICIAL;VL_SALDO_FINAL\n";

    fn seed(data_dir: &Path) -> PipelineConfig {
        let config = PipelineConfig::with_data_dir(data_dir);
        fs::create_dir_all(config.registry_path.parent().unwrap()).unwrap();
        fs::write(
            &config.registry_path,
            "REGISTRO_OPERADORA;CNPJ;Razao_Social;Modalidade;UF\n\
             100;11.222.333/0001-81;Operadora Alfa;Cooperativa Médica;SP\n\
             200;19131243000197;;Medicina de Grupo;RJ\n",
        )
        .unwrap();
        write_zip(
            &config.raw_dir.join("2025/1T/1T2025.zip"),
            &[(
                "1T2025.csv",
                &*format!("{STATEMENT_HEADER}d;100;411;E;0;1.000,00\nd;200;411;E;0;500,00\n"),
            )],
        );
        config
    }

    #[test]
    fn test_full_run_writes_every_output() {
        let dir = tempdir().unwrap();
        let config = seed(dir.path());

        let report = run_pipeline(&config).unwrap();
        assert_eq!(report.consolidation.rows, 2);
        assert_eq!(report.validation.valid_rows, 1);
        assert_eq!(report.validation.invalid_rows, 1);
        assert_eq!(report.enrichment.matched_rows, 1);
        assert_eq!(report.aggregation.groups, 1);

        let outputs = config.outputs();
        for path in [
            &outputs.consolidated_csv,
            &outputs.consolidated_zip,
            &outputs.validated_csv,
            &outputs.invalid_rows_csv,
            &outputs.enriched_csv,
            &outputs.unmatched_csv,
            &outputs.conflicts_csv,
            &outputs.aggregated_csv,
            &outputs.aggregated_zip,
            &outputs.run_report_json,
        ] {
            assert!(path.exists(), "{} missing", path.display());
        }

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&outputs.run_report_json).unwrap()).unwrap();
        assert_eq!(json["runId"], report.run_id.to_string());
        assert_eq!(json["validation"]["invalidRows"], 1);
    }

    #[test]
    fn test_missing_registry_is_missing_input() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::with_data_dir(dir.path());
        let err = run_pipeline(&config).unwrap_err();
        match err {
            PipelineError::MissingInput { stage, .. } => assert_eq!(stage, "registry"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_package_requires_tables() {
        let dir = tempdir().unwrap();
        let outputs = PipelineConfig::with_data_dir(dir.path()).outputs();
        assert!(matches!(
            package_outputs(&outputs),
            Err(PipelineError::MissingInput { .. })
        ));
    }
}
