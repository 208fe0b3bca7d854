//! Pipeline configuration.
//!
//! Defaults mirror the on-disk layout used by the regulator download jobs:
//!
//! ```text
//! data/
//! ├── raw/ans/demonstracoes_contabeis/<YYYY>/<q>T/*.zip   statement archives
//! ├── raw/ans/operadoras_ativas/Relatorio_cadop.csv        operator registry
//! ├── processed/                                           stage tables
//! ├── aggregated/                                          ranked summary
//! └── artifacts/                                           zipped deliverables + run report
//! ```
//!
//! [`PipelineConfig::from_env`] reads overrides from the environment (and `.env`).

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult, PipelineError, PipelineResult};
use crate::logs::log_warning;
use crate::models::{Anomaly, AnomalyKind};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_STATS_CACHE_TTL_SECONDS: u64 = 300;
pub const DEFAULT_STATS_CACHE_CAPACITY: usize = 16;

// =============================================================================
// Parse Policy
// =============================================================================

/// How a stage reacts to upstream format drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Drift aborts the stage.
    Strict,
    /// Drift is logged and recorded, the offending row/file is skipped.
    #[default]
    Tolerant,
}

impl ParsePolicy {
    pub fn is_strict(self) -> bool {
        self == ParsePolicy::Strict
    }

    /// Apply the policy to an anomaly found by `stage`.
    ///
    /// Format drift under `Strict` becomes an error; everything else is
    /// logged as a warning and appended to `anomalies`.
    pub fn absorb(self, stage: &str, anomaly: Anomaly, anomalies: &mut Vec<Anomaly>) -> PipelineResult<()> {
        if self.is_strict() && anomaly.kind == AnomalyKind::SourceFormatDrift {
            return Err(PipelineError::SourceFormatDrift {
                source_name: anomaly.source,
                detail: anomaly.detail,
            });
        }
        log_warning(stage, anomaly.to_string());
        anomalies.push(anomaly);
        Ok(())
    }
}

impl FromStr for ParsePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ParsePolicy::Strict),
            "tolerant" | "" => Ok(ParsePolicy::Tolerant),
            other => Err(ConfigError::InvalidValue {
                key: "ANS_PARSE_POLICY".into(),
                value: other.into(),
                reason: "expected 'strict' or 'tolerant'".into(),
            }),
        }
    }
}

// =============================================================================
// Cache Config
// =============================================================================

/// Capacity and time-to-live of a [`crate::cache::TtlCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_STATS_CACHE_CAPACITY,
            ttl: Duration::from_secs(DEFAULT_STATS_CACHE_TTL_SECONDS),
        }
    }
}

// =============================================================================
// Pipeline Config
// =============================================================================

/// Input locations, output directories and stage policy for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root scanned recursively for statement archives
    pub raw_dir: PathBuf,
    /// Operator registry file
    pub registry_path: PathBuf,
    pub processed_dir: PathBuf,
    pub aggregated_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub policy: ParsePolicy,
    pub stats_cache: CacheConfig,
}

impl PipelineConfig {
    /// Layout rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let base = data_dir.as_ref();
        Self {
            raw_dir: base.join("raw/ans/demonstracoes_contabeis"),
            registry_path: base.join("raw/ans/operadoras_ativas/Relatorio_cadop.csv"),
            processed_dir: base.join("processed"),
            aggregated_dir: base.join("aggregated"),
            artifacts_dir: base.join("artifacts"),
            policy: ParsePolicy::default(),
            stats_cache: CacheConfig::default(),
        }
    }

    /// Build from environment variables, loading `.env` first if present.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `ANS_DATA_DIR` | `data` |
    /// | `ANS_RAW_DIR` | `<data>/raw/ans/demonstracoes_contabeis` |
    /// | `ANS_REGISTRY_PATH` | `<data>/raw/ans/operadoras_ativas/Relatorio_cadop.csv` |
    /// | `ANS_PARSE_POLICY` | `tolerant` |
    /// | `STATS_CACHE_TTL_SECONDS` | `300` |
    /// | `STATS_CACHE_CAPACITY` | `16` |
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("ANS_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let mut config = Self::with_data_dir(data_dir);

        if let Some(raw) = lookup("ANS_RAW_DIR") {
            config.raw_dir = PathBuf::from(raw);
        }
        if let Some(registry) = lookup("ANS_REGISTRY_PATH") {
            config.registry_path = PathBuf::from(registry);
        }
        if let Some(policy) = lookup("ANS_PARSE_POLICY") {
            config.policy = policy.parse()?;
        }
        if let Some(ttl) = lookup("STATS_CACHE_TTL_SECONDS") {
            config.stats_cache.ttl = Duration::from_secs(parse_number("STATS_CACHE_TTL_SECONDS", &ttl)?);
        }
        if let Some(capacity) = lookup("STATS_CACHE_CAPACITY") {
            let capacity = parse_number("STATS_CACHE_CAPACITY", &capacity)?;
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "STATS_CACHE_CAPACITY".into(),
                    value: "0".into(),
                    reason: "capacity must be at least 1".into(),
                });
            }
            config.stats_cache.capacity = capacity as usize;
        }

        Ok(config)
    }

    pub fn with_policy(mut self, policy: ParsePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Every file the pipeline writes.
    pub fn outputs(&self) -> OutputPaths {
        OutputPaths {
            consolidated_csv: self.processed_dir.join("consolidated_expenses.csv"),
            consolidated_zip: self.artifacts_dir.join("consolidated_expenses.zip"),
            validated_csv: self.processed_dir.join("consolidated_validated.csv"),
            invalid_rows_csv: self.processed_dir.join("consolidated_invalid_rows.csv"),
            enriched_csv: self.processed_dir.join("enriched.csv"),
            unmatched_csv: self.processed_dir.join("unmatched_tax_ids.csv"),
            conflicts_csv: self.processed_dir.join("registry_conflicts.csv"),
            aggregated_csv: self.aggregated_dir.join("aggregated_expenses.csv"),
            aggregated_zip: self.artifacts_dir.join("aggregated_expenses.zip"),
            run_report_json: self.artifacts_dir.join("run_report.json"),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR)
    }
}

/// Output file locations derived from a [`PipelineConfig`].
#[derive(Debug, Clone, Serialize)]
pub struct OutputPaths {
    pub consolidated_csv: PathBuf,
    pub consolidated_zip: PathBuf,
    pub validated_csv: PathBuf,
    pub invalid_rows_csv: PathBuf,
    pub enriched_csv: PathBuf,
    pub unmatched_csv: PathBuf,
    pub conflicts_csv: PathBuf,
    pub aggregated_csv: PathBuf,
    pub aggregated_zip: PathBuf,
    pub run_report_json: PathBuf,
}

fn parse_number(key: &str, value: &str) -> ConfigResult<u64> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
        reason: "expected a non-negative integer".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.policy, ParsePolicy::Tolerant);
        assert_eq!(config.stats_cache.ttl, Duration::from_secs(300));
        assert_eq!(config.processed_dir, PathBuf::from("data/processed"));
        assert!(config.registry_path.ends_with("Relatorio_cadop.csv"));
    }

    #[test]
    fn test_env_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("ANS_DATA_DIR", "/tmp/ans"),
            ("ANS_PARSE_POLICY", "STRICT"),
            ("STATS_CACHE_TTL_SECONDS", "5"),
            ("STATS_CACHE_CAPACITY", "2"),
        ]))
        .unwrap();

        assert_eq!(config.policy, ParsePolicy::Strict);
        assert_eq!(config.stats_cache.capacity, 2);
        assert_eq!(config.stats_cache.ttl, Duration::from_secs(5));
        assert_eq!(config.outputs().enriched_csv, PathBuf::from("/tmp/ans/processed/enriched.csv"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("ANS_PARSE_POLICY", "lenient")]))
            .unwrap_err();
        assert!(err.to_string().contains("ANS_PARSE_POLICY"));

        let err = PipelineConfig::from_lookup(lookup_from(&[("STATS_CACHE_TTL_SECONDS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("STATS_CACHE_TTL_SECONDS"));

        assert!(PipelineConfig::from_lookup(lookup_from(&[("STATS_CACHE_CAPACITY", "0")])).is_err());
    }

    #[test]
    fn test_policy_absorb() {
        let mut anomalies = Vec::new();
        ParsePolicy::Tolerant
            .absorb("test", Anomaly::drift("a.zip", "no table"), &mut anomalies)
            .unwrap();
        assert_eq!(anomalies.len(), 1);

        let err = ParsePolicy::Strict
            .absorb("test", Anomaly::drift("b.zip", "no table"), &mut anomalies)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceFormatDrift { .. }));
        assert_eq!(anomalies.len(), 1);

        // Coerced values never abort.
        ParsePolicy::Strict
            .absorb("test", Anomaly::parse_failure("c.zip", "bad balance", 3), &mut anomalies)
            .unwrap();
        assert_eq!(anomalies.len(), 2);
    }
}
