//! Dataset statistics over the validated table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::{CacheStats, TtlCache};
use crate::config::CacheConfig;
use crate::error::PipelineResult;
use crate::logs::log_info;
use crate::models::{RegistryRecord, ValidatedRow};
use crate::parser::read_table_file;
use crate::registry::Registry;
use crate::transform::enrich::dedup_registry;
use crate::validation::read_validated_rows;

const STAGE: &str = "stats";

/// Number of operators listed in [`DatasetStatistics::top_operators`].
pub const TOP_OPERATORS: usize = 5;

/// One of the highest-spending operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopOperator {
    pub tax_id: String,
    pub legal_name: String,
    /// `None` when the tax id has no registry entry
    pub region: Option<String>,
    pub total_expense: f64,
}

/// Totals over every validated row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStatistics {
    pub total_expenses: f64,
    pub mean_expense: f64,
    pub row_count: usize,
    pub top_operators: Vec<TopOperator>,
}

/// Compute statistics from validated rows and the resolved registry.
///
/// The legal name of a top operator is the greatest of its row snapshots.
pub fn compute_statistics(
    rows: &[ValidatedRow],
    resolved: &BTreeMap<String, RegistryRecord>,
) -> DatasetStatistics {
    let total_expenses: f64 = rows.iter().map(|r| r.expense_value).sum();
    let mean_expense = if rows.is_empty() {
        0.0
    } else {
        total_expenses / rows.len() as f64
    };

    let mut per_operator: BTreeMap<&str, (&str, f64)> = BTreeMap::new();
    for row in rows {
        let entry = per_operator
            .entry(row.tax_id.as_str())
            .or_insert((row.legal_name.as_str(), 0.0));
        if row.legal_name.as_str() > entry.0 {
            entry.0 = row.legal_name.as_str();
        }
        entry.1 += row.expense_value;
    }

    let mut ranked: Vec<(&str, (&str, f64))> = per_operator.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .1.total_cmp(&a.1 .1));

    let top_operators = ranked
        .into_iter()
        .take(TOP_OPERATORS)
        .map(|(tax_id, (legal_name, total_expense))| TopOperator {
            tax_id: tax_id.to_string(),
            legal_name: legal_name.to_string(),
            region: resolved.get(tax_id).map(|r| r.region.clone()),
            total_expense,
        })
        .collect();

    DatasetStatistics {
        total_expenses,
        mean_expense,
        row_count: rows.len(),
        top_operators,
    }
}

/// Serves [`DatasetStatistics`] for a validated table through a [`TtlCache`].
pub struct StatisticsService {
    validated: PathBuf,
    resolved: BTreeMap<String, RegistryRecord>,
    cache: TtlCache<PathBuf, DatasetStatistics>,
}

impl StatisticsService {
    pub fn new(validated: impl AsRef<Path>, registry: &Registry, cache: CacheConfig) -> Self {
        Self {
            validated: validated.as_ref().to_path_buf(),
            resolved: dedup_registry(&registry.records),
            cache: TtlCache::new(cache),
        }
    }

    /// Statistics of the validated table, recomputed at most once per TTL.
    pub fn statistics(&mut self) -> PipelineResult<DatasetStatistics> {
        let path = self.validated.clone();
        let resolved = &self.resolved;
        self.cache.get_or_compute(path.clone(), || -> PipelineResult<DatasetStatistics> {
            log_info(STAGE, format!("Computing statistics from {}", path.display()));
            let table = read_table_file(&path)?;
            let (rows, _) = read_validated_rows(&table)?;
            Ok(compute_statistics(&rows, resolved))
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Force the next call to recompute.
    pub fn invalidate(&mut self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn row(tax_id: &str, legal_name: &str, value: f64) -> ValidatedRow {
        ValidatedRow {
            tax_id: tax_id.into(),
            legal_name: legal_name.into(),
            quarter: "1".into(),
            year: "2025".into(),
            expense_value: value,
        }
    }

    fn registry() -> Registry {
        Registry {
            records: vec![RegistryRecord {
                registration_id: "000100".into(),
                tax_id: "11222333000181".into(),
                legal_name: "Alfa".into(),
                modality: "Grupo".into(),
                region: "SP".into(),
            }],
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn test_totals_and_top_operators() {
        let mut rows = vec![
            row("11222333000181", "Alfa", 100.0),
            row("11222333000181", "Alfa Saúde", 300.0),
        ];
        for (i, tax_id) in ["19131243000197", "12345678000195", "98765432000198", "44455566600024", "11144477700061"]
            .iter()
            .enumerate()
        {
            rows.push(row(tax_id, "Outra", (i + 1) as f64));
        }
        let resolved = dedup_registry(&registry().records);

        let stats = compute_statistics(&rows, &resolved);
        assert_eq!(stats.total_expenses, 415.0);
        assert_eq!(stats.row_count, 7);
        assert!((stats.mean_expense - 415.0 / 7.0).abs() < 1e-9);

        assert_eq!(stats.top_operators.len(), TOP_OPERATORS);
        let first = &stats.top_operators[0];
        assert_eq!(first.legal_name, "Alfa Saúde");
        assert_eq!(first.total_expense, 400.0);
        assert_eq!(first.region.as_deref(), Some("SP"));
        assert_eq!(stats.top_operators[1].region, None);
        assert!(!stats.top_operators.iter().any(|op| op.total_expense == 1.0));
    }

    #[test]
    fn test_empty_table_is_zero() {
        let stats = compute_statistics(&[], &BTreeMap::new());
        assert_eq!(stats.total_expenses, 0.0);
        assert_eq!(stats.mean_expense, 0.0);
        assert!(stats.top_operators.is_empty());
    }

    #[test]
    fn test_service_caches_within_ttl() {
        let dir = tempdir().unwrap();
        let validated = dir.path().join("validated.csv");
        std::fs::write(
            &validated,
            "taxId,legalName,quarter,year,expenseValue\n11222333000181,Alfa,1,2025,10.00\n",
        )
        .unwrap();

        let config = CacheConfig { capacity: 4, ttl: Duration::from_secs(300) };
        let mut service = StatisticsService::new(&validated, &registry(), config);
        let first = service.statistics().unwrap();

        // Changes on disk are not seen until the entry expires or is invalidated.
        std::fs::write(
            &validated,
            "taxId,legalName,quarter,year,expenseValue\n11222333000181,Alfa,1,2025,99.00\n",
        )
        .unwrap();
        assert_eq!(service.statistics().unwrap(), first);
        assert_eq!(service.cache_stats().hits, 1);

        service.invalidate();
        assert_eq!(service.statistics().unwrap().total_expenses, 99.0);
    }
}
