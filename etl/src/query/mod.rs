//! Read-side lookups over the registry and the validated table.
//!
//! - [`OperatorDirectory::list`] - paged registry listing with search
//! - [`OperatorDirectory::get`] - deterministic registry record for a tax id
//! - [`OperatorDirectory::expenses`] - quarterly expense history of a tax id

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::config::ParsePolicy;
use crate::error::{PipelineResult, QueryError, QueryResult};
use crate::models::{normalize_tax_id, RegistryRecord, ValidatedRow};
use crate::parser::read_table_file;
use crate::registry::{load_registry_file, Registry};
use crate::transform::enrich::dedup_registry;
use crate::validation::read_validated_rows;

/// Largest accepted page size.
pub const MAX_PAGE_LIMIT: usize = 100;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Matches across all pages
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

/// One quarter of an operator's expense history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseEntry {
    pub year: String,
    pub quarter: String,
    pub expense_value: f64,
    /// Legal name as recorded on that row
    pub legal_name_snapshot: String,
}

/// In-memory directory of operators and their validated expenses.
pub struct OperatorDirectory {
    records: Vec<RegistryRecord>,
    resolved: BTreeMap<String, RegistryRecord>,
    expenses: Vec<ValidatedRow>,
}

impl OperatorDirectory {
    pub fn new(registry: Registry, expenses: Vec<ValidatedRow>) -> Self {
        let resolved = dedup_registry(&registry.records);
        let mut records = registry.records;
        records.sort_by(|a, b| {
            cmp_name_blanks_last(&a.legal_name, &b.legal_name)
                .then_with(|| a.registration_id.cmp(&b.registration_id))
        });
        Self {
            records,
            resolved,
            expenses,
        }
    }

    /// Load the registry file and the validated table.
    pub fn load(registry: &Path, validated: &Path, policy: ParsePolicy) -> PipelineResult<Self> {
        let registry = load_registry_file(registry, policy)?;
        let table = read_table_file(validated)?;
        let (rows, _) = read_validated_rows(&table)?;
        Ok(Self::new(registry, rows))
    }

    /// Registry records ordered by legal name.
    ///
    /// A search containing digits matches a tax id substring; any other
    /// search matches a legal name substring, ignoring case.
    pub fn list(&self, page: usize, limit: usize, search: Option<&str>) -> QueryResult<Page<RegistryRecord>> {
        if page < 1 || limit < 1 || limit > MAX_PAGE_LIMIT {
            return Err(QueryError::InvalidPage {
                page,
                limit,
                max_limit: MAX_PAGE_LIMIT,
            });
        }

        let search = search.map(str::trim).unwrap_or("");
        let digits = normalize_tax_id(search);
        let needle = search.to_lowercase();

        let matches: Vec<&RegistryRecord> = self
            .records
            .iter()
            .filter(|r| {
                if !digits.is_empty() {
                    r.tax_id.contains(&digits)
                } else if !needle.is_empty() {
                    r.legal_name.to_lowercase().contains(&needle)
                } else {
                    true
                }
            })
            .collect();

        let data = matches
            .iter()
            .skip((page - 1) * limit)
            .take(limit)
            .map(|r| (*r).clone())
            .collect();

        Ok(Page {
            data,
            total: matches.len(),
            page,
            limit,
        })
    }

    /// Registry record for a tax id; formatting in `tax_id` is ignored.
    pub fn get(&self, tax_id: &str) -> QueryResult<RegistryRecord> {
        let digits = normalize_tax_id(tax_id);
        self.resolved
            .get(&digits)
            .cloned()
            .ok_or_else(|| QueryError::NotFound(tax_id.trim().to_string()))
    }

    /// Expense history ordered by (year, quarter). Empty when the tax id has no rows.
    pub fn expenses(&self, tax_id: &str) -> Vec<ExpenseEntry> {
        let digits = normalize_tax_id(tax_id);
        let mut history: Vec<ExpenseEntry> = self
            .expenses
            .iter()
            .filter(|row| row.tax_id == digits)
            .map(|row| ExpenseEntry {
                year: row.year.clone(),
                quarter: row.quarter.clone(),
                expense_value: row.expense_value,
                legal_name_snapshot: row.legal_name.clone(),
            })
            .collect();
        history.sort_by_key(|e| (period_part(&e.year), period_part(&e.quarter)));
        history
    }
}

/// Numeric value of a year/quarter cell, non-numeric sorting last.
fn period_part(raw: &str) -> (u32, String) {
    (raw.trim().parse().unwrap_or(u32::MAX), raw.to_string())
}

fn cmp_name_blanks_last(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(registration_id: &str, tax_id: &str, legal_name: &str) -> RegistryRecord {
        RegistryRecord {
            registration_id: registration_id.into(),
            tax_id: tax_id.into(),
            legal_name: legal_name.into(),
            modality: "Grupo".into(),
            region: "SP".into(),
        }
    }

    fn expense(tax_id: &str, year: &str, quarter: &str, value: f64) -> ValidatedRow {
        ValidatedRow {
            tax_id: tax_id.into(),
            legal_name: "Alfa".into(),
            quarter: quarter.into(),
            year: year.into(),
            expense_value: value,
        }
    }

    fn directory() -> OperatorDirectory {
        let registry = Registry {
            records: vec![
                record("000300", "19131243000197", "Gama Saúde"),
                record("000100", "11222333000181", "Alfa Assistência"),
                record("000200", "12345678000195", ""),
                record("000400", "98765432000198", "Beta Planos"),
            ],
            anomalies: Vec::new(),
        };
        OperatorDirectory::new(
            registry,
            vec![
                expense("11222333000181", "2025", "1", 30.0),
                expense("11222333000181", "2024", "4", 20.0),
                expense("11222333000181", "2024", "3", 10.0),
                expense("19131243000197", "2025", "1", 99.0),
            ],
        )
    }

    #[test]
    fn test_list_ordered_by_name_blanks_last() {
        let page = directory().list(1, 10, None).unwrap();
        let names: Vec<_> = page.data.iter().map(|r| r.legal_name.as_str()).collect();
        assert_eq!(names, vec!["Alfa Assistência", "Beta Planos", "Gama Saúde", ""]);
        assert_eq!(page.total, 4);
    }

    #[test]
    fn test_list_paging() {
        let page = directory().list(2, 3, None).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.total, 4);
        assert_eq!((page.page, page.limit), (2, 3));

        assert!(directory().list(5, 3, None).unwrap().data.is_empty());
    }

    #[test]
    fn test_list_search_by_digits_or_name() {
        let dir = directory();
        let by_digits = dir.list(1, 10, Some("11.222")).unwrap();
        assert_eq!(by_digits.total, 1);
        assert_eq!(by_digits.data[0].tax_id, "11222333000181");

        let by_name = dir.list(1, 10, Some("  SAÚDE ")).unwrap();
        assert_eq!(by_name.total, 1);
        assert_eq!(by_name.data[0].registration_id, "000300");
    }

    #[test]
    fn test_invalid_paging_rejected() {
        let dir = directory();
        for (page, limit) in [(0, 10), (1, 0), (1, 101)] {
            assert!(matches!(dir.list(page, limit, None), Err(QueryError::InvalidPage { .. })));
        }
        assert!(dir.list(1, MAX_PAGE_LIMIT, None).is_ok());
    }

    #[test]
    fn test_get_normalizes_tax_id() {
        let dir = directory();
        assert_eq!(dir.get("11.222.333/0001-81").unwrap().registration_id, "000100");
        assert!(matches!(dir.get("00000000000000"), Err(QueryError::NotFound(_))));
    }

    #[test]
    fn test_expenses_ordered_by_period() {
        let history = directory().expenses("11222333000181");
        let periods: Vec<_> = history.iter().map(|e| (e.year.as_str(), e.quarter.as_str())).collect();
        assert_eq!(periods, vec![("2024", "3"), ("2024", "4"), ("2025", "1")]);
        assert!(directory().expenses("55123456000130").is_empty());
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempdir().unwrap();
        let registry = dir.path().join("cadop.csv");
        let validated = dir.path().join("validated.csv");
        std::fs::write(&registry, "REGISTRO_OPERADORA;CNPJ;Razao_Social;Modalidade;UF\n100;11222333000181;Alfa;Grupo;SP\n").unwrap();
        std::fs::write(
            &validated,
            "taxId,legalName,quarter,year,expenseValue\n11222333000181,Alfa,1,2025,10.00\n",
        )
        .unwrap();

        let directory = OperatorDirectory::load(&registry, &validated, ParsePolicy::Tolerant).unwrap();
        assert_eq!(directory.get("11222333000181").unwrap().region, "SP");
        assert_eq!(directory.expenses("11222333000181")[0].expense_value, 10.0);
    }
}
