//! Domain models for the expense ETL pipeline.
//!
//! One type per table the pipeline produces:
//!
//! - [`RegistryRecord`] - normalized operator registry entry
//! - [`ConsolidatedRow`] - summed expense per operator per quarter
//! - [`ExpenseRecord`] - a consolidated-format row as read back from disk
//! - [`ValidatedRow`] / [`InvalidRow`] - validator verdicts
//! - [`EnrichedRow`] - validated row plus registry enrichment
//! - [`RegistryConflict`] - tax id with conflicting registry entries
//! - [`AggregateRow`] - per (legal name, region) summary
//! - [`Anomaly`] - non-fatal issue a stage absorbed
//!
//! Each implements [`TableRow`], which fixes the output header and the
//! string rendering of a row.

pub mod tax_id;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use tax_id::{is_valid_tax_id, normalize_tax_id, TAX_ID_LEN};

/// Width of a zero-padded registration code.
pub const REGISTRATION_ID_LEN: usize = 6;

/// Fixed-point rendering used by every numeric output column.
pub fn format_amount(value: f64) -> String {
    format!("{:.2}", value)
}

/// A row that can be written as a delimited table.
pub trait TableRow {
    /// Column header, in output order.
    const HEADERS: &'static [&'static str];

    /// Cell values, in `HEADERS` order.
    fn to_record(&self) -> Vec<String>;
}

// =============================================================================
// Quarter Period
// =============================================================================

/// A (year, quarter) reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuarterPeriod {
    pub year: u16,
    /// 1 to 4
    pub quarter: u8,
}

impl QuarterPeriod {
    pub fn new(year: u16, quarter: u8) -> Option<Self> {
        if (1..=4).contains(&quarter) && (1000..=9999).contains(&year) {
            Some(Self { year, quarter })
        } else {
            None
        }
    }
}

impl fmt::Display for QuarterPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.quarter, self.year)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Operator registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    /// Exactly [`REGISTRATION_ID_LEN`] digits, zero-padded.
    pub registration_id: String,
    /// Digits only; not guaranteed unique across records.
    pub tax_id: String,
    pub legal_name: String,
    pub modality: String,
    /// State code (UF).
    pub region: String,
}

/// Tax id that maps to more than one distinct registration/modality/region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConflict {
    pub tax_id: String,
    pub registration_ids: Vec<String>,
    pub modalities: Vec<String>,
    pub regions: Vec<String>,
    pub registry_row_count: usize,
}

impl TableRow for RegistryConflict {
    const HEADERS: &'static [&'static str] =
        &["taxId", "registrationIds", "modalities", "regions", "registryRowCount"];

    fn to_record(&self) -> Vec<String> {
        vec![
            self.tax_id.clone(),
            self.registration_ids.join("|"),
            self.modalities.join("|"),
            self.regions.join("|"),
            self.registry_row_count.to_string(),
        ]
    }
}

// =============================================================================
// Consolidation
// =============================================================================

/// Header shared by consolidated and validated tables.
pub const EXPENSE_HEADERS: &[&str] = &["taxId", "legalName", "quarter", "year", "expenseValue"];

/// Summed expense of one operator in one quarter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedRow {
    /// Blank when the registration code had no registry match.
    pub tax_id: String,
    pub legal_name: String,
    pub period: QuarterPeriod,
    pub expense_value: f64,
}

impl TableRow for ConsolidatedRow {
    const HEADERS: &'static [&'static str] = EXPENSE_HEADERS;

    fn to_record(&self) -> Vec<String> {
        vec![
            self.tax_id.clone(),
            self.legal_name.clone(),
            self.period.quarter.to_string(),
            self.period.year.to_string(),
            format_amount(self.expense_value),
        ]
    }
}

/// A consolidated-format row read back from a table, all fields verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpenseRecord {
    pub tax_id: String,
    pub legal_name: String,
    pub quarter: String,
    pub year: String,
    pub expense_value: String,
}

// =============================================================================
// Validation
// =============================================================================

/// Why a consolidated row was quarantined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidReason {
    TaxidInvalid,
    LegalnameEmpty,
    ValueInvalidOrNonpositive,
}

impl InvalidReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TaxidInvalid => "TAXID_INVALID",
            Self::LegalnameEmpty => "LEGALNAME_EMPTY",
            Self::ValueInvalidOrNonpositive => "VALUE_INVALID_OR_NONPOSITIVE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "TAXID_INVALID" => Some(Self::TaxidInvalid),
            "LEGALNAME_EMPTY" => Some(Self::LegalnameEmpty),
            "VALUE_INVALID_OR_NONPOSITIVE" => Some(Self::ValueInvalidOrNonpositive),
            _ => None,
        }
    }

    /// Pipe-joined codes, e.g. `TAXID_INVALID|LEGALNAME_EMPTY`.
    pub fn join(reasons: &[InvalidReason]) -> String {
        reasons.iter().map(|r| r.code()).collect::<Vec<_>>().join("|")
    }
}

/// A row that passed every validity rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedRow {
    pub tax_id: String,
    pub legal_name: String,
    pub quarter: String,
    pub year: String,
    pub expense_value: f64,
}

impl TableRow for ValidatedRow {
    const HEADERS: &'static [&'static str] = EXPENSE_HEADERS;

    fn to_record(&self) -> Vec<String> {
        vec![
            self.tax_id.clone(),
            self.legal_name.clone(),
            self.quarter.clone(),
            self.year.clone(),
            format_amount(self.expense_value),
        ]
    }
}

/// A quarantined row with its reasons.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidRow {
    /// Normalized tax id / trimmed legal name, other fields verbatim.
    pub record: ExpenseRecord,
    /// `None` when the value did not parse.
    pub parsed_value: Option<f64>,
    pub reasons: Vec<InvalidReason>,
}

impl TableRow for InvalidRow {
    const HEADERS: &'static [&'static str] =
        &["taxId", "legalName", "quarter", "year", "expenseValue", "invalidReason"];

    fn to_record(&self) -> Vec<String> {
        let value = match self.parsed_value {
            Some(v) => format_amount(v),
            None => self.record.expense_value.trim().to_string(),
        };
        vec![
            self.record.tax_id.clone(),
            self.record.legal_name.clone(),
            self.record.quarter.clone(),
            self.record.year.clone(),
            value,
            InvalidReason::join(&self.reasons),
        ]
    }
}

// =============================================================================
// Enrichment
// =============================================================================

/// Validated row plus the registry fields of its deterministic match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRow {
    #[serde(flatten)]
    pub row: ValidatedRow,
    pub registration_id: Option<String>,
    pub modality: Option<String>,
    pub region: Option<String>,
}

impl EnrichedRow {
    /// A row is matched when it carries a non-blank registration id.
    pub fn is_matched(&self) -> bool {
        self.registration_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty())
    }
}

impl TableRow for EnrichedRow {
    const HEADERS: &'static [&'static str] = &[
        "taxId",
        "legalName",
        "quarter",
        "year",
        "expenseValue",
        "registrationId",
        "modality",
        "region",
    ];

    fn to_record(&self) -> Vec<String> {
        let mut record = self.row.to_record();
        record.push(self.registration_id.clone().unwrap_or_default());
        record.push(self.modality.clone().unwrap_or_default());
        record.push(self.region.clone().unwrap_or_default());
        record
    }
}

// =============================================================================
// Aggregation
// =============================================================================

/// Summary of one (legal name, region) group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    pub legal_name: String,
    pub region: String,
    pub total_expense: f64,
    pub mean_quarterly_expense: f64,
    pub std_dev_quarterly_expense: f64,
    pub quarter_count: usize,
}

impl TableRow for AggregateRow {
    const HEADERS: &'static [&'static str] = &[
        "legalName",
        "region",
        "totalExpense",
        "meanQuarterlyExpense",
        "stdDevQuarterlyExpense",
        "quarterCount",
    ];

    fn to_record(&self) -> Vec<String> {
        vec![
            self.legal_name.clone(),
            self.region.clone(),
            format_amount(self.total_expense),
            format_amount(self.mean_quarterly_expense),
            format_amount(self.std_dev_quarterly_expense),
            self.quarter_count.to_string(),
        ]
    }
}

// =============================================================================
// Anomalies
// =============================================================================

/// Kind of non-fatal issue absorbed by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// A file or row lacks the expected shape and was skipped.
    SourceFormatDrift,
    /// A numeric value did not parse and was coerced.
    ValueParseFailure,
}

/// A recorded, non-fatal issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// File (or file:line) the issue was found in
    pub source: String,
    pub detail: String,
    /// Rows affected
    pub count: usize,
}

impl Anomaly {
    pub fn drift(source: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: AnomalyKind::SourceFormatDrift,
            source: source.into(),
            detail: detail.into(),
            count: 1,
        }
    }

    pub fn parse_failure(source: impl Into<String>, detail: impl Into<String>, count: usize) -> Self {
        Self {
            kind: AnomalyKind::ValueParseFailure,
            source: source.into(),
            detail: detail.into(),
            count,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.detail)?;
        if self.count > 1 {
            write!(f, " ({} rows)", self.count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_period_bounds() {
        assert!(QuarterPeriod::new(2025, 1).is_some());
        assert!(QuarterPeriod::new(2025, 0).is_none());
        assert!(QuarterPeriod::new(2025, 5).is_none());
        assert!(QuarterPeriod::new(25, 1).is_none());
        assert_eq!(QuarterPeriod::new(2024, 3).unwrap().to_string(), "3Q2024");
    }

    #[test]
    fn test_consolidated_value_has_two_decimals() {
        let row = ConsolidatedRow {
            tax_id: "11222333000181".into(),
            legal_name: "Operadora Alfa".into(),
            period: QuarterPeriod { year: 2025, quarter: 1 },
            expense_value: 1234.5,
        };
        let record = row.to_record();
        assert_eq!(record, vec!["11222333000181", "Operadora Alfa", "1", "2025", "1234.50"]);
        assert_eq!(record.len(), ConsolidatedRow::HEADERS.len());
    }

    #[test]
    fn test_reason_codes_round_trip() {
        let reasons = [InvalidReason::TaxidInvalid, InvalidReason::ValueInvalidOrNonpositive];
        let joined = InvalidReason::join(&reasons);
        assert_eq!(joined, "TAXID_INVALID|VALUE_INVALID_OR_NONPOSITIVE");

        let parsed: Vec<_> = joined.split('|').filter_map(InvalidReason::from_code).collect();
        assert_eq!(parsed, reasons);
    }

    #[test]
    fn test_invalid_row_keeps_raw_value_when_unparsed() {
        let row = InvalidRow {
            record: ExpenseRecord {
                expense_value: " abc ".into(),
                ..Default::default()
            },
            parsed_value: None,
            reasons: vec![InvalidReason::ValueInvalidOrNonpositive],
        };
        assert_eq!(row.to_record()[4], "abc");

        let row = InvalidRow { parsed_value: Some(-12.5), ..row };
        assert_eq!(row.to_record()[4], "-12.50");
    }

    #[test]
    fn test_enriched_row_match_flag() {
        let base = ValidatedRow {
            tax_id: "11222333000181".into(),
            legal_name: "Operadora Alfa".into(),
            quarter: "1".into(),
            year: "2025".into(),
            expense_value: 10.0,
        };
        let unmatched = EnrichedRow {
            row: base.clone(),
            registration_id: Some("  ".into()),
            modality: None,
            region: None,
        };
        assert!(!unmatched.is_matched());
        assert_eq!(unmatched.to_record().len(), EnrichedRow::HEADERS.len());

        let matched = EnrichedRow {
            registration_id: Some("000123".into()),
            ..unmatched
        };
        assert!(matched.is_matched());
    }
}
