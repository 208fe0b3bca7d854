//! Row validation for consolidated expense tables.
//!
//! Splits a consolidated table into valid and quarantined rows. A row is
//! quarantined when any rule fails; every failing rule contributes a reason
//! code, in rule order:
//!
//! | Rule | Code |
//! |---|---|
//! | tax id fails the check-digit test | `TAXID_INVALID` |
//! | legal name trims to empty | `LEGALNAME_EMPTY` |
//! | value unparseable, non-finite or ≤ 0 | `VALUE_INVALID_OR_NONPOSITIVE` |
//!
//! # Example
//!
//! ```rust,ignore
//! use ans_etl::validation::validate_record;
//!
//! let record = ExpenseRecord {
//!     tax_id: "11.222.333/0001-81".into(),
//!     legal_name: " Operadora Alfa ".into(),
//!     quarter: "1".into(),
//!     year: "2025".into(),
//!     expense_value: "1000,50".into(),
//! };
//! let row = validate_record(&record).unwrap();
//! assert_eq!(row.expense_value, 1000.5);
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineResult, TableResult};
use crate::logs::{log_info, log_success, log_warning};
use crate::models::{
    is_valid_tax_id, normalize_tax_id, ExpenseRecord, InvalidReason, InvalidRow, ValidatedRow,
};
use crate::output::write_table;
use crate::parser::{parse_detected_decimal, read_table_file, ColumnAliases, Table};

const STAGE: &str = "validate";

pub const TAX_ID_COLUMN: ColumnAliases = &["taxId", "CNPJ"];
pub const LEGAL_NAME_COLUMN: ColumnAliases = &["legalName", "RazaoSocial", "Razao_Social"];
pub const QUARTER_COLUMN: ColumnAliases = &["quarter", "Trimestre"];
pub const YEAR_COLUMN: ColumnAliases = &["year", "Ano"];
pub const EXPENSE_VALUE_COLUMN: ColumnAliases = &["expenseValue", "ValorDespesas"];

/// Columns every consolidated-format table must carry, in header order.
pub const EXPENSE_COLUMNS: [ColumnAliases; 5] = [
    TAX_ID_COLUMN,
    LEGAL_NAME_COLUMN,
    QUARTER_COLUMN,
    YEAR_COLUMN,
    EXPENSE_VALUE_COLUMN,
];

/// Valid and quarantined rows of one table.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub valid: Vec<ValidatedRow>,
    pub invalid: Vec<InvalidRow>,
}

/// Counts reported for the validation stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid_output: PathBuf,
    pub invalid_output: PathBuf,
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
}

/// Read consolidated-format rows, all fields verbatim.
///
/// Fails with a schema error when any expense column is missing.
pub fn read_expense_records(table: &Table) -> TableResult<Vec<ExpenseRecord>> {
    let idx = table.require_columns(&EXPENSE_COLUMNS)?;
    Ok(table
        .rows
        .iter()
        .map(|row| ExpenseRecord {
            tax_id: Table::cell(row, idx[0]).to_string(),
            legal_name: Table::cell(row, idx[1]).to_string(),
            quarter: Table::cell(row, idx[2]).to_string(),
            year: Table::cell(row, idx[3]).to_string(),
            expense_value: Table::cell(row, idx[4]).to_string(),
        })
        .collect())
}

/// Rows of an already validated table.
///
/// Values that no longer parse read as `0.0`; their number is returned
/// alongside the rows.
pub fn read_validated_rows(table: &Table) -> TableResult<(Vec<ValidatedRow>, usize)> {
    let mut unparsed = 0;
    let rows = read_expense_records(table)?
        .into_iter()
        .map(|record| ValidatedRow {
            expense_value: parse_detected_decimal(&record.expense_value).unwrap_or_else(|| {
                unparsed += 1;
                0.0
            }),
            tax_id: normalize_tax_id(&record.tax_id),
            legal_name: record.legal_name.trim().to_string(),
            quarter: record.quarter.trim().to_string(),
            year: record.year.trim().to_string(),
        })
        .collect();
    Ok((rows, unparsed))
}

/// Apply every rule to one record.
pub fn validate_record(record: &ExpenseRecord) -> Result<ValidatedRow, InvalidRow> {
    let tax_id = normalize_tax_id(&record.tax_id);
    let legal_name = record.legal_name.trim().to_string();
    let parsed_value = parse_detected_decimal(&record.expense_value);

    let mut reasons = Vec::new();
    if !is_valid_tax_id(&tax_id) {
        reasons.push(InvalidReason::TaxidInvalid);
    }
    if legal_name.is_empty() {
        reasons.push(InvalidReason::LegalnameEmpty);
    }
    let value = parsed_value.filter(|v| *v > 0.0);
    if value.is_none() {
        reasons.push(InvalidReason::ValueInvalidOrNonpositive);
    }

    match value {
        Some(expense_value) if reasons.is_empty() => Ok(ValidatedRow {
            tax_id,
            legal_name,
            quarter: record.quarter.trim().to_string(),
            year: record.year.trim().to_string(),
            expense_value,
        }),
        _ => Err(InvalidRow {
            record: ExpenseRecord {
                tax_id,
                legal_name,
                ..record.clone()
            },
            parsed_value,
            reasons,
        }),
    }
}

/// Partition a consolidated table.
pub fn validate_table(table: &Table) -> TableResult<ValidationOutcome> {
    let mut outcome = ValidationOutcome::default();
    for record in read_expense_records(table)? {
        match validate_record(&record) {
            Ok(row) => outcome.valid.push(row),
            Err(row) => outcome.invalid.push(row),
        }
    }
    Ok(outcome)
}

/// Validate `input` and write both partitions.
///
/// The invalid-rows table is written even when empty.
pub fn run_validation(input: &Path, valid_output: &Path, invalid_output: &Path) -> PipelineResult<ValidationReport> {
    log_info(STAGE, format!("Validating {}", input.display()));
    let table = read_table_file(input)?;
    let outcome = validate_table(&table)?;

    let valid_rows = write_table(valid_output, &outcome.valid)?;
    let invalid_rows = write_table(invalid_output, &outcome.invalid)?;

    if invalid_rows > 0 {
        log_warning(
            STAGE,
            format!("{} row(s) quarantined → {}", invalid_rows, invalid_output.display()),
        );
    }
    log_success(
        STAGE,
        format!("{} valid row(s) → {}", valid_rows, valid_output.display()),
    );

    Ok(ValidationReport {
        valid_output: valid_output.to_path_buf(),
        invalid_output: invalid_output.to_path_buf(),
        total_rows: table.len(),
        valid_rows,
        invalid_rows,
    })
}
