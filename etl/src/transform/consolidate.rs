//! Statement consolidation: archives → summed expense per operator per quarter.
//!
//! # Algorithm
//!
//! ```text
//! for each archive (sorted):
//!     period   ← infer_period(path)            fatal if absent
//!     table    ← first .csv/.txt in the zip    skip (drift) if absent or unreadable
//!     require REG_ANS, CD_CONTA_CONTABIL, VL_SALDO_FINAL    skip (drift) if absent
//!     keep rows where CD_CONTA_CONTABIL == 411
//!     value    ← locale decimal, unparseable → 0.0 (recorded)
//!     sum value by REG_ANS (zero-padded when numeric)
//! union → left join registry on registration id → ConsolidatedRow
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ParsePolicy;
use crate::error::{ArchiveError, PipelineError, PipelineResult};
use crate::logs::{log_info, log_info_indent, log_success};
use crate::models::{Anomaly, ConsolidatedRow, QuarterPeriod};
use crate::output::write_table;
use crate::parser::{parse_locale_decimal, ColumnAliases, Table};
use crate::registry::{pad_registration_id, Registry};

use super::archive::{discover_archives, read_archive_table};
use super::period::infer_period;

const STAGE: &str = "consolidate";

/// Account code of the expense category this pipeline tracks.
pub const EXPENSE_ACCOUNT_CODE: &str = "411";

const REGISTRATION_CODE_COLUMN: ColumnAliases = &["REG_ANS"];
const ACCOUNT_CODE_COLUMN: ColumnAliases = &["CD_CONTA_CONTABIL"];
const FINAL_BALANCE_COLUMN: ColumnAliases = &["VL_SALDO_FINAL"];

/// Summed expense of one registration code in one archive.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterTotal {
    pub registration_id: String,
    pub period: QuarterPeriod,
    pub expense_value: f64,
}

/// Consolidated rows plus what was absorbed on the way.
#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    pub rows: Vec<ConsolidatedRow>,
    pub anomalies: Vec<Anomaly>,
    pub archives_found: usize,
    pub archives_used: usize,
    /// Rows whose registration code had no registry entry
    pub unmatched_registrations: usize,
}

/// Counts reported for the consolidation stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationReport {
    pub output: PathBuf,
    pub rows: usize,
    pub archives_found: usize,
    pub archives_used: usize,
    pub unmatched_registrations: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Grouping key of a statement's registration code.
///
/// Numeric codes are zero-padded like the registry ids; anything else is kept
/// trimmed so the expense survives as an unmatched row.
fn registration_key(raw: &str) -> String {
    pad_registration_id(raw).unwrap_or_else(|| raw.trim().to_string())
}

/// Sum the expense account per registration code within one statement table.
///
/// Returns `Ok(None)` when the table lacks the expected columns (already
/// absorbed into `anomalies` under the tolerant policy).
pub fn sum_statement_table(
    table: &Table,
    period: QuarterPeriod,
    source: &str,
    policy: ParsePolicy,
    anomalies: &mut Vec<Anomaly>,
) -> PipelineResult<Option<Vec<QuarterTotal>>> {
    let columns = match table.require_columns(&[
        REGISTRATION_CODE_COLUMN,
        ACCOUNT_CODE_COLUMN,
        FINAL_BALANCE_COLUMN,
    ]) {
        Ok(columns) => columns,
        Err(err) => {
            policy.absorb(STAGE, Anomaly::drift(source, err.to_string()), anomalies)?;
            return Ok(None);
        }
    };
    let (code_idx, account_idx, balance_idx) = (columns[0], columns[1], columns[2]);

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut unparsed = 0;

    for row in &table.rows {
        if Table::cell(row, account_idx).trim() != EXPENSE_ACCOUNT_CODE {
            continue;
        }

        let registration_id = registration_key(Table::cell(row, code_idx));
        let value = parse_locale_decimal(Table::cell(row, balance_idx)).unwrap_or_else(|| {
            unparsed += 1;
            0.0
        });
        *totals.entry(registration_id).or_insert(0.0) += value;
    }

    if unparsed > 0 {
        policy.absorb(
            STAGE,
            Anomaly::parse_failure(source, "unparseable final balance coerced to 0.00", unparsed),
            anomalies,
        )?;
    }

    Ok(Some(
        totals
            .into_iter()
            .map(|(registration_id, expense_value)| QuarterTotal {
                registration_id,
                period,
                expense_value,
            })
            .collect(),
    ))
}

/// Consolidate the given archives against the registry.
pub fn consolidate_archives(
    archives: &[PathBuf],
    registry: &Registry,
    policy: ParsePolicy,
) -> PipelineResult<Consolidation> {
    if archives.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: STAGE.into(),
            reason: "no statement archives found".into(),
        });
    }

    let mut consolidation = Consolidation {
        archives_found: archives.len(),
        ..Default::default()
    };
    let mut totals = Vec::new();

    for path in archives {
        let period = infer_period(path)?;
        let source = path.display().to_string();
        log_info_indent(STAGE, format!("Reading {} ({})", source, period), 1);

        let table = match read_archive_table(path) {
            Ok(Some(table)) => table,
            Ok(None) => {
                policy.absorb(
                    STAGE,
                    Anomaly::drift(&source, "archive contains no tabular file"),
                    &mut consolidation.anomalies,
                )?;
                continue;
            }
            Err(err @ (ArchiveError::Zip(_) | ArchiveError::Table(_))) => {
                policy.absorb(
                    STAGE,
                    Anomaly::drift(&source, format!("unreadable archive: {err}")),
                    &mut consolidation.anomalies,
                )?;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(archive_totals) =
            sum_statement_table(&table, period, &source, policy, &mut consolidation.anomalies)?
        {
            consolidation.archives_used += 1;
            totals.extend(archive_totals);
        }
    }

    if totals.is_empty() {
        return Err(PipelineError::EmptyResult {
            stage: STAGE.into(),
            reason: format!(
                "no rows with account code {} in {} archive(s)",
                EXPENSE_ACCOUNT_CODE,
                archives.len()
            ),
        });
    }

    let by_registration = registry.by_registration_id();
    for total in totals {
        let (tax_id, legal_name) = match by_registration.get(total.registration_id.as_str()) {
            Some(record) => (record.tax_id.clone(), record.legal_name.clone()),
            None => {
                consolidation.unmatched_registrations += 1;
                (String::new(), String::new())
            }
        };
        consolidation.rows.push(ConsolidatedRow {
            tax_id,
            legal_name,
            period: total.period,
            expense_value: total.expense_value,
        });
    }

    Ok(consolidation)
}

/// Consolidate every archive under `raw_dir` and write the consolidated table.
pub fn run_consolidation(
    raw_dir: &Path,
    registry: &Registry,
    output: &Path,
    policy: ParsePolicy,
) -> PipelineResult<ConsolidationReport> {
    log_info(STAGE, format!("Scanning {} for statement archives", raw_dir.display()));
    let archives = discover_archives(raw_dir)?;
    log_info(STAGE, format!("{} archive(s) found", archives.len()));

    let consolidation = consolidate_archives(&archives, registry, policy)?;
    let rows = write_table(output, &consolidation.rows)?;

    log_success(
        STAGE,
        format!(
            "{} rows from {}/{} archives → {} ({} without registry match)",
            rows,
            consolidation.archives_used,
            consolidation.archives_found,
            output.display(),
            consolidation.unmatched_registrations
        ),
    );

    Ok(ConsolidationReport {
        output: output.to_path_buf(),
        rows,
        archives_found: consolidation.archives_found,
        archives_used: consolidation.archives_used,
        unmatched_registrations: consolidation.unmatched_registrations,
        anomalies: consolidation.anomalies,
    })
}
