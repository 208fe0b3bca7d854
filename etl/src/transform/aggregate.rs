//! Aggregation of enriched rows per (legal name, region).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ParsePolicy;
use crate::error::PipelineResult;
use crate::logs::{log_info, log_success};
use crate::models::{AggregateRow, Anomaly, EnrichedRow};
use crate::output::write_table;
use crate::parser::{parse_detected_decimal, read_table_file, ColumnAliases, Table};
use crate::registry::REGION_COLUMN;
use crate::validation::{EXPENSE_VALUE_COLUMN, LEGAL_NAME_COLUMN};

const STAGE: &str = "aggregate";

/// Counts reported for the aggregation stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    pub output: PathBuf,
    pub input_rows: usize,
    pub groups: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Running values of one group.
#[derive(Default)]
struct GroupAccumulator {
    values: Vec<f64>,
}

impl GroupAccumulator {
    fn build(self, legal_name: String, region: String) -> AggregateRow {
        let count = self.values.len();
        let total: f64 = self.values.iter().sum();
        let mean = if count > 0 { total / count as f64 } else { 0.0 };
        let std_dev = if count > 1 {
            let squares: f64 = self.values.iter().map(|v| (v - mean).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        AggregateRow {
            legal_name,
            region,
            total_expense: total,
            mean_quarterly_expense: mean,
            std_dev_quarterly_expense: std_dev,
            quarter_count: count,
        }
    }
}

/// Group `(legal name, region, value)` observations and rank by total.
///
/// Keys are trimmed and compared case-sensitively. Groups are built in key
/// order and then stably sorted by descending total.
pub fn aggregate<I, S>(observations: I) -> Vec<AggregateRow>
where
    I: IntoIterator<Item = (S, S, f64)>,
    S: AsRef<str>,
{
    let mut groups: BTreeMap<(String, String), GroupAccumulator> = BTreeMap::new();
    for (legal_name, region, value) in observations {
        let key = (
            legal_name.as_ref().trim().to_string(),
            region.as_ref().trim().to_string(),
        );
        groups.entry(key).or_default().values.push(value);
    }

    let mut rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|((legal_name, region), acc)| acc.build(legal_name, region))
        .collect();
    rows.sort_by(|a, b| b.total_expense.total_cmp(&a.total_expense));
    rows
}

/// Aggregate in-memory enriched rows.
pub fn aggregate_enriched(rows: &[EnrichedRow]) -> Vec<AggregateRow> {
    aggregate(rows.iter().map(|r| {
        (
            r.row.legal_name.as_str(),
            r.region.as_deref().unwrap_or(""),
            r.row.expense_value,
        )
    }))
}

const AGGREGATE_COLUMNS: [ColumnAliases; 3] = [LEGAL_NAME_COLUMN, REGION_COLUMN, EXPENSE_VALUE_COLUMN];

/// Aggregate an enriched table. Unparseable values count as `0.0`;
/// their number is returned alongside the groups.
pub fn aggregate_table(table: &Table) -> PipelineResult<(Vec<AggregateRow>, usize)> {
    let idx = table.require_columns(&AGGREGATE_COLUMNS)?;
    let mut unparsed = 0;

    let observations: Vec<(&str, &str, f64)> = table
        .rows
        .iter()
        .map(|row| {
            let value = parse_detected_decimal(Table::cell(row, idx[2])).unwrap_or_else(|| {
                unparsed += 1;
                0.0
            });
            (Table::cell(row, idx[0]), Table::cell(row, idx[1]), value)
        })
        .collect();

    Ok((aggregate(observations), unparsed))
}

/// Aggregate the enriched table at `input` and write the ranked summary.
pub fn run_aggregation(input: &Path, output: &Path, policy: ParsePolicy) -> PipelineResult<AggregationReport> {
    log_info(STAGE, format!("Aggregating {}", input.display()));
    let table = read_table_file(input)?;
    let (rows, unparsed) = aggregate_table(&table)?;

    let mut anomalies = Vec::new();
    if unparsed > 0 {
        policy.absorb(
            STAGE,
            Anomaly::parse_failure(&table.name, "unparseable expense value counted as 0.00", unparsed),
            &mut anomalies,
        )?;
    }

    let groups = write_table(output, &rows)?;
    log_success(
        STAGE,
        format!("{} group(s) from {} rows → {}", groups, table.len(), output.display()),
    );

    Ok(AggregationReport {
        output: output.to_path_buf(),
        input_rows: table.len(),
        groups,
        anomalies,
    })
}
