//! Enrichment: validated rows ⋈ registry on tax id.
//!
//! The registry is not unique per tax id, so it is resolved before the join:
//!
//! ```text
//! Registry (many rows per tax id)      Resolved (one row per tax id)
//! ┌─────────────────────────────┐      ┌─────────────────────────────┐
//! │ 111… 000200  RJ  Grupo      │      │ 111… 000100  SP  Cooperativa│
//! │ 111… 000100  SP  Cooperativa│  →   │ 222… 000300  MG  Grupo      │
//! │ 222… 000300  MG  Grupo      │      └─────────────────────────────┘
//! └─────────────────────────────┘
//! ```
//!
//! Rows are sorted by (tax id, registration id, region, modality) with blank
//! values last and the first row per tax id wins. Tax ids whose rows disagree
//! are listed in the conflict report; they do not block the join.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ParsePolicy;
use crate::error::PipelineResult;
use crate::logs::{log_info, log_success, log_warning};
use crate::models::{Anomaly, EnrichedRow, RegistryConflict, RegistryRecord, ValidatedRow};
use crate::output::write_table;
use crate::parser::read_table_file;
use crate::registry::Registry;
use crate::validation::read_validated_rows;

const STAGE: &str = "enrich";

/// Enriched rows plus the diagnostics of the join.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub rows: Vec<EnrichedRow>,
    pub conflicts: Vec<RegistryConflict>,
}

impl Enrichment {
    pub fn unmatched(&self) -> impl Iterator<Item = &EnrichedRow> {
        self.rows.iter().filter(|row| !row.is_matched())
    }

    pub fn matched_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_matched()).count()
    }
}

/// Counts reported for the enrichment stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentReport {
    pub output: PathBuf,
    pub unmatched_output: PathBuf,
    pub conflicts_output: PathBuf,
    pub total_rows: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    pub conflicting_tax_ids: usize,
    pub anomalies: Vec<Anomaly>,
}

// =============================================================================
// Registry resolution
// =============================================================================

/// Accumulates the distinct values seen for one tax id. Blank is a value too.
#[derive(Default)]
struct ConflictBuilder {
    registration_ids: BTreeSet<String>,
    modalities: BTreeSet<String>,
    regions: BTreeSet<String>,
    rows: usize,
}

impl ConflictBuilder {
    fn add(&mut self, record: &RegistryRecord) {
        self.registration_ids.insert(record.registration_id.trim().to_string());
        self.modalities.insert(record.modality.trim().to_string());
        self.regions.insert(record.region.trim().to_string());
        self.rows += 1;
    }

    fn is_conflicted(&self) -> bool {
        self.registration_ids.len() > 1 || self.modalities.len() > 1 || self.regions.len() > 1
    }

    fn build(self, tax_id: String) -> RegistryConflict {
        RegistryConflict {
            tax_id,
            registration_ids: self.registration_ids.into_iter().collect(),
            modalities: self.modalities.into_iter().collect(),
            regions: self.regions.into_iter().collect(),
            registry_row_count: self.rows,
        }
    }
}

/// Tax ids with more than one distinct registration id, modality or region.
///
/// A blank next to a filled value is a conflict.
pub fn detect_conflicts(records: &[RegistryRecord]) -> Vec<RegistryConflict> {
    let mut groups: BTreeMap<&str, ConflictBuilder> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.tax_id.is_empty()) {
        groups.entry(record.tax_id.as_str()).or_default().add(record);
    }

    groups
        .into_iter()
        .filter(|(_, builder)| builder.is_conflicted())
        .map(|(tax_id, builder)| builder.build(tax_id.to_string()))
        .collect()
}

/// Ascending comparison where blank values sort after every non-blank one.
fn cmp_blanks_last(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.trim(), b.trim());
    match (a.is_empty(), b.is_empty()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => a.cmp(b),
    }
}

fn cmp_registry_order(a: &RegistryRecord, b: &RegistryRecord) -> Ordering {
    cmp_blanks_last(&a.tax_id, &b.tax_id)
        .then_with(|| cmp_blanks_last(&a.registration_id, &b.registration_id))
        .then_with(|| cmp_blanks_last(&a.region, &b.region))
        .then_with(|| cmp_blanks_last(&a.modality, &b.modality))
}

/// One registry record per tax id: the first by
/// (tax id, registration id, region, modality), blanks last.
pub fn dedup_registry(records: &[RegistryRecord]) -> BTreeMap<String, RegistryRecord> {
    let mut sorted: Vec<&RegistryRecord> = records.iter().filter(|r| !r.tax_id.is_empty()).collect();
    sorted.sort_by(|a, b| cmp_registry_order(a, b));

    let mut resolved = BTreeMap::new();
    for record in sorted {
        resolved
            .entry(record.tax_id.clone())
            .or_insert_with(|| record.clone());
    }
    resolved
}

// =============================================================================
// Join
// =============================================================================

/// Left-join `rows` against the resolved registry. Every row appears exactly once.
pub fn enrich_rows(rows: Vec<ValidatedRow>, registry: &Registry) -> Enrichment {
    let conflicts = detect_conflicts(&registry.records);
    let resolved = dedup_registry(&registry.records);

    let rows = rows
        .into_iter()
        .map(|row| match resolved.get(&row.tax_id) {
            Some(record) => EnrichedRow {
                registration_id: Some(record.registration_id.clone()),
                modality: Some(record.modality.clone()),
                region: Some(record.region.clone()),
                row,
            },
            None => EnrichedRow {
                row,
                registration_id: None,
                modality: None,
                region: None,
            },
        })
        .collect();

    Enrichment { rows, conflicts }
}

/// Enrich the validated table and write the enriched, unmatched and conflict tables.
pub fn run_enrichment(
    validated: &Path,
    registry: &Registry,
    output: &Path,
    unmatched_output: &Path,
    conflicts_output: &Path,
    policy: ParsePolicy,
) -> PipelineResult<EnrichmentReport> {
    log_info(STAGE, format!("Enriching {} against {} registry records", validated.display(), registry.len()));
    let table = read_table_file(validated)?;
    let (rows, unparsed) = read_validated_rows(&table)?;

    let mut anomalies = Vec::new();
    if unparsed > 0 {
        policy.absorb(
            STAGE,
            Anomaly::parse_failure(&table.name, "unparseable expense value read as 0.00", unparsed),
            &mut anomalies,
        )?;
    }

    // Side reports before the main table.
    let enrichment = enrich_rows(rows, registry);
    let conflicting_tax_ids = write_table(conflicts_output, &enrichment.conflicts)?;
    let unmatched_rows = write_table(unmatched_output, enrichment.unmatched())?;
    let total_rows = write_table(output, &enrichment.rows)?;

    if conflicting_tax_ids > 0 {
        log_warning(
            STAGE,
            format!(
                "{} tax id(s) with conflicting registry entries → {}",
                conflicting_tax_ids,
                conflicts_output.display()
            ),
        );
    }
    let matched_rows = total_rows - unmatched_rows;
    log_success(
        STAGE,
        format!(
            "{} rows → {} ({} matched, {} unmatched)",
            total_rows,
            output.display(),
            matched_rows,
            unmatched_rows
        ),
    );

    Ok(EnrichmentReport {
        output: output.to_path_buf(),
        unmatched_output: unmatched_output.to_path_buf(),
        conflicts_output: conflicts_output.to_path_buf(),
        total_rows,
        matched_rows,
        unmatched_rows,
        conflicting_tax_ids,
        anomalies,
    })
}
