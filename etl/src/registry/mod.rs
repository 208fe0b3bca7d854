//! Operator registry loader.
//!
//! Turns the regulator's registry export into [`RegistryRecord`]s:
//!
//! - fields are whitespace-trimmed
//! - tax ids keep digits only
//! - registration ids are zero-padded to six digits so they join against
//!   statement codes (`"1234"` and `"001234"` are the same operator)
//! - modality and region default to `""` when their columns are absent
//!
//! Header names changed between registry generations, so every column is
//! looked up through an alias list.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use crate::config::ParsePolicy;
use crate::error::PipelineResult;
use crate::logs::{log_info, log_success};
use crate::models::{normalize_tax_id, Anomaly, RegistryRecord, REGISTRATION_ID_LEN};
use crate::parser::{read_table_file, ColumnAliases, Table};

const STAGE: &str = "registry";

pub const REGISTRATION_ID_COLUMN: ColumnAliases = &[
    "REGISTRO_OPERADORA",
    "Registro_ANS",
    "RegistroANS",
    "REG_ANS",
    "registrationId",
];
pub const TAX_ID_COLUMN: ColumnAliases = &["CNPJ", "taxId"];
pub const LEGAL_NAME_COLUMN: ColumnAliases = &["Razao_Social", "RazaoSocial", "legalName"];
pub const MODALITY_COLUMN: ColumnAliases = &["Modalidade", "modality"];
pub const REGION_COLUMN: ColumnAliases = &["UF", "region"];

/// Loaded registry plus what the loader had to skip.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub records: Vec<RegistryRecord>,
    pub anomalies: Vec<Anomaly>,
}

impl Registry {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One record per registration id, the first by (registration id, tax id, legal name).
    pub fn by_registration_id(&self) -> HashMap<&str, &RegistryRecord> {
        let mut index: HashMap<&str, &RegistryRecord> = HashMap::new();
        for record in &self.records {
            index
                .entry(record.registration_id.as_str())
                .and_modify(|current| {
                    if identity_key(record).cmp(&identity_key(current)) == Ordering::Less {
                        *current = record;
                    }
                })
                .or_insert(record);
        }
        index
    }
}

fn identity_key(record: &RegistryRecord) -> (&str, &str, &str) {
    (&record.registration_id, &record.tax_id, &record.legal_name)
}

/// Left-pad a registration code with zeros to six digits.
///
/// Returns `None` for codes that are blank, non-numeric, or too long to pad.
pub fn pad_registration_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.len() > REGISTRATION_ID_LEN
        || !trimmed.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    Some(format!("{:0>width$}", trimmed, width = REGISTRATION_ID_LEN))
}

/// Normalize a parsed registry table.
///
/// Fails with a schema error when the tax id or registration id column is absent.
pub fn parse_registry(table: &Table, policy: ParsePolicy) -> PipelineResult<Registry> {
    let required = table.require_columns(&[REGISTRATION_ID_COLUMN, TAX_ID_COLUMN])?;
    let (registration_idx, tax_idx) = (required[0], required[1]);
    let name_idx = table.find_column(LEGAL_NAME_COLUMN);
    let modality_idx = table.find_column(MODALITY_COLUMN);
    let region_idx = table.find_column(REGION_COLUMN);

    let optional = |row: &[String], idx: Option<usize>| -> String {
        idx.map(|i| Table::cell(row, i).trim().to_string())
            .unwrap_or_default()
    };

    let mut registry = Registry::default();
    for (line, row) in table.rows.iter().enumerate() {
        let raw_registration = Table::cell(row, registration_idx);
        let Some(registration_id) = pad_registration_id(raw_registration) else {
            policy.absorb(
                STAGE,
                Anomaly::drift(
                    format!("{}:{}", table.name, line + 2),
                    format!("unusable registration id '{}', record skipped", raw_registration.trim()),
                ),
                &mut registry.anomalies,
            )?;
            continue;
        };

        registry.records.push(RegistryRecord {
            registration_id,
            tax_id: normalize_tax_id(Table::cell(row, tax_idx)),
            legal_name: optional(row, name_idx),
            modality: optional(row, modality_idx),
            region: optional(row, region_idx),
        });
    }

    Ok(registry)
}

/// Read and normalize a registry file.
pub fn load_registry_file(path: &Path, policy: ParsePolicy) -> PipelineResult<Registry> {
    log_info(STAGE, format!("Reading registry {}", path.display()));
    let table = read_table_file(path)?;
    log_info(
        STAGE,
        format!("Detected encoding {} and separator '{}'", table.encoding, table.delimiter),
    );

    let registry = parse_registry(&table, policy)?;
    log_success(
        STAGE,
        format!(
            "{} registry records loaded ({} skipped)",
            registry.len(),
            registry.anomalies.len()
        ),
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, TableError};
    use crate::parser::parse_table_bytes;

    fn table(content: &str) -> Table {
        parse_table_bytes("Relatorio_cadop.csv", content.as_bytes()).unwrap()
    }

    #[test]
    fn test_normalizes_fields() {
        let t = table(
            "REGISTRO_OPERADORA;CNPJ;Razao_Social;Modalidade;UF\n\
             1234; 11.222.333/0001-81 ;  Operadora Alfa  ;Medicina de Grupo; SP \n",
        );
        let registry = parse_registry(&t, ParsePolicy::Tolerant).unwrap();

        assert_eq!(
            registry.records,
            vec![RegistryRecord {
                registration_id: "001234".into(),
                tax_id: "11222333000181".into(),
                legal_name: "Operadora Alfa".into(),
                modality: "Medicina de Grupo".into(),
                region: "SP".into(),
            }]
        );
    }

    #[test]
    fn test_registration_ids_always_six_digits() {
        let t = table("Registro_ANS;CNPJ\n1;1\n12345;2\n123456;3\n000042;4\n");
        let registry = parse_registry(&t, ParsePolicy::Tolerant).unwrap();

        assert_eq!(registry.len(), 4);
        for record in &registry.records {
            assert_eq!(record.registration_id.len(), REGISTRATION_ID_LEN);
            assert!(record.registration_id.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(registry.records[0].registration_id, "000001");
        assert_eq!(registry.records[3].registration_id, "000042");
    }

    #[test]
    fn test_optional_columns_default_to_empty() {
        let t = table("RegistroANS;CNPJ\n42;11222333000181\n");
        let registry = parse_registry(&t, ParsePolicy::Tolerant).unwrap();
        let record = &registry.records[0];
        assert_eq!(record.legal_name, "");
        assert_eq!(record.modality, "");
        assert_eq!(record.region, "");
    }

    #[test]
    fn test_missing_key_columns_is_schema_error() {
        let t = table("Razao_Social;UF\nAlfa;SP\n");
        let err = parse_registry(&t, ParsePolicy::Tolerant).unwrap_err();
        assert!(err.is_schema_error());
        match err {
            PipelineError::Table(TableError::Schema { missing, .. }) => {
                assert_eq!(missing, vec!["REGISTRO_OPERADORA", "CNPJ"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unusable_registration_id_depends_on_policy() {
        let t = table("REGISTRO_OPERADORA;CNPJ\n;11222333000181\n1234567;1\n99;2\n");

        let registry = parse_registry(&t, ParsePolicy::Tolerant).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.anomalies.len(), 2);
        assert_eq!(registry.anomalies[0].source, "Relatorio_cadop.csv:2");

        let err = parse_registry(&t, ParsePolicy::Strict).unwrap_err();
        assert!(matches!(err, PipelineError::SourceFormatDrift { .. }));
    }

    #[test]
    fn test_by_registration_id_is_order_independent() {
        let forward = table("REGISTRO_OPERADORA;CNPJ;Razao_Social\n7;22;Beta\n7;11;Alfa\n");
        let reverse = table("REGISTRO_OPERADORA;CNPJ;Razao_Social\n7;11;Alfa\n7;22;Beta\n");

        for t in [forward, reverse] {
            let registry = parse_registry(&t, ParsePolicy::Tolerant).unwrap();
            let index = registry.by_registration_id();
            assert_eq!(index.len(), 1);
            assert_eq!(index["000007"].legal_name, "Alfa");
        }
    }

    #[test]
    fn test_pad_registration_id() {
        assert_eq!(pad_registration_id(" 42 ").as_deref(), Some("000042"));
        assert_eq!(pad_registration_id("123456").as_deref(), Some("123456"));
        assert_eq!(pad_registration_id("1234567"), None);
        assert_eq!(pad_registration_id("12a"), None);
        assert_eq!(pad_registration_id(""), None);
    }
}
