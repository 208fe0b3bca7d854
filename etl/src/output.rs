//! Table writer and deliverable packaging.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ArchiveResult, TableResult};
use crate::models::TableRow;

/// Write `rows` as a comma-separated UTF-8 table with a header row.
///
/// Parent directories are created; an existing file is replaced.
/// Returns the number of data rows written.
pub fn write_table<'a, R, I>(path: &Path, rows: I) -> TableResult<usize>
where
    R: TableRow + 'a,
    I: IntoIterator<Item = &'a R>,
{
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(R::HEADERS)?;

    let mut count = 0;
    for row in rows {
        writer.write_record(row.to_record())?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Zip a single file (deflate) under `entry_name`, or its own file name.
pub fn package_single_file(input: &Path, zip_path: &Path, entry_name: Option<&str>) -> ArchiveResult<()> {
    ensure_parent(zip_path)?;
    let entry_name = match entry_name {
        Some(name) => name.to_string(),
        None => input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table.csv".to_string()),
    };

    let content = fs::read(input)?;
    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(entry_name, options)?;
    zip.write_all(&content)?;
    zip.finish()?;
    Ok(())
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregateRow, ConsolidatedRow, QuarterPeriod};
    use crate::parser::read_table_file;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_written_table_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/consolidated.csv");
        let rows = vec![
            ConsolidatedRow {
                tax_id: "11222333000181".into(),
                legal_name: "Alfa, Saúde S.A.".into(),
                period: QuarterPeriod { year: 2025, quarter: 1 },
                expense_value: 10.0,
            },
            ConsolidatedRow {
                tax_id: String::new(),
                legal_name: String::new(),
                period: QuarterPeriod { year: 2025, quarter: 2 },
                expense_value: 0.0,
            },
        ];

        assert_eq!(write_table(&path, &rows).unwrap(), 2);

        let table = read_table_file(&path).unwrap();
        assert_eq!(table.headers, ConsolidatedRow::HEADERS);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][1], "Alfa, Saúde S.A.");
        assert_eq!(table.rows[1][4], "0.00");
    }

    #[test]
    fn test_header_only_table_for_empty_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("aggregated.csv");
        let rows: Vec<AggregateRow> = Vec::new();

        assert_eq!(write_table(&path, &rows).unwrap(), 0);
        let table = read_table_file(&path).unwrap();
        assert_eq!(table.headers, AggregateRow::HEADERS);
        assert!(table.is_empty());
    }

    #[test]
    fn test_package_single_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("aggregated.csv");
        fs::write(&input, "a,b\n1,2\n").unwrap();
        let zip_path = dir.path().join("artifacts/out.zip");

        package_single_file(&input, &zip_path, Some("expenses.csv")).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_index(0).unwrap();
        assert_eq!(entry.name(), "expenses.csv");
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "a,b\n1,2\n");
    }
}
