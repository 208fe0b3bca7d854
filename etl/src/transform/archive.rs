//! Statement archive discovery and extraction.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::ArchiveResult;
use crate::parser::{parse_table_bytes, Table};

const TABULAR_EXTENSIONS: [&str; 2] = [".csv", ".txt"];

/// All `*.zip` files under `root`, recursively, sorted by path.
///
/// A missing root yields an empty list.
pub fn discover_archives(root: &Path) -> ArchiveResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    if root.is_dir() {
        collect_archives(root, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn collect_archives(dir: &Path, found: &mut Vec<PathBuf>) -> ArchiveResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_archives(&path, found)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        {
            found.push(path);
        }
    }
    Ok(())
}

/// Parse the first tabular entry of the archive.
///
/// Returns `Ok(None)` when the archive holds no `.csv`/`.txt` file.
pub fn read_archive_table(path: &Path) -> ArchiveResult<Option<Table>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let lower = name.to_lowercase();
        if !entry.is_file() || !TABULAR_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        let table = parse_table_bytes(&name, &bytes)?;
        return Ok(Some(table));
    }

    Ok(None)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;

    use zip::write::FileOptions;
    use zip::{CompressionMethod, ZipWriter};

    /// Write a zip with the given (entry name, content) pairs.
    pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::write_zip;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_discover_recurses_and_sorts() {
        let dir = tempdir().unwrap();
        write_zip(&dir.path().join("2025/2T/2T2025.zip"), &[("a.csv", "a\n1\n")]);
        write_zip(&dir.path().join("2025/1T/1T2025.ZIP"), &[("a.csv", "a\n1\n")]);
        fs::write(dir.path().join("2025/notes.txt"), "ignore me").unwrap();

        let archives = discover_archives(dir.path()).unwrap();
        assert_eq!(archives.len(), 2);
        assert!(archives[0].ends_with("2025/1T/1T2025.ZIP"));
        assert!(archives[1].ends_with("2025/2T/2T2025.zip"));
    }

    #[test]
    fn test_discover_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        assert!(discover_archives(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_reads_first_tabular_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.zip");
        write_zip(
            &path,
            &[
                ("readme.pdf", "%PDF"),
                ("1T2025.csv", "REG_ANS;CD_CONTA_CONTABIL;VL_SALDO_FINAL\n1;411;2,00\n"),
                ("other.csv", "x\n1\n"),
            ],
        );

        let table = read_archive_table(&path).unwrap().unwrap();
        assert_eq!(table.name, "1T2025.csv");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_archive_without_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.zip");
        write_zip(&path, &[("readme.pdf", "%PDF")]);
        assert!(read_archive_table(&path).unwrap().is_none());
    }
}
