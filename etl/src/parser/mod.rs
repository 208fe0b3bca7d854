//! Delimited table reader with encoding and delimiter auto-detection.
//!
//! Regulator files arrive as UTF-8 or Latin-1, separated by `;`; tables written
//! by this pipeline are UTF-8 and comma-separated. [`parse_table_bytes`]
//! handles both without being told which is which.

pub mod decimal;

use csv::{ReaderBuilder, Trim};
use std::path::Path;

use crate::error::{TableError, TableResult};

pub use decimal::{parse_detected_decimal, parse_locale_decimal, DecimalFormat};

/// Accepted header spellings for one logical column; the first is canonical.
pub type ColumnAliases = &'static [&'static str];

/// A parsed table: trimmed headers and string cells.
#[derive(Debug, Clone)]
pub struct Table {
    /// Name used in error messages (usually the file name)
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first alias present: exact match first, then case-insensitive.
    pub fn find_column(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.headers.iter().position(|h| h == alias))
            .or_else(|| {
                aliases.iter().find_map(|alias| {
                    self.headers.iter().position(|h| h.eq_ignore_ascii_case(alias))
                })
            })
    }

    /// Resolve every column or fail with a schema error naming the missing ones.
    pub fn require_columns(&self, columns: &[ColumnAliases]) -> TableResult<Vec<usize>> {
        let mut indices = Vec::with_capacity(columns.len());
        let mut missing = Vec::new();

        for aliases in columns {
            match self.find_column(aliases) {
                Some(idx) => indices.push(idx),
                None => missing.push(aliases[0].to_string()),
            }
        }

        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(TableError::Schema {
                table: self.name.clone(),
                missing,
                found: self.headers.clone(),
            })
        }
    }

    /// Cell value, empty when the row is short.
    pub fn cell<'a>(row: &'a [String], idx: usize) -> &'a str {
        row.get(idx).map(String::as_str).unwrap_or("")
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }

    let charset = chardet::detect(bytes).0;
    match charset.to_lowercase().as_str() {
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        // Invalid UTF-8 from this regulator is Latin-1 in practice.
        _ => "iso-8859-1".to_string(),
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> TableResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|_| TableError::Encoding(encoding.to_string()))?,
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        other => return Err(TableError::Encoding(other.to_string())),
    };
    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ';';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse decoded content with an explicit delimiter.
///
/// Quoted fields may contain the delimiter; short rows are padded with empty
/// cells, blank lines are skipped.
pub fn parse_table_str(name: &str, content: &str, delimiter: char, encoding: String) -> TableResult<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().trim_matches('"').to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(TableError::NoHeaders(name.to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len().max(row.len()), String::new());
        rows.push(row);
    }

    Ok(Table {
        name: name.to_string(),
        headers,
        rows,
        encoding,
        delimiter,
    })
}

/// Parse raw bytes with auto-detection of encoding and delimiter.
pub fn parse_table_bytes(name: &str, bytes: &[u8]) -> TableResult<Table> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    if content.trim().is_empty() {
        return Err(TableError::NoHeaders(name.to_string()));
    }
    let delimiter = detect_delimiter(&content);
    parse_table_str(name, &content, delimiter, encoding)
}

/// Read a table file with auto-detection.
pub fn read_table_file(path: impl AsRef<Path>) -> TableResult<Table> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("table");
    parse_table_bytes(name, &bytes)
}
