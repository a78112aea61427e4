//! CSV loader with encoding and delimiter auto-detection.
//!
//! Turns uploaded bytes into a [`RawTable`]: string cells under normalized
//! headers (trimmed, lowercased, renamed through [`ColumnAliases`]).
//! No typing happens here; see [`crate::validation`] for that.

pub mod aliases;

pub use aliases::ColumnAliases;

use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{CsvError, CsvResult, RowIssue};

/// Parsed upload, before schema validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Headers after normalization and renaming
    pub headers: Vec<String>,
    /// Headers exactly as they appeared in the file
    pub source_headers: Vec<String>,
    /// Data rows, each padded to `headers.len()`
    pub rows: Vec<RawRow>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// One data row with its line number in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: usize,
    pub cells: Vec<String>,
}

impl RawTable {
    /// Index of the first header with this name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows as JSON objects keyed by normalized header.
    pub fn to_json_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let mut obj = Map::new();
                for (header, cell) in self.headers.iter().zip(&row.cells) {
                    // duplicate headers: first one wins
                    if !obj.contains_key(header) {
                        obj.insert(header.clone(), Value::String(cell.clone()));
                    }
                }
                Value::Object(obj)
            })
            .collect()
    }
}

/// Trim and case-fold a header.
pub fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Normalize headers and apply the alias table.
///
/// When two headers claim the same canonical name the first one keeps it and
/// the later one keeps its own normalized spelling.
pub fn normalize_headers(headers: &[String], aliases: &ColumnAliases) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());

    for header in headers {
        let normalized = normalize_header(header);
        let renamed = match aliases.resolve(&normalized) {
            Some(canonical) if !out.iter().any(|h| h == canonical) => canonical.to_string(),
            _ => normalized,
        };
        out.push(renamed);
    }

    out
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        // UTF-8 and anything unrecognised: lossy UTF-8
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    decoded.trim_start_matches('\u{feff}').to_string()
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
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

/// Load CSV bytes, detecting encoding and (unless given) the delimiter.
pub fn load_bytes(bytes: &[u8], aliases: &ColumnAliases, delimiter: Option<char>) -> CsvResult<RawTable> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));

    load_str(&content, delimiter, encoding, aliases)
}

/// Load a CSV file from disk.
///
/// # Example
/// ```ignore
/// let table = load_file("kpi.csv", &ColumnAliases::builtin(), None)?;
/// println!("Delimiter: '{}', rows: {}", table.delimiter, table.row_count());
/// ```
pub fn load_file<P: AsRef<Path>>(path: P, aliases: &ColumnAliases, delimiter: Option<char>) -> CsvResult<RawTable> {
    let bytes = std::fs::read(path.as_ref())?;
    load_bytes(&bytes, aliases, delimiter)
}

/// Parse decoded CSV text with an explicit delimiter.
pub fn load_str(content: &str, delimiter: char, encoding: String, aliases: &ColumnAliases) -> CsvResult<RawTable> {
    let delimiter_byte = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            CsvError::Malformed(RowIssue::new(0, "Delimiter must be a single ASCII character").with_value(delimiter.to_string()))
        })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let source_headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if source_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    let headers = normalize_headers(&source_headers, aliases);
    let width = headers.len();
    let mut rows = Vec::new();

    for result in reader.records() {
        let record = result.map_err(malformed)?;
        // whitespace-only lines and bare delimiters carry no data
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

        if record.len() > width {
            return Err(CsvError::Malformed(RowIssue::new(
                line,
                format!("Expected {} fields, found {}", width, record.len()),
            )));
        }

        let mut cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        cells.resize(width, String::new());
        rows.push(RawRow { line, cells });
    }

    Ok(RawTable {
        headers,
        source_headers,
        rows,
        encoding,
        delimiter,
    })
}

fn malformed(err: csv::Error) -> CsvError {
    let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
    CsvError::Malformed(RowIssue::new(line, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(csv: &str) -> RawTable {
        load_bytes(csv.as_bytes(), &ColumnAliases::builtin(), None).unwrap()
    }

    #[test]
    fn test_headers_trimmed_and_lowercased() {
        let table = load(" Date , SITE,Traffic_GB\n2024-01-01,A,10");
        assert_eq!(table.headers, vec!["date", "site", "traffic_gb"]);
        assert_eq!(table.source_headers, vec!["Date", "SITE", "Traffic_GB"]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let table = load("date,site,traffic_gb\n2024-01-01,A,10\n   \n,,\n2024-01-02,B,20\n  \n");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[1].cells, vec!["2024-01-02", "B", "20"]);
    }

    #[test]
    fn test_enodeb_variant_renamed() {
        let table = load("Date,eNodeBName,Sector,Band,Payload,PRB,Availability,Lat,Lon\n2024-01-01,E1,1,L1800,5,40,99,-6.2,106.8");
        assert_eq!(
            table.headers,
            vec!["date", "site", "sector", "band", "traffic_gb", "prb", "availability", "lat", "lon"]
        );
        assert_eq!(table.rows[0].cells[1], "E1");
    }

    #[test]
    fn test_first_header_keeps_canonical_name() {
        let table = load("site,eNodeBName\nA,B");
        assert_eq!(table.headers, vec!["site", "enodebname"]);
    }

    #[test]
    fn test_quoted_values() {
        let table = load("site,note\n\"Site, North\",\"said \"\"hi\"\"\"");
        assert_eq!(table.rows[0].cells[0], "Site, North");
        assert_eq!(table.rows[0].cells[1], "said \"hi\"");
    }

    #[test]
    fn test_short_rows_padded() {
        let table = load("a,b,c\n1");
        assert_eq!(table.rows[0].cells, vec!["1", "", ""]);
    }

    #[test]
    fn test_long_row_is_parse_error() {
        let err = load_bytes(b"a,b\n1,2\n1,2,3", &ColumnAliases::builtin(), None).unwrap_err();
        match err {
            CsvError::Malformed(issue) => assert_eq!(issue.line, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_csv_error() {
        assert!(matches!(
            load_bytes(b"", &ColumnAliases::builtin(), None),
            Err(CsvError::EmptyFile)
        ));
        assert!(matches!(
            load_bytes(b"  \n", &ColumnAliases::builtin(), None),
            Err(CsvError::EmptyFile)
        ));
    }

    #[test]
    fn test_line_numbers() {
        let table = load("a,b\n1,2\n3,4");
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 3);
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
    }

    #[test]
    fn test_detect_delimiter_comma() {
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
    }

    #[test]
    fn test_detect_delimiter_pipe() {
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
    }

    #[test]
    fn test_explicit_delimiter() {
        let table = load_bytes(b"a;b\n1;2", &ColumnAliases::builtin(), Some(';')).unwrap();
        assert_eq!(table.delimiter, ';');
        assert_eq!(table.rows[0].cells, vec!["1", "2"]);
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let result = load_bytes(b"a,b\n1,2", &ColumnAliases::builtin(), Some('é'));
        assert!(matches!(result, Err(CsvError::Malformed(_))));
    }

    #[test]
    fn test_bom_stripped() {
        let table = load("\u{feff}date,site\n2024-01-01,A");
        assert_eq!(table.headers[0], "date");
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert!(decoded.contains("Soci"));
    }

    #[test]
    fn test_json_records() {
        let table = load("site,traffic_gb\nA,10\nB,20");
        let records = table.to_json_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["site"], "B");
        assert_eq!(records[1]["traffic_gb"], "20");
    }
}
