//! CSV parsing with encoding and delimiter auto-detection.
//!
//! Parsing is best-effort: malformed rows are kept (padded or truncated to
//! the header width) and reported as [`CsvRowError`]s next to the rows,
//! never raised. Only undecodable input is a [`CsvError`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CsvError, CsvResult};
use crate::models::Row;

const BOM: char = '\u{feff}';

/// Parser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvOptions {
    /// Field separator. Unset means `,` for text input and auto-detection
    /// for byte input.
    pub delimiter: Option<char>,
    pub quote: char,
    /// First record holds column names.
    pub has_header: bool,
    /// Stop after this many data rows.
    pub max_rows: Option<usize>,
    /// Trim whitespace around every cell.
    pub trim: bool,
    /// Drop records whose cells are all empty.
    pub skip_empty_lines: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: '"',
            has_header: true,
            max_rows: None,
            trim: false,
            skip_empty_lines: true,
        }
    }
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }

    fn delimiter_char(&self) -> char {
        self.delimiter.unwrap_or(',')
    }

    fn delimiter_byte(&self) -> u8 {
        ascii_byte(self.delimiter_char(), b',', "delimiter")
    }

    fn quote_byte(&self) -> u8 {
        ascii_byte(self.quote, b'"', "quote")
    }
}

fn ascii_byte(c: char, fallback: u8, what: &str) -> u8 {
    if c.is_ascii() {
        c as u8
    } else {
        warn!(character = %c, fallback = %(fallback as char), "non-ASCII CSV {} ignored", what);
        fallback
    }
}

/// A row-scoped parse problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CsvRowError {
    /// Index into [`ParsedCsv::rows`].
    pub row: usize,
    pub message: String,
}

impl CsvRowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CsvRowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Result of parsing with metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    /// Data rows, each exactly `headers.len()` cells wide.
    pub rows: Vec<Vec<String>>,
    pub errors: Vec<CsvRowError>,
    /// `maxRows` stopped parsing before the end of input.
    pub truncated: bool,
    pub delimiter: char,
    pub encoding: String,
}

impl ParsedCsv {
    fn empty(options: &CsvOptions) -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            errors: Vec::new(),
            truncated: false,
            delimiter: options.delimiter_char(),
            encoding: "utf-8".to_string(),
        }
    }

    /// Pair cells with headers into string-valued rows.
    pub fn records(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|cells| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(cells.iter().cloned())
                    .collect::<Row>()
            })
            .collect()
    }
}

/// Parse CSV text.
///
/// # Example
/// ```
/// use creative_sync::parser::{parse_csv, CsvOptions};
///
/// let parsed = parse_csv("name,age\nAlice,30\nBob,25", &CsvOptions::default());
///
/// assert_eq!(parsed.headers, vec!["name", "age"]);
/// assert_eq!(parsed.rows.len(), 2);
/// assert_eq!(parsed.rows[0], vec!["Alice", "30"]);
/// ```
pub fn parse_csv(content: &str, options: &CsvOptions) -> ParsedCsv {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let mut result = ParsedCsv::empty(options);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter_byte())
        .quote(options.quote_byte())
        .has_headers(false)
        .flexible(true)
        .trim(if options.trim { csv::Trim::All } else { csv::Trim::None })
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let mut width: Option<usize> = None;

    if options.has_header {
        match records.next() {
            Some(Ok(record)) => {
                result.headers = record.iter().map(|h| h.trim().to_string()).collect();
                width = Some(result.headers.len());
            }
            Some(Err(e)) => {
                warn!(error = %e, "unreadable CSV header");
                result.errors.push(CsvRowError::new(0, format!("Cannot read header: {}", e)));
                return result;
            }
            None => return result,
        }
    }

    for record in records {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                result
                    .errors
                    .push(CsvRowError::new(result.rows.len(), format!("Cannot read row: {}", e)));
                continue;
            }
        };

        if options.skip_empty_lines && record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        if let Some(max) = options.max_rows {
            if result.rows.len() >= max {
                result.truncated = true;
                break;
            }
        }

        let expected = *width.get_or_insert_with(|| {
            result.headers = (1..=record.len()).map(|i| format!("column_{}", i)).collect();
            record.len()
        });

        let mut cells: Vec<String> = record.iter().map(String::from).collect();
        if cells.len() != expected {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let message = format!(
                "Line {}: expected {} fields, found {}",
                line,
                expected,
                cells.len()
            );
            warn!(row = result.rows.len(), line, expected, found = cells.len(), "ragged CSV row");
            result.errors.push(CsvRowError::new(result.rows.len(), message));
            cells.resize(expected, String::new());
        }
        result.rows.push(cells);
    }

    debug!(
        columns = result.headers.len(),
        rows = result.rows.len(),
        errors = result.errors.len(),
        truncated = result.truncated,
        "parsed CSV"
    );
    result
}

/// Parse at most `limit` data rows, for quick previews of large files.
pub fn preview_csv(content: &str, options: &CsvOptions, limit: usize) -> ParsedCsv {
    let limit = options.max_rows.map_or(limit, |max| max.min(limit));
    let options = options.clone().with_max_rows(limit);
    parse_csv(content, &options)
}

/// Serialize rows back to CSV text, quoting only where needed.
pub fn write_csv(headers: &[String], rows: &[Vec<String>], options: &CsvOptions) -> CsvResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter_byte())
        .quote(options.quote_byte())
        .flexible(true)
        .from_writer(Vec::new());

    let write_err = |e: csv::Error| CsvError::WriteError(e.to_string());

    if options.has_header {
        writer.write_record(headers).map_err(write_err)?;
    }
    for row in rows {
        writer.write_record(row).map_err(write_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::WriteError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CsvError::EncodingError(e.to_string()))
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }
    let charset = chardet::detect(bytes).0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(e) => {
                warn!(error = %e, "invalid UTF-8, decoding lossily");
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        },
        "iso-8859-1" | "latin-1" | "latin1" => Ok(encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()),
        "windows-1252" | "cp1252" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        other => encoding_rs::Encoding::for_label(other.as_bytes())
            .map(|enc| enc.decode(bytes).0.into_owned())
            .ok_or_else(|| CsvError::EncodingError(format!("unsupported encoding '{}'", other))),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content
        .strip_prefix(BOM)
        .unwrap_or(content)
        .lines()
        .next()
        .unwrap_or("");

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

/// Parse CSV bytes with auto-detection of encoding, and of the delimiter
/// when `options.delimiter` is unset.
pub fn parse_bytes_auto(bytes: &[u8], options: &CsvOptions) -> CsvResult<ParsedCsv> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(&content));
    debug!(%encoding, delimiter = %delimiter.escape_default(), detected = options.delimiter.is_none(), "CSV format");

    let mut parsed = parse_csv(&content, &options.clone().with_delimiter(delimiter));
    parsed.encoding = encoding;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv: &str) -> ParsedCsv {
        parse_csv(csv, &CsvOptions::default())
    }

    #[test]
    fn test_simple_csv() {
        let parsed = parse("name,age\nAlice,30\nBob,25");

        assert_eq!(parsed.headers, vec!["name", "age"]);
        assert_eq!(parsed.rows, vec![vec!["Alice", "30"], vec!["Bob", "25"]]);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn test_semicolon_delimiter() {
        let options = CsvOptions::default().with_delimiter(';');
        let parsed = parse_csv("a;b;c\n1;2;3", &options);

        assert_eq!(parsed.rows[0], vec!["1", "2", "3"]);
    }

    #[test]
    fn test_quoted_delimiters_and_newlines() {
        let parsed = parse("headline,body\n\"Sale, today\",\"Line one\nLine two\"\n");

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0][0], "Sale, today");
        assert_eq!(parsed.rows[0][1], "Line one\nLine two");
    }

    #[test]
    fn test_escaped_quotes() {
        let parsed = parse("title\n\"The \"\"best\"\" deal\"");
        assert_eq!(parsed.rows[0][0], "The \"best\" deal");
    }

    #[test]
    fn test_bom_is_stripped() {
        let parsed = parse("\u{feff}sku,price\nA1,9.99");
        assert_eq!(parsed.headers[0], "sku");
    }

    #[test]
    fn test_trailing_newline_and_empty_lines() {
        let parsed = parse("a,b\n1,2\n\n3,4\n,\n");
        assert_eq!(parsed.rows.len(), 2);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn test_ragged_rows_are_kept_and_reported() {
        let parsed = parse("a,b,c\n1,2\n1,2,3,4\n5,6,7");

        assert_eq!(parsed.rows.len(), 3);
        assert_eq!(parsed.rows[0], vec!["1", "2", ""]);
        assert_eq!(parsed.rows[1], vec!["1", "2", "3"]);
        assert_eq!(parsed.errors.len(), 2);
        assert_eq!(parsed.errors[0].row, 0);
        assert_eq!(parsed.errors[1].row, 1);
        assert!(parsed.errors[0].message.contains("expected 3 fields, found 2"));
    }

    #[test]
    fn test_without_header() {
        let options = CsvOptions {
            has_header: false,
            ..CsvOptions::default()
        };
        let parsed = parse_csv("x,y\n1,2", &options);

        assert_eq!(parsed.headers, vec!["column_1", "column_2"]);
        assert_eq!(parsed.rows.len(), 2);
    }

    #[test]
    fn test_max_rows_truncates() {
        let options = CsvOptions::default().with_max_rows(2);
        let parsed = parse_csv("a\n1\n2\n3", &options);

        assert_eq!(parsed.rows.len(), 2);
        assert!(parsed.truncated);

        let parsed = parse_csv("a\n1\n2", &options);
        assert!(!parsed.truncated);
    }

    #[test]
    fn test_preview_respects_smaller_cap() {
        let options = CsvOptions::default().with_max_rows(1);
        let parsed = preview_csv("a\n1\n2\n3", &options, 10);
        assert_eq!(parsed.rows.len(), 1);

        let parsed = preview_csv("a\n1\n2\n3", &CsvOptions::default(), 2);
        assert_eq!(parsed.rows, vec![vec!["1"], vec!["2"]]);
    }

    #[test]
    fn test_trim_option() {
        let options = CsvOptions {
            trim: true,
            ..CsvOptions::default()
        };
        let parsed = parse_csv("a , b\n  1 , 2 ", &options);
        assert_eq!(parsed.headers, vec!["a", "b"]);
        assert_eq!(parsed.rows[0], vec!["1", "2"]);
    }

    #[test]
    fn test_empty_content() {
        let parsed = parse("");
        assert!(parsed.headers.is_empty());
        assert!(parsed.rows.is_empty());
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn test_records_pair_headers() {
        let rows = parse("country,spend\nUS,10").records();
        assert_eq!(rows[0].get("country").and_then(|v| v.as_str()), Some("US"));
        assert_eq!(rows[0].get("spend").and_then(|v| v.as_str()), Some("10"));
    }

    #[test]
    fn test_write_then_parse() {
        let headers = vec!["headline".to_string(), "price".to_string()];
        let rows = vec![
            vec!["Buy now, save".to_string(), "10".to_string()],
            vec!["Say \"hi\"".to_string(), "".to_string()],
        ];
        let text = write_csv(&headers, &rows, &CsvOptions::default()).unwrap();
        let parsed = parse(&text);

        assert_eq!(parsed.headers, headers);
        assert_eq!(parsed.rows, rows);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("a|b|c\n1|2|3"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let parsed = parse_bytes_auto(b"name;age\nAlice;30\nBob;25", &CsvOptions::default()).unwrap();

        assert_eq!(parsed.delimiter, ';');
        assert_eq!(parsed.encoding, "utf-8");
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_auto_parse_keeps_configured_delimiter() {
        let bytes = b"\"Sale, Now\";price\nx;10";

        let parsed = parse_bytes_auto(bytes, &CsvOptions::default().with_delimiter(';')).unwrap();
        assert_eq!(parsed.delimiter, ';');
        assert_eq!(parsed.headers, vec!["Sale, Now", "price"]);
        assert_eq!(parsed.rows, vec![vec!["x", "10"]]);

        let detected = parse_bytes_auto(bytes, &CsvOptions::default()).unwrap();
        assert_eq!(detected.delimiter, ',');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Société" in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1").unwrap();
        assert_eq!(decoded, "Société");
    }

    #[test]
    fn test_unknown_encoding_is_error() {
        let result = decode_content(b"abc", "klingon-8");
        assert!(matches!(result, Err(CsvError::EncodingError(_))));
    }
}
