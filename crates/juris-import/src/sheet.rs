//! Tabular input: the parsed sheet and its readers.
//!
//! Workbooks (xlsx, xlsm, xlsb, xls, ods) are read from their first
//! worksheet; anything else must be delimited text. Other binary content
//! (pdf, images, archives) is recognised by magic bytes and rejected with
//! [`Error::UnsupportedFormat`].

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use juris_core::{Error, Result};

/// Extensions read as workbooks.
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Extensions that are never text, even when the bytes are too short for
/// magic-byte detection.
const BINARY_EXTENSIONS: &[&str] = &["pdf", "zip"];

const WORKBOOK_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/vnd.oasis.opendocument.spreadsheet",
];

/// Delimiters tried when sniffing, in tie-break order.
const DELIMITERS: &[u8] = b";,\t";

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Cell {
    /// A cell from raw text; blank text becomes [`Cell::Empty`].
    pub fn text(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(raw)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Bool(_) | Cell::Number(_) => false,
        }
    }

    /// Trimmed textual form, `None` for empty cells.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then_some(Cow::Borrowed(t))
            }
            Cell::Bool(b) => Some(Cow::Owned(b.to_string())),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(Cow::Owned(format!("{}", *n as i64)))
            }
            Cell::Number(n) => Some(Cow::Owned(n.to_string())),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::text(s)
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Bool(b)
    }
}

/// Header row plus data rows, every row as wide as the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    /// Build a sheet from rows parsed elsewhere.
    ///
    /// Headers are trimmed; blank headers become `coluna_N` and repeated
    /// headers get a ` (2)`, ` (3)`, … suffix. Blank rows are dropped, short
    /// rows are padded and long rows truncated. Fails with
    /// [`Error::EmptyFile`] when no data row remains.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(Error::EmptyFile("the header row is empty".to_string()));
        }
        let headers = unique_headers(headers);
        let width = headers.len();

        let rows: Vec<Vec<Cell>> = rows
            .into_iter()
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();

        if rows.is_empty() {
            return Err(Error::EmptyFile(
                "the sheet has headers but no data rows".to_string(),
            ));
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of `header` in the header row.
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }
}

fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(i, h)| {
            let base = match h.trim() {
                "" => format!("coluna_{}", i + 1),
                t => t.to_string(),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{} ({})", base, count)
            }
        })
        .collect()
}

/// How a file's bytes are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Delimited,
    Workbook,
}

/// Decide the reader from magic bytes, falling back to the extension.
pub fn detect_format(bytes: &[u8], file_name: &str) -> Result<SheetFormat> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    let workbook_ext = extension
        .as_deref()
        .is_some_and(|e| WORKBOOK_EXTENSIONS.contains(&e));

    if let Some(kind) = infer::get(bytes) {
        let mime = kind.mime_type();
        // Some writers order xlsx entries so only the archive is detected;
        // the workbook reader rejects other archives.
        if WORKBOOK_MIME_TYPES.contains(&mime) || mime == "application/zip" {
            return Ok(SheetFormat::Workbook);
        }
        return Err(Error::UnsupportedFormat(format!(
            "{} looks like {} ({}); expected a spreadsheet or CSV",
            file_name,
            mime,
            kind.extension()
        )));
    }

    if workbook_ext {
        return Ok(SheetFormat::Workbook);
    }
    if let Some(ext) = extension.filter(|e| BINARY_EXTENSIONS.contains(&e.as_str())) {
        return Err(Error::UnsupportedFormat(format!(
            "{}: .{} files are not spreadsheets",
            file_name, ext
        )));
    }
    Ok(SheetFormat::Delimited)
}

/// Read the first worksheet of an xlsx/xls/ods workbook. The first
/// non-blank row is the header row.
pub fn parse_workbook(bytes: &[u8], file_name: &str) -> Result<Sheet> {
    let unreadable =
        |e: calamine::Error| Error::UnsupportedFormat(format!("{}: {}", file_name, e));

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(unreadable)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::EmptyFile(format!("{} has no worksheets", file_name)))?
        .map_err(unreadable)?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect::<Vec<Cell>>())
        .skip_while(|row| row.iter().all(Cell::is_empty));
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| Error::EmptyFile(format!("{} has an empty first worksheet", file_name)))?
        .iter()
        .map(|c| c.as_text().map(Cow::into_owned).unwrap_or_default())
        .collect();
    let rows: Vec<Vec<Cell>> = rows.collect();

    debug!(
        columns = headers.len(),
        row_count = rows.len(),
        "Parsed workbook sheet"
    );
    Sheet::new(headers, rows)
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(n) => Cell::Number(*n as f64),
            Data::Float(n) => Cell::Number(*n),
            Data::String(s) => Cell::text(s.as_str()),
            Data::Bool(b) => Cell::Bool(*b),
            // Serial day number, read as a date by the coercion layer.
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.as_str()),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

/// Decode UTF-8 (BOM stripped), falling back to Latin-1 as spreadsheet
/// exports on Windows produce. Control bytes other than tab/CR/LF mean the
/// input is not text.
pub fn decode_text(bytes: &[u8]) -> Result<Cow<'_, str>> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Some(b) = bytes
        .iter()
        .find(|b| b.is_ascii_control() && !matches!(b, b'\t' | b'\n' | b'\r'))
    {
        return Err(Error::UnsupportedFormat(format!(
            "input contains control byte 0x{:02x}; not a text file",
            b
        )));
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(Cow::Borrowed(s)),
        Err(_) => Ok(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
    }
}

/// Pick the delimiter occurring most often in `line` outside quotes;
/// ties go to `;`, then `,`, then tab. A line with none of them is a single
/// column, read with `,`.
pub fn sniff_delimiter(line: &str) -> u8 {
    let mut counts = [0usize; 3];
    let mut in_quotes = false;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if !in_quotes {
            if let Some(i) = DELIMITERS.iter().position(|d| *d == b) {
                counts[i] += 1;
            }
        }
    }
    let mut best = 0;
    for i in 1..DELIMITERS.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    if counts[best] == 0 {
        b','
    } else {
        DELIMITERS[best]
    }
}

/// Parse delimited text into a [`Sheet`]. The first non-blank line is the
/// header row.
pub fn parse_delimited(text: &str) -> Result<Sheet> {
    let header_line = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| Error::EmptyFile("the file has no content".to_string()))?;
    let delimiter = sniff_delimiter(header_line);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut headers: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            Error::UnsupportedFormat(format!("malformed CSV near record {}: {}", idx + 1, e))
        })?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        match headers {
            None => headers = Some(record.iter().map(str::to_string).collect()),
            Some(_) => rows.push(record.iter().map(Cell::from).collect()),
        }
    }

    let headers =
        headers.ok_or_else(|| Error::EmptyFile("the file has no header row".to_string()))?;
    debug!(
        delimiter = %(delimiter as char).escape_default(),
        columns = headers.len(),
        row_count = rows.len(),
        "Parsed delimited sheet"
    );
    Sheet::new(headers, rows)
}

/// Full read path: format detection, then the workbook or text reader.
pub fn read_sheet(bytes: &[u8], file_name: &str) -> Result<Sheet> {
    if bytes.is_empty() {
        return Err(Error::EmptyFile(format!("{} is empty", file_name)));
    }
    match detect_format(bytes, file_name)? {
        SheetFormat::Workbook => parse_workbook(bytes, file_name),
        SheetFormat::Delimited => {
            let text = decode_text(bytes)?;
            parse_delimited(&text)
        }
    }
}
