//! File readers
//!
//! Every supported file becomes one or more [`Dataset`]s: a header row plus
//! text rows. Readers are synchronous; callers run them on the blocking pool.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::{Result, SeedError};

/// Supported input formats, keyed by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Json,
    Workbook,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "json" | "geojson" => Some(SourceFormat::Json),
            "xlsx" | "xls" => Some(SourceFormat::Workbook),
            _ => None,
        }
    }
}

/// One table's worth of parsed data
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Lower-case file extension
    pub kind: String,
    /// 1-based worksheet position; 1 for single-table files
    pub index: usize,
    pub sheet: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Dataset {
    fn new(kind: &str, index: usize, sheet: Option<String>, headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self {
            kind: kind.to_string(),
            index,
            sheet,
            headers: normalize_headers(headers),
            rows,
        }
    }

    /// `{stem}_{kind}_{index}`, before sanitizing and prefixing
    pub fn table_candidate(&self, stem: &str) -> String {
        format!("{}_{}_{}", stem, self.kind, self.index)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.headers.is_empty()
    }
}

/// Parse a file into datasets
pub fn read_file(path: &Path) -> Result<Vec<Dataset>> {
    let format = SourceFormat::from_path(path)
        .ok_or_else(|| SeedError::UnsupportedFile(path.display().to_string()))?;
    let kind = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match format {
        SourceFormat::Csv => read_csv(path, &kind).map(|d| vec![d]),
        SourceFormat::Json => read_json(path, &kind).map(|d| vec![d]),
        SourceFormat::Workbook => read_workbook(path, &kind),
    }
}

fn read_csv(path: &Path, kind: &str) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(raw_text).collect::<Vec<_>>());
    }

    // Ragged rows widen the table with unnamed columns
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(headers.len());
    headers.resize(width, String::new());
    for row in &mut rows {
        row.resize(width, None);
    }

    Ok(Dataset::new(kind, 1, None, headers, rows))
}

fn read_json(path: &Path, kind: &str) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&content)?;
    let (headers, rows) = flatten_document(document);
    Ok(Dataset::new(kind, 1, None, headers, rows))
}

fn read_workbook(path: &Path, kind: &str) -> Result<Vec<Dataset>> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_vec();

    let mut datasets = Vec::with_capacity(sheet_names.len());
    for (position, sheet) in sheet_names.into_iter().enumerate() {
        let range = workbook.worksheet_range(&sheet)?;
        let mut rows = range.rows();

        let headers: Vec<String> = rows
            .next()
            .map(|header| header.iter().map(|cell| cell_text(cell).unwrap_or_default()).collect())
            .unwrap_or_default();
        let rows: Vec<Vec<Option<String>>> = rows
            .map(|row| row.iter().map(cell_text).collect())
            .filter(|row: &Vec<Option<String>>| row.iter().any(Option::is_some))
            .collect();

        datasets.push(Dataset::new(kind, position + 1, Some(sheet), headers, rows));
    }
    Ok(datasets)
}

/// Text of a raw field; blank and NaN become NULL
fn raw_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(value.to_string())
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => raw_text(s),
        Data::Float(f) if f.is_nan() => None,
        Data::DateTime(_) => cell.as_datetime().map(|dt| dt.to_string()),
        other => Some(other.to_string()),
    }
}

/// Flatten a JSON document into headers and rows
///
/// A GeoJSON `FeatureCollection` is unwrapped to its features. Nested objects
/// become dotted columns, arrays are kept as JSON text and scalar elements
/// land in a `value` column.
pub fn flatten_document(document: Value) -> (Vec<String>, Vec<Vec<Option<String>>>) {
    let records = match document {
        Value::Object(mut object) if object.get("type").and_then(Value::as_str) == Some("FeatureCollection") => {
            match object.remove("features") {
                Some(Value::Array(features)) => features,
                _ => Vec::new(),
            }
        },
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut headers: Vec<String> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut flat_rows = Vec::with_capacity(records.len());

    for record in records {
        let mut flat = Vec::new();
        match record {
            Value::Object(object) => flatten_object("", object, &mut flat),
            scalar => flat.push(("value".to_string(), scalar_text(scalar))),
        }
        for (key, _) in &flat {
            if !positions.contains_key(key) {
                positions.insert(key.clone(), headers.len());
                headers.push(key.clone());
            }
        }
        flat_rows.push(flat);
    }

    let rows = flat_rows
        .into_iter()
        .map(|flat| {
            let mut row = vec![None; headers.len()];
            for (key, value) in flat {
                if let Some(&position) = positions.get(&key) {
                    row[position] = value;
                }
            }
            row
        })
        .collect();

    (headers, rows)
}

fn flatten_object(prefix: &str, object: Map<String, Value>, out: &mut Vec<(String, Option<String>)>) {
    for (key, value) in object {
        let column = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(nested) if !nested.is_empty() => flatten_object(&column, nested, out),
            other => out.push((column, scalar_text(other))),
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => raw_text(&s),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
        other => Some(other.to_string()),
    }
}

/// Name blank headers, move `id`/`created_at` out of the way of the raw
/// table's own columns, then de-duplicate as `name`, `name.1`, `name.2`
pub fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: HashSet<String> = HashSet::new();
    let mut normalized = Vec::with_capacity(headers.len());

    for (position, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("unnamed_{}", position)
        } else if header.eq_ignore_ascii_case("id") {
            "source_id".to_string()
        } else if header.eq_ignore_ascii_case("created_at") {
            "source_created_at".to_string()
        } else {
            header
        };

        let mut name = base.clone();
        let count = seen.entry(base.clone()).or_insert(0);
        while taken.contains(&name) {
            *count += 1;
            name = format!("{}.{}", base, count);
        }
        taken.insert(name.clone());
        normalized.push(name);
    }
    normalized
}
