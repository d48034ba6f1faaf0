//! Mapping raw rows onto clean-table records

use serde_json::{Map, Value};

use super::clean::{clean_value, CleanValue};
use super::registry::{TableKind, TableMapping, ValueOverrides};

/// A raw row: every column in table order with its text value
pub type RawRow = Vec<(String, Option<String>)>;

/// Raw-table columns that never supply field values
pub const BOOKKEEPING_COLUMNS: &[&str] = &["id", "created_at"];

/// Cleaned field values for one clean-table row, in mapping order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: Vec<(String, CleanValue)>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&CleanValue> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_null())
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::to_value(value).unwrap_or(Value::Null)))
            .collect();
        Value::Object(map)
    }
}

/// What one raw row contributes to one clean table
#[derive(Debug, Clone, PartialEq)]
pub enum TableRecords {
    /// A single row (dimensions, plain and sequenced facts)
    Single(Record),
    /// One row per token of the expansion field
    Expanded { field: String, values: Vec<String> },
    /// Nothing to write
    Empty,
}

/// Find the raw column supplying a field
///
/// Exact candidate matches win over substring matches; within each pass the
/// raw column order decides.
pub fn find_column<'r>(row: &'r [(String, Option<String>)], candidates: &[String]) -> Option<&'r (String, Option<String>)> {
    let columns = || {
        row.iter()
            .filter(|(name, _)| !BOOKKEEPING_COLUMNS.contains(&name.as_str()))
    };

    columns()
        .find(|(name, _)| candidates.iter().any(|c| c == name))
        .or_else(|| columns().find(|(name, _)| candidates.iter().any(|c| name.contains(c.as_str()))))
}

/// Build the record(s) a raw row contributes to `table`
pub fn extract_records(row: &[(String, Option<String>)], table: &TableMapping, overrides: &ValueOverrides) -> TableRecords {
    let mut record = Record::default();

    for field in &table.fields {
        let raw = find_column(row, &field.candidates).and_then(|(_, value)| value.as_deref());
        let mut value = clean_value(raw, field.kind);

        if let CleanValue::Text(Some(text)) = &mut value {
            if let Some(replacement) = overrides.lookup(&table.name, &field.name, text.as_str()) {
                *text = replacement.to_string();
            }
            if field.name == "status" {
                *text = text.to_lowercase();
            }
        }

        record.fields.push((field.name.clone(), value));
    }

    match table.kind {
        TableKind::Dimension => TableRecords::Single(record),
        TableKind::Expanded(expansion) => {
            let values = record
                .get(expansion.field)
                .and_then(CleanValue::as_text)
                .map(|text| split_tokens(text, expansion.delimiters, expansion.lowercase))
                .unwrap_or_default();

            if values.is_empty() {
                TableRecords::Empty
            } else {
                TableRecords::Expanded {
                    field: expansion.field.to_string(),
                    values,
                }
            }
        },
        TableKind::Sequenced | TableKind::Plain => {
            if record.is_empty() {
                TableRecords::Empty
            } else {
                TableRecords::Single(record)
            }
        },
    }
}

/// Split on any delimiter, trimming tokens and dropping empty ones
pub fn split_tokens(text: &str, delimiters: &[char], lowercase: bool) -> Vec<String> {
    text.split(|c| delimiters.contains(&c))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| if lowercase { token.to_lowercase() } else { token.to_string() })
        .collect()
}
