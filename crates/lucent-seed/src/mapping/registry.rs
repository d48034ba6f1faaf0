//! Column-mapping registry
//!
//! Maps every clean table to the fields it carries and, per field, the ordered
//! list of raw column names that may supply it. The registry is loaded once at
//! start-up from two JSON documents:
//!
//! ```json
//! { "dim_status": { "status": ["status", "Status"] } }
//! ```
//!
//! and the value overrides applied to cleaned text:
//!
//! ```json
//! { "dim_status": { "status": { "Producing": "operating" } } }
//! ```
//!
//! Table and field names end up in SQL, so both must be plain lower-case
//! identifiers. A table's [`TableKind`] is fixed by its name.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::{Result, SeedError};
use crate::ident::validate_identifier;

const DEFAULT_COLUMN_MAPPINGS: &str = include_str!("../../../../config/column_mappings.json");
const DEFAULT_VALUE_OVERRIDES: &str = include_str!("../../../../config/value_overrides.json");

/// Columns managed by the clean tables themselves
const RESERVED_FIELDS: &[&str] = &["id", "mine_id", "created_at", "updated_at", "shaft_number"];

/// How a cleaned field value is typed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Numeric,
    Integer,
    Boolean,
    Latitude,
    Longitude,
}

impl FieldKind {
    /// Kind implied by a target field name
    pub fn for_field(field: &str) -> Self {
        match field {
            "latitude" => FieldKind::Latitude,
            "longitude" => FieldKind::Longitude,
            "shaft_depth" | "shaft_diameter" => FieldKind::Numeric,
            "grid_connection" => FieldKind::Boolean,
            "closure_year" | "opening_year" | "no_shafts" => FieldKind::Integer,
            _ => FieldKind::Text,
        }
    }
}

/// Split rule for fact tables that fan one field out into many rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    pub field: &'static str,
    pub delimiters: &'static [char],
    pub lowercase: bool,
}

/// Write protocol of a clean table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// At most one row per mine; losing writes are audited as duplicates
    Dimension,
    /// Fact rows numbered per mine (`shaft_number`)
    Sequenced,
    /// One fact row per token of a delimited field
    Expanded(Expansion),
    /// Fact rows inserted as-is, skipped when every field is empty
    Plain,
}

impl TableKind {
    pub fn for_table(table: &str) -> Result<Self> {
        match table {
            "fact_shafts" => Ok(TableKind::Sequenced),
            "fact_commodities" => Ok(TableKind::Expanded(Expansion {
                field: "commodity",
                delimiters: &[',', '|', '&', ';'],
                lowercase: true,
            })),
            "fact_documentation" => Ok(TableKind::Expanded(Expansion {
                field: "reference",
                delimiters: &[',', '|', ';'],
                lowercase: false,
            })),
            t if t.starts_with("dim_") => Ok(TableKind::Dimension),
            t if t.starts_with("fact_") => Ok(TableKind::Plain),
            t => Err(SeedError::registry(format!(
                "table '{}' is neither a dim_ nor a fact_ table",
                t
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub name: String,
    pub kind: FieldKind,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableMapping {
    pub name: String,
    pub kind: TableKind,
    pub fields: Vec<FieldMapping>,
}

impl TableMapping {
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Literal replacements applied to cleaned text values, keyed by table then field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueOverrides(HashMap<String, HashMap<String, HashMap<String, String>>>);

impl ValueOverrides {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(json)?))
    }

    /// Replacement for `value`, if one is configured
    pub fn lookup(&self, table: &str, field: &str, value: &str) -> Option<&str> {
        self.0
            .get(table)
            .and_then(|fields| fields.get(field))
            .and_then(|values| values.get(value))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct ColumnMappingRegistry {
    tables: Vec<TableMapping>,
    overrides: ValueOverrides,
}

impl ColumnMappingRegistry {
    /// Registry built from the mappings shipped with the crate
    pub fn embedded() -> Result<Self> {
        Self::from_json(DEFAULT_COLUMN_MAPPINGS, DEFAULT_VALUE_OVERRIDES)
    }

    /// Load from files, falling back to the embedded document for any path not given
    pub fn load(mappings_path: Option<&Path>, overrides_path: Option<&Path>) -> Result<Self> {
        let mappings = match mappings_path {
            Some(path) => read_config(path)?,
            None => DEFAULT_COLUMN_MAPPINGS.to_string(),
        };
        let overrides = match overrides_path {
            Some(path) => read_config(path)?,
            None => DEFAULT_VALUE_OVERRIDES.to_string(),
        };
        Self::from_json(&mappings, &overrides)
    }

    pub fn from_json(mappings: &str, overrides: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, Vec<String>>> = serde_json::from_str(mappings)
            .map_err(|e| SeedError::registry(format!("column mappings are malformed: {}", e)))?;
        let overrides = ValueOverrides::from_json(overrides)
            .map_err(|e| SeedError::registry(format!("value overrides are malformed: {}", e)))?;

        let mut tables = Vec::with_capacity(raw.len());
        for (table, fields) in raw {
            validate_identifier(&table)?;
            let kind = TableKind::for_table(&table)?;

            let mut mapped = Vec::with_capacity(fields.len());
            for (field, candidates) in fields {
                validate_identifier(&field)?;
                if RESERVED_FIELDS.contains(&field.as_str()) {
                    return Err(SeedError::registry(format!(
                        "{}.{} collides with a managed column",
                        table, field
                    )));
                }
                if candidates.is_empty() {
                    return Err(SeedError::registry(format!(
                        "{}.{} has no candidate columns",
                        table, field
                    )));
                }
                mapped.push(FieldMapping {
                    kind: FieldKind::for_field(&field),
                    name: field,
                    candidates,
                });
            }

            let mapping = TableMapping {
                name: table,
                kind,
                fields: mapped,
            };
            if let TableKind::Expanded(expansion) = kind {
                if mapping.field(expansion.field).is_none() {
                    return Err(SeedError::registry(format!(
                        "{} must map the '{}' field",
                        mapping.name, expansion.field
                    )));
                }
            }
            tables.push(mapping);
        }

        Ok(Self { tables, overrides })
    }

    /// Table mappings in name order (dimensions before facts)
    pub fn tables(&self) -> &[TableMapping] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableMapping> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn overrides(&self) -> &ValueOverrides {
        &self.overrides
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        SeedError::registry(format!("cannot read {}: {}", path.display(), e))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_embedded_registry_loads() {
        let registry = ColumnMappingRegistry::embedded().unwrap();
        let names: Vec<&str> = registry.tables().iter().map(|t| t.name.as_str()).collect();

        assert!(names.contains(&"dim_status"));
        assert!(names.contains(&"fact_shafts"));
        assert_eq!(registry.table("fact_shafts").unwrap().kind, TableKind::Sequenced);
        assert_eq!(
            registry.table("dim_locations").unwrap().field("latitude").unwrap().kind,
            FieldKind::Latitude
        );
        // Dimensions sort ahead of facts
        let first_fact = names.iter().position(|n| n.starts_with("fact_")).unwrap();
        assert!(names[..first_fact].iter().all(|n| n.starts_with("dim_")));
    }

    #[test]
    fn test_table_kinds() {
        assert_eq!(TableKind::for_table("dim_company").unwrap(), TableKind::Dimension);
        assert_eq!(TableKind::for_table("fact_prices").unwrap(), TableKind::Plain);
        match TableKind::for_table("fact_commodities").unwrap() {
            TableKind::Expanded(e) => {
                assert_eq!(e.field, "commodity");
                assert!(e.lowercase);
                assert!(e.delimiters.contains(&'&'));
            },
            other => panic!("unexpected kind {:?}", other),
        }
        match TableKind::for_table("fact_documentation").unwrap() {
            TableKind::Expanded(e) => assert!(!e.delimiters.contains(&'&')),
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(TableKind::for_table("mines").is_err());
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(FieldKind::for_field("shaft_depth"), FieldKind::Numeric);
        assert_eq!(FieldKind::for_field("grid_connection"), FieldKind::Boolean);
        assert_eq!(FieldKind::for_field("no_shafts"), FieldKind::Integer);
        assert_eq!(FieldKind::for_field("company_name"), FieldKind::Text);
    }

    #[test]
    fn test_rejects_unsafe_names() {
        let err = ColumnMappingRegistry::from_json(r#"{"dim_x; drop": {"a": ["a"]}}"#, "{}")
            .unwrap_err();
        assert!(matches!(err, SeedError::InvalidIdentifier(_)));

        let err = ColumnMappingRegistry::from_json(r#"{"dim_x": {"mine_id": ["a"]}}"#, "{}")
            .unwrap_err();
        assert!(matches!(err, SeedError::Registry(_)));

        let err = ColumnMappingRegistry::from_json(r#"{"dim_x": {"a": []}}"#, "{}").unwrap_err();
        assert!(matches!(err, SeedError::Registry(_)));

        let err = ColumnMappingRegistry::from_json(r#"{"fact_commodities": {"name": ["a"]}}"#, "{}")
            .unwrap_err();
        assert!(matches!(err, SeedError::Registry(_)));
    }

    #[test]
    fn test_overrides_lookup() {
        let overrides =
            ValueOverrides::from_json(r#"{"dim_status": {"status": {"C&M": "care and maintenance"}}}"#)
                .unwrap();
        assert_eq!(
            overrides.lookup("dim_status", "status", "C&M"),
            Some("care and maintenance")
        );
        assert_eq!(overrides.lookup("dim_status", "status", "Operating"), None);
        assert_eq!(overrides.lookup("dim_company", "status", "C&M"), None);
    }

    #[test]
    fn test_load_from_files() {
        let mut mappings = NamedTempFile::new().unwrap();
        write!(mappings, r#"{{"dim_status": {{"status": ["Status"]}}}}"#).unwrap();

        let registry = ColumnMappingRegistry::load(Some(mappings.path()), None).unwrap();
        assert_eq!(registry.tables().len(), 1);
        assert!(registry.overrides().lookup("dim_status", "status", "Producing").is_some());

        let missing = Path::new("/nonexistent/mappings.json");
        assert!(ColumnMappingRegistry::load(Some(missing), None).is_err());
    }
}
