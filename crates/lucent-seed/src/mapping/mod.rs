//! Column mapping, value cleaning and record extraction

pub mod clean;
pub mod record;
pub mod registry;

pub use clean::{clean_value, CleanValue};
pub use record::{extract_records, find_column, RawRow, Record, TableRecords};
pub use registry::{ColumnMappingRegistry, FieldKind, TableKind, TableMapping, ValueOverrides};
