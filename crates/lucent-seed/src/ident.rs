//! SQL identifier construction
//!
//! Table and column names come from file names, spreadsheet headers and
//! configuration. They never reach SQL through plain string formatting: raw
//! table names are reduced to `[a-z0-9_]`, configured names must already be in
//! that form, and everything is emitted through [`quote_ident`].

use crate::error::{Result, SeedError, MAX_IDENTIFIER_LEN};

/// Schema holding the untyped staging tables
pub const RAW_SCHEMA: &str = "data_raw";

/// Schema holding the dimension and fact tables
pub const CLEAN_SCHEMA: &str = "data_clean";

/// Schema holding the audit and log tables
pub const AUDIT_SCHEMA: &str = "public";

/// Lower-case a source name and replace everything outside `[a-z0-9_]` with `_`
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect()
}

/// Build a raw table name from a visibility prefix and a candidate name
///
/// Fails instead of truncating when the result exceeds the identifier limit.
pub fn raw_table_name(prefix: &str, candidate: &str) -> Result<String> {
    let name = format!("{}{}", prefix, sanitize_name(candidate));
    check_length(&name)?;
    Ok(name)
}

/// Require `^[a-z_][a-z0-9_]*$` within the length limit
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_start || !valid_rest {
        return Err(SeedError::InvalidIdentifier(name.to_string()));
    }
    check_length(name)
}

/// Double-quote an identifier, escaping embedded quotes
pub fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(SeedError::InvalidIdentifier(name.to_string()));
    }
    check_length(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `"schema"."table"`
pub fn qualified(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

fn check_length(name: &str) -> Result<()> {
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(SeedError::IdentifierTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    Ok(())
}
