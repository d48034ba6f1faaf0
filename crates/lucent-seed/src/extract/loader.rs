//! Raw table DDL and bulk loading
//!
//! Every raw table has a surrogate `id`, one `TEXT` column per source header
//! and a `created_at` timestamp. Rows go in through multi-row inserts sized to
//! stay under PostgreSQL's bind-parameter limit.

use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::reader::Dataset;
use crate::error::Result;
use crate::ident::{qualified, quote_ident, RAW_SCHEMA};

/// Rows per insert statement
pub const CHUNK_SIZE: usize = 500;

/// PostgreSQL's bind-parameter limit per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per statement for a given column count
pub fn rows_per_chunk(columns: usize) -> usize {
    if columns == 0 {
        return CHUNK_SIZE;
    }
    (MAX_BIND_PARAMS / columns).clamp(1, CHUNK_SIZE)
}

/// `CREATE TABLE IF NOT EXISTS` for a raw table
pub fn create_table_sql(table: &str, headers: &[String]) -> Result<String> {
    let mut columns = Vec::with_capacity(headers.len() + 2);
    columns.push("id SERIAL PRIMARY KEY".to_string());
    for header in headers {
        columns.push(format!("{} TEXT", quote_ident(header)?));
    }
    columns.push("created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP".to_string());

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(RAW_SCHEMA, table)?,
        columns.join(", ")
    ))
}

/// `ALTER TABLE` adding any header column the table does not have yet
pub fn add_columns_sql(table: &str, headers: &[String]) -> Result<Option<String>> {
    if headers.is_empty() {
        return Ok(None);
    }
    let clauses = headers
        .iter()
        .map(|header| Ok(format!("ADD COLUMN IF NOT EXISTS {} TEXT", quote_ident(header)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(format!(
        "ALTER TABLE {} {}",
        qualified(RAW_SCHEMA, table)?,
        clauses.join(", ")
    )))
}

/// Create (or widen) the raw table and insert every row; returns rows inserted
pub async fn load_dataset(conn: &mut PgConnection, table: &str, dataset: &Dataset) -> Result<usize> {
    let create = create_table_sql(table, &dataset.headers)?;
    sqlx::query(&create).execute(&mut *conn).await?;

    if let Some(alter) = add_columns_sql(table, &dataset.headers)? {
        sqlx::query(&alter).execute(&mut *conn).await?;
    }

    let target = qualified(RAW_SCHEMA, table)?;
    let column_list = dataset
        .headers
        .iter()
        .map(|h| quote_ident(h))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    let mut inserted = 0;
    for chunk in dataset.rows.chunks(rows_per_chunk(dataset.headers.len())) {
        let mut query = QueryBuilder::<Postgres>::new(format!("INSERT INTO {} ({}) ", target, column_list));
        query.push_values(chunk, |mut b, row| {
            for value in row {
                b.push_bind(value.as_deref());
            }
        });
        let result = query.build().execute(&mut *conn).await?;
        inserted += result.rows_affected() as usize;

        tracing::debug!(table = %table, rows = chunk.len(), "Inserted raw chunk");
    }

    Ok(inserted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::SeedError;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql("p_mines_csv_1", &headers(&["source_id", "Mine Name"])).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"data_raw\".\"p_mines_csv_1\" (id SERIAL PRIMARY KEY, \
             \"source_id\" TEXT, \"Mine Name\" TEXT, created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
        );
    }

    #[test]
    fn test_add_columns_sql() {
        let sql = add_columns_sql("p_x", &headers(&["a", "b\"c"])).unwrap().unwrap();
        assert_eq!(
            sql,
            "ALTER TABLE \"data_raw\".\"p_x\" ADD COLUMN IF NOT EXISTS \"a\" TEXT, \
             ADD COLUMN IF NOT EXISTS \"b\"\"c\" TEXT"
        );
        assert!(add_columns_sql("p_x", &[]).unwrap().is_none());
    }

    #[test]
    fn test_overlong_column_is_rejected() {
        let long = "c".repeat(64);
        let err = create_table_sql("p_x", &headers(&[long.as_str()])).unwrap_err();
        assert!(matches!(err, SeedError::IdentifierTooLong { len: 64, .. }));
    }

    #[test]
    fn test_rows_per_chunk_respects_parameter_limit() {
        assert_eq!(rows_per_chunk(5), CHUNK_SIZE);
        assert_eq!(rows_per_chunk(200), 327);
        assert_eq!(rows_per_chunk(70_000), 1);
        assert!(rows_per_chunk(131) * 131 <= MAX_BIND_PARAMS);
    }
}
