//! Clean-schema writes
//!
//! One function per write protocol. Mine claims run on the pool and commit
//! immediately; every other write runs on the caller's connection inside a
//! transaction, so a failure never leaves half a row behind.

use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::ident::{qualified, quote_ident, AUDIT_SCHEMA, CLEAN_SCHEMA};
use crate::identity::MineId;
use crate::mapping::{CleanValue, Record, TableMapping};

/// Result of a dimension write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionWrite {
    Inserted,
    /// Another row already holds this mine; the attempt was audited
    Duplicate,
}

/// Claim mines for a raw table; returns the ones this table now owns
///
/// Runs outside any table transaction so the claim is visible to every other
/// worker at once. Only the owning table writes a mine's dimension rows, so
/// workers never wait on each other's uncommitted dimension keys. Ids are
/// inserted in sorted order so concurrent claims cannot deadlock.
pub async fn claim_mines(pool: &PgPool, source_table: &str, mine_ids: &[MineId]) -> Result<HashSet<MineId>> {
    let mut ids: Vec<Uuid> = mine_ids.iter().map(MineId::as_uuid).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let claimed: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO data_clean.dim_raw (mine_id, source_table, created_at, updated_at)
        SELECT id, $2, NOW(), NOW()
        FROM UNNEST($1::uuid[]) AS claim(id)
        ORDER BY id
        ON CONFLICT (mine_id) DO NOTHING
        RETURNING mine_id
        "#,
    )
    .bind(&ids)
    .bind(source_table)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    Ok(mine_ids
        .iter()
        .copied()
        .filter(|id| claimed.contains(&id.as_uuid()))
        .collect())
}

/// Give back claims whose rows never committed
pub async fn release_claims(pool: &PgPool, source_table: &str, mine_ids: &[MineId]) -> Result<u64> {
    if mine_ids.is_empty() {
        return Ok(0);
    }
    let ids: Vec<Uuid> = mine_ids.iter().map(MineId::as_uuid).collect();
    let result = sqlx::query("DELETE FROM data_clean.dim_raw WHERE source_table = $1 AND mine_id = ANY($2)")
        .bind(source_table)
        .bind(&ids)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Keep a row that has no usable coordinates, every column verbatim
pub async fn record_exclusion(
    conn: &mut PgConnection,
    source_name: &str,
    row: &[(String, Option<String>)],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO public.pipeline_exclusions (source_name, row_data, created_at)
        VALUES ($1, $2, NOW())
        "#,
    )
    .bind(source_name)
    .bind(row_json(row))
    .execute(conn)
    .await?;
    Ok(())
}

/// Insert a dimension row unless the mine already has one
///
/// The check and the insert are a single statement against the
/// `UNIQUE (mine_id)` constraint, so two rows of the same mine cannot both
/// win. The losing attempt is written to `pipeline_duplicates`.
pub async fn insert_dimension(
    conn: &mut PgConnection,
    table: &TableMapping,
    mine_id: MineId,
    record: &Record,
) -> Result<DimensionWrite> {
    let mut query = insert_prefix(table, record, &[])?;
    query.push_bind(mine_id.as_uuid());
    push_record(&mut query, record);
    query.push(", NOW(), NOW()) ON CONFLICT (mine_id) DO NOTHING RETURNING mine_id");

    let inserted = query.build().fetch_optional(&mut *conn).await?;
    if inserted.is_some() {
        return Ok(DimensionWrite::Inserted);
    }

    record_duplicate(conn, table, mine_id, record).await?;
    Ok(DimensionWrite::Duplicate)
}

/// Audit a dimension write for a mine that already has its row
pub async fn record_duplicate(conn: &mut PgConnection, table: &TableMapping, mine_id: MineId, record: &Record) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO {} (mine_id, table_name, row_data, created_at, updated_at) VALUES ($1, $2, $3, NOW(), NOW())",
        qualified(AUDIT_SCHEMA, "pipeline_duplicates")?
    ))
    .bind(mine_id.as_uuid())
    .bind(&table.name)
    .bind(record.to_json())
    .execute(conn)
    .await?;
    Ok(())
}

/// Insert a fact row as-is
pub async fn insert_fact(conn: &mut PgConnection, table: &TableMapping, mine_id: MineId, record: &Record) -> Result<()> {
    let mut query = insert_prefix(table, record, &[])?;
    query.push_bind(mine_id.as_uuid());
    push_record(&mut query, record);
    query.push(", NOW(), NOW())");

    query.build().execute(conn).await?;
    Ok(())
}

/// Insert a fact row numbered `max + 1` within its mine; returns the number
///
/// The per-mine advisory lock is held until the transaction ends, so two
/// workers numbering the same mine queue instead of colliding.
pub async fn insert_sequenced(
    conn: &mut PgConnection,
    table: &TableMapping,
    mine_id: MineId,
    record: &Record,
) -> Result<i32> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
        .bind(&table.name)
        .bind(mine_id.to_string())
        .execute(&mut *conn)
        .await?;

    let target = qualified(CLEAN_SCHEMA, &table.name)?;
    let next: i32 = sqlx::query_scalar(&format!(
        "SELECT COALESCE(MAX(shaft_number), 0) + 1 FROM {} WHERE mine_id = $1",
        target
    ))
    .bind(mine_id.as_uuid())
    .fetch_one(&mut *conn)
    .await?;

    let mut query = insert_prefix(table, record, &["shaft_id", "shaft_number"])?;
    query.push_bind(mine_id.as_uuid());
    query.push(", ");
    query.push_bind(Uuid::new_v4());
    query.push(", ");
    query.push_bind(next);
    push_record(&mut query, record);
    query.push(", NOW(), NOW())");

    query.build().execute(&mut *conn).await?;
    Ok(next)
}

/// Insert one row per value, ignoring values the mine already has; returns rows added
///
/// Values go in sorted order so workers touching the same mine take its keys
/// in the same order.
pub async fn insert_expanded(
    conn: &mut PgConnection,
    table: &TableMapping,
    mine_id: MineId,
    field: &str,
    values: &[String],
) -> Result<u64> {
    let mut values: Vec<&String> = values.iter().collect();
    values.sort_unstable();
    values.dedup();
    if values.is_empty() {
        return Ok(0);
    }

    let field = quote_ident(field)?;
    let mut query = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} (mine_id, {}, created_at, updated_at) ",
        qualified(CLEAN_SCHEMA, &table.name)?,
        field
    ));
    query.push_values(values, |mut b, value| {
        b.push_bind(mine_id.as_uuid())
            .push_bind(value)
            .push("NOW()")
            .push("NOW()");
    });
    query.push(format!(" ON CONFLICT (mine_id, {}) DO NOTHING", field));

    let result = query.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// `INSERT INTO table (mine_id, extra..., fields..., created_at, updated_at) VALUES (`
fn insert_prefix(table: &TableMapping, record: &Record, extra: &[&str]) -> Result<QueryBuilder<'static, Postgres>> {
    let mut columns = vec!["mine_id".to_string()];
    for name in extra {
        columns.push(quote_ident(name)?);
    }
    for (name, _) in &record.fields {
        columns.push(quote_ident(name)?);
    }
    columns.push("created_at".to_string());
    columns.push("updated_at".to_string());

    Ok(QueryBuilder::new(format!(
        "INSERT INTO {} ({}) VALUES (",
        qualified(CLEAN_SCHEMA, &table.name)?,
        columns.join(", ")
    )))
}

/// Bind each value with its column's type, NULLs included
fn push_record(query: &mut QueryBuilder<'static, Postgres>, record: &Record) {
    for (_, value) in &record.fields {
        query.push(", ");
        match value {
            CleanValue::Text(v) => query.push_bind(v.clone()),
            CleanValue::Float(v) => query.push_bind(*v),
            CleanValue::Integer(v) => query.push_bind(*v),
            CleanValue::Boolean(v) => query.push_bind(*v),
        };
    }
}

/// A raw row as a JSON object of text values
pub fn row_json(row: &[(String, Option<String>)]) -> Value {
    let object: Map<String, Value> = row
        .iter()
        .map(|(column, value)| {
            let value = value.clone().map(Value::String).unwrap_or(Value::Null);
            (column.clone(), value)
        })
        .collect();
    Value::Object(object)
}
