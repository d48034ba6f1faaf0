//! Raw to clean transformation
//!
//! Every primary raw table (`data_raw.p_*`) is processed by its own worker.
//! The worker first claims the mines its rows resolve to, then writes the
//! rows of its own mines in one transaction, in source order, each inside a
//! savepoint: a failing row is rolled back and counted, a failing table is
//! rolled back and reported, and neither stops the other workers. Rows whose
//! mine another table claimed are written after that commit, one short
//! transaction each, so no two table transactions ever hold keys of the same
//! mine.

pub mod resolver;
pub mod upsert;

use futures::stream::{self, StreamExt};
use sqlx::{Acquire, PgConnection, PgPool, Row};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::worker_count;
use crate::db::ConnectionProvider;
use crate::error::Result;
use crate::ident::{qualified, quote_ident, RAW_SCHEMA};
use crate::identity::MineId;
use crate::mapping::{ColumnMappingRegistry, RawRow};
use crate::models::{TableTransformResult, TransformSummary};
use resolver::{process_row, row_identity, Ownership, RowOutcome};

/// Attempts for a row that keeps losing lock conflicts
const ROW_ATTEMPTS: u32 = 5;
/// Pause before a retry, scaled by the attempt number
const RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct Transformer {
    provider: ConnectionProvider,
    registry: Arc<ColumnMappingRegistry>,
    workers: Option<usize>,
}

impl Transformer {
    pub fn new(provider: ConnectionProvider, registry: Arc<ColumnMappingRegistry>) -> Self {
        Self {
            provider,
            registry,
            workers: None,
        }
    }

    /// Cap concurrent tables; defaults to available parallelism
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    /// Transform every primary raw table
    ///
    /// Fails only when the raw tables cannot be listed.
    pub async fn transform_all(&self) -> Result<TransformSummary> {
        let start = Instant::now();
        let tables = list_primary_tables(self.provider.pool()).await?;
        info!(tables = tables.len(), "Found raw data tables to process");

        if tables.is_empty() {
            info!("No raw data tables to process");
            return Ok(TransformSummary::default());
        }

        let workers = worker_count(self.workers, tables.len());
        info!(workers, "Using worker pool");

        let results: Vec<TableTransformResult> = stream::iter(tables)
            .map(|table| self.transform_table(table))
            .buffer_unordered(workers)
            .collect()
            .await;
        let summary = TransformSummary { tables: results };

        let failed = summary.failed_tables();
        if !failed.is_empty() {
            warn!(count = failed.len(), tables = %failed.join(", "), "Failed to process raw tables");
        }
        info!(
            rows = summary.total_rows(),
            excluded = summary.total_excluded(),
            duplicates = summary.total_duplicates(),
            failed_rows = summary.total_failed_rows(),
            duration_secs = start.elapsed().as_secs_f64(),
            "Completed processing raw data into clean tables"
        );

        Ok(summary)
    }

    /// Transform one raw table in a single transaction
    pub async fn transform_table(&self, table: String) -> TableTransformResult {
        info!(table = %table, "Processing raw table");

        match self.transform_rows(&table).await {
            Ok(result) => {
                info!(
                    table = %table,
                    rows = result.rows_read,
                    excluded = result.rows_excluded,
                    failed = result.rows_failed,
                    "Processed raw table"
                );
                result
            },
            Err(e) => {
                error!(table = %table, error = %e, configuration = e.is_configuration(), "Error processing table");
                TableTransformResult {
                    table_name: table,
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            },
        }
    }

    async fn transform_rows(&self, table: &str) -> Result<TableTransformResult> {
        let rows = {
            let mut conn = self.provider.pool().acquire().await?;
            fetch_raw_rows(&mut conn, table).await?
        };
        let identities: Vec<Option<MineId>> = rows.iter().map(|row| row_identity(row)).collect();
        let resolved: Vec<MineId> = identities.iter().flatten().copied().collect();
        let owned = upsert::claim_mines(self.provider.pool(), table, &resolved).await?;
        debug!(table = %table, mines = resolved.len(), claimed = owned.len(), "Claimed mines");

        let mut pass = RowPass {
            result: TableTransformResult {
                table_name: table.to_string(),
                rows_read: rows.len(),
                ..Default::default()
            },
            written: HashSet::new(),
        };
        let outcome = self.write_rows(table, &rows, &identities, &owned, &mut pass).await;

        let unwritten: Vec<MineId> = owned.difference(&pass.written).copied().collect();
        if !unwritten.is_empty() {
            match upsert::release_claims(self.provider.pool(), table, &unwritten).await {
                Ok(released) => debug!(table = %table, released, "Released claims on unwritten mines"),
                Err(e) => warn!(table = %table, error = %e, "Failed to release mine claims"),
            }
        }

        outcome?;
        Ok(pass.result)
    }

    /// Owned mines and exclusions go through the table transaction, one
    /// savepoint per row. Rows for mines another table owns, and rows that
    /// lost a lock conflict, follow after the commit in their own transactions.
    async fn write_rows(
        &self,
        table: &str,
        rows: &[RawRow],
        identities: &[Option<MineId>],
        owned: &HashSet<MineId>,
        pass: &mut RowPass,
    ) -> Result<()> {
        let mut deferred = Vec::new();
        let mut committed = Vec::new();
        let mut tx = self.provider.begin().await?;

        for (index, (row, mine_id)) in rows.iter().zip(identities).enumerate() {
            let identity = match mine_id {
                Some(id) if owned.contains(id) => Some((*id, Ownership::Owner)),
                Some(id) => {
                    deferred.push((index, Some((*id, Ownership::Foreign))));
                    continue;
                },
                None => None,
            };

            let mut savepoint = tx.begin().await?;
            match process_row(&mut savepoint, &self.registry, table, row, identity).await {
                Ok(outcome) => {
                    savepoint.commit().await?;
                    if let RowOutcome::Resolved { mine_id, .. } = outcome {
                        committed.push(mine_id);
                    }
                    pass.tally(outcome);
                },
                Err(e) if e.is_lock_conflict() => {
                    savepoint.rollback().await?;
                    debug!(table = %table, row = index, error = %e, "Deferring row after lock conflict");
                    deferred.push((index, identity));
                },
                Err(e) => {
                    savepoint.rollback().await?;
                    pass.result.rows_failed += 1;
                    warn!(table = %table, row = index, error = %e, "Failed to process row");
                },
            }
        }

        tx.commit().await?;
        pass.written.extend(committed);

        if !deferred.is_empty() {
            debug!(table = %table, rows = deferred.len(), "Writing deferred rows");
        }
        for (index, identity) in deferred {
            let Some(row) = rows.get(index) else { continue };
            match self.write_row_alone(table, row, identity).await {
                Ok(outcome) => {
                    if let Some((mine_id, Ownership::Owner)) = identity {
                        pass.written.insert(mine_id);
                    }
                    pass.tally(outcome);
                },
                Err(e) => {
                    pass.result.rows_failed += 1;
                    warn!(table = %table, row = index, error = %e, "Failed to process row");
                },
            }
        }

        Ok(())
    }

    /// One row in its own transaction, retried while it keeps losing lock
    /// conflicts to other workers
    async fn write_row_alone(
        &self,
        table: &str,
        row: &RawRow,
        identity: Option<(MineId, Ownership)>,
    ) -> Result<RowOutcome> {
        let mut attempt = 1;
        loop {
            let mut tx = self.provider.begin().await?;
            match process_row(&mut tx, &self.registry, table, row, identity).await {
                Ok(outcome) => {
                    tx.commit().await?;
                    return Ok(outcome);
                },
                Err(e) if e.is_lock_conflict() && attempt < ROW_ATTEMPTS => {
                    tx.rollback().await?;
                    debug!(table = %table, attempt, error = %e, "Retrying row after lock conflict");
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Running totals for one table
struct RowPass {
    result: TableTransformResult,
    /// Owned mines whose rows are committed; the rest of the claims are released
    written: HashSet<MineId>,
}

impl RowPass {
    fn tally(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Resolved { duplicates, .. } => {
                self.result.rows_resolved += 1;
                self.result.duplicates += duplicates;
            },
            RowOutcome::Excluded => self.result.rows_excluded += 1,
        }
    }
}

/// Primary raw tables in name order
pub async fn list_primary_tables(pool: &PgPool) -> Result<Vec<String>> {
    let tables = sqlx::query_scalar::<_, String>(
        r#"
        SELECT tablename::text
        FROM pg_tables
        WHERE schemaname = $1 AND tablename LIKE 'p\_%'
        ORDER BY tablename
        "#,
    )
    .bind(RAW_SCHEMA)
    .fetch_all(pool)
    .await?;
    Ok(tables)
}

/// Every row of a raw table in insertion order, each column as text
pub async fn fetch_raw_rows(conn: &mut PgConnection, table: &str) -> Result<Vec<RawRow>> {
    let columns: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
        "#,
    )
    .bind(RAW_SCHEMA)
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    if columns.is_empty() {
        debug!(table = %table, "Raw table has no columns");
        return Ok(Vec::new());
    }

    let select_list = columns
        .iter()
        .map(|c| Ok(format!("{}::text", quote_ident(c)?)))
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let order = if columns.iter().any(|c| c == "id") { " ORDER BY id" } else { "" };
    let sql = format!("SELECT {} FROM {}{}", select_list, qualified(RAW_SCHEMA, table)?, order);

    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, column)| Ok((column.clone(), row.try_get::<Option<String>, _>(i)?)))
                .collect::<Result<RawRow>>()
        })
        .collect()
}
