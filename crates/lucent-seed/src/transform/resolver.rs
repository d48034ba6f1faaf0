//! Per-row resolution

use sqlx::PgConnection;

use super::upsert::{self, DimensionWrite};
use crate::error::Result;
use crate::identity::{locate_coordinates, resolve, MineId};
use crate::mapping::{extract_records, ColumnMappingRegistry, TableKind, TableRecords};

/// Whether the row's table holds the claim on its mine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Dimension rows are inserted, same-table repeats are audited
    Owner,
    /// Another table owns the mine; every dimension record is audited
    Foreign,
}

/// What happened to one raw row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Resolved { mine_id: MineId, duplicates: usize },
    Excluded,
}

/// Identity of a raw row, if its coordinates are usable
pub fn row_identity(row: &[(String, Option<String>)]) -> Option<MineId> {
    let (latitude, longitude) = locate_coordinates(row);
    resolve(latitude, longitude)
}

/// Write one raw row: an exclusion when it has no identity, otherwise a
/// fan-out into every registry table
pub async fn process_row(
    conn: &mut PgConnection,
    registry: &ColumnMappingRegistry,
    source_table: &str,
    row: &[(String, Option<String>)],
    identity: Option<(MineId, Ownership)>,
) -> Result<RowOutcome> {
    let Some((mine_id, ownership)) = identity else {
        upsert::record_exclusion(conn, source_table, row).await?;
        return Ok(RowOutcome::Excluded);
    };

    let mut duplicates = 0;
    for table in registry.tables() {
        match (table.kind, extract_records(row, table, registry.overrides())) {
            (_, TableRecords::Empty) => {},
            (TableKind::Dimension, TableRecords::Single(record)) => match ownership {
                Ownership::Owner => {
                    if upsert::insert_dimension(conn, table, mine_id, &record).await? == DimensionWrite::Duplicate {
                        duplicates += 1;
                    }
                },
                Ownership::Foreign => {
                    upsert::record_duplicate(conn, table, mine_id, &record).await?;
                    duplicates += 1;
                },
            },
            (TableKind::Sequenced, TableRecords::Single(record)) => {
                upsert::insert_sequenced(conn, table, mine_id, &record).await?;
            },
            (_, TableRecords::Single(record)) => {
                upsert::insert_fact(conn, table, mine_id, &record).await?;
            },
            (_, TableRecords::Expanded { field, values }) => {
                upsert::insert_expanded(conn, table, mine_id, &field, &values).await?;
            },
        }
    }

    Ok(RowOutcome::Resolved { mine_id, duplicates })
}
