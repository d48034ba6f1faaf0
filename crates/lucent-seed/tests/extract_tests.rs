//! Raw extraction against a real PostgreSQL
//!
//! Run with `cargo test -- --ignored` on a machine with Docker.

mod common;

use anyhow::Result;
use common::{init_test_tracing, write_file, TestPostgres};
use lucent_seed::extract::Extractor;
use lucent_seed::manifest::Manifest;
use serial_test::serial;
use std::sync::Arc;
use tempfile::TempDir;

const MANIFEST: &str = r#"
resources:
  local-files:
    - table_name: mines
      type: primary
    - table_name: leases
      type: supplementary
  remote-files:
    - table_name: vectors
      type: embeddings
"#;

fn extractor(pg: &TestPostgres) -> Result<Extractor> {
    let manifest = Manifest::from_yaml(MANIFEST)?;
    Ok(Extractor::new(pg.provider(), Arc::new(manifest)).with_workers(Some(2)))
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_ingest_loads_each_tier() -> Result<()> {
    init_test_tracing();
    let pg = TestPostgres::start().await?;
    let dir = TempDir::new()?;

    write_file(dir.path(), "mines.csv", "id,Name,Lat,Long\n1,Boulder,-30.75,121.47\n2,Kalgoorlie,-30.74,121.46\n")?;
    write_file(dir.path(), "leases.csv", "Lease,Holder\nM26/1,Acme\n")?;
    write_file(dir.path(), "vectors.csv", "chunk,text\n1,hello\n")?;
    write_file(dir.path(), "notes.txt", "ignored")?;

    let summary = extractor(&pg)?.ingest(dir.path()).await?;

    assert_eq!(summary.files_found, 3);
    assert_eq!(summary.datasets_skipped, 1);
    assert_eq!(summary.loaded_tables(), 2);
    assert_eq!(summary.total_rows(), 3);
    assert!(summary.failed_tables().is_empty());

    assert_eq!(pg.count("data_raw.p_mines_csv_1").await?, 2);
    assert_eq!(pg.count("data_raw.s_leases_csv_1").await?, 1);

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT tablename::text FROM pg_tables WHERE schemaname = 'data_raw' ORDER BY tablename",
    )
    .fetch_all(pg.pool())
    .await?;
    assert_eq!(tables, vec!["p_mines_csv_1", "s_leases_csv_1"]);

    // The source `id` column is kept beside the table's own surrogate key
    let source_ids: Vec<Option<String>> =
        sqlx::query_scalar("SELECT source_id FROM data_raw.p_mines_csv_1 ORDER BY id")
            .fetch_all(pg.pool())
            .await?;
    assert_eq!(source_ids, vec![Some("1".to_string()), Some("2".to_string())]);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_ingest_reports_bad_files_and_names_without_stopping() -> Result<()> {
    init_test_tracing();
    let pg = TestPostgres::start().await?;
    let dir = TempDir::new()?;

    let long_stem = "a".repeat(60);
    write_file(dir.path(), &format!("{}.csv", long_stem), "Name\nx\n")?;
    write_file(dir.path(), "broken.json", "{ not json")?;
    write_file(dir.path(), "sites.geojson", r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "Boulder", "lat": -30.75}},
            {"type": "Feature", "properties": {"name": "Paddington"}}
        ]
    }"#)?;

    let summary = extractor(&pg)?.ingest(dir.path()).await?;

    assert_eq!(summary.files_found, 3);
    assert_eq!(summary.file_errors.len(), 1);
    assert_eq!(summary.file_errors[0].0, "broken.json");

    let failed = summary.failed_tables();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].starts_with(&long_stem));
    let error = summary.tables.iter().find_map(|t| t.error.clone()).unwrap_or_default();
    assert!(error.contains("Identifier too long"), "unexpected error: {}", error);

    assert_eq!(pg.count("data_raw.p_sites_geojson_1").await?, 2);
    let names: Vec<Option<String>> =
        sqlx::query_scalar(r#"SELECT "properties.name" FROM data_raw.p_sites_geojson_1 ORDER BY id"#)
            .fetch_all(pg.pool())
            .await?;
    assert_eq!(names, vec![Some("Boulder".to_string()), Some("Paddington".to_string())]);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_ingest_reloading_appends_and_widens() -> Result<()> {
    init_test_tracing();
    let pg = TestPostgres::start().await?;
    let dir = TempDir::new()?;
    let extractor = extractor(&pg)?;

    write_file(dir.path(), "mines.csv", "Name\nBoulder\n")?;
    extractor.ingest(dir.path()).await?;

    write_file(dir.path(), "mines.csv", "Name,Status\nKalgoorlie,Operating\n")?;
    let summary = extractor.ingest(dir.path()).await?;
    assert_eq!(summary.total_rows(), 1);

    let rows: Vec<(String, Option<String>)> =
        sqlx::query_as(r#"SELECT "Name", "Status" FROM data_raw.p_mines_csv_1 ORDER BY id"#)
            .fetch_all(pg.pool())
            .await?;
    assert_eq!(
        rows,
        vec![
            ("Boulder".to_string(), None),
            ("Kalgoorlie".to_string(), Some("Operating".to_string())),
        ]
    );

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_ingest_missing_directory_is_empty() -> Result<()> {
    init_test_tracing();
    let pg = TestPostgres::start().await?;
    let dir = TempDir::new()?;

    let summary = extractor(&pg)?.ingest(&dir.path().join("absent")).await?;
    assert_eq!(summary.files_found, 0);
    assert!(summary.tables.is_empty());

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_ingest_colliding_names_share_one_table() -> Result<()> {
    init_test_tracing();
    let pg = TestPostgres::start().await?;
    let dir = TempDir::new()?;

    write_file(dir.path(), "Mines.csv", "Name\nBoulder\n")?;
    write_file(dir.path(), "mines.csv", "Name,Status\nKalgoorlie,Operating\nParkes,Closed\n")?;

    let summary = extractor(&pg)?.ingest(dir.path()).await?;

    assert!(summary.failed_tables().is_empty(), "failed: {:?}", summary.failed_tables());
    assert_eq!(summary.tables.len(), 2);
    assert_eq!(summary.total_rows(), 3);
    assert_eq!(pg.count("data_raw.p_mines_csv_1").await?, 3);

    Ok(())
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_ingest_workbook_sheets_become_tables() -> Result<()> {
    init_test_tracing();
    let pg = TestPostgres::start().await?;
    let dir = TempDir::new()?;

    let mut workbook = rust_xlsxwriter::Workbook::new();
    {
        let sites = workbook.add_worksheet();
        sites.set_name("Sites")?;
        sites.write_string(0, 0, "Name")?;
        sites.write_string(1, 0, "Boulder")?;
        sites.write_string(2, 0, "Paddington")?;
    }
    {
        let leases = workbook.add_worksheet();
        leases.set_name("Leases")?;
        leases.write_string(0, 0, "Lease")?;
        leases.write_string(1, 0, "M26/1")?;
    }
    workbook.save(dir.path().join("register.xlsx"))?;

    let summary = extractor(&pg)?.ingest(dir.path()).await?;

    assert!(summary.failed_tables().is_empty());
    assert_eq!(pg.count("data_raw.p_register_xlsx_1").await?, 2);
    assert_eq!(pg.count("data_raw.p_register_xlsx_2").await?, 1);

    let leases: Vec<Option<String>> = sqlx::query_scalar(r#"SELECT "Lease" FROM data_raw.p_register_xlsx_2"#)
        .fetch_all(pg.pool())
        .await?;
    assert_eq!(leases, vec![Some("M26/1".to_string())]);

    Ok(())
}
