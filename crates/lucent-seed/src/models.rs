//! Stage results
//!
//! Per-table outcomes are collected rather than propagated so one bad file or
//! raw table never stops the rest of a stage.

use serde::{Deserialize, Serialize};

/// Outcome of loading one dataset into the raw schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableLoadResult {
    /// Raw table name, or the dataset name when no table name could be built
    pub table_name: String,
    pub file_name: String,
    pub rows_loaded: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub files_found: usize,
    /// Files that could not be parsed at all
    pub file_errors: Vec<(String, String)>,
    /// Datasets skipped because they were empty or flagged for embeddings
    pub datasets_skipped: usize,
    pub tables: Vec<TableLoadResult>,
}

impl ExtractionSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows_loaded).sum()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.error.is_some())
            .map(|t| t.table_name.as_str())
            .collect()
    }

    pub fn loaded_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.error.is_none()).count()
    }
}

/// Outcome of resolving one primary raw table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableTransformResult {
    pub table_name: String,
    pub rows_read: usize,
    /// Rows that resolved to a mine and were written without error
    pub rows_resolved: usize,
    /// Rows without usable coordinates, diverted to `pipeline_exclusions`
    pub rows_excluded: usize,
    /// Rows rolled back to their savepoint
    pub rows_failed: usize,
    /// Dimension writes that lost to an existing row
    pub duplicates: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformSummary {
    pub tables: Vec<TableTransformResult>,
}

impl TransformSummary {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows_read).sum()
    }

    pub fn total_excluded(&self) -> usize {
        self.tables.iter().map(|t| t.rows_excluded).sum()
    }

    pub fn total_duplicates(&self) -> usize {
        self.tables.iter().map(|t| t.duplicates).sum()
    }

    pub fn total_failed_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows_failed).sum()
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.error.is_some())
            .map(|t| t.table_name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_totals() {
        let summary = ExtractionSummary {
            files_found: 2,
            file_errors: vec![],
            datasets_skipped: 0,
            tables: vec![
                TableLoadResult {
                    table_name: "p_mines_csv_1".into(),
                    file_name: "mines.csv".into(),
                    rows_loaded: 10,
                    error: None,
                },
                TableLoadResult {
                    table_name: "p_sites_xlsx_2".into(),
                    file_name: "sites.xlsx".into(),
                    rows_loaded: 0,
                    error: Some("Identifier too long".into()),
                },
            ],
        };

        assert_eq!(summary.total_rows(), 10);
        assert_eq!(summary.loaded_tables(), 1);
        assert_eq!(summary.failed_tables(), vec!["p_sites_xlsx_2"]);
    }

    #[test]
    fn test_transform_totals() {
        let summary = TransformSummary {
            tables: vec![
                TableTransformResult {
                    table_name: "p_a_csv_1".into(),
                    rows_read: 5,
                    rows_resolved: 3,
                    rows_excluded: 1,
                    rows_failed: 1,
                    duplicates: 8,
                    error: None,
                },
                TableTransformResult {
                    table_name: "p_b_csv_1".into(),
                    error: Some("relation does not exist".into()),
                    ..Default::default()
                },
            ],
        };

        assert_eq!(summary.total_rows(), 5);
        assert_eq!(summary.total_excluded(), 1);
        assert_eq!(summary.total_duplicates(), 8);
        assert_eq!(summary.total_failed_rows(), 1);
        assert_eq!(summary.failed_tables(), vec!["p_b_csv_1"]);
    }
}
