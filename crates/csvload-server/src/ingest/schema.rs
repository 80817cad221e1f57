//! Target table schema
//!
//! The schema fixes the column order used for three things: the arity check on every
//! record, the column list of the insert statement, and the placeholder list. Integer
//! columns are validated before a row is queued and bound as `BIGINT` values.

use serde::{Deserialize, Serialize};

use super::error::{IngestError, IngestResult};

/// Default target table
pub const DEFAULT_TABLE: &str = "domain";

/// Columns of the Majestic Million rank file, in file order
pub const DOMAIN_COLUMNS: [(&str, ColumnKind); 12] = [
    ("GlobalRank", ColumnKind::Integer),
    ("TldRank", ColumnKind::Integer),
    ("Domain", ColumnKind::Text),
    ("TLD", ColumnKind::Text),
    ("RefSubNets", ColumnKind::Integer),
    ("RefIPs", ColumnKind::Integer),
    ("IDN_Domain", ColumnKind::Text),
    ("IDN_TLD", ColumnKind::Text),
    ("PrevGlobalRank", ColumnKind::Integer),
    ("PrevTldRank", ColumnKind::Integer),
    ("PrevRefSubNets", ColumnKind::Integer),
    ("PrevRefIPs", ColumnKind::Integer),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Integer,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    table: String,
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema, rejecting identifiers that would need quoting.
    pub fn new(table: impl Into<String>, columns: Vec<Column>) -> IngestResult<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(IngestError::Schema(format!("invalid table name '{}'", table)));
        }
        if columns.is_empty() {
            return Err(IngestError::Schema("schema has no columns".to_string()));
        }
        if let Some(bad) = columns.iter().find(|c| !is_identifier(&c.name)) {
            return Err(IngestError::Schema(format!("invalid column name '{}'", bad.name)));
        }
        Ok(Self { table, columns })
    }

    /// A schema where every column is text
    pub fn text(table: impl Into<String>, names: &[&str]) -> IngestResult<Self> {
        Self::new(
            table,
            names
                .iter()
                .map(|n| Column::new(*n, ColumnKind::Text))
                .collect(),
        )
    }

    /// The 12-column domain rank schema, targeting `table`
    pub fn domain(table: impl Into<String>) -> IngestResult<Self> {
        Self::new(
            table,
            DOMAIN_COLUMNS
                .iter()
                .map(|(name, kind)| Column::new(*name, *kind))
                .collect(),
        )
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// `$1, $2, ...`, one per column
    pub fn placeholders(&self) -> Vec<String> {
        (1..=self.columns.len()).map(|i| format!("${}", i)).collect()
    }

    /// `INSERT INTO <table> (<cols>) VALUES (<placeholders>)`
    pub fn insert_statement(&self) -> String {
        let columns: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            self.placeholders().join(", ")
        )
    }

    /// Check arity and integer columns for the record starting at `line`.
    pub fn validate(&self, line: u64, fields: &[String]) -> IngestResult<()> {
        if fields.len() != self.columns.len() {
            return Err(IngestError::Arity {
                line,
                expected: self.columns.len(),
                found: fields.len(),
            });
        }

        for (column, value) in self.columns.iter().zip(fields) {
            if column.kind == ColumnKind::Integer && value.parse::<i64>().is_err() {
                return Err(IngestError::InvalidValue {
                    line,
                    column: column.name.clone(),
                    value: value.clone(),
                });
            }
        }

        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
