use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DbError;

/// One row keyed by column name.
pub type Row = serde_json::Map<String, Value>;

/// Tabular result of a read.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Snapshot of the row at `index`, keyed by column name.
    pub fn row(&self, index: usize) -> Option<Row> {
        self.rows.get(index).map(|values| {
            self.columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect()
        })
    }

    pub fn to_csv(&self) -> Result<String, DbError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());

        wtr.write_record(&self.columns)
            .map_err(|e| DbError::Export(e.to_string()))?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(cell_text))
                .map_err(|e| DbError::Export(e.to_string()))?;
        }

        let bytes = wtr
            .into_inner()
            .map_err(|e| DbError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| DbError::Export(e.to_string()))
    }
}

/// Plain text of a cell; null is empty.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Positional reference to a row: `<table>:<index>`.
///
/// The index is the row's position in an unordered `SELECT *` at listing time,
/// so it points at a different row once the table changes underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIdentity {
    pub table: String,
    pub index: usize,
}

impl RowIdentity {
    pub fn new(table: impl Into<String>, index: usize) -> Self {
        Self {
            table: table.into(),
            index,
        }
    }
}

impl fmt::Display for RowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.index)
    }
}

impl FromStr for RowIdentity {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (table, index) = s
            .rsplit_once(':')
            .ok_or_else(|| DbError::InvalidRowIdentity(s.to_string()))?;
        if table.is_empty() {
            return Err(DbError::InvalidRowIdentity(s.to_string()));
        }
        let index = index
            .parse()
            .map_err(|_| DbError::InvalidRowIdentity(s.to_string()))?;

        Ok(Self::new(table, index))
    }
}
