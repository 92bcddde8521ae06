//! Columnar catalogs and the interface to an external correspondence finder.
//!
//! [`Table`] is a minimal named-column table holding float or boolean
//! columns of equal length. [`probabilistic`] prepares selection masks and
//! derived columns before handing both tables to a [`CorrespondenceFinder`].

pub mod probabilistic;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AstromError, Result};

pub use probabilistic::{CoordConversion, MatchProbabilisticConfig, MatchProbabilisticTask};

/// Name of a table column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnRef(pub String);

impl ColumnRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ColumnRef {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single table column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named columns of equal length, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Table::set_column`].
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        self.set_column(name, column)?;
        Ok(self)
    }

    /// Number of rows (0 for a table without columns).
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Add a column, replacing any existing column of the same name.
    ///
    /// The length must match the existing columns.
    pub fn set_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.len() {
            return Err(AstromError::LengthMismatch {
                expected: self.len(),
                found: column.len(),
            });
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = column,
            None => self.columns.push((name, column)),
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| AstromError::MissingColumn(name.to_string()))
    }

    /// A float column by name.
    pub fn float(&self, name: &str) -> Result<&[f64]> {
        match self.column(name)? {
            Column::Float(v) => Ok(v),
            Column::Bool(_) => Err(AstromError::WrongColumnType {
                column: name.to_string(),
                expected: "float",
            }),
        }
    }

    /// A boolean column by name.
    pub fn bool(&self, name: &str) -> Result<&[bool]> {
        match self.column(name)? {
            Column::Bool(v) => Ok(v),
            Column::Float(_) => Err(AstromError::WrongColumnType {
                column: name.to_string(),
                expected: "bool",
            }),
        }
    }
}

/// Output of a correspondence finder.
#[derive(Debug, Clone, Default)]
pub struct MatchOutput {
    /// Reference table annotated with the finder's match columns.
    pub reference: Table,
    /// Target table annotated with the finder's match columns.
    pub target: Table,
    /// Per-row failures, keyed by reference row index.
    pub exceptions: BTreeMap<usize, String>,
}

/// Pairs rows of a reference table with rows of a target table.
pub trait CorrespondenceFinder {
    /// Match the selected rows of `reference` against the selected rows of
    /// `target`. Both masks have one entry per row of their table.
    fn find(
        &self,
        reference: &Table,
        target: &Table,
        select_ref: &[bool],
        select_target: &[bool],
    ) -> Result<MatchOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_columns() {
        let mut t = Table::new()
            .with_column("flux", Column::Float(vec![1.0, 2.0, 3.0]))
            .unwrap()
            .with_column("good", Column::Bool(vec![true, false, true]))
            .unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.float("flux").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(t.bool("good").unwrap(), &[true, false, true]);
        assert!(t.has_column("flux") && t.has_column("good"));

        t.set_column("flux", Column::Float(vec![0.0; 3])).unwrap();
        assert_eq!(t.float("flux").unwrap(), &[0.0; 3]);
    }

    #[test]
    fn test_table_errors() {
        let mut t = Table::new()
            .with_column("x", Column::Float(vec![1.0, 2.0]))
            .unwrap();
        assert_eq!(
            t.set_column("y", Column::Float(vec![1.0])).unwrap_err(),
            AstromError::LengthMismatch {
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            t.float("z").unwrap_err(),
            AstromError::MissingColumn("z".into())
        );
        assert!(matches!(
            t.bool("x"),
            Err(AstromError::WrongColumnType { .. })
        ));
    }
}
