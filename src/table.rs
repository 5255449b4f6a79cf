use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::TVError;

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// A single cell. Storage keeps the difference between an empty string and a
/// missing value; only the display string collapses both to "".
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{n}"),
            Value::Boolean(true) => f.write_str("True"),
            Value::Boolean(false) => f.write_str("False"),
            Value::Null => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Notification returned by the single in-place write path. Whoever owns the
/// caches built on top of the table has to hand it back to them.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellChanged {
    pub table_id: u64,
    pub row: usize,
    pub column: usize,
}

/// Rectangular, read-only dataset. Every row holds exactly `columns.len()`
/// values. Loading new data means building a new `Table`.
#[derive(Debug)]
pub struct Table {
    id: u64,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Default for Table {
    fn default() -> Self {
        Table::empty()
    }
}

impl Table {
    pub fn empty() -> Self {
        Table {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn load(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TVError> {
        let expected = columns.len();
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(TVError::MalformedData {
                row,
                expected,
                found: r.len(),
            });
        }
        Ok(Table {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            columns,
            rows,
        })
    }

    /// Identity of this instance, unique for the lifetime of the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_name(&self, column: usize) -> Result<&str, TVError> {
        self.columns
            .get(column)
            .map(String::as_str)
            .ok_or(TVError::IndexOutOfRange {
                what: "column",
                index: column,
                len: self.columns.len(),
            })
    }

    pub fn get(&self, row: usize, column: usize) -> Result<&Value, TVError> {
        let record = self.rows.get(row).ok_or(TVError::IndexOutOfRange {
            what: "row",
            index: row,
            len: self.rows.len(),
        })?;
        record.get(column).ok_or(TVError::IndexOutOfRange {
            what: "column",
            index: column,
            len: self.columns.len(),
        })
    }

    pub fn display(&self, row: usize, column: usize) -> Result<String, TVError> {
        self.get(row, column).map(Value::to_string)
    }

    pub(crate) fn row(&self, row: usize) -> Option<&[Value]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// Flips a boolean cell in place. Null cells in an all-boolean column are
    /// treated as `false`. Any other value is rejected.
    pub fn toggle_bool(&mut self, row: usize, column: usize) -> Result<CellChanged, TVError> {
        let column_is_bool = self
            .rows
            .iter()
            .all(|r| matches!(r.get(column), Some(Value::Boolean(_)) | Some(Value::Null)));
        let len = self.columns.len();
        let rows = self.rows.len();
        let cell = self
            .rows
            .get_mut(row)
            .ok_or(TVError::IndexOutOfRange {
                what: "row",
                index: row,
                len: rows,
            })?
            .get_mut(column)
            .ok_or(TVError::IndexOutOfRange {
                what: "column",
                index: column,
                len,
            })?;

        let toggled = match &*cell {
            Value::Boolean(b) => Value::Boolean(!b),
            Value::Null if column_is_bool => Value::Boolean(true),
            _ => return Err(TVError::NotABoolean { row, column }),
        };
        *cell = toggled;
        Ok(CellChanged {
            table_id: self.id,
            row,
            column,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn players() -> Table {
        Table::load(
            vec!["Player".into(), "Team".into(), "Owned".into()],
            vec![
                vec!["Mike Trout".into(), "Angels".into(), false.into()],
                vec!["Bryce Harper".into(), "Phillies".into(), true.into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_load_rejects_ragged_rows() {
        let err = Table::load(
            vec!["a".into(), "b".into()],
            vec![
                vec![Value::Number(1.0), Value::Number(2.0)],
                vec![Value::Number(3.0)],
            ],
        )
        .unwrap_err();
        match err {
            TVError::MalformedData {
                row,
                expected,
                found,
            } => assert_eq!((row, expected, found), (1, 2, 1)),
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn test_duplicate_and_empty_column_names_are_kept() {
        let table = Table::load(
            vec!["".into(), "Team".into(), "Team".into()],
            vec![vec![Value::Null, "A".into(), "B".into()]],
        )
        .unwrap();
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.column_name(0).unwrap(), "");
        assert_eq!(table.column_name(2).unwrap(), "Team");
    }

    #[test]
    fn test_get_out_of_range() {
        let table = players();
        assert!(matches!(
            table.get(2, 0),
            Err(TVError::IndexOutOfRange { what: "row", .. })
        ));
        assert!(matches!(
            table.get(0, 3),
            Err(TVError::IndexOutOfRange { what: "column", .. })
        ));
        assert!(table.column_name(3).is_err());
    }

    #[test]
    fn test_display_collapses_null_and_empty() {
        let table = Table::load(
            vec!["a".into(), "b".into(), "c".into()],
            vec![vec![Value::Null, "".into(), Value::Number(2023.0)]],
        )
        .unwrap();
        assert_eq!(table.get(0, 0).unwrap(), &Value::Null);
        assert_eq!(table.get(0, 1).unwrap(), &Value::String(String::new()));
        assert_eq!(table.display(0, 0).unwrap(), "");
        assert_eq!(table.display(0, 1).unwrap(), "");
        assert_eq!(table.display(0, 2).unwrap(), "2023");
    }

    #[test]
    fn test_number_and_bool_display() {
        assert_eq!(Value::Number(1.5).to_string(), "1.5");
        assert_eq!(Value::Number(-3.0).to_string(), "-3");
        assert_eq!(Value::Boolean(true).to_string(), "True");
        assert_eq!(Value::from(None::<bool>), Value::Null);
    }

    #[test]
    fn test_every_table_has_its_own_id() {
        assert_ne!(players().id(), players().id());
        assert_ne!(Table::empty().id(), Table::empty().id());
    }

    #[test]
    fn test_toggle_bool() {
        let mut table = players();
        let change = table.toggle_bool(0, 2).unwrap();
        assert_eq!(change.row, 0);
        assert_eq!(change.table_id, table.id());
        assert_eq!(table.get(0, 2).unwrap(), &Value::Boolean(true));

        assert!(matches!(
            table.toggle_bool(0, 0),
            Err(TVError::NotABoolean { row: 0, column: 0 })
        ));
        assert!(table.toggle_bool(5, 2).is_err());
    }

    #[test]
    fn test_toggle_null_in_boolean_column() {
        let mut table = Table::load(
            vec!["Owned".into()],
            vec![vec![Value::Null], vec![true.into()]],
        )
        .unwrap();
        let _ = table.toggle_bool(0, 0).unwrap();
        assert_eq!(table.get(0, 0).unwrap(), &Value::Boolean(true));
    }
}
