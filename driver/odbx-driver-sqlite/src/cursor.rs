///
/// Materialized result sets.
///
/// A query runs to completion on execute; the rows are kept here and the
/// cursor moves over them. `position` is -1 before the first row and
/// `rows.len()` after the last.
///

use odbx_driver::{FetchOrientation, Nullability};
use rusqlite::types::Value;

use crate::describe::TypeInfo;

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub info: TypeInfo,
    pub nullable: Nullability,
    /// Origin table, empty for expressions.
    pub table: String,
    /// False for expression columns, whose type is inferred from the data.
    pub declared: bool,
}

/// Progress of consecutive `get_data` calls on one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetDataState {
    pub column: u16,
    pub offset: usize,
    pub done: bool,
}

#[derive(Debug)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Value>>,
    pub position: i64,
    pub get_data: Option<GetDataState>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: -1,
            get_data: None,
        }
    }

    /// Move the cursor; `None` when it ends up outside the result set.
    pub fn move_to(&mut self, orientation: FetchOrientation) -> Option<usize> {
        let len = self.rows.len() as i64;
        let target = match orientation {
            FetchOrientation::Next => self.position + 1,
            FetchOrientation::Prior => self.position - 1,
            FetchOrientation::First => 0,
            FetchOrientation::Last => len - 1,
            FetchOrientation::Absolute(n) if n > 0 => n - 1,
            FetchOrientation::Absolute(n) if n < 0 => len + n,
            FetchOrientation::Absolute(_) => -1,
            FetchOrientation::Relative(n) => self.position + n,
            FetchOrientation::Bookmark(n) => n - 1,
        };
        self.get_data = None;
        if target < 0 {
            self.position = -1;
            None
        } else if target >= len {
            self.position = len;
            None
        } else {
            self.position = target;
            Some(target as usize)
        }
    }

    pub fn current_row(&self) -> Option<usize> {
        (self.position >= 0 && self.position < self.rows.len() as i64).then_some(self.position as usize)
    }
}
