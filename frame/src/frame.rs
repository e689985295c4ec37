//! `QFrame`: an immutable, columnar table (spec §3). Every query operation
//! (`where`/`select`/`order_by`/...) produces a new `QFrame` rather than
//! mutating in place; `update` is the sole exception (§4.3.5) and still
//! goes through `QFrame::with_column` rather than touching `Vec`s directly.

use std::cell::Cell;

use indexmap::IndexMap;

use qcache_common::error::{QError, QResult};

use crate::column::Column;
use crate::standin::StandInColumn;

/// A columnar table. Column order is insertion order (`IndexMap`), matching
/// the "columns keep first-seen order" rule from CSV/JSON ingestion (§3).
#[derive(Debug, Clone)]
pub struct QFrame {
    columns: IndexMap<String, Column>,
    row_count: usize,
    /// Recomputed lazily and cached; invalidated whenever columns change.
    byte_size: Cell<Option<usize>>,
}

impl QFrame {
    /// Builds a frame from columns, validating that every column has the
    /// same row count (§3 invariant).
    pub fn new(columns: IndexMap<String, Column>) -> QResult<Self> {
        let row_count = columns.values().next().map(|c| c.len()).unwrap_or(0);
        for (name, col) in &columns {
            if col.len() != row_count {
                return Err(QError::MalformedQuery(format!(
                    "column '{name}' has {} rows, expected {row_count}",
                    col.len()
                )));
            }
        }
        Ok(QFrame {
            columns,
            row_count,
            byte_size: Cell::new(None),
        })
    }

    pub fn empty() -> Self {
        QFrame {
            columns: IndexMap::new(),
            row_count: 0,
            byte_size: Cell::new(Some(0)),
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> QResult<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| QError::MalformedQuery(format!("unknown column '{name}'")))
    }

    pub fn columns(&self) -> &IndexMap<String, Column> {
        &self.columns
    }

    /// Bytes resident across all columns (§4.3.6), memoized until the next
    /// structural change.
    pub fn byte_size(&self) -> usize {
        if let Some(cached) = self.byte_size.get() {
            return cached;
        }
        let total = self.columns.values().map(|c| c.byte_size()).sum();
        self.byte_size.set(Some(total));
        total
    }

    /// Returns a new frame keeping only `indices`, in the given order
    /// (shared by filter, distinct, order_by, offset/limit).
    pub fn take_rows(&self, indices: &[usize]) -> QFrame {
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| (name.clone(), col.take(indices)))
            .collect();
        QFrame {
            columns,
            row_count: indices.len(),
            byte_size: Cell::new(None),
        }
    }

    /// Returns a frame with only the named columns, preserving the order of
    /// `names` (used by `select`'s bare-projection case).
    pub fn select_columns(&self, names: &[String]) -> QResult<QFrame> {
        let mut columns = IndexMap::new();
        for name in names {
            columns.insert(name.clone(), self.column(name)?.clone());
        }
        QFrame::new(columns)
    }

    /// Returns a frame with `name` replaced (or appended, if new) by `col`.
    /// Used both by `update` and by select-alias assignment.
    pub fn with_column(&self, name: &str, col: Column) -> QResult<QFrame> {
        if col.len() != self.row_count {
            return Err(QError::MalformedQuery(format!(
                "column '{name}' produced {} rows, frame has {}",
                col.len(),
                self.row_count
            )));
        }
        let mut columns = self.columns.clone();
        columns.insert(name.to_string(), col);
        Ok(QFrame {
            columns,
            row_count: self.row_count,
            byte_size: Cell::new(None),
        })
    }

    /// Applies stand-in columns not already present, left-to-right,
    /// chaining each application's output into the next's input (§3).
    /// Called both at insert time and against the cached frame before every
    /// query (§4.3.1).
    pub fn apply_stand_ins(&self, stand_ins: &[StandInColumn]) -> QResult<QFrame> {
        let mut frame = self.clone();
        for stand_in in stand_ins {
            if frame.has_column(&stand_in.target) {
                continue;
            }
            frame = stand_in.apply(&frame)?;
        }
        Ok(frame)
    }
}
