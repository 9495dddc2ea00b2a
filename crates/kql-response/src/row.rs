use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::{Bound, RangeBounds};

use serde_json::Value as JsonValue;

use crate::convert::convert_cell;
use crate::csv_pages::SharedRow;
use crate::error::DecodeError;
use crate::schema::{Column, TableSchema};
use crate::value::Value;

/// Raw cells of one row, either borrowed from an in-memory table or shared with a CSV window.
#[derive(Clone, Debug)]
pub enum RowCells<'a> {
    Borrowed(&'a [JsonValue]),
    Shared(SharedRow),
}

impl RowCells<'_> {
    pub fn as_slice(&self) -> &[JsonValue] {
        match self {
            RowCells::Borrowed(cells) => cells,
            RowCells::Shared(cells) => cells,
        }
    }
}

/// Read-only view of one row, addressable by position or column name.
///
/// Building a view is O(1): it holds the raw cells and a reference to the table's name → index
/// map. Cells are converted to typed [`Value`]s only when accessed, so expensive conversions
/// (e.g. `dynamic`) are never paid for columns nobody reads.
#[derive(Clone, Debug)]
pub struct RowView<'a> {
    cells: RowCells<'a>,
    schema: &'a TableSchema,
    /// Absolute column range of `schema` exposed by this view.
    start: usize,
    end: usize,
    /// Name → index relative to `start`.
    names: Cow<'a, HashMap<String, usize>>,
}

impl<'a> RowView<'a> {
    pub(crate) fn new(schema: &'a TableSchema, cells: RowCells<'a>) -> Self {
        Self {
            cells,
            schema,
            start: 0,
            end: schema.len(),
            names: Cow::Borrowed(schema.name_index()),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn columns(&self) -> &'a [Column] {
        &self.schema.columns()[self.start..self.end]
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.columns().iter().map(Column::name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// The unconverted wire cell at `index`.
    pub fn raw(&self, index: usize) -> Option<&JsonValue> {
        self.raw_cells().get(index)
    }

    pub fn raw_cells(&self) -> &[JsonValue] {
        &self.cells.as_slice()[self.start..self.end]
    }

    /// Typed value of the cell at `index`, converted for its column's type.
    pub fn get(&self, index: usize) -> Result<Value, DecodeError> {
        let len = self.len();
        let raw = self
            .raw(index)
            .ok_or(DecodeError::ColumnOutOfRange { index, len })?;
        let wire_type = self
            .schema
            .conversion(self.start + index)
            .ok_or(DecodeError::ColumnOutOfRange { index, len })?;
        convert_cell(wire_type, raw)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Value, DecodeError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| DecodeError::UnknownColumn(name.to_string()))?;
        self.get(index)
    }

    /// A view over the same cells restricted to `range` (clamped to this view's width).
    ///
    /// The returned view has its own name → index map, relative to the new first column.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> RowView<'a> {
        let len = self.len();
        let from = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let to = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .min(len)
        .max(from);

        let start = self.start + from;
        let end = self.start + to;
        let names = self.schema.columns()[start..end]
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.name().to_string(), idx))
            .collect();

        RowView {
            cells: self.cells.clone(),
            schema: self.schema,
            start,
            end,
            names: Cow::Owned(names),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Value, DecodeError>> + '_ {
        (0..self.len()).map(move |idx| self.get(idx))
    }

    pub fn to_values(&self) -> Result<Vec<Value>, DecodeError> {
        self.iter().collect()
    }
}
