use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use serde_json::Value as JsonValue;

use crate::csv_pages::PagedCsvRowSource;
use crate::error::DecodeError;
use crate::options::CsvPageOptions;
use crate::response::ExtendedProperties;
use crate::row::{RowCells, RowView};
use crate::schema::{Column, ColumnSpec, TableSchema};

/// Backing store for a table's raw rows.
///
/// Rows are owned by the source; tables only hand out views over them.
pub trait RowSource: fmt::Debug + Send + Sync {
    /// Raw cells of row `index`, or `None` past the last row.
    fn row(&self, index: usize) -> Result<Option<RowCells<'_>>, DecodeError>;

    /// Total number of rows. May be expensive for sources that have to probe.
    fn len(&self) -> Result<usize, DecodeError>;

    /// Row count if it is known without probing.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Rows decoded inline from the JSON response.
#[derive(Debug, Default)]
pub struct InlineRows {
    rows: Vec<Vec<JsonValue>>,
}

impl InlineRows {
    pub fn new(rows: Vec<Vec<JsonValue>>) -> Self {
        Self { rows }
    }
}

impl RowSource for InlineRows {
    fn row(&self, index: usize) -> Result<Option<RowCells<'_>>, DecodeError> {
        Ok(self
            .rows
            .get(index)
            .map(|cells| RowCells::Borrowed(cells.as_slice())))
    }

    fn len(&self) -> Result<usize, DecodeError> {
        Ok(self.rows.len())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.rows.len())
    }
}

/// Rows replayed from CSV shards on disk through a sliding window.
#[derive(Debug)]
pub struct CsvShardRows {
    pages: Mutex<PagedCsvRowSource>,
    len: OnceLock<usize>,
}

impl CsvShardRows {
    pub fn new(pages: PagedCsvRowSource) -> Self {
        Self {
            pages: Mutex::new(pages),
            len: OnceLock::new(),
        }
    }

    fn pages(&self) -> std::sync::MutexGuard<'_, PagedCsvRowSource> {
        match self.pages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RowSource for CsvShardRows {
    fn row(&self, index: usize) -> Result<Option<RowCells<'_>>, DecodeError> {
        Ok(self.pages().get(index)?.map(RowCells::Shared))
    }

    fn len(&self) -> Result<usize, DecodeError> {
        if let Some(len) = self.len.get() {
            return Ok(*len);
        }
        let len = self.pages().len()?;
        Ok(*self.len.get_or_init(|| len))
    }

    fn len_hint(&self) -> Option<usize> {
        self.len.get().copied()
    }
}

/// One decoded table: column metadata plus a lazily converted, restartable row sequence.
#[derive(Debug)]
pub struct ColumnarTable {
    id: i64,
    name: String,
    kind: Option<String>,
    schema: TableSchema,
    rows: Box<dyn RowSource>,
    /// In-band error records the server placed among the rows.
    inline_errors: Vec<JsonValue>,
    partial: bool,
    extended_properties: Option<ExtendedProperties>,
}

impl ColumnarTable {
    /// Build a table over an arbitrary row source.
    ///
    /// A lone `DatabaseSchema` column probes the source for its first two rows to decide whether
    /// the result is a single schema document.
    pub fn with_rows(
        id: i64,
        name: impl Into<String>,
        columns: Vec<ColumnSpec>,
        rows: Box<dyn RowSource>,
    ) -> Result<Self, DecodeError> {
        let name = name.into();
        let mut schema = TableSchema::new(&name, columns)?;
        if schema.has_schema_metadata_column()
            && rows.row(0)?.is_some()
            && rows.row(1)?.is_none()
        {
            schema.apply_schema_metadata_override(1);
        }
        Ok(Self::assemble(id, name, None, schema, rows, Vec::new()))
    }

    /// Build an in-memory table, validating every row's width up front.
    pub fn from_rows(
        id: i64,
        name: impl Into<String>,
        columns: Vec<ColumnSpec>,
        rows: Vec<Vec<JsonValue>>,
    ) -> Result<Self, DecodeError> {
        let name = name.into();
        let mut schema = TableSchema::new(&name, columns)?;
        check_row_widths(&name, &schema, &rows)?;
        schema.apply_schema_metadata_override(rows.len());
        Ok(Self::assemble(
            id,
            name,
            None,
            schema,
            Box::new(InlineRows::new(rows)),
            Vec::new(),
        ))
    }

    /// Build a table whose rows are replayed from `folder/1.csv`, `folder/2.csv`, ...
    pub fn from_csv_shards(
        id: i64,
        name: impl Into<String>,
        columns: Vec<ColumnSpec>,
        folder: impl Into<PathBuf>,
        options: CsvPageOptions,
    ) -> Result<Self, DecodeError> {
        let pages = PagedCsvRowSource::new(folder, options);
        Self::with_rows(id, name, columns, Box::new(CsvShardRows::new(pages)))
    }

    /// Decode a wire table object (`TableName`, `Columns`, `Rows`, and for v2 `TableKind`).
    ///
    /// The `Rows` array is moved into the table, not copied. Entries of `Rows` that are objects
    /// rather than arrays are server error records: they are kept aside and mark the table
    /// partial.
    pub(crate) fn from_wire(id: i64, mut table: JsonValue) -> Result<Self, DecodeError> {
        let name = table
            .get("TableName")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Table_{id}"));
        let Some(object) = table.as_object_mut() else {
            return Err(DecodeError::malformed(
                format!("table `{name}`"),
                "table is not a JSON object",
            ));
        };

        let kind = object
            .get("TableKind")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        let mut schema = match object.get("Columns") {
            Some(columns) => TableSchema::from_json(&name, columns)?,
            None => {
                return Err(DecodeError::malformed(
                    format!("table `{name}`"),
                    "missing `Columns`",
                ))
            }
        };

        let raw_rows = match object.remove("Rows") {
            Some(JsonValue::Array(rows)) => rows,
            Some(JsonValue::Null) | None => Vec::new(),
            Some(_) => {
                return Err(DecodeError::malformed(
                    format!("table `{name}`"),
                    "`Rows` is not an array",
                ))
            }
        };

        let mut rows = Vec::with_capacity(raw_rows.len());
        let mut inline_errors = Vec::new();
        for entry in raw_rows {
            match entry {
                JsonValue::Array(cells) => rows.push(cells),
                other => inline_errors.push(other),
            }
        }
        if !inline_errors.is_empty() {
            log::warn!(
                "table `{name}` carries {} in-band error record(s); results are partial",
                inline_errors.len()
            );
        }

        check_row_widths(&name, &schema, &rows)?;
        schema.apply_schema_metadata_override(rows.len());
        Ok(Self::assemble(
            id,
            name,
            kind,
            schema,
            Box::new(InlineRows::new(rows)),
            inline_errors,
        ))
    }

    fn assemble(
        id: i64,
        name: String,
        kind: Option<String>,
        schema: TableSchema,
        rows: Box<dyn RowSource>,
        inline_errors: Vec<JsonValue>,
    ) -> Self {
        let partial = !inline_errors.is_empty();
        Self {
            id,
            name,
            kind,
            schema,
            rows,
            inline_errors,
            partial,
            extended_properties: None,
        }
    }

    pub(crate) fn mark_partial(&mut self) {
        self.partial = true;
    }

    pub(crate) fn set_extended_properties(&mut self, properties: ExtendedProperties) {
        self.extended_properties = Some(properties);
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `TableKind` of a v2 frame (e.g. `PrimaryResult`).
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn columns(&self) -> &[Column] {
        self.schema.columns()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.columns().iter().map(Column::name).collect()
    }

    /// Declared wire type names, as sent by the server.
    pub fn column_types(&self) -> Vec<&str> {
        self.schema
            .columns()
            .iter()
            .map(Column::declared_type)
            .collect()
    }

    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    /// Number of rows. For CSV-backed tables the first call walks every shard.
    pub fn row_count(&self) -> Result<usize, DecodeError> {
        self.rows.len()
    }

    /// Whether the server had more rows than were materialized (errors, truncation or
    /// cancellation).
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub fn inline_errors(&self) -> &[JsonValue] {
        &self.inline_errors
    }

    pub fn extended_properties(&self) -> Option<&ExtendedProperties> {
        self.extended_properties.as_ref()
    }

    pub fn visualization(&self) -> Option<&JsonValue> {
        self.extended_properties
            .as_ref()
            .and_then(|p| p.visualization())
    }

    /// Row `index`, or `None` past the end.
    pub fn row(&self, index: usize) -> Result<Option<RowView<'_>>, DecodeError> {
        let Some(cells) = self.rows.row(index)? else {
            return Ok(None);
        };
        let width = cells.as_slice().len();
        if width != self.schema.len() {
            return Err(DecodeError::RowWidthMismatch {
                table: self.name.clone(),
                row: index,
                cells: width,
                columns: self.schema.len(),
            });
        }
        Ok(Some(RowView::new(&self.schema, cells)))
    }

    /// A fresh iterator over every row. Each call starts from the first row.
    pub fn iter_all(&self) -> Rows<'_> {
        Rows {
            table: self,
            next: 0,
            limit: None,
            done: false,
        }
    }

    pub fn fetch_all(&self) -> Rows<'_> {
        self.iter_all()
    }

    /// A fresh iterator over at most `n` rows.
    pub fn fetch_many(&self, n: usize) -> Rows<'_> {
        Rows {
            table: self,
            next: 0,
            limit: Some(n),
            done: false,
        }
    }
}

fn check_row_widths(
    table: &str,
    schema: &TableSchema,
    rows: &[Vec<JsonValue>],
) -> Result<(), DecodeError> {
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != schema.len() {
            return Err(DecodeError::RowWidthMismatch {
                table: table.to_string(),
                row: idx,
                cells: row.len(),
                columns: schema.len(),
            });
        }
    }
    Ok(())
}

/// Cursor over a table's rows. Stops at the first error.
#[derive(Debug)]
pub struct Rows<'a> {
    table: &'a ColumnarTable,
    next: usize,
    limit: Option<usize>,
    done: bool,
}

impl<'a> Iterator for Rows<'a> {
    type Item = Result<RowView<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.limit.is_some_and(|limit| self.next >= limit) {
            return None;
        }
        match self.table.row(self.next) {
            Ok(Some(row)) => {
                self.next += 1;
                Some(Ok(row))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining_limit = self.limit.map(|l| l.saturating_sub(self.next));
        match self.table.rows.len_hint() {
            Some(len) => {
                let remaining = len.saturating_sub(self.next);
                let bound = remaining_limit.map_or(remaining, |l| l.min(remaining));
                (bound, Some(bound))
            }
            None => (0, remaining_limit),
        }
    }
}
