//! Decoding of Kusto query responses.
//!
//! Both wire formats are supported: v1 (`{"Tables": [...]}` with a trailing manifest table) and
//! v2 (an array of `FrameType`-tagged frames). Decoding yields a [`DecodedResponse`] whose
//! primary tables expose lazily converted, restartable row sequences.
//!
//! Two readers keep memory bounded for large results:
//!
//! - [`ChunkedReader`] lets `serde_json` consume an HTTP body delivered as byte chunks.
//! - [`PagedCsvRowSource`] replays cached rows from numbered CSV shards one window at a time.
//!
//! ```
//! use kql_response::{decode_str, DecodeOptions, Value};
//!
//! let body = r#"{"Tables": [{"TableName": "Table_0",
//!     "Columns": [{"ColumnName": "n", "ColumnType": "long"}],
//!     "Rows": [[1], [2]]}]}"#;
//! let response = decode_str(body, &DecodeOptions::default())
//!     .unwrap()
//!     .into_query()
//!     .unwrap();
//! let table = &response.primary_tables()[0];
//! let values: Vec<Value> = table
//!     .fetch_all()
//!     .map(|row| row.and_then(|r| r.get_by_name("n")))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(values, vec![Value::Int(1), Value::Int(2)]);
//! ```

#![forbid(unsafe_code)]

pub mod convert;
pub mod csv_pages;
mod error;
mod options;
pub mod response;
mod row;
mod schema;
pub mod stream;
mod table;
mod value;

pub use csv_pages::{CsvPageError, PagedCsvRowSource, SharedRow};
pub use error::{DecodeError, ResponseError, ServerQueryError};
pub use options::{CsvPageOptions, DecodeOptions, EndpointVersion, DEFAULT_WINDOW_SIZE_ROWS};
pub use response::{
    decode_chunks, decode_reader, decode_slice, decode_str, decode_value, DecodedResponse,
    ExtendedProperties, Response, SchemaResponse,
};
pub use row::{RowCells, RowView};
pub use schema::{Column, ColumnSpec, TableSchema, WireType};
pub use stream::{from_infallible_chunks, ChunkedReader};
pub use table::{ColumnarTable, CsvShardRows, InlineRows, RowSource, Rows};
pub use value::{Timespan, Value, TICKS_PER_SECOND};
