use serde_json::Value as JsonValue;

use crate::csv_pages::CsvPageError;
use crate::response::DecodedResponse;

/// A response (or one of its cells) could not be decoded.
///
/// These are fatal for the decode operation that produced them and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized response shape: {0}")]
    UnrecognizedShape(String),
    #[error("malformed {context}: {reason}")]
    Malformed {
        context: String,
        reason: String,
    },
    #[error("row {row} of table `{table}` has {cells} cells, expected {columns}")]
    RowWidthMismatch {
        table: String,
        row: usize,
        cells: usize,
        columns: usize,
    },
    #[error("table `{table}` declares column `{column}` more than once")]
    DuplicateColumn { table: String, column: String },
    #[error("timespan value `{0}` cannot be decoded")]
    InvalidTimespan(String),
    #[error("cannot decode {value} as `{wire_type}`")]
    InvalidCell { wire_type: String, value: String },
    #[error("column index {index} out of range for a row with {len} columns")]
    ColumnOutOfRange { index: usize, len: usize },
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Shard(#[from] CsvPageError),
}

impl DecodeError {
    pub(crate) fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_cell(wire_type: &str, value: &JsonValue) -> Self {
        DecodeError::InvalidCell {
            wire_type: wire_type.to_string(),
            value: value.to_string(),
        }
    }
}

/// The server reported that the query failed.
///
/// Whatever tables were still decodable are attached so callers can inspect partial results.
#[derive(Debug, thiserror::Error)]
#[error("query failed on the server: {message}")]
pub struct ServerQueryError {
    message: String,
    exceptions: JsonValue,
    partial: Option<Box<DecodedResponse>>,
}

impl ServerQueryError {
    pub(crate) fn new(exceptions: JsonValue, partial: Option<DecodedResponse>) -> Self {
        let message = match &exceptions {
            JsonValue::String(s) => s.clone(),
            JsonValue::Array(items) if items.len() == 1 => match &items[0] {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            },
            other => other.to_string(),
        };
        Self {
            message,
            exceptions,
            partial: partial.map(Box::new),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The raw `Exceptions` payload as sent by the server.
    pub fn exceptions(&self) -> &JsonValue {
        &self.exceptions
    }

    /// Whether the server rejected the query text itself rather than failing during execution.
    pub fn is_semantic_error(&self) -> bool {
        self.message.trim_start().starts_with("Semantic error:")
    }

    pub fn has_partial_results(&self) -> bool {
        self.partial.is_some()
    }

    pub fn partial_results(&self) -> Option<&DecodedResponse> {
        self.partial.as_deref()
    }

    pub fn into_partial_results(self) -> Option<DecodedResponse> {
        self.partial.map(|p| *p)
    }
}

/// Error returned by the top-level decode entry points.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    ServerQuery(#[from] ServerQueryError),
}

impl From<serde_json::Error> for ResponseError {
    fn from(err: serde_json::Error) -> Self {
        ResponseError::Decode(DecodeError::Json(err))
    }
}
