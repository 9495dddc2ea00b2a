//! Top-level response decoding.
//!
//! A document is classified once by its shape (or by [`DecodeOptions::endpoint_version`]) and
//! handed to the matching decoder:
//!
//! - `{"Tables": [...]}`: v1, see [`v1`].
//! - `[{"FrameType": ..}, ...]`: v2, see [`v2`].
//! - `{"tables": [...]}`: schema listing, kept as raw JSON.

use std::collections::BTreeMap;
use std::io::{self, BufReader, Read};

use serde_json::Value as JsonValue;

use crate::error::{DecodeError, ResponseError, ServerQueryError};
use crate::options::{DecodeOptions, EndpointVersion};
use crate::stream::ChunkedReader;
use crate::table::ColumnarTable;

mod v1;
mod v2;

const VISUALIZATION_KEY: &str = "Visualization";
const CURSOR_KEY: &str = "Cursor";

/// Side-channel properties the server attached to one table id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtendedProperties {
    visualization: Option<JsonValue>,
    cursor: Option<String>,
    other: BTreeMap<String, JsonValue>,
}

impl ExtendedProperties {
    /// Rendering hints produced by the query's `render` operator.
    pub fn visualization(&self) -> Option<&JsonValue> {
        self.visualization.as_ref()
    }

    /// Database cursor as of query execution.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Any property other than `Visualization` and `Cursor`.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.other.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.visualization.is_none() && self.cursor.is_none() && self.other.is_empty()
    }

    pub(crate) fn insert(&mut self, key: &str, value: &JsonValue) {
        match key {
            VISUALIZATION_KEY => {
                self.visualization = Some(crate::convert::to_dynamic(value).into_owned())
            }
            CURSOR_KEY => self.cursor = Some(cell_to_string(value)),
            _ => {
                self.other.insert(key.to_string(), value.clone());
            }
        }
    }
}

/// A decoded query response. Immutable once built.
#[derive(Debug)]
pub struct DecodedResponse {
    version: EndpointVersion,
    primary_tables: Vec<ColumnarTable>,
    extended_properties: BTreeMap<i64, ExtendedProperties>,
    completion_info: Option<JsonValue>,
    resource_consumption: Option<JsonValue>,
    data_set_completion: Vec<JsonValue>,
    exceptions: Option<JsonValue>,
    partial: bool,
}

impl DecodedResponse {
    fn new(version: EndpointVersion) -> Self {
        Self {
            version,
            primary_tables: Vec::new(),
            extended_properties: BTreeMap::new(),
            completion_info: None,
            resource_consumption: None,
            data_set_completion: Vec::new(),
            exceptions: None,
            partial: false,
        }
    }

    /// Attach extended properties to their tables and settle the partial flag.
    fn finish(mut self) -> Self {
        for table in &mut self.primary_tables {
            if let Some(properties) = self.extended_properties.get(&table.id()) {
                table.set_extended_properties(properties.clone());
            }
            if self.partial {
                table.mark_partial();
            }
        }
        self.partial |= self.primary_tables.iter().any(ColumnarTable::is_partial);
        self
    }

    pub fn version(&self) -> EndpointVersion {
        self.version
    }

    pub fn primary_tables(&self) -> &[ColumnarTable] {
        &self.primary_tables
    }

    pub fn into_primary_tables(self) -> Vec<ColumnarTable> {
        self.primary_tables
    }

    pub fn table_count(&self) -> usize {
        self.primary_tables.len()
    }

    /// Primary table with wire id `id`: the frame's `TableId` for v2, the primary ordinal for v1.
    pub fn table_by_id(&self, id: i64) -> Option<&ColumnarTable> {
        self.primary_tables.iter().find(|t| t.id() == id)
    }

    pub fn extended_properties(&self, table_id: i64) -> Option<&ExtendedProperties> {
        self.extended_properties.get(&table_id)
    }

    /// One entry per table id the server sent extended properties for.
    pub fn visualization_by_table_id(&self) -> BTreeMap<i64, Option<&JsonValue>> {
        self.extended_properties
            .iter()
            .map(|(id, properties)| (*id, properties.visualization()))
            .collect()
    }

    /// `QueryInfo` completion payload (v2) or the `Info` status row (v1).
    pub fn completion_info(&self) -> Option<&JsonValue> {
        self.completion_info.as_ref()
    }

    pub fn resource_consumption(&self) -> Option<&JsonValue> {
        self.resource_consumption.as_ref()
    }

    /// Every v2 `DataSetCompletion` frame, in order. Always empty for v1.
    pub fn data_set_completion(&self) -> &[JsonValue] {
        &self.data_set_completion
    }

    /// Top-level v1 `Exceptions`, or the `OneApiErrors` of v2 completion frames.
    pub fn exceptions(&self) -> Option<&JsonValue> {
        self.exceptions.as_ref()
    }

    pub fn has_exceptions(&self) -> bool {
        self.exceptions.is_some()
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }
}

/// Result of a metadata (`.show schema`) request. Not demultiplexed.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaResponse {
    tables: Vec<JsonValue>,
    exceptions: Option<JsonValue>,
}

impl SchemaResponse {
    fn from_object(mut object: serde_json::Map<String, JsonValue>) -> Result<Self, DecodeError> {
        let tables = match object.remove("tables") {
            Some(JsonValue::Array(tables)) => tables,
            _ => {
                return Err(DecodeError::malformed(
                    "schema response",
                    "`tables` is not an array",
                ))
            }
        };
        Ok(Self {
            tables,
            exceptions: object.remove("Exceptions"),
        })
    }

    pub fn tables(&self) -> &[JsonValue] {
        &self.tables
    }

    pub fn exceptions(&self) -> Option<&JsonValue> {
        self.exceptions.as_ref()
    }
}

#[derive(Debug)]
pub enum Response {
    Query(DecodedResponse),
    Schema(SchemaResponse),
}

impl Response {
    pub fn as_query(&self) -> Option<&DecodedResponse> {
        match self {
            Response::Query(response) => Some(response),
            Response::Schema(_) => None,
        }
    }

    pub fn into_query(self) -> Option<DecodedResponse> {
        match self {
            Response::Query(response) => Some(response),
            Response::Schema(_) => None,
        }
    }

    pub fn into_schema(self) -> Option<SchemaResponse> {
        match self {
            Response::Schema(response) => Some(response),
            Response::Query(_) => None,
        }
    }
}

/// Decode an already-parsed document.
pub fn decode_value(
    document: JsonValue,
    options: &DecodeOptions,
) -> Result<Response, ResponseError> {
    match document {
        JsonValue::Object(object)
            if !object.contains_key("Tables") && object.contains_key("tables") =>
        {
            log::debug!("decoding schema response");
            let schema = SchemaResponse::from_object(object)?;
            match schema.exceptions() {
                Some(exceptions) if !options.accept_partial_results => {
                    Err(ServerQueryError::new(exceptions.clone(), None).into())
                }
                _ => Ok(Response::Schema(schema)),
            }
        }
        JsonValue::Object(object) => {
            log::debug!("decoding v1 response");
            let response = v1::decode(object)?.finish();
            check_exceptions(response, options)
        }
        JsonValue::Array(frames) => {
            if options.endpoint_version == Some(EndpointVersion::V1) {
                return Err(DecodeError::UnrecognizedShape(
                    "v1 was requested but the document is a frame array".to_string(),
                )
                .into());
            }
            log::debug!("decoding v2 response ({} frames)", frames.len());
            Ok(Response::Query(v2::decode(frames)?.finish()))
        }
        other => Err(DecodeError::UnrecognizedShape(format!(
            "expected a JSON object or array, found {}",
            json_kind(&other)
        ))
        .into()),
    }
}

pub fn decode_str(text: &str, options: &DecodeOptions) -> Result<Response, ResponseError> {
    decode_value(serde_json::from_str(text)?, options)
}

pub fn decode_slice(bytes: &[u8], options: &DecodeOptions) -> Result<Response, ResponseError> {
    decode_value(serde_json::from_slice(bytes)?, options)
}

pub fn decode_reader<R: Read>(
    reader: R,
    options: &DecodeOptions,
) -> Result<Response, ResponseError> {
    decode_value(serde_json::from_reader(BufReader::new(reader))?, options)
}

/// Decode a body delivered as byte chunks, pulling chunks only as the parser needs them.
pub fn decode_chunks<T, C>(chunks: T, options: &DecodeOptions) -> Result<Response, ResponseError>
where
    T: IntoIterator<Item = io::Result<C>>,
    C: AsRef<[u8]>,
{
    decode_value(serde_json::from_reader(ChunkedReader::new(chunks))?, options)
}

fn check_exceptions(
    response: DecodedResponse,
    options: &DecodeOptions,
) -> Result<Response, ResponseError> {
    if options.accept_partial_results {
        return Ok(Response::Query(response));
    }
    let Some(exceptions) = response.exceptions.clone() else {
        return Ok(Response::Query(response));
    };
    log::debug!(
        "server reported exceptions alongside {} table(s)",
        response.primary_tables.len()
    );
    let partial = (!response.primary_tables.is_empty()).then_some(response);
    Err(ServerQueryError::new(exceptions, partial).into())
}

/// Text form of a cell: strings as-is, anything else as JSON.
pub(crate) fn cell_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Rows of a raw wire table; empty when `Rows` is absent or not an array.
fn raw_rows(table: &JsonValue) -> &[JsonValue] {
    table
        .get("Rows")
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
