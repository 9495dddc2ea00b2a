//! v2: a flat array of `FrameType`-tagged frames.

use serde_json::Value as JsonValue;

use super::{raw_rows, DecodedResponse};
use crate::convert::to_dynamic;
use crate::error::DecodeError;
use crate::options::EndpointVersion;
use crate::schema::{TableSchema, WireType};
use crate::table::ColumnarTable;

pub(super) fn decode(frames: Vec<JsonValue>) -> Result<DecodedResponse, DecodeError> {
    let mut response = DecodedResponse::new(EndpointVersion::V2);
    let mut errors = Vec::new();

    for (position, frame) in frames.into_iter().enumerate() {
        let Some(frame_type) = frame
            .get("FrameType")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
        else {
            return Err(DecodeError::malformed(
                format!("frame {position}"),
                "missing `FrameType`",
            ));
        };
        match frame_type.as_str() {
            "DataTable" => decode_data_table(position, frame, &mut response)?,
            "DataSetCompletion" => {
                let flag = |key: &str| frame.get(key).and_then(JsonValue::as_bool) == Some(true);
                if flag("HasErrors") || flag("Cancelled") {
                    response.partial = true;
                }
                if let Some(JsonValue::Array(items)) = frame.get("OneApiErrors") {
                    errors.extend(items.iter().cloned());
                }
                response.data_set_completion.push(frame);
            }
            other => log::debug!("skipping v2 frame {position} of type `{other}`"),
        }
    }

    if !errors.is_empty() {
        log::warn!(
            "v2 response completed with {} error(s); results are partial",
            errors.len()
        );
        response.exceptions = Some(JsonValue::Array(errors));
    }
    Ok(response)
}

fn decode_data_table(
    position: usize,
    frame: JsonValue,
    response: &mut DecodedResponse,
) -> Result<(), DecodeError> {
    let text = |key: &str| {
        frame
            .get(key)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let (kind, name) = (text("TableKind"), text("TableName"));
    match (kind.as_str(), name.as_str()) {
        ("PrimaryResult", _) => {
            let Some(id) = frame.get("TableId").and_then(JsonValue::as_i64) else {
                return Err(DecodeError::malformed(
                    format!("frame {position}"),
                    "primary result has no integer `TableId`",
                ));
            };
            response
                .primary_tables
                .push(ColumnarTable::from_wire(id, frame)?);
        }
        ("QueryProperties", "@ExtendedProperties") => read_extended_properties(&frame, response)?,
        (_, "QueryCompletionInformation") => read_completion_information(&frame, response)?,
        (kind, name) => log::debug!("skipping v2 table `{name}` of kind `{kind}`"),
    }
    Ok(())
}

/// Rows are `(TableId, Key, Value)`; the columns are located by name.
fn read_extended_properties(
    frame: &JsonValue,
    response: &mut DecodedResponse,
) -> Result<(), DecodeError> {
    let schema = columns_of(frame, "@ExtendedProperties")?;
    let typed_index = |name: &str, wire_type: WireType| {
        schema
            .index_of(name)
            .filter(|&idx| schema.columns()[idx].wire_type() == &wire_type)
    };
    let (Some(key_idx), Some(table_id_idx), Some(value_idx)) = (
        typed_index("Key", WireType::String),
        typed_index("TableId", WireType::Int32),
        schema.index_of("Value"),
    ) else {
        log::warn!("ignoring @ExtendedProperties table without string `Key`, int `TableId` and `Value` columns");
        return Ok(());
    };

    for row in raw_rows(frame) {
        let Some(cells) = row.as_array() else {
            continue;
        };
        let (Some(table_id), Some(key), Some(value)) = (
            cells.get(table_id_idx).and_then(JsonValue::as_i64),
            cells.get(key_idx).and_then(JsonValue::as_str),
            cells.get(value_idx),
        ) else {
            continue;
        };
        response
            .extended_properties
            .entry(table_id)
            .or_default()
            .insert(key, value);
    }
    Ok(())
}

/// Rows are `(..., EventTypeName, Payload)`; the first `QueryInfo` and
/// `QueryResourceConsumption` events win.
fn read_completion_information(
    frame: &JsonValue,
    response: &mut DecodedResponse,
) -> Result<(), DecodeError> {
    let schema = columns_of(frame, "QueryCompletionInformation")?;
    let (Some(event_idx), Some(payload_idx)) =
        (schema.index_of("EventTypeName"), schema.index_of("Payload"))
    else {
        return Ok(());
    };

    for row in raw_rows(frame) {
        let Some(cells) = row.as_array() else {
            continue;
        };
        let Some(payload) = cells.get(payload_idx) else {
            continue;
        };
        let slot = match cells.get(event_idx).and_then(JsonValue::as_str) {
            Some("QueryInfo") => &mut response.completion_info,
            Some("QueryResourceConsumption") => &mut response.resource_consumption,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(to_dynamic(payload).into_owned());
        }
    }
    Ok(())
}

fn columns_of(frame: &JsonValue, table: &str) -> Result<TableSchema, DecodeError> {
    match frame.get("Columns") {
        Some(columns) => TableSchema::from_json(table, columns),
        None => Err(DecodeError::malformed(
            format!("table `{table}`"),
            "missing `Columns`",
        )),
    }
}
