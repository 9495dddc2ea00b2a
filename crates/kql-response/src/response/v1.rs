//! v1: `{"Tables": [...]}` whose last table is a table of contents.
//!
//! Each manifest row is `[index, kind, role, ...]`, where `index` points into `Tables`. Primary
//! results carry role `PrimaryResult` or `GenericResult`; `@ExtendedProperties` and
//! `QueryStatus` tables hold the side-channel metadata.

use serde_json::{json, Map, Value as JsonValue};

use super::{cell_to_string, raw_rows, DecodedResponse, ExtendedProperties};
use super::{CURSOR_KEY, VISUALIZATION_KEY};
use crate::convert::to_dynamic;
use crate::error::DecodeError;
use crate::options::EndpointVersion;
use crate::table::ColumnarTable;

const PRIMARY_ROLES: [&str; 2] = ["GenericResult", "PrimaryResult"];

struct ManifestEntry<'a> {
    index: usize,
    kind: &'a str,
    role: &'a str,
}

/// `None` when the manifest has no `Rows` array or any row does not point at a table.
fn parse_manifest(manifest: &JsonValue, table_count: usize) -> Option<Vec<ManifestEntry<'_>>> {
    let rows = manifest.get("Rows")?.as_array()?;
    rows.iter()
        .map(|row| {
            let cells = row.as_array()?;
            let index = usize::try_from(cells.first()?.as_u64()?).ok()?;
            if index >= table_count {
                return None;
            }
            let text = |i: usize| cells.get(i).and_then(JsonValue::as_str).unwrap_or("");
            Some(ManifestEntry {
                index,
                kind: text(1),
                role: text(2),
            })
        })
        .collect()
}

pub(super) fn decode(mut document: Map<String, JsonValue>) -> Result<DecodedResponse, DecodeError> {
    let mut response = DecodedResponse::new(EndpointVersion::V1);
    response.exceptions = document.remove("Exceptions");

    let mut tables = match document.remove("Tables") {
        Some(JsonValue::Array(tables)) => tables,
        Some(_) => {
            return Err(DecodeError::malformed(
                "v1 response",
                "`Tables` is not an array",
            ))
        }
        // An error-only response carries `Exceptions` and nothing else.
        None if response.exceptions.is_some() => Vec::new(),
        None => {
            return Err(DecodeError::UnrecognizedShape(
                "object has neither `Tables` nor `tables`".to_string(),
            ))
        }
    };

    let entries = match tables.len() {
        0 | 1 => None,
        n => parse_manifest(&tables[n - 1], n),
    };

    let mut primary: Vec<usize> = Vec::new();
    if let Some(entries) = &entries {
        for entry in entries.iter().filter(|e| PRIMARY_ROLES.contains(&e.role)) {
            if !primary.contains(&entry.index) {
                primary.push(entry.index);
            }
        }
        if let Some(entry) = entries
            .iter()
            .find(|e| e.role == "@ExtendedProperties" && e.kind == "QueryProperties")
        {
            if let Some(properties) = read_extended_properties(&tables[entry.index]) {
                response.extended_properties.insert(0, properties);
            }
        }
        if let Some(entry) = entries.iter().find(|e| e.role == "QueryStatus") {
            read_query_status(&tables[entry.index], &mut response);
        }
    }

    if primary.is_empty() && !tables.is_empty() {
        if tables.len() > 1 {
            if entries.is_some() {
                log::warn!("v1 manifest lists no primary result; using the first table");
            } else {
                log::warn!("v1 manifest is unusable; using the first table");
            }
        }
        primary.push(0);
    }
    log::debug!(
        "v1 primary tables at {:?} of {} table(s)",
        primary,
        tables.len()
    );

    let mut ordinal = 0;
    for index in primary {
        let table = std::mem::take(&mut tables[index]);
        match ColumnarTable::from_wire(ordinal, table) {
            Ok(table) => {
                response.primary_tables.push(table);
                ordinal += 1;
            }
            // The server already reported a failure; keep whatever tables still decode.
            Err(err) if response.exceptions.is_some() => {
                log::warn!("skipping undecodable table {index} of a failed query: {err}");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(response)
}

/// Each row's first cell is a JSON object keyed by the property it carries.
fn read_extended_properties(table: &JsonValue) -> Option<ExtendedProperties> {
    let mut properties = ExtendedProperties::default();
    for row in raw_rows(table) {
        let Some(cell) = row.get(0) else {
            continue;
        };
        let value = to_dynamic(cell).into_owned();
        let JsonValue::Object(object) = &value else {
            continue;
        };
        if object.contains_key(VISUALIZATION_KEY) {
            properties.visualization = Some(value);
        } else if let Some(cursor) = object.get(CURSOR_KEY) {
            properties.cursor = Some(cell_to_string(cursor));
        } else {
            for (key, item) in object {
                properties.other.insert(key.clone(), item.clone());
            }
        }
    }
    (!properties.is_empty()).then_some(properties)
}

/// Status rows are `[timestamp, severity, severity name, code, description, count, ...]`.
fn read_query_status(table: &JsonValue, response: &mut DecodedResponse) {
    for row in raw_rows(table) {
        let Some(cells) = row.as_array() else {
            continue;
        };
        let cell = |i: usize| cells.get(i).cloned().unwrap_or(JsonValue::Null);
        match cells.get(2).and_then(JsonValue::as_str) {
            Some("Info") if response.completion_info.is_none() => {
                response.completion_info = Some(json!({
                    "StatusCode": cell(3),
                    "StatusDescription": cell(4),
                    "Count": cell(5),
                }));
            }
            Some("Stats") if response.resource_consumption.is_none() => {
                response.resource_consumption = Some(to_dynamic(&cell(4)).into_owned());
            }
            _ => {}
        }
    }
}
