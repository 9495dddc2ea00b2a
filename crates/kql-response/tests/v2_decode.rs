use kql_response::{decode_value, DecodeOptions, DecodedResponse, EndpointVersion, Value};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};

fn decode(frames: JsonValue) -> DecodedResponse {
    decode_value(frames, &DecodeOptions::default())
        .expect("decode")
        .into_query()
        .expect("query response")
}

fn header() -> JsonValue {
    json!({"FrameType": "DataSetHeader", "IsProgressive": false, "Version": "v2.0"})
}

fn primary(id: i64, name: &str, rows: JsonValue) -> JsonValue {
    json!({
        "FrameType": "DataTable",
        "TableId": id,
        "TableKind": "PrimaryResult",
        "TableName": name,
        "Columns": [
            {"ColumnName": "Name", "ColumnType": "string"},
            {"ColumnName": "Count", "ColumnType": "long"},
        ],
        "Rows": rows,
    })
}

fn extended_properties(rows: JsonValue) -> JsonValue {
    json!({
        "FrameType": "DataTable",
        "TableId": 0,
        "TableKind": "QueryProperties",
        "TableName": "@ExtendedProperties",
        "Columns": [
            {"ColumnName": "TableId", "ColumnType": "int"},
            {"ColumnName": "Key", "ColumnType": "string"},
            {"ColumnName": "Value", "ColumnType": "dynamic"},
        ],
        "Rows": rows,
    })
}

fn completion_information() -> JsonValue {
    json!({
        "FrameType": "DataTable",
        "TableId": 3,
        "TableKind": "QueryCompletionInformation",
        "TableName": "QueryCompletionInformation",
        "Columns": [
            {"ColumnName": "Timestamp", "ColumnType": "datetime"},
            {"ColumnName": "EventTypeName", "ColumnType": "string"},
            {"ColumnName": "Payload", "ColumnType": "string"},
        ],
        "Rows": [
            ["2023-05-01T10:00:00Z", "QueryInfo", "{\"Count\":1,\"Text\":\"Query completed successfully\"}"],
            ["2023-05-01T10:00:00Z", "QueryResourceConsumption", "{\"ExecutionTime\":0.0156}"],
        ],
    })
}

fn completion(has_errors: bool, errors: JsonValue) -> JsonValue {
    json!({
        "FrameType": "DataSetCompletion",
        "HasErrors": has_errors,
        "Cancelled": false,
        "OneApiErrors": errors,
    })
}

#[test]
fn primary_tables_follow_frame_order() {
    let response = decode(json!([
        header(),
        extended_properties(json!([[1, "Visualization", "{\"Visualization\":\"columnchart\"}"]])),
        primary(1, "PrimaryResult", json!([["a", 1], ["b", 2]])),
        primary(2, "PrimaryResult", json!([["c", 3]])),
        completion_information(),
        completion(false, JsonValue::Null),
    ]));

    assert_eq!(response.version(), EndpointVersion::V2);
    let ids: Vec<i64> = response.primary_tables().iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(response
        .primary_tables()
        .iter()
        .all(|t| t.kind() == Some("PrimaryResult")));
    assert!(!response.is_partial());
    assert_eq!(response.data_set_completion().len(), 1);
    assert_eq!(response.exceptions(), None);
}

#[test]
fn visualization_only_for_tables_with_properties() {
    let response = decode(json!([
        header(),
        extended_properties(json!([
            [1, "Visualization", "{\"Visualization\":\"columnchart\",\"Title\":null}"],
            [0, "Cursor", "638196"],
        ])),
        primary(1, "PrimaryResult", json!([["a", 1]])),
        primary(2, "PrimaryResult", json!([["b", 2]])),
        completion(false, JsonValue::Null),
    ]));

    let by_id = response.visualization_by_table_id();
    let expected = json!({"Visualization": "columnchart", "Title": null});
    assert_eq!(by_id.get(&1), Some(&Some(&expected)));
    assert_eq!(by_id.get(&0), Some(&None));
    assert_eq!(by_id.get(&2), None);

    assert_eq!(
        response
            .extended_properties(0)
            .and_then(|p| p.cursor()),
        Some("638196")
    );
    let table = response.table_by_id(1).expect("table 1");
    assert_eq!(table.visualization(), Some(&expected));
    assert!(response.table_by_id(2).expect("table 2").visualization().is_none());
}

#[test]
fn completion_information_is_decoded() {
    let response = decode(json!([
        header(),
        primary(1, "PrimaryResult", json!([])),
        completion_information(),
        completion(false, JsonValue::Null),
    ]));
    assert_eq!(
        response.completion_info(),
        Some(&json!({"Count": 1, "Text": "Query completed successfully"}))
    );
    assert_eq!(
        response.resource_consumption(),
        Some(&json!({"ExecutionTime": 0.0156}))
    );
    assert_eq!(response.primary_tables()[0].row_count().expect("rows"), 0);
}

#[test]
fn completion_errors_mark_results_partial() {
    let error = json!({"error": {"code": "LimitsExceeded", "message": "Request is invalid and cannot be executed."}});
    let response = decode(json!([
        header(),
        primary(1, "PrimaryResult", json!([["a", 1]])),
        completion(true, json!([error.clone()])),
    ]));

    assert!(response.is_partial());
    assert!(response.primary_tables()[0].is_partial());
    assert_eq!(response.exceptions(), Some(&json!([error])));
}

#[test]
fn in_band_error_rows_are_not_rows() {
    let response = decode(json!([
        header(),
        primary(
            1,
            "PrimaryResult",
            json!([
                ["a", 1],
                {"OneApiErrors": [{"error": {"code": "LimitsExceeded"}}]},
            ]),
        ),
        completion(false, JsonValue::Null),
    ]));

    let table = &response.primary_tables()[0];
    assert_eq!(table.row_count().expect("rows"), 1);
    assert_eq!(table.inline_errors().len(), 1);
    assert!(table.is_partial());
    assert!(response.is_partial());

    let names: Vec<Value> = table
        .fetch_all()
        .map(|row| row.and_then(|r| r.get_by_name("Name")).expect("name"))
        .collect();
    assert_eq!(names, vec![Value::String("a".to_string())]);
}

#[test]
fn non_primary_tables_are_skipped() {
    let response = decode(json!([
        header(),
        {
            "FrameType": "DataTable",
            "TableId": 5,
            "TableKind": "QueryTraceLog",
            "TableName": "QueryTraceLog",
            "Columns": [],
            "Rows": [],
        },
        primary(1, "PrimaryResult", json!([["a", 1]])),
        completion(false, JsonValue::Null),
    ]));
    assert_eq!(response.table_count(), 1);
    assert!(response.table_by_id(5).is_none());
}
