use chrono::SecondsFormat;
use kql_response::{
    decode_str, decode_value, DecodeError, DecodeOptions, DecodedResponse, EndpointVersion,
    ResponseError, Value,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value as JsonValue};

fn decode(document: JsonValue) -> DecodedResponse {
    decode_value(document, &DecodeOptions::default())
        .expect("decode")
        .into_query()
        .expect("query response")
}

fn manifest(rows: JsonValue) -> JsonValue {
    json!({
        "TableName": "Table_Manifest",
        "Columns": [
            {"ColumnName": "Ordinal", "DataType": "Int64"},
            {"ColumnName": "Kind", "DataType": "String"},
            {"ColumnName": "Name", "DataType": "String"},
            {"ColumnName": "Id", "DataType": "String"},
            {"ColumnName": "PrettyName", "DataType": "String"},
        ],
        "Rows": rows,
    })
}

fn single_column(name: &str, column: &str, wire_type: &str, rows: JsonValue) -> JsonValue {
    json!({
        "TableName": name,
        "Columns": [{"ColumnName": column, "ColumnType": wire_type}],
        "Rows": rows,
    })
}

#[test]
fn self_validation_query_decodes_string_cell_as_long() {
    let response = decode(json!({"Tables": [
        {"Columns": [{"ColumnName": "c", "ColumnType": "long"}], "Rows": [["10"]]},
        {"Columns": [
            {"ColumnName": "Ordinal", "ColumnType": "long"},
            {"ColumnName": "Kind", "ColumnType": "string"},
            {"ColumnName": "Name", "ColumnType": "string"},
        ], "Rows": [[0, "PrimaryResult", "GenericResult"]]},
    ]}));

    assert_eq!(response.version(), EndpointVersion::V1);
    assert_eq!(response.table_count(), 1);
    let table = &response.primary_tables()[0];
    let rows: Vec<Vec<Value>> = table
        .fetch_all()
        .map(|row| row.and_then(|r| r.to_values()).expect("row"))
        .collect();
    assert_eq!(rows, vec![vec![Value::Int(10)]]);
}

#[test]
fn manifest_selects_primary_tables_in_manifest_order() {
    let response = decode(json!({"Tables": [
        single_column("Table_0", "a", "long", json!([[1]])),
        single_column("Table_1", "b", "string", json!([["x"], ["y"]])),
        single_column("Table_2", "c", "long", json!([[3]])),
        manifest(json!([
            [2, "QueryResult", "PrimaryResult", "id2", ""],
            [1, "QueryProperties", "@ExtendedProperties", "id1", ""],
            [0, "QueryResult", "PrimaryResult", "id0", ""],
        ])),
    ]}));

    let names: Vec<&str> = response.primary_tables().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["Table_2", "Table_0"]);
    let ids: Vec<i64> = response.primary_tables().iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![0, 1]);
}

#[test]
fn unusable_manifest_falls_back_to_first_table() {
    let response = decode(json!({"Tables": [
        single_column("Table_0", "a", "long", json!([[1]])),
        single_column("Table_1", "b", "long", json!([[2]])),
        manifest(json!([[9, "QueryResult", "PrimaryResult", "", ""]])),
    ]}));
    assert_eq!(response.table_count(), 1);
    assert_eq!(response.primary_tables()[0].name(), "Table_0");

    let no_primary = decode(json!({"Tables": [
        single_column("Table_0", "a", "long", json!([[1]])),
        manifest(json!([[0, "QueryStatus", "QueryStatus", "", ""]])),
    ]}));
    assert_eq!(no_primary.primary_tables()[0].name(), "Table_0");

    let single = decode(json!({"Tables": [
        single_column("Only", "a", "long", json!([[1]])),
    ]}));
    assert_eq!(single.primary_tables()[0].name(), "Only");
}

#[test]
fn side_channels_are_read_through_the_manifest() {
    let response = decode(json!({"Tables": [
        single_column("Table_0", "a", "long", json!([[1]])),
        single_column(
            "Table_1",
            "Value",
            "string",
            json!([["{\"Visualization\":\"piechart\",\"Title\":\"share\"}"]]),
        ),
        json!({
            "TableName": "Table_2",
            "Columns": [
                {"ColumnName": "Timestamp", "ColumnType": "datetime"},
                {"ColumnName": "Severity", "ColumnType": "int"},
                {"ColumnName": "SeverityName", "ColumnType": "string"},
                {"ColumnName": "StatusCode", "ColumnType": "int"},
                {"ColumnName": "StatusDescription", "ColumnType": "string"},
                {"ColumnName": "Count", "ColumnType": "int"},
            ],
            "Rows": [
                ["2020-01-01T00:00:00Z", 4, "Info", 0, "Query completed successfully", 1],
                ["2020-01-01T00:00:00Z", 6, "Stats", 0, "{\"ExecutionTime\":0.25}", 0],
            ],
        }),
        manifest(json!([
            [0, "QueryResult", "PrimaryResult", "", ""],
            [1, "QueryProperties", "@ExtendedProperties", "", ""],
            [2, "QueryStatus", "QueryStatus", "", ""],
        ])),
    ]}));

    let expected = json!({"Visualization": "piechart", "Title": "share"});
    assert_eq!(response.visualization_by_table_id().get(&0), Some(&Some(&expected)));
    assert_eq!(
        response.primary_tables()[0].visualization(),
        Some(&expected)
    );
    assert_eq!(
        response.completion_info(),
        Some(&json!({
            "StatusCode": 0,
            "StatusDescription": "Query completed successfully",
            "Count": 1,
        }))
    );
    assert_eq!(
        response.resource_consumption(),
        Some(&json!({"ExecutionTime": 0.25}))
    );
    assert!(response.data_set_completion().is_empty());
}

#[test]
fn wide_row_is_a_decode_error() {
    let err = decode_value(
        json!({"Tables": [{
            "TableName": "t",
            "Columns": [
                {"ColumnName": "a", "ColumnType": "long"},
                {"ColumnName": "b", "ColumnType": "long"},
            ],
            "Rows": [[1, 2, 3]],
        }]}),
        &DecodeOptions::default(),
    )
    .expect_err("width mismatch");
    assert!(
        matches!(
            err,
            ResponseError::Decode(DecodeError::RowWidthMismatch {
                cells: 3,
                columns: 2,
                ..
            })
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn exceptions_become_server_errors_with_partial_tables() {
    let document = json!({
        "Tables": [single_column("Table_0", "a", "long", json!([[1]]))],
        "Exceptions": ["Query execution has exceeded the allowed limits"],
    });

    let err = decode_value(document.clone(), &DecodeOptions::default()).expect_err("exceptions");
    let err = match err {
        ResponseError::ServerQuery(err) => err,
        other => panic!("expected a server error, got {other:?}"),
    };
    assert_eq!(
        err.message(),
        "Query execution has exceeded the allowed limits"
    );
    assert!(!err.is_semantic_error());
    assert!(err.has_partial_results());
    let partial = err.into_partial_results().expect("partial");
    assert_eq!(partial.primary_tables()[0].row_count().expect("rows"), 1);

    let accepted = decode_value(
        document,
        &DecodeOptions {
            accept_partial_results: true,
            ..DecodeOptions::default()
        },
    )
    .expect("decode")
    .into_query()
    .expect("query response");
    assert!(accepted.has_exceptions());
    assert_eq!(accepted.table_count(), 1);
}

#[test]
fn failed_query_keeps_tables_that_still_decode() {
    let err = decode_value(
        json!({
            "Tables": [
                single_column("Table_0", "a", "long", json!([[1]])),
                single_column("Table_1", "b", "long", json!([[1, 2]])),
                manifest(json!([
                    [0, "QueryResult", "PrimaryResult", "id0", ""],
                    [1, "QueryResult", "PrimaryResult", "id1", ""],
                ])),
            ],
            "Exceptions": ["Query execution was cancelled"],
        }),
        &DecodeOptions::default(),
    )
    .expect_err("exceptions");
    let err = match err {
        ResponseError::ServerQuery(err) => err,
        other => panic!("expected a server error, got {other:?}"),
    };
    assert_eq!(err.message(), "Query execution was cancelled");
    let partial = err.into_partial_results().expect("partial");
    assert_eq!(partial.table_count(), 1);
    assert_eq!(partial.primary_tables()[0].name(), "Table_0");
}

#[test]
fn error_only_response_has_no_partial_results() {
    let err = decode_str(
        r#"{"Exceptions": ["Semantic error: 'foo' could not be resolved"]}"#,
        &DecodeOptions::default(),
    )
    .expect_err("exceptions");
    let err = match err {
        ResponseError::ServerQuery(err) => err,
        other => panic!("expected a server error, got {other:?}"),
    };
    assert!(err.is_semantic_error());
    assert!(!err.has_partial_results());
}

#[test]
fn typed_cells_convert_on_access() {
    let response = decode(json!({"Tables": [{
        "TableName": "Table_0",
        "Columns": [
            {"ColumnName": "when", "DataType": "DateTime"},
            {"ColumnName": "took", "DataType": "TimeSpan"},
            {"ColumnName": "bag", "DataType": "Object"},
            {"ColumnName": "price", "DataType": "Decimal"},
            {"ColumnName": "ok", "DataType": "Boolean"},
        ],
        "Rows": [
            ["2021-03-04T05:06:07.5Z", "1.02:03:04.5", "{\"k\":[1,2]}", "12.50", true],
            [null, null, null, null, null],
        ],
    }]}));
    let table = &response.primary_tables()[0];
    assert_eq!(table.column_types(), vec!["DateTime", "TimeSpan", "Object", "Decimal", "Boolean"]);

    let row = table.row(0).expect("row").expect("present");
    let Value::DateTime(when) = row.get_by_name("when").expect("when") else {
        panic!("expected a datetime");
    };
    assert_eq!(
        when.to_rfc3339_opts(SecondsFormat::Millis, true),
        "2021-03-04T05:06:07.500Z"
    );
    let Value::Timespan(took) = row.get_by_name("took").expect("took") else {
        panic!("expected a timespan");
    };
    assert_eq!((took.days(), took.hours(), took.sub_second_ticks()), (1, 2, 5_000_000));
    assert_eq!(row.get_by_name("bag").expect("bag"), Value::Dynamic(json!({"k": [1, 2]})));
    assert_eq!(
        row.get_by_name("price").expect("price"),
        Value::Decimal("12.50".parse().expect("decimal"))
    );
    assert_eq!(row.get_by_name("ok").expect("ok"), Value::Bool(true));

    let nulls = table.row(1).expect("row").expect("present");
    assert!(nulls
        .to_values()
        .expect("values")
        .iter()
        .all(Value::is_null));
}

#[test]
fn schema_document_column_is_decoded_as_json() {
    let response = decode(json!({"Tables": [single_column(
        "Table_0",
        "DatabaseSchema",
        "string",
        json!([["{\"Databases\":{\"db\":{\"Tables\":{}}}}"]]),
    )]}));
    let row = response.primary_tables()[0]
        .row(0)
        .expect("row")
        .expect("present");
    assert_eq!(
        row.get(0).expect("schema"),
        Value::Dynamic(json!({"Databases": {"db": {"Tables": {}}}}))
    );
}
