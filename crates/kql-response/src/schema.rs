use std::collections::HashMap;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::DecodeError;

/// Column holding the database schema document returned by schema-listing commands.
pub(crate) const SCHEMA_METADATA_COLUMN: &str = "DatabaseSchema";

/// Declared wire type of a column.
///
/// Both the query-language names (`long`, `real`, ...) and the v1 `DataType` names (`Int64`,
/// `Double`, ...) are accepted, case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WireType {
    Bool,
    Int32,
    Int64,
    UInt,
    Real,
    Decimal,
    String,
    DateTime,
    Guid,
    Timespan,
    Dynamic,
    /// Anything else; cells pass through unconverted.
    Other(String),
}

impl WireType {
    pub fn from_wire_name(name: &str) -> WireType {
        match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" | "sbyte" => WireType::Bool,
            "int" | "int32" | "int16" | "byte" => WireType::Int32,
            "long" | "int64" => WireType::Int64,
            "uint" | "uint32" | "uint64" | "ulong" | "uint16" => WireType::UInt,
            "real" | "double" | "single" | "float" => WireType::Real,
            "decimal" | "sqldecimal" => WireType::Decimal,
            "string" => WireType::String,
            "datetime" | "date" => WireType::DateTime,
            "guid" | "uniqueid" => WireType::Guid,
            "timespan" | "time" => WireType::Timespan,
            "dynamic" | "object" => WireType::Dynamic,
            _ => WireType::Other(name.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            WireType::Bool => "bool",
            WireType::Int32 => "int",
            WireType::Int64 => "long",
            WireType::UInt => "uint",
            WireType::Real => "real",
            WireType::Decimal => "decimal",
            WireType::String => "string",
            WireType::DateTime => "datetime",
            WireType::Guid => "guid",
            WireType::Timespan => "timespan",
            WireType::Dynamic => "dynamic",
            WireType::Other(name) => name,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    wire_type: WireType,
    /// Type name exactly as declared on the wire.
    declared_type: String,
    ordinal: usize,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire_type(&self) -> &WireType {
        &self.wire_type
    }

    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Column declaration used to build a [`TableSchema`] outside of JSON decoding (e.g. when
/// replaying cached rows).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub wire_type: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, wire_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wire_type: wire_type.into(),
        }
    }
}

/// Ordered column list of one table plus a shared name → index map.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    columns: Vec<Column>,
    name_index: HashMap<String, usize>,
    /// Type each column's cells are converted with; differs from the declared type only for
    /// the schema-metadata column.
    conversions: Vec<WireType>,
}

impl TableSchema {
    pub fn new(table: &str, specs: Vec<ColumnSpec>) -> Result<Self, DecodeError> {
        let mut columns = Vec::with_capacity(specs.len());
        let mut name_index = HashMap::with_capacity(specs.len());
        for (ordinal, spec) in specs.into_iter().enumerate() {
            if name_index.insert(spec.name.clone(), ordinal).is_some() {
                return Err(DecodeError::DuplicateColumn {
                    table: table.to_string(),
                    column: spec.name,
                });
            }
            columns.push(Column {
                wire_type: WireType::from_wire_name(&spec.wire_type),
                declared_type: spec.wire_type,
                name: spec.name,
                ordinal,
            });
        }
        let conversions = columns.iter().map(|c| c.wire_type.clone()).collect();
        Ok(Self {
            columns,
            name_index,
            conversions,
        })
    }

    /// Parse a wire `Columns` array (`[{"ColumnName": .., "ColumnType"|"DataType": ..}]`).
    pub fn from_json(table: &str, columns: &JsonValue) -> Result<Self, DecodeError> {
        let context = || format!("columns of table `{table}`");
        let items = columns
            .as_array()
            .ok_or_else(|| DecodeError::malformed(context(), "`Columns` is not an array"))?;

        let mut specs = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let name = item
                .get("ColumnName")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| {
                    DecodeError::malformed(context(), format!("column {idx} has no `ColumnName`"))
                })?;
            let wire_type = item
                .get("ColumnType")
                .or_else(|| item.get("DataType"))
                .and_then(JsonValue::as_str)
                .ok_or_else(|| {
                    DecodeError::malformed(
                        context(),
                        format!("column `{name}` has neither `ColumnType` nor `DataType`"),
                    )
                })?;
            specs.push(ColumnSpec::new(name, wire_type));
        }
        Self::new(table, specs)
    }

    /// The server labels the schema document column `string` even though it carries JSON.
    /// For single-cell results of that column, decode it as `dynamic`.
    pub(crate) fn apply_schema_metadata_override(&mut self, row_count: usize) {
        if row_count == 1 && self.has_schema_metadata_column() {
            self.conversions[0] = WireType::Dynamic;
        }
    }

    /// Whether this is the lone `string` schema-metadata column the override applies to.
    pub(crate) fn has_schema_metadata_column(&self) -> bool {
        matches!(
            self.columns.as_slice(),
            [column]
                if column.name == SCHEMA_METADATA_COLUMN && column.wire_type == WireType::String
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub(crate) fn name_index(&self) -> &HashMap<String, usize> {
        &self.name_index
    }

    pub(crate) fn conversion(&self, index: usize) -> Option<&WireType> {
        self.conversions.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_type_aliases_are_case_insensitive() {
        assert_eq!(WireType::from_wire_name("Int64"), WireType::Int64);
        assert_eq!(WireType::from_wire_name("long"), WireType::Int64);
        assert_eq!(WireType::from_wire_name("TimeSpan"), WireType::Timespan);
        assert_eq!(WireType::from_wire_name("Object"), WireType::Dynamic);
        assert_eq!(
            WireType::from_wire_name("geography"),
            WireType::Other("geography".to_string())
        );
    }

    #[test]
    fn columns_accept_either_type_key() {
        let schema = TableSchema::from_json(
            "t",
            &json!([
                {"ColumnName": "a", "ColumnType": "long"},
                {"ColumnName": "b", "DataType": "String"},
            ]),
        )
        .expect("schema");
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.columns()[1].declared_type(), "String");
        assert_eq!(schema.columns()[1].wire_type(), &WireType::String);
        assert_eq!(schema.index_of("b"), Some(1));
        let ordinals: Vec<usize> = schema.columns().iter().map(Column::ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let err = TableSchema::new(
            "t",
            vec![ColumnSpec::new("a", "long"), ColumnSpec::new("a", "string")],
        )
        .expect_err("duplicate");
        assert!(matches!(err, DecodeError::DuplicateColumn { .. }));
    }

    #[test]
    fn schema_metadata_override_needs_single_cell() {
        let mut schema =
            TableSchema::new("t", vec![ColumnSpec::new(SCHEMA_METADATA_COLUMN, "string")])
                .expect("schema");
        schema.apply_schema_metadata_override(2);
        assert_eq!(schema.conversion(0), Some(&WireType::String));
        schema.apply_schema_metadata_override(1);
        assert_eq!(schema.conversion(0), Some(&WireType::Dynamic));
        assert_eq!(schema.columns()[0].wire_type(), &WireType::String);
    }
}
