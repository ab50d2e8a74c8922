//! Table schema descriptions and the recursive schema-file parser.
//!
//! Schema files are JSON arrays of field objects
//! (`{"name", "type", "mode", "description", "fields"}`). RECORD fields
//! recurse into the same structure. Missing `mode` defaults to NULLABLE
//! and missing `type` to STRING, matching the warehouse defaults.
//! Malformed input is a fatal configuration error and surfaces before any
//! warehouse operation is attempted.

use serde::Serialize;
use serde_json::Value;
use snafu::prelude::*;
use std::path::Path;

use crate::error::{
    EmptyRecordSnafu, MissingNameSnafu, NotAnArraySnafu, NotAnObjectSnafu, ParseSnafu,
    ReadFileSnafu, SchemaError, UnexpectedNestedFieldsSnafu, UnknownModeSnafu, UnknownTypeSnafu,
};

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    Boolean,
    Timestamp,
    Date,
    Datetime,
    Record,
}

impl FieldType {
    fn parse(name: &str, value: &str) -> Result<Self, SchemaError> {
        match value.to_ascii_uppercase().as_str() {
            "STRING" => Ok(Self::String),
            "BYTES" => Ok(Self::Bytes),
            "INTEGER" | "INT64" => Ok(Self::Integer),
            "FLOAT" | "FLOAT64" => Ok(Self::Float),
            "NUMERIC" => Ok(Self::Numeric),
            "BOOLEAN" | "BOOL" => Ok(Self::Boolean),
            "TIMESTAMP" => Ok(Self::Timestamp),
            "DATE" => Ok(Self::Date),
            "DATETIME" => Ok(Self::Datetime),
            "RECORD" | "STRUCT" => Ok(Self::Record),
            _ => UnknownTypeSnafu { name, value }.fail(),
        }
    }
}

/// Column mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

impl FieldMode {
    fn parse(name: &str, value: &str) -> Result<Self, SchemaError> {
        match value.to_ascii_uppercase().as_str() {
            "NULLABLE" => Ok(Self::Nullable),
            "REQUIRED" => Ok(Self::Required),
            "REPEATED" => Ok(Self::Repeated),
            _ => UnknownModeSnafu { name, value }.fail(),
        }
    }
}

/// A single column in a table schema.
///
/// Invariant: `fields` is non-empty iff `field_type` is RECORD.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub mode: FieldMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaField>,
}

/// Read and parse a schema description file.
pub fn read_schema_from_file(path: &Path) -> Result<Vec<SchemaField>, SchemaError> {
    let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    let json: Value = serde_json::from_str(&content).context(ParseSnafu)?;
    parse_fields(&json)
}

/// Parse an ordered sequence of schema fields, recursing into RECORDs.
pub fn parse_fields(json: &Value) -> Result<Vec<SchemaField>, SchemaError> {
    let entries = json.as_array().context(NotAnArraySnafu)?;
    let mut result = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let object = entry.as_object().context(NotAnObjectSnafu { index })?;

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .context(MissingNameSnafu { index })?
            .to_string();

        let field_type = match object.get("type").and_then(Value::as_str) {
            Some(value) => FieldType::parse(&name, value)?,
            None => FieldType::String,
        };
        let mode = match object.get("mode").and_then(Value::as_str) {
            Some(value) => FieldMode::parse(&name, value)?,
            None => FieldMode::Nullable,
        };
        let description = object
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let nested = object.get("fields");
        let fields = match (field_type, nested) {
            (FieldType::Record, Some(nested)) => {
                let children = parse_fields(nested)?;
                ensure!(!children.is_empty(), EmptyRecordSnafu { name });
                children
            }
            (FieldType::Record, None) => return EmptyRecordSnafu { name }.fail(),
            (_, Some(nested)) if !nested.as_array().map(|f| f.is_empty()).unwrap_or(true) => {
                return UnexpectedNestedFieldsSnafu { name }.fail();
            }
            _ => Vec::new(),
        };

        result.push(SchemaField {
            name,
            field_type,
            mode,
            description,
            fields,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat_schema() {
        let json = json!([
            {"name": "hash", "type": "STRING", "mode": "REQUIRED", "description": "Block hash"},
            {"name": "number", "type": "INTEGER"},
            {"name": "timestamp", "type": "TIMESTAMP", "mode": "REQUIRED"},
        ]);

        let fields = parse_fields(&json).unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, "hash");
        assert_eq!(fields[0].field_type, FieldType::String);
        assert_eq!(fields[0].mode, FieldMode::Required);
        assert_eq!(fields[0].description.as_deref(), Some("Block hash"));
        assert_eq!(fields[1].mode, FieldMode::Nullable);
        assert!(fields[1].fields.is_empty());
    }

    #[test]
    fn test_parse_defaults_type_to_string() {
        let json = json!([{"name": "address"}]);
        let fields = parse_fields(&json).unwrap();
        assert_eq!(fields[0].field_type, FieldType::String);
        assert_eq!(fields[0].mode, FieldMode::Nullable);
    }

    #[test]
    fn test_parse_nested_records() {
        let json = json!([
            {"name": "block_number", "type": "INTEGER"},
            {"name": "inputs", "type": "RECORD", "mode": "REPEATED", "fields": [
                {"name": "index", "type": "INTEGER", "mode": "REQUIRED"},
                {"name": "addresses", "type": "STRING", "mode": "REPEATED"},
                {"name": "outpoint", "type": "RECORD", "fields": [
                    {"name": "txid", "type": "STRING"},
                    {"name": "vout", "type": "INTEGER"},
                ]},
            ]},
        ]);

        let fields = parse_fields(&json).unwrap();
        assert_eq!(fields.len(), 2);

        let inputs = &fields[1];
        assert_eq!(inputs.field_type, FieldType::Record);
        assert_eq!(inputs.mode, FieldMode::Repeated);
        assert_eq!(inputs.fields.len(), 3);

        let outpoint = &inputs.fields[2];
        assert_eq!(outpoint.field_type, FieldType::Record);
        assert_eq!(outpoint.fields.len(), 2);
        assert_eq!(outpoint.fields[0].name, "txid");
        assert_eq!(outpoint.fields[1].name, "vout");
    }

    #[test]
    fn test_parse_preserves_field_order() {
        let json = json!([
            {"name": "c"}, {"name": "a"}, {"name": "b"},
        ]);
        let fields = parse_fields(&json).unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let json = json!({"name": "hash"});
        assert!(matches!(
            parse_fields(&json).unwrap_err(),
            SchemaError::NotAnArray
        ));
    }

    #[test]
    fn test_parse_rejects_non_object_entry() {
        let json = json!(["hash"]);
        assert!(matches!(
            parse_fields(&json).unwrap_err(),
            SchemaError::NotAnObject { index: 0 }
        ));
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        let json = json!([{"type": "STRING"}]);
        assert!(matches!(
            parse_fields(&json).unwrap_err(),
            SchemaError::MissingName { index: 0 }
        ));
    }

    #[test]
    fn test_parse_rejects_record_without_fields() {
        let json = json!([{"name": "empty", "type": "RECORD"}]);
        assert!(matches!(
            parse_fields(&json).unwrap_err(),
            SchemaError::EmptyRecord { .. }
        ));

        let json = json!([{"name": "empty", "type": "RECORD", "fields": []}]);
        assert!(matches!(
            parse_fields(&json).unwrap_err(),
            SchemaError::EmptyRecord { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_nested_fields_on_scalar() {
        let json = json!([{"name": "x", "type": "STRING", "fields": [{"name": "y"}]}]);
        assert!(matches!(
            parse_fields(&json).unwrap_err(),
            SchemaError::UnexpectedNestedFields { .. }
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let json = json!([{"name": "x", "type": "GEOMETRY"}]);
        let err = parse_fields(&json).unwrap_err();
        assert!(err.to_string().contains("GEOMETRY"));
    }

    #[test]
    fn test_read_schema_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.json");
        std::fs::write(
            &path,
            r#"[{"name": "hash", "type": "STRING", "mode": "REQUIRED"}]"#,
        )
        .unwrap();

        let fields = read_schema_from_file(&path).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "hash");
    }

    #[test]
    fn test_read_schema_invalid_json_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            read_schema_from_file(&path).unwrap_err(),
            SchemaError::Parse { .. }
        ));
    }
}
