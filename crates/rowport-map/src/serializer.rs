//! Wire map serializer
//!
//! Converts mapping trees to and from the compact JSON map format, validating
//! every key and every shape against the resource schema. The wire format is
//! hand-authored by third parties, so it must never change shape:
//!
//! - column source: `{"Column": "<name>", "Lookup": "<table>", "Default": <literal>}`
//! - static value: a bare JSON scalar
//! - object: nested JSON object; array: JSON array of item forms
//! - unmapped fields and array items are omitted entirely

use serde_json::{Map, Number, Value};

use crate::error::{MapError, Result};
use crate::mapping::{AuthoredNode, ColumnSource, MappingNode, MappingSource};
use crate::schema::{self, ScalarType, SchemaKind, SchemaNode};

/// The extra top-level key tolerated on deserialize
pub const ID_KEY: &str = "Id";

const COLUMN_KEY: &str = "Column";
const LOOKUP_KEY: &str = "Lookup";
const DEFAULT_KEY: &str = "Default";

/// Serializer bound to one resource schema
#[derive(Debug, Clone)]
pub struct MapSerializer {
    resource_path: String,
    schema: Vec<SchemaNode>,
}

impl MapSerializer {
    pub fn new(resource_path: impl Into<String>, schema: Vec<SchemaNode>) -> Self {
        Self {
            resource_path: resource_path.into(),
            schema,
        }
    }

    /// Serializer for delete-by-natural-key maps: only top-level required fields
    pub fn for_natural_key(resource_path: impl Into<String>, schema: &[SchemaNode]) -> Self {
        Self::new(resource_path, schema::required_only(schema))
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn schema(&self) -> &[SchemaNode] {
        &self.schema
    }

    /// Serialize a mapping tree into a wire map object
    pub fn serialize(&self, nodes: &[MappingNode]) -> Result<Value> {
        Ok(Value::Object(self.serialize_object(&self.schema, nodes)?))
    }

    /// Serialize a mapping tree into indented wire map text
    pub fn serialize_to_string(&self, nodes: &[MappingNode]) -> Result<String> {
        Ok(pretty(&self.serialize(nodes)?))
    }

    /// Validate flat authored nodes and serialize them
    pub fn serialize_authored(&self, nodes: &[AuthoredNode]) -> Result<Value> {
        let resolved = self.resolve_authored(nodes)?;
        self.serialize(&resolved)
    }

    /// Turn flat authored nodes into a mapping tree shaped by the schema
    ///
    /// Shape mismatches are left in place for [`MapSerializer::serialize`] to
    /// report; only conflicting value sources are rejected here.
    pub fn resolve_authored(&self, nodes: &[AuthoredNode]) -> Result<Vec<MappingNode>> {
        nodes
            .iter()
            .map(|node| {
                let schema = schema::find(&self.schema, &node.name)
                    .ok_or_else(|| self.unknown_key_on_serialize(&node.name))?;
                resolve_node(schema, node)
            })
            .collect()
    }

    /// Parse wire map text into a mapping tree
    pub fn deserialize(&self, text: &str) -> Result<Vec<MappingNode>> {
        let value: Value = serde_json::from_str(text).map_err(|source| MapError::InvalidJson {
            text: text.to_string(),
            source: Some(source),
        })?;

        if !value.is_object() {
            return Err(MapError::InvalidJson {
                text: text.to_string(),
                source: None,
            });
        }

        self.deserialize_value(&value)
    }

    /// Read a parsed wire map into a mapping tree in schema order
    pub fn deserialize_value(&self, value: &Value) -> Result<Vec<MappingNode>> {
        self.deserialize_object(&self.schema, value)
    }

    fn serialize_object(
        &self,
        schema: &[SchemaNode],
        nodes: &[MappingNode],
    ) -> Result<Map<String, Value>> {
        if let Some(stray) = nodes.iter().find(|n| schema::find(schema, &n.name).is_none()) {
            return Err(self.unknown_key_on_serialize(&stray.name));
        }

        let mut result = Map::new();
        for field in schema {
            let Some(node) = nodes.iter().find(|n| n.name == field.name) else {
                continue;
            };
            if node.is_mapped() {
                result.insert(field.name.clone(), self.serialize_node(field, node)?);
            }
        }

        Ok(result)
    }

    fn serialize_node(&self, field: &SchemaNode, node: &MappingNode) -> Result<Value> {
        match (&field.kind, &node.source) {
            (SchemaKind::Array(item), MappingSource::Array(items)) => {
                let mut values = Vec::new();
                for item_node in items.iter().filter(|n| n.is_mapped()) {
                    values.push(self.serialize_node(item, item_node)?);
                }
                Ok(Value::Array(values))
            },
            (SchemaKind::Array(_), MappingSource::Object(_)) => Err(MapError::violation(format!(
                "Cannot serialize mappings to JSON, because an array literal was expected for key '{}', but instead it is being mapped to an object literal.",
                node.name
            ))),
            (SchemaKind::Array(_), _) => Err(MapError::violation(format!(
                "Cannot serialize mappings to JSON, because an array literal was expected for key '{}', but instead it is being mapped to a single value.",
                node.name
            ))),
            (SchemaKind::Object(fields), MappingSource::Object(children)) => {
                Ok(Value::Object(self.serialize_object(fields, children)?))
            },
            (SchemaKind::Object(_), MappingSource::Array(_)) => Err(MapError::violation(format!(
                "Cannot serialize mappings to JSON, because an object literal was expected for key '{}', but instead it is being mapped to an array literal.",
                node.name
            ))),
            (SchemaKind::Object(_), _) => Err(MapError::violation(format!(
                "Cannot serialize mappings to JSON, because an object literal was expected for key '{}', but instead it is being mapped to a single value.",
                node.name
            ))),
            (SchemaKind::Scalar, MappingSource::Static(value)) => {
                Ok(encode_literal(&field.data_type, value))
            },
            (SchemaKind::Scalar, MappingSource::Column(source)) => {
                Ok(serialize_column_source(&field.data_type, source))
            },
            (SchemaKind::Scalar, _) => Err(MapError::violation(format!(
                "Cannot serialize mappings to JSON, because a single value was expected for key '{}', but instead it is being mapped to a complex value.",
                node.name
            ))),
        }
    }

    fn deserialize_object(&self, schema: &[SchemaNode], value: &Value) -> Result<Vec<MappingNode>> {
        let Value::Object(object) = value else {
            return Err(MapError::violation(format!(
                "Cannot deserialize mappings from JSON, because an object literal was expected. Instead, found: {}",
                pretty(value)
            )));
        };

        if let Some(stray) = object
            .keys()
            .find(|key| key.as_str() != ID_KEY && schema::find(schema, key).is_none())
        {
            return Err(MapError::violation(format!(
                "Cannot deserialize mappings from JSON, because the key '{}' should not exist according to the metadata for resource '{}'.",
                stray, self.resource_path
            )));
        }

        schema
            .iter()
            .map(|field| match object.get(&field.name) {
                None => Ok(field.initial_mapping()),
                Some(value) => self.deserialize_node(field, value),
            })
            .collect()
    }

    fn deserialize_node(&self, field: &SchemaNode, value: &Value) -> Result<MappingNode> {
        let source = match &field.kind {
            SchemaKind::Array(item) => {
                let Value::Array(items) = value else {
                    return Err(MapError::violation(format!(
                        "Cannot deserialize mappings from JSON, because an array literal was expected. Instead, found: {}",
                        pretty(value)
                    )));
                };
                MappingSource::Array(
                    items
                        .iter()
                        .map(|item_value| self.deserialize_node(item, item_value))
                        .collect::<Result<_>>()?,
                )
            },
            SchemaKind::Object(fields) => MappingSource::Object(self.deserialize_object(fields, value)?),
            SchemaKind::Scalar => deserialize_mapped_value(field, value)?,
        };

        Ok(MappingNode {
            name: field.name.clone(),
            source,
        })
    }

    fn unknown_key_on_serialize(&self, name: &str) -> MapError {
        MapError::violation(format!(
            "Cannot serialize mappings to JSON, because the key '{}' should not exist according to the metadata for resource '{}'.",
            name, self.resource_path
        ))
    }
}

fn resolve_node(field: &SchemaNode, node: &AuthoredNode) -> Result<MappingNode> {
    if node.is_ambiguous() {
        return Err(MapError::AmbiguousMapping {
            name: node.name.clone(),
            definition: serde_json::to_string_pretty(node).unwrap_or_else(|_| node.name.clone()),
        });
    }

    let source = if let Some(value) = &node.value {
        MappingSource::Static(value.clone())
    } else if let Some(column) = &node.source_column {
        MappingSource::Column(ColumnSource {
            column: column.clone(),
            lookup: node.source_table.clone(),
            default: node.default.clone(),
        })
    } else if node.children.is_empty() {
        match &field.kind {
            SchemaKind::Object(fields) => {
                MappingSource::Object(fields.iter().map(SchemaNode::initial_mapping).collect())
            },
            SchemaKind::Array(_) => MappingSource::Array(Vec::new()),
            SchemaKind::Scalar => MappingSource::Unmapped,
        }
    } else {
        match &field.kind {
            SchemaKind::Array(item) => MappingSource::Array(
                node.children
                    .iter()
                    .map(|child| resolve_node(item, child))
                    .collect::<Result<_>>()?,
            ),
            SchemaKind::Object(fields) => MappingSource::Object(
                node.children
                    .iter()
                    .map(|child| match schema::find(fields, &child.name) {
                        Some(child_field) => resolve_node(child_field, child),
                        None => Ok(resolve_unguided(child)),
                    })
                    .collect::<Result<_>>()?,
            ),
            // Keep the children so serialize can name the complex-value mismatch
            SchemaKind::Scalar => {
                MappingSource::Object(node.children.iter().map(resolve_unguided).collect())
            },
        }
    };

    Ok(MappingNode {
        name: node.name.clone(),
        source,
    })
}

/// Shape-agnostic conversion for nodes that have no schema counterpart
fn resolve_unguided(node: &AuthoredNode) -> MappingNode {
    let source = if let Some(value) = &node.value {
        MappingSource::Static(value.clone())
    } else if let Some(column) = &node.source_column {
        MappingSource::Column(ColumnSource {
            column: column.clone(),
            lookup: node.source_table.clone(),
            default: node.default.clone(),
        })
    } else if node.children.is_empty() {
        MappingSource::Unmapped
    } else {
        MappingSource::Object(node.children.iter().map(resolve_unguided).collect())
    };

    MappingNode {
        name: node.name.clone(),
        source,
    }
}

fn serialize_column_source(data_type: &str, source: &ColumnSource) -> Value {
    let mut result = Map::new();
    result.insert(COLUMN_KEY.to_string(), Value::String(source.column.clone()));
    if let Some(table) = &source.lookup {
        result.insert(LOOKUP_KEY.to_string(), Value::String(table.clone()));
    }
    if let Some(default) = &source.default {
        result.insert(DEFAULT_KEY.to_string(), encode_literal(data_type, default));
    }
    Value::Object(result)
}

fn deserialize_mapped_value(field: &SchemaNode, value: &Value) -> Result<MappingSource> {
    match value {
        Value::Object(object) => deserialize_column_source(field, object, value),
        Value::Array(_) => Err(MapError::violation(format!(
            "Cannot deserialize mappings from JSON, because the key '{}' was expected to have a {} value. Instead, the value was: {}",
            field.name,
            field.data_type,
            pretty(value)
        ))),
        scalar => Ok(match scalar_text(scalar) {
            Some(text) => MappingSource::Static(text),
            None => MappingSource::Unmapped,
        }),
    }
}

fn deserialize_column_source(
    field: &SchemaNode,
    object: &Map<String, Value>,
    value: &Value,
) -> Result<MappingSource> {
    if !object.contains_key(COLUMN_KEY) {
        return Err(MapError::violation(format!(
            "Cannot deserialize mappings from JSON, because the key '{}' was expected to have a Column Source declaration as its value, indicating the source column. Instead, the value was: {}",
            field.name,
            pretty(value)
        )));
    }

    if let Some(key) = object
        .keys()
        .find(|key| ![COLUMN_KEY, LOOKUP_KEY, DEFAULT_KEY].contains(&key.as_str()))
    {
        return Err(MapError::violation(format!(
            "Cannot deserialize mappings from JSON, because the key '{}' was expected to have a Column Source declaration as its value. Instead, the value contains unexpected property '{}': {}",
            field.name,
            key,
            pretty(value)
        )));
    }

    let non_strings: Vec<String> = object
        .iter()
        .filter(|(key, v)| key.as_str() != DEFAULT_KEY && !v.is_string())
        .map(|(key, _)| format!("'{key}'"))
        .collect();
    if !non_strings.is_empty() {
        return Err(MapError::violation(format!(
            "Cannot deserialize mappings from JSON, because the key '{}' was expected to have a valid Column Source declaration as its value. It has a Column Source, but one with invalid content. {} should be strings: {}",
            field.name,
            non_strings.join(", "),
            pretty(value)
        )));
    }

    let default = object.get(DEFAULT_KEY);
    if matches!(default, Some(Value::Object(_) | Value::Array(_))) {
        return Err(MapError::violation(format!(
            "Cannot deserialize mappings from JSON, because the key '{}' was expected to have a valid Column Source declaration as its value. It has a Column Source, but one with an invalid default. 'Default' should be a single value: {}",
            field.name,
            pretty(value)
        )));
    }

    Ok(MappingSource::Column(ColumnSource {
        column: object
            .get(COLUMN_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        lookup: object.get(LOOKUP_KEY).and_then(Value::as_str).map(str::to_string),
        default: default.and_then(scalar_text),
    }))
}

/// Text form of a JSON scalar; `None` for null and non-scalars
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    }
}

/// Encode an authored literal as the JSON scalar its declared type calls for
///
/// A typed literal is produced only when its rendering reproduces the trimmed
/// input exactly, so `.567` stays the string `".567"` while `12.34` becomes a
/// number. Everything else is emitted as the trimmed string.
pub fn encode_literal(data_type: &str, raw: &str) -> Value {
    let trimmed = raw.trim();

    match ScalarType::from_data_type(data_type) {
        ScalarType::Integer => {
            if let Ok(parsed) = trimmed.parse::<i64>() {
                if parsed.to_string() == trimmed {
                    return Value::from(parsed);
                }
            }
        },
        ScalarType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                return Value::Bool(true);
            }
            if trimmed.eq_ignore_ascii_case("false") {
                return Value::Bool(false);
            }
        },
        ScalarType::Number => {
            if let Some(number) = lossless_number(trimmed) {
                return Value::Number(number);
            }
        },
        ScalarType::String | ScalarType::DateTime | ScalarType::Other => {},
    }

    Value::String(trimmed.to_string())
}

fn lossless_number(text: &str) -> Option<Number> {
    if let Ok(parsed) = text.parse::<i64>() {
        return (parsed.to_string() == text).then(|| Number::from(parsed));
    }

    let parsed = text.parse::<f64>().ok()?;
    let number = Number::from_f64(parsed)?;
    (number.to_string() == text).then_some(number)
}

pub(crate) fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<SchemaNode> {
        vec![
            SchemaNode::scalar("studentUniqueId", "string", true),
            SchemaNode::scalar("birthDate", "date-time", false),
            SchemaNode::scalar("score", "number", false),
            SchemaNode::scalar("grade", "integer", false),
            SchemaNode::scalar("hispanic", "boolean", false),
            SchemaNode::object(
                "schoolReference",
                "schoolReference",
                true,
                vec![SchemaNode::scalar("schoolId", "integer", true)],
            ),
            SchemaNode::array(
                "addresses",
                false,
                SchemaNode::object(
                    "address",
                    "address",
                    false,
                    vec![
                        SchemaNode::scalar("city", "string", true),
                        SchemaNode::scalar("apartment", "string", false),
                    ],
                ),
            ),
        ]
    }

    fn serializer() -> MapSerializer {
        MapSerializer::new("/ed-fi/students", schema())
    }

    #[test]
    fn test_serialize_walks_schema_order_and_skips_unmapped() {
        let nodes = vec![
            MappingNode::object(
                "schoolReference",
                vec![MappingNode::column(
                    "schoolId",
                    ColumnSource::new("School").with_lookup("schools").with_default("100"),
                )],
            ),
            MappingNode::column("studentUniqueId", ColumnSource::new("StudentId")),
            MappingNode::unmapped("birthDate"),
            MappingNode::array(
                "addresses",
                vec![
                    MappingNode::object("address", vec![MappingNode::unmapped("city")]),
                    MappingNode::object("address", vec![MappingNode::fixed("city", " Austin ")]),
                ],
            ),
        ];

        let text = serializer().serialize_to_string(&nodes).unwrap();
        let expected = serde_json::to_string_pretty(&json!({
            "studentUniqueId": {"Column": "StudentId"},
            "schoolReference": {"schoolId": {"Column": "School", "Lookup": "schools", "Default": 100}},
            "addresses": [{"city": "Austin"}]
        }))
        .unwrap();
        assert_eq!(text, expected);
    }

    #[test]
    fn test_serialize_rejects_unknown_key() {
        let err = serializer()
            .serialize(&[MappingNode::fixed("nickname", "x")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot serialize mappings to JSON, because the key 'nickname' should not exist according to the metadata for resource '/ed-fi/students'."
        );
    }

    #[test]
    fn test_serialize_shape_mismatches() {
        let s = serializer();

        let err = s.serialize(&[MappingNode::fixed("addresses", "x")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot serialize mappings to JSON, because an array literal was expected for key 'addresses', but instead it is being mapped to a single value."
        );

        let err = s
            .serialize(&[MappingNode::column("schoolReference", ColumnSource::new("S"))])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot serialize mappings to JSON, because an object literal was expected for key 'schoolReference', but instead it is being mapped to a single value."
        );

        let err = s
            .serialize(&[MappingNode::object(
                "grade",
                vec![MappingNode::fixed("x", "1")],
            )])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot serialize mappings to JSON, because a single value was expected for key 'grade', but instead it is being mapped to a complex value."
        );
    }

    #[test]
    fn test_literal_encoding_is_lossless() {
        assert_eq!(encode_literal("number", "12.34"), json!(12.34));
        assert_eq!(encode_literal("number", ".567"), json!(".567"));
        assert_eq!(encode_literal("number", " 42 "), json!(42));
        assert_eq!(encode_literal("number", "1e5"), json!("1e5"));
        assert_eq!(encode_literal("integer", "007"), json!("007"));
        assert_eq!(encode_literal("integer", "-3"), json!(-3));
        assert_eq!(encode_literal("integer", "abc"), json!("abc"));
        assert_eq!(encode_literal("boolean", "True"), json!(true));
        assert_eq!(encode_literal("boolean", "no"), json!("no"));
        assert_eq!(encode_literal("string", " 5 "), json!("5"));
        assert_eq!(encode_literal("descriptor", "uri://x"), json!("uri://x"));
    }

    #[test]
    fn test_deserialize_fills_unmapped_placeholders() {
        let nodes = serializer()
            .deserialize(r#"{"grade": 9, "Id": {"Column": "Key"}}"#)
            .unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "studentUniqueId",
                "birthDate",
                "score",
                "grade",
                "hispanic",
                "schoolReference",
                "addresses"
            ]
        );
        assert_eq!(nodes[3].source, MappingSource::Static("9".to_string()));
        assert_eq!(nodes[6].source, MappingSource::Array(Vec::new()));
        assert!(matches!(&nodes[5].source, MappingSource::Object(c) if c[0].source == MappingSource::Unmapped));
    }

    #[test]
    fn test_deserialize_scalars_to_text() {
        let nodes = serializer()
            .deserialize(r#"{"hispanic": false, "score": 3.5, "birthDate": null}"#)
            .unwrap();
        assert_eq!(nodes[1].source, MappingSource::Unmapped);
        assert_eq!(nodes[2].source, MappingSource::Static("3.5".to_string()));
        assert_eq!(nodes[4].source, MappingSource::Static("false".to_string()));
    }

    #[test]
    fn test_deserialize_invalid_json() {
        let err = serializer().deserialize("{not json").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because the map text is not a valid JSON object. Check the inner exception for details. Invalid JSON Map text:\n\n{not json"
        );
        assert!(matches!(serializer().deserialize("[1]"), Err(MapError::InvalidJson { .. })));
    }

    #[test]
    fn test_deserialize_rejects_unknown_key() {
        let err = serializer().deserialize(r#"{"nickname": "x"}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because the key 'nickname' should not exist according to the metadata for resource '/ed-fi/students'."
        );

        let err = serializer()
            .deserialize(r#"{"schoolReference": {"districtId": 1}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("the key 'districtId' should not exist"));
    }

    #[test]
    fn test_deserialize_shape_mismatches() {
        let err = serializer()
            .deserialize(r#"{"addresses": {"city": "x"}}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because an array literal was expected. Instead, found: {\n  \"city\": \"x\"\n}"
        );

        let err = serializer().deserialize(r#"{"schoolReference": 5}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because an object literal was expected. Instead, found: 5"
        );

        let err = serializer().deserialize(r#"{"grade": [1]}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because the key 'grade' was expected to have a integer value. Instead, the value was: [\n  1\n]"
        );
    }

    #[test]
    fn test_column_source_validation_order() {
        let s = serializer();

        let err = s.deserialize(r#"{"grade": {"Lookup": "t"}}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because the key 'grade' was expected to have a Column Source declaration as its value, indicating the source column. Instead, the value was: {\n  \"Lookup\": \"t\"\n}"
        );

        let err = s
            .deserialize(r#"{"grade": {"Column": "G", "Extra": 1}}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because the key 'grade' was expected to have a Column Source declaration as its value. Instead, the value contains unexpected property 'Extra': {\n  \"Column\": \"G\",\n  \"Extra\": 1\n}"
        );

        let err = s
            .deserialize(r#"{"grade": {"Column": 1, "Lookup": true}}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot deserialize mappings from JSON, because the key 'grade' was expected to have a valid Column Source declaration as its value. It has a Column Source, but one with invalid content. 'Column', 'Lookup' should be strings: {\n  \"Column\": 1,\n  \"Lookup\": true\n}"
        );

        let err = s
            .deserialize(r#"{"grade": {"Column": "G", "Default": [1]}}"#)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("but one with an invalid default. 'Default' should be a single value: {"));
    }

    #[test]
    fn test_column_source_defaults_become_text() {
        let nodes = serializer()
            .deserialize(r#"{"hispanic": {"Column": "H", "Default": true}, "grade": {"Column": "G", "Lookup": "grades", "Default": 9}}"#)
            .unwrap();
        assert_eq!(
            nodes[3].source,
            MappingSource::Column(ColumnSource::new("G").with_lookup("grades").with_default("9"))
        );
        assert_eq!(
            nodes[4].source,
            MappingSource::Column(ColumnSource::new("H").with_default("true"))
        );
    }

    #[test]
    fn test_authored_nodes_resolve_against_schema() {
        let authored: Vec<AuthoredNode> = serde_json::from_value(json!([
            {"Name": "studentUniqueId", "SourceColumn": "StudentId"},
            {"Name": "addresses", "Children": [
                {"Name": "address", "Children": [{"Name": "city", "Value": "Austin"}]}
            ]}
        ]))
        .unwrap();

        let value = serializer().serialize_authored(&authored).unwrap();
        assert_eq!(
            value,
            json!({"studentUniqueId": {"Column": "StudentId"}, "addresses": [{"city": "Austin"}]})
        );
    }

    #[test]
    fn test_authored_ambiguity_rejected() {
        let authored = vec![AuthoredNode {
            name: "grade".to_string(),
            source_column: Some("G".to_string()),
            value: Some("9".to_string()),
            ..Default::default()
        }];

        let err = serializer().serialize_authored(&authored).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot serialize mappings to JSON, because the key 'grade' has an ambiguous mapping definition: {\n  \"Name\": \"grade\",\n  \"SourceColumn\": \"G\",\n  \"Value\": \"9\",\n  \"Children\": []\n}"
        );
    }

    #[test]
    fn test_natural_key_serializer_keeps_required_fields() {
        let s = MapSerializer::for_natural_key("/ed-fi/students", &schema());
        let names: Vec<_> = s.schema().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["studentUniqueId", "schoolReference"]);

        let err = s.deserialize(r#"{"grade": 1}"#).unwrap_err();
        assert!(err.to_string().contains("the key 'grade' should not exist"));
    }
}
