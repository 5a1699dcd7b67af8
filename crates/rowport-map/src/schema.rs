//! Schema trees describing the shape of a target resource
//!
//! On the wire a schema is an ordered list of `{Name, DataType, Required, Children}`
//! records. In memory each node is one of three closed shapes:
//!
//! - `Scalar`: a leaf carrying a declared type such as `string` or `integer`
//! - `Object`: an ordered list of named properties
//! - `Array`: exactly one item schema, which may itself be any shape

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{MapError, Result};
use crate::mapping::{MappingNode, MappingSource};

/// Declared data type of an array node
pub const ARRAY_TYPE: &str = "array";

/// One field of a target resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchemaNode", into = "RawSchemaNode")]
pub struct SchemaNode {
    pub name: String,
    /// Declared type; for objects this is the opaque type name
    pub data_type: String,
    pub required: bool,
    pub kind: SchemaKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaKind {
    Scalar,
    Object(Vec<SchemaNode>),
    Array(Box<SchemaNode>),
}

/// Scalar types understood by literal encoding and row coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    DateTime,
    Integer,
    Number,
    Boolean,
    /// Anything else; carried through as an opaque string
    Other,
}

impl ScalarType {
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type {
            "string" => ScalarType::String,
            "date-time" => ScalarType::DateTime,
            "integer" => ScalarType::Integer,
            "number" => ScalarType::Number,
            "boolean" => ScalarType::Boolean,
            _ => ScalarType::Other,
        }
    }
}

impl SchemaNode {
    pub fn scalar(name: impl Into<String>, data_type: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            required,
            kind: SchemaKind::Scalar,
        }
    }

    pub fn object(
        name: impl Into<String>,
        data_type: impl Into<String>,
        required: bool,
        children: Vec<SchemaNode>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            required,
            kind: SchemaKind::Object(children),
        }
    }

    pub fn array(name: impl Into<String>, required: bool, item: SchemaNode) -> Self {
        Self {
            name: name.into(),
            data_type: ARRAY_TYPE.to_string(),
            required,
            kind: SchemaKind::Array(Box::new(item)),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        ScalarType::from_data_type(&self.data_type)
    }

    /// The unmapped placeholder for this node
    ///
    /// Objects mirror their properties; arrays start out with no items.
    pub fn initial_mapping(&self) -> MappingNode {
        let source = match &self.kind {
            SchemaKind::Scalar => MappingSource::Unmapped,
            SchemaKind::Object(children) => {
                MappingSource::Object(children.iter().map(SchemaNode::initial_mapping).collect())
            },
            SchemaKind::Array(_) => MappingSource::Array(Vec::new()),
        };

        MappingNode {
            name: self.name.clone(),
            source,
        }
    }

    /// Names of the required properties of an object node
    pub fn required_properties(&self) -> Vec<&str> {
        match &self.kind {
            SchemaKind::Object(children) => children
                .iter()
                .filter(|c| c.required)
                .map(|c| c.name.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Parse a schema list from its JSON wire form
pub fn parse_schema(text: &str) -> Result<Vec<SchemaNode>> {
    let nodes: Vec<SchemaNode> =
        serde_json::from_str(text).map_err(|e| MapError::schema_format(e.to_string()))?;
    check_unique_names(&nodes).map_err(MapError::schema_format)?;
    Ok(nodes)
}

/// Render a schema list to its JSON wire form
pub fn schema_to_string(nodes: &[SchemaNode]) -> Result<String> {
    serde_json::to_string_pretty(nodes).map_err(|e| MapError::schema_format(e.to_string()))
}

/// Only the top-level required properties, as used by natural-key deletes
pub fn required_only(nodes: &[SchemaNode]) -> Vec<SchemaNode> {
    nodes.iter().filter(|n| n.required).cloned().collect()
}

pub fn find<'a>(nodes: &'a [SchemaNode], name: &str) -> Option<&'a SchemaNode> {
    nodes.iter().find(|n| n.name == name)
}

fn check_unique_names(nodes: &[SchemaNode]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for node in nodes {
        if !seen.insert(node.name.as_str()) {
            return Err(format!("Duplicate property '{}' in schema", node.name));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSchemaNode {
    name: String,
    data_type: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    children: Vec<RawSchemaNode>,
}

impl TryFrom<RawSchemaNode> for SchemaNode {
    type Error = String;

    fn try_from(raw: RawSchemaNode) -> std::result::Result<Self, Self::Error> {
        let mut children = raw
            .children
            .into_iter()
            .map(SchemaNode::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let kind = if raw.data_type == ARRAY_TYPE {
            if children.len() != 1 {
                return Err(format!(
                    "Array property '{}' must declare exactly one item schema, found {}",
                    raw.name,
                    children.len()
                ));
            }
            SchemaKind::Array(Box::new(children.remove(0)))
        } else if children.is_empty() {
            SchemaKind::Scalar
        } else {
            check_unique_names(&children)?;
            SchemaKind::Object(children)
        };

        Ok(SchemaNode {
            name: raw.name,
            data_type: raw.data_type,
            required: raw.required,
            kind,
        })
    }
}

impl From<SchemaNode> for RawSchemaNode {
    fn from(node: SchemaNode) -> Self {
        let children = match node.kind {
            SchemaKind::Scalar => Vec::new(),
            SchemaKind::Object(children) => children.into_iter().map(RawSchemaNode::from).collect(),
            SchemaKind::Array(item) => vec![RawSchemaNode::from(*item)],
        };

        RawSchemaNode {
            name: node.name,
            data_type: node.data_type,
            required: node.required,
            children,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const STUDENT_SCHEMA: &str = r#"[
        {"Name": "studentUniqueId", "DataType": "string", "Required": true, "Children": []},
        {"Name": "schoolReference", "DataType": "schoolReference", "Required": true, "Children": [
            {"Name": "schoolId", "DataType": "integer", "Required": true, "Children": []}
        ]},
        {"Name": "addresses", "DataType": "array", "Required": false, "Children": [
            {"Name": "address", "DataType": "address", "Required": false, "Children": [
                {"Name": "city", "DataType": "string", "Required": true, "Children": []},
                {"Name": "apartment", "DataType": "string", "Required": false, "Children": []}
            ]}
        ]}
    ]"#;

    #[test]
    fn test_parse_schema_shapes() {
        let schema = parse_schema(STUDENT_SCHEMA).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema[0].kind, SchemaKind::Scalar);
        assert_eq!(schema[0].scalar_type(), ScalarType::String);
        assert!(matches!(&schema[1].kind, SchemaKind::Object(c) if c.len() == 1));
        match &schema[2].kind {
            SchemaKind::Array(item) => {
                assert_eq!(item.name, "address");
                assert_eq!(item.required_properties(), vec!["city"]);
            },
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_array_requires_single_item() {
        let text = r#"[{"Name": "tags", "DataType": "array", "Required": false, "Children": []}]"#;
        let err = parse_schema(text).unwrap_err();
        assert!(err.to_string().contains("exactly one item schema"));
    }

    #[test]
    fn test_duplicate_siblings_rejected() {
        let text = r#"[
            {"Name": "a", "DataType": "string", "Required": false},
            {"Name": "a", "DataType": "integer", "Required": false}
        ]"#;
        assert!(matches!(parse_schema(text), Err(MapError::SchemaFormat(_))));
    }

    #[test]
    fn test_wire_form_round_trip() {
        let schema = parse_schema(STUDENT_SCHEMA).unwrap();
        let text = schema_to_string(&schema).unwrap();
        assert_eq!(parse_schema(&text).unwrap(), schema);
    }

    #[test]
    fn test_initial_mapping_starts_arrays_empty() {
        let schema = parse_schema(STUDENT_SCHEMA).unwrap();
        let initial: Vec<_> = schema.iter().map(SchemaNode::initial_mapping).collect();

        assert_eq!(initial[0].source, MappingSource::Unmapped);
        match &initial[1].source {
            MappingSource::Object(children) => {
                assert_eq!(children[0].name, "schoolId");
                assert_eq!(children[0].source, MappingSource::Unmapped);
            },
            other => panic!("expected object, got {other:?}"),
        }
        assert_eq!(initial[2].source, MappingSource::Array(Vec::new()));
        assert!(initial.iter().all(|n| !n.is_mapped()));
    }

    #[test]
    fn test_required_only_filters_top_level() {
        let schema = parse_schema(STUDENT_SCHEMA).unwrap();
        let keys = required_only(&schema);
        let names: Vec<_> = keys.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["studentUniqueId", "schoolReference"]);
    }
}
