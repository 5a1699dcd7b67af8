//! Delete-by-identifier maps
//!
//! The wire form is fixed: `{"Id": {"Column": "<name>"}}`. No schema applies.

use serde_json::{json, Value};

use crate::error::{MapError, Result};
use crate::mapping::{ColumnSource, MappingNode, MappingSource};
use crate::serializer::{pretty, ID_KEY};

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteByIdSerializer;

impl DeleteByIdSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Emit the fixed delete shape from the single column-mapped node
    pub fn serialize(&self, nodes: &[MappingNode]) -> Result<Value> {
        match nodes {
            [MappingNode {
                source: MappingSource::Column(source),
                ..
            }] => Ok(json!({ ID_KEY: { "Column": source.column } })),
            _ => Err(MapError::violation(format!(
                "Cannot serialize mappings to JSON, because a delete-by-id map requires exactly one column-mapped key, but {} mapping(s) were provided.",
                nodes.len()
            ))),
        }
    }

    pub fn serialize_to_string(&self, nodes: &[MappingNode]) -> Result<String> {
        Ok(pretty(&self.serialize(nodes)?))
    }

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

    /// Extract the identifier column into a single node named `Id`
    pub fn deserialize_value(&self, value: &Value) -> Result<Vec<MappingNode>> {
        let Value::Object(object) = value else {
            return Err(MapError::violation(format!(
                "Cannot deserialize mappings from JSON, because an object literal was expected. Instead, found: {}",
                pretty(value)
            )));
        };

        let column = object
            .get(ID_KEY)
            .and_then(|id| id.get("Column"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MapError::violation(format!(
                    "Cannot deserialize mappings from JSON, because the key '{}' was expected to have a Column Source declaration as its value, indicating the source column. Instead, the value was: {}",
                    ID_KEY,
                    pretty(object.get(ID_KEY).unwrap_or(&Value::Null))
                ))
            })?;

        Ok(vec![MappingNode::column(ID_KEY, ColumnSource::new(column))])
    }
}
