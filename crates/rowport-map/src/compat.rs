//! Compatibility of stored maps and bootstrap payloads with a resource schema

use serde_json::Value;

use crate::error::{MapError, Result};
use crate::mapping::referenced_columns;
use crate::schema::SchemaNode;
use crate::serializer::MapSerializer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityLevel {
    /// Literal seed payloads: may be an array of objects, may not read columns
    Bootstrap,
    /// A single data map object
    DataMap,
}

/// Check that `json` survives a deserialize/serialize pass against `schema`
///
/// Returns the first failure found.
pub fn check_compatibility(
    resource_path: &str,
    schema: &[SchemaNode],
    json: &Value,
    level: CompatibilityLevel,
) -> Result<()> {
    let serializer = MapSerializer::new(resource_path, schema.to_vec());

    match (json, level) {
        (Value::Array(items), CompatibilityLevel::Bootstrap) => items
            .iter()
            .try_for_each(|item| check_object(&serializer, item, level)),
        (Value::Array(_), CompatibilityLevel::DataMap) => Err(MapError::Incompatible(format!(
            "A single data map object for a single '{resource_path}' resource was expected, but an array of objects was provided."
        ))),
        _ => check_object(&serializer, json, level),
    }
}

/// Text variant of [`check_compatibility`]
pub fn check_compatibility_text(
    resource_path: &str,
    schema: &[SchemaNode],
    text: &str,
    level: CompatibilityLevel,
) -> Result<()> {
    let json: Value = serde_json::from_str(text).map_err(|source| MapError::InvalidJson {
        text: text.to_string(),
        source: Some(source),
    })?;
    check_compatibility(resource_path, schema, &json, level)
}

fn check_object(serializer: &MapSerializer, json: &Value, level: CompatibilityLevel) -> Result<()> {
    let nodes = serializer.deserialize_value(json)?;

    if level == CompatibilityLevel::Bootstrap && !referenced_columns(&nodes).is_empty() {
        return Err(MapError::Incompatible(
            "Bootstrap JSON cannot include column references.".to_string(),
        ));
    }

    serializer.serialize(&nodes).map(|_| ())
}
