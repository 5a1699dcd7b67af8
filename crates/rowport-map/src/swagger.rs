//! Schema adapter for Swagger 2.0 resource descriptions
//!
//! The input is the resource's own model (`swaggerVersion`, `properties`,
//! `required`) plus a `models` table that `$ref` names resolve against.

use serde_json::{Map, Value};

use crate::error::{MapError, Result};
use crate::schema::{SchemaNode, ARRAY_TYPE};

const IGNORED_FIELDS: [&str; 3] = ["id", "link", "_etag"];
const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Build the schema tree for one resource from its Swagger description
pub fn parse(resource_path: &str, text: &str) -> Result<Vec<SchemaNode>> {
    let document: Value = serde_json::from_str(text).map_err(|e| {
        MapError::schema_format(format!(
            "Resource description for '{resource_path}' is not valid JSON: {e}"
        ))
    })?;

    match document.get("swaggerVersion").and_then(Value::as_str) {
        Some("2.0") => {},
        Some(version) => {
            return Err(MapError::NotSupported(format!(
                "Swagger version {version} is not supported."
            )))
        },
        None => {
            return Err(MapError::NotSupported(
                "Swagger version number is missing.".to_string(),
            ))
        },
    }

    let empty = Map::new();
    let models = document
        .get("models")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut stack = Vec::new();
    model_fields(&document, models, &mut stack)
}

fn model_fields(
    model: &Value,
    models: &Map<String, Value>,
    stack: &mut Vec<String>,
) -> Result<Vec<SchemaNode>> {
    let required: Vec<&str> = model
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = model.get("properties").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut fields = Vec::new();
    for (name, detail) in properties {
        if IGNORED_FIELDS.contains(&name.as_str()) {
            continue;
        }
        let is_required = required.contains(&name.as_str());
        fields.push(property_node(name, is_required, detail, models, stack)?);
    }
    Ok(fields)
}

fn property_node(
    name: &str,
    required: bool,
    detail: &Value,
    models: &Map<String, Value>,
    stack: &mut Vec<String>,
) -> Result<SchemaNode> {
    let data_type = match detail.get("$ref").and_then(Value::as_str) {
        Some(reference) => reference_name(reference),
        None => detail
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                MapError::schema_format(format!("Property '{name}' declares neither a type nor a $ref"))
            })?,
    };

    if data_type == ARRAY_TYPE {
        let items = detail.get("items").unwrap_or(&Value::Null);
        let item = match items.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                let model_name = reference_name(reference);
                let children = nested_fields(&model_name, models, stack)?;
                let item_name = formatted_model_name(&model_name).to_string();
                if children.is_empty() {
                    SchemaNode::scalar(item_name, model_name, false)
                } else {
                    SchemaNode::object(item_name, model_name, false, children)
                }
            },
            None => {
                let item_type = items.get("type").and_then(Value::as_str).ok_or_else(|| {
                    MapError::schema_format(format!("Array property '{name}' has no item type"))
                })?;
                SchemaNode::scalar(name, item_type, false)
            },
        };
        return Ok(SchemaNode::array(name, required, item));
    }

    let children = nested_fields(&data_type, models, stack)?;
    if children.is_empty() {
        Ok(SchemaNode::scalar(name, data_type, required))
    } else {
        Ok(SchemaNode::object(name, data_type, required, children))
    }
}

/// Fields of a referenced model; trivial types have no model and yield nothing
fn nested_fields(
    model_name: &str,
    models: &Map<String, Value>,
    stack: &mut Vec<String>,
) -> Result<Vec<SchemaNode>> {
    let Some(model) = models.get(model_name) else {
        return Ok(Vec::new());
    };
    // self-referencing models stop at the first repeat
    if stack.iter().any(|m| m == model_name) {
        return Ok(Vec::new());
    }

    stack.push(model_name.to_string());
    let fields = model_fields(model, models, stack);
    stack.pop();
    fields
}

fn reference_name(reference: &str) -> String {
    reference.replace(DEFINITIONS_PREFIX, "")
}

fn formatted_model_name(model_name: &str) -> &str {
    match model_name.find('_') {
        Some(idx) => &model_name[idx + 1..],
        None => model_name,
    }
}
