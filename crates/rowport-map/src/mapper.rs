//! Row mapper: schema + mapping tree + one row -> one JSON document
//!
//! Resolution per scalar node:
//!
//! 1. a column reads the cell; a blank cell never triggers a lookup
//! 2. a lookup table translates a non-blank cell, failing on an unknown key
//! 3. a default replaces a blank result
//! 4. a static literal is used as-is
//!
//! The resolved text is then coerced to the declared type. Blank values are
//! omitted, and objects or arrays that end up empty are omitted with them.

use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::error::{MapError, Result};
use crate::lookup::LookupCollection;
use crate::mapping::{self, ColumnSource, MappingNode, MappingSource};
use crate::row::Row;
use crate::schema::{self, ScalarType, SchemaKind, SchemaNode};
use crate::serializer::ID_KEY;

/// Applies one mapping tree to rows
///
/// Everything inside is read-only, so one mapper can serve many rows concurrently.
#[derive(Debug, Clone)]
pub struct RowMapper {
    schema: Vec<SchemaNode>,
    mappings: Vec<MappingNode>,
    lookups: Arc<LookupCollection>,
}

impl RowMapper {
    pub fn new(
        schema: Vec<SchemaNode>,
        mappings: Vec<MappingNode>,
        lookups: Arc<LookupCollection>,
    ) -> Self {
        Self {
            schema,
            mappings,
            lookups,
        }
    }

    pub fn mappings(&self) -> &[MappingNode] {
        &self.mappings
    }

    pub fn referenced_columns(&self) -> Vec<String> {
        mapping::referenced_columns(&self.mappings)
    }

    pub fn referenced_lookups(&self) -> Vec<String> {
        mapping::referenced_lookups(&self.mappings)
    }

    /// Referenced columns absent from a header
    pub fn missing_columns(&self, headers: &[String]) -> Vec<String> {
        self.referenced_columns()
            .into_iter()
            .filter(|c| !headers.contains(c))
            .collect()
    }

    /// Referenced lookup tables absent from the configured lookups
    pub fn missing_lookups(&self) -> Vec<String> {
        self.referenced_lookups()
            .into_iter()
            .filter(|t| !self.lookups.contains_table(t))
            .collect()
    }

    /// Produce the pruned, typed document for one row
    pub fn apply(&self, row: &Row) -> Result<Value> {
        Ok(Value::Object(self.map_object(&self.schema, &self.mappings, row)?))
    }

    /// Produce `{"Id": <raw value>}` for delete-by-id maps, bypassing the schema
    pub fn apply_delete_by_id(&self, row: &Row) -> Result<Value> {
        let mut result = Map::new();
        for node in &self.mappings {
            let raw = self.raw_value(node, row)?;
            result.insert(ID_KEY.to_string(), raw.map(Value::String).unwrap_or(Value::Null));
        }
        Ok(Value::Object(result))
    }

    fn map_object(
        &self,
        fields: &[SchemaNode],
        nodes: &[MappingNode],
        row: &Row,
    ) -> Result<Map<String, Value>> {
        let mut result = Map::new();
        for node in nodes {
            let field = schema::find(fields, &node.name).ok_or_else(|| {
                MapError::violation(format!(
                    "Cannot map row {}, because the key '{}' should not exist according to the metadata.",
                    row.number, node.name
                ))
            })?;

            if let Some(value) = self.map_node(field, node, row)? {
                result.insert(field.name.clone(), value);
            }
        }
        Ok(result)
    }

    fn map_node(&self, field: &SchemaNode, node: &MappingNode, row: &Row) -> Result<Option<Value>> {
        match &field.kind {
            SchemaKind::Array(item) => {
                let values = self.map_array(item, node.children(), row)?;
                Ok((!values.is_empty()).then_some(Value::Array(values)))
            },
            SchemaKind::Object(fields) => {
                let object = self.map_object(fields, node.children(), row)?;
                Ok((!object.is_empty()).then_some(Value::Object(object)))
            },
            SchemaKind::Scalar => self.map_scalar(field, node, row),
        }
    }

    fn map_array(&self, item: &SchemaNode, nodes: &[MappingNode], row: &Row) -> Result<Vec<Value>> {
        let mut result = Vec::new();
        for node in nodes {
            let Some(value) = self.map_node(item, node, row)? else {
                continue;
            };

            if let Value::Object(object) = &value {
                let complete = item
                    .required_properties()
                    .iter()
                    .all(|name| object.contains_key(*name));
                if !complete {
                    info!(
                        row = row.number,
                        item = %item.name,
                        "Discarding array item '{}' because one of its required properties was blank. This can happen when an input file with 'jagged' data is mapped to an array property.",
                        item.name
                    );
                    continue;
                }
            }

            result.push(value);
        }
        Ok(result)
    }

    fn map_scalar(&self, field: &SchemaNode, node: &MappingNode, row: &Row) -> Result<Option<Value>> {
        let Some(raw) = self.raw_value(node, row)? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let converted = coerce(field.scalar_type(), &raw);
        match converted {
            Coerced::Value(value) => Ok(Some(value)),
            Coerced::Invalid => Err(conversion_error(field, node, false)),
            Coerced::Unsupported => Err(conversion_error(field, node, true)),
        }
    }

    fn raw_value(&self, node: &MappingNode, row: &Row) -> Result<Option<String>> {
        match &node.source {
            MappingSource::Column(source) => self.column_value(source, row),
            MappingSource::Static(value) if !value.trim().is_empty() => Ok(Some(value.clone())),
            _ => Ok(None),
        }
    }

    fn column_value(&self, source: &ColumnSource, row: &Row) -> Result<Option<String>> {
        let cell = row.get(&source.column)?;

        let resolved = if cell.trim().is_empty() {
            None
        } else {
            match source.lookup.as_deref().filter(|t| !t.trim().is_empty()) {
                Some(table) => match self.lookups.try_lookup(table, cell) {
                    Some(value) => Some(value.to_string()),
                    None => {
                        return Err(MapError::MissingLookupKey {
                            column: source.column.clone(),
                            table: table.to_string(),
                        })
                    },
                },
                None => Some(cell.to_string()),
            }
        };

        let blank = resolved.as_deref().is_none_or(|v| v.trim().is_empty());
        match &source.default {
            Some(default) if blank && !default.trim().is_empty() => Ok(Some(default.clone())),
            _ => Ok(resolved),
        }
    }
}

enum Coerced {
    Value(Value),
    Invalid,
    Unsupported,
}

fn coerce(scalar_type: ScalarType, raw: &str) -> Coerced {
    match scalar_type {
        ScalarType::String | ScalarType::DateTime => Coerced::Value(Value::String(raw.to_string())),
        ScalarType::Integer => match raw.trim().parse::<i64>() {
            Ok(n) => Coerced::Value(Value::from(n)),
            Err(_) => Coerced::Invalid,
        },
        ScalarType::Boolean => {
            let trimmed = raw.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Coerced::Value(Value::Bool(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Coerced::Value(Value::Bool(false))
            } else {
                Coerced::Invalid
            }
        },
        ScalarType::Number => match parse_number(raw) {
            Some(n) => Coerced::Value(Value::Number(n)),
            None => Coerced::Invalid,
        },
        ScalarType::Other => Coerced::Unsupported,
    }
}

/// Parse a decimal as found in spreadsheets: optional leading `$`, thousands separators
///
/// Exponent forms are rejected and the decimal text is kept as written, so
/// `1.10` stays `1.10` and no digits are lost to binary floating point.
fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim_start();
    let cleaned: String = trimmed
        .strip_prefix('$')
        .unwrap_or(trimmed)
        .trim()
        .chars()
        .filter(|c| *c != ',')
        .collect();

    let digits = cleaned.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(&cleaned);
    if !digits.chars().any(|c| c.is_ascii_digit())
        || !digits.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }

    let decimal = Decimal::from_str(&cleaned).ok()?;
    serde_json::from_str(&decimal.to_string()).ok()
}

fn conversion_error(field: &SchemaNode, node: &MappingNode, unsupported: bool) -> MapError {
    match &node.source {
        MappingSource::Column(source) if !source.column.trim().is_empty() => {
            MapError::column_conversion(&source.column, &node.name, &field.data_type, unsupported)
        },
        _ => MapError::static_conversion(&node.name, &field.data_type, unsupported),
    }
}
