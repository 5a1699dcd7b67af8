//! Rowport Map Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Schema-validated mapping of tabular rows onto JSON resources.
//!
//! # Overview
//!
//! - **Schema**: the shape of a target resource ([`SchemaNode`])
//! - **Mapping**: how each field gets its value ([`MappingNode`])
//! - **Serializer**: mapping trees to and from the JSON wire map ([`MapSerializer`],
//!   [`DeleteByIdSerializer`])
//! - **Mapper**: one row in, one pruned and typed document out ([`RowMapper`])
//! - **Swagger**: schema trees from Swagger 2.0 resource descriptions
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rowport_map::{LookupCollection, MapSerializer, Row, RowMapper, SchemaNode};
//!
//! let schema = vec![
//!     SchemaNode::scalar("propertyA", "string", false),
//!     SchemaNode::scalar("propertyB", "integer", false),
//! ];
//! let serializer = MapSerializer::new("/things", schema.clone());
//! let mappings = serializer
//!     .deserialize(r#"{"propertyA": {"Column": "Col1", "Default": "X"}, "propertyB": 42}"#)
//!     .unwrap();
//!
//! let mapper = RowMapper::new(schema, mappings, Arc::new(LookupCollection::default()));
//! let doc = mapper.apply(&Row::from_pairs(1, [("Col1", "")])).unwrap();
//! assert_eq!(doc.to_string(), r#"{"propertyA":"X","propertyB":42}"#);
//! ```

pub mod compat;
pub mod delete;
pub mod error;
pub mod lookup;
pub mod mapper;
pub mod mapping;
pub mod row;
pub mod schema;
pub mod serializer;
pub mod swagger;

pub use compat::{check_compatibility, check_compatibility_text, CompatibilityLevel};
pub use delete::DeleteByIdSerializer;
pub use error::{MapError, Result};
pub use lookup::{LookupCollection, LookupEntry};
pub use mapper::RowMapper;
pub use mapping::{referenced_columns, referenced_lookups, AuthoredNode, ColumnSource, MappingNode, MappingSource};
pub use row::Row;
pub use schema::{parse_schema, SchemaKind, SchemaNode, ScalarType};
pub use serializer::{encode_literal, MapSerializer};
