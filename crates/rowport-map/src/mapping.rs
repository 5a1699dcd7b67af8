//! Mapping trees: how each schema field gets its value

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One authored rule, parallel by name to a schema node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingNode {
    pub name: String,
    pub source: MappingSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingSource {
    Unmapped,
    /// A literal typed by the author
    Static(String),
    Column(ColumnSource),
    Object(Vec<MappingNode>),
    /// One node per array element, each shaped by the array's item schema
    Array(Vec<MappingNode>),
}

/// Value read from a row column, optionally translated through a lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSource {
    pub column: String,
    pub lookup: Option<String>,
    pub default: Option<String>,
}

impl ColumnSource {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            lookup: None,
            default: None,
        }
    }

    pub fn with_lookup(mut self, table: impl Into<String>) -> Self {
        self.lookup = Some(table.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

impl MappingNode {
    pub fn unmapped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: MappingSource::Unmapped,
        }
    }

    pub fn fixed(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: MappingSource::Static(value.into()),
        }
    }

    pub fn column(name: impl Into<String>, source: ColumnSource) -> Self {
        Self {
            name: name.into(),
            source: MappingSource::Column(source),
        }
    }

    pub fn object(name: impl Into<String>, children: Vec<MappingNode>) -> Self {
        Self {
            name: name.into(),
            source: MappingSource::Object(children),
        }
    }

    pub fn array(name: impl Into<String>, items: Vec<MappingNode>) -> Self {
        Self {
            name: name.into(),
            source: MappingSource::Array(items),
        }
    }

    /// True when this node or any descendant carries a static or column value
    pub fn is_mapped(&self) -> bool {
        match &self.source {
            MappingSource::Unmapped => false,
            MappingSource::Static(_) | MappingSource::Column(_) => true,
            MappingSource::Object(children) | MappingSource::Array(children) => {
                children.iter().any(MappingNode::is_mapped)
            },
        }
    }

    pub fn children(&self) -> &[MappingNode] {
        match &self.source {
            MappingSource::Object(children) | MappingSource::Array(children) => children,
            _ => &[],
        }
    }

    fn visit_columns<'a>(&'a self, visit: &mut impl FnMut(&'a ColumnSource)) {
        match &self.source {
            MappingSource::Column(source) => visit(source),
            MappingSource::Object(children) | MappingSource::Array(children) => {
                for child in children {
                    child.visit_columns(visit);
                }
            },
            MappingSource::Unmapped | MappingSource::Static(_) => {},
        }
    }
}

/// Distinct column names read anywhere in the tree, sorted
pub fn referenced_columns(nodes: &[MappingNode]) -> Vec<String> {
    let mut columns = BTreeSet::new();
    for node in nodes {
        node.visit_columns(&mut |source| {
            columns.insert(source.column.clone());
        });
    }
    columns.into_iter().collect()
}

/// Distinct lookup-table names used anywhere in the tree, sorted
pub fn referenced_lookups(nodes: &[MappingNode]) -> Vec<String> {
    let mut tables = BTreeSet::new();
    for node in nodes {
        node.visit_columns(&mut |source| {
            if let Some(table) = &source.lookup {
                tables.insert(table.clone());
            }
        });
    }
    tables.into_iter().collect()
}

/// Flat, hand-editable form of a mapping rule
///
/// Mapping editors work with this shape: every value source is an optional
/// field, so a node can end up carrying conflicting sources. Converting to a
/// [`MappingNode`] through [`crate::MapSerializer::resolve_authored`] rejects
/// those nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuthoredNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub children: Vec<AuthoredNode>,
}

impl AuthoredNode {
    pub(crate) fn is_ambiguous(&self) -> bool {
        let column_parts =
            self.source_column.is_some() || self.source_table.is_some() || self.default.is_some();
        (self.value.is_some() && column_parts)
            || (self.source_column.is_none() && (self.source_table.is_some() || self.default.is_some()))
    }
}
