//! Error types for mapping and serialization

use thiserror::Error;

/// Result type alias for mapping operations
pub type Result<T> = std::result::Result<T, MapError>;

/// Everything that can go wrong while reading, writing or applying a map
#[derive(Error, Debug)]
pub enum MapError {
    /// The wire map and the schema disagree on a key or a shape
    #[error("{0}")]
    SchemaViolation(String),

    /// A mapping node carries more than one kind of value source
    #[error(
        "Cannot serialize mappings to JSON, because the key '{name}' has an ambiguous mapping definition: {definition}"
    )]
    AmbiguousMapping { name: String, definition: String },

    #[error(
        "Cannot deserialize mappings from JSON, because the map text is not a valid JSON object. Check the inner exception for details. Invalid JSON Map text:\n\n{text}"
    )]
    InvalidJson {
        text: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Missing column in CSV file: '{column}'.")]
    MissingColumn { column: String },

    #[error("Column '{column}' contains a value which could not be found in lookup table '{table}'.")]
    MissingLookupKey { column: String, table: String },

    #[error("{0}")]
    TypeConversion(String),

    /// A schema document could not be read
    #[error("Schema format error: {0}")]
    SchemaFormat(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A map is well formed but cannot be used where it was offered
    #[error("{0}")]
    Incompatible(String),
}

impl MapError {
    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        Self::SchemaViolation(msg.into())
    }

    pub(crate) fn schema_format(msg: impl Into<String>) -> Self {
        Self::SchemaFormat(msg.into())
    }

    /// Conversion failure for a value that came from a row column
    pub fn column_conversion(column: &str, property: &str, data_type: &str, unsupported: bool) -> Self {
        Self::TypeConversion(format!(
            "Column \"{column}\" contains a value for property \"{property}\" which cannot be converted to {}type \"{data_type}\".",
            unsupported_word(unsupported)
        ))
    }

    /// Conversion failure for a static literal
    pub fn static_conversion(property: &str, data_type: &str, unsupported: bool) -> Self {
        Self::TypeConversion(format!(
            "Static value for property \"{property}\" cannot be converted to {}type \"{data_type}\".",
            unsupported_word(unsupported)
        ))
    }

    /// Structural failures abort the whole unit of work; the rest are local to one row
    pub fn is_row_local(&self) -> bool {
        matches!(
            self,
            MapError::MissingLookupKey { .. } | MapError::TypeConversion(_)
        )
    }
}

fn unsupported_word(unsupported: bool) -> &'static str {
    if unsupported {
        "unsupported "
    } else {
        ""
    }
}
