use serde::{Deserialize, Serialize};

/// Substrings of a lowercased declared type that mark a column as numeric.
const NUMERIC_MARKERS: [&str; 3] = ["integer", "float", "double"];

/// Decides whether values of `declared_type` are rendered unquoted.
///
/// Pure substring match on the lowercased type string: `"FLOAT(10,2)"` and
/// `"INTEGER(11)"` are numeric, `"BIGINT"`, `"DECIMAL"` and `"VARCHAR"` are not,
/// and `"floating-point"` is. Statement rendering and form coercion both go
/// through this function only.
pub fn is_numeric_type(declared_type: &str) -> bool {
    let lowered = declared_type.to_lowercase();
    NUMERIC_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Raw engine type string, e.g. `INTEGER(11)` or `character varying`.
    pub declared_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    /// Engine type name usable in a cast, when it differs from `declared_type`.
    pub cast_type: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            is_nullable: true,
            default: None,
            cast_type: None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        is_numeric_type(&self.declared_type)
    }

    /// First word of the declared type, as shown on the schema page.
    pub fn display_type(&self) -> &str {
        self.declared_type
            .split_whitespace()
            .next()
            .unwrap_or(&self.declared_type)
    }

    pub fn cast_type(&self) -> &str {
        self.cast_type.as_deref().unwrap_or(&self.declared_type)
    }
}
