//! Field metadata model
//!
//! A [`FieldDescriptor`] is the merged view of one column as the query
//! builder and the save path see it. Descriptors originate from live schema
//! introspection, are overlaid with declarative configuration, and are
//! finally adjusted programmatically by component code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a field, driving both SQL shape and value handling.
///
/// Kinds are matched exhaustively in the query builder; physical-column
/// kinds come from schema introspection, presentation kinds (`Select`,
/// `Multi`, `Value`, `Tab`, ...) are assigned by configuration or component
/// code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Int,
    Float,
    String,
    Text,
    Bool,
    Date,
    DateTime,
    /// Single choice out of a fixed or looked-up value list
    Select,
    /// Many-to-many values resolved through a link table; no physical column
    Multi,
    /// Foreign-key reference rendered as `{id, label}`
    Value,
    HtmlBlock,
    File,
    Hidden,
    /// Computed by component code; never part of generated SQL
    Custom,
    /// Pure presentation grouping; never part of generated SQL
    Tab,
}

impl FieldKind {
    /// Map an introspected SQL column type to a field kind
    pub fn from_sql_type(sql_type: &str) -> Self {
        let upper = sql_type.to_uppercase();
        if upper.contains("INT") {
            FieldKind::Int
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("DECIMAL")
            || upper.contains("NUMERIC")
        {
            FieldKind::Float
        } else if upper.contains("BOOL") {
            FieldKind::Bool
        } else if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
            FieldKind::DateTime
        } else if upper.contains("DATE") {
            FieldKind::Date
        } else if upper.contains("TEXT") || upper.contains("CLOB") {
            FieldKind::Text
        } else if upper.contains("BLOB") {
            FieldKind::File
        } else {
            FieldKind::String
        }
    }

    /// Whether fields of this kind map to a physical column in generated SQL
    pub fn has_physical_column(&self) -> bool {
        !matches!(self, FieldKind::Custom | FieldKind::Tab | FieldKind::Multi)
    }
}

/// Read/write mode of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    Read,
    ReadWrite,
}

/// Lookup declaration for [`FieldKind::Value`] fields: resolve a stored id
/// to `{id, label}` against a reference table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueLookup {
    pub table: String,
    pub key_column: String,
    pub label_column: String,
}

/// Link declaration for [`FieldKind::Multi`] fields: the many-to-many table
/// carrying one row per `(record, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiLink {
    pub link_table: String,
    /// Column of the link table referencing the owning record
    pub self_column: String,
    /// Column of the link table carrying the linked value
    pub value_column: String,
}

/// Merged metadata for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    pub mode: FieldMode,
    /// Table the field physically belongs to
    pub table_origin: String,
    /// True only for translation-table fields that are not the shared
    /// primary key or `lang_id`
    pub multilanguage: bool,
    /// Whether the field is the record key
    pub key: bool,
    /// Whether a value must be present on save
    pub required: bool,
    pub title: Option<String>,
    /// Validation regex applied on save
    pub pattern: Option<String>,
    pub default_value: Option<Value>,
    /// Fixed option list for `Select` fields
    pub available_values: Vec<Value>,
    pub value_lookup: Option<ValueLookup>,
    pub multi_link: Option<MultiLink>,
}

impl FieldDescriptor {
    pub fn new(name: &str, kind: FieldKind, table_origin: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mode: FieldMode::ReadWrite,
            table_origin: table_origin.to_string(),
            multilanguage: false,
            key: false,
            required: false,
            title: None,
            pattern: None,
            default_value: None,
            available_values: Vec::new(),
            value_lookup: None,
            multi_link: None,
        }
    }

    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_key(mut self, key: bool) -> Self {
        self.key = key;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_multilanguage(mut self, multilanguage: bool) -> Self {
        self.multilanguage = multilanguage;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_value_lookup(mut self, lookup: ValueLookup) -> Self {
        self.kind = FieldKind::Value;
        self.value_lookup = Some(lookup);
        self
    }

    pub fn with_multi_link(mut self, link: MultiLink) -> Self {
        self.kind = FieldKind::Multi;
        self.multi_link = Some(link);
        self
    }

    /// Whether the field participates in generated SELECT lists
    pub fn selectable(&self) -> bool {
        self.kind.has_physical_column()
    }

    /// Whether the save path writes this field
    pub fn writable(&self) -> bool {
        self.mode == FieldMode::ReadWrite && self.kind.has_physical_column()
    }
}
