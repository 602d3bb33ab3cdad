//! Declarative field configuration
//!
//! The external configuration loader hands field declarations to this crate
//! as already-parsed structures; the crate never reads configuration files
//! itself. A [`ConfigField`] carries only the attributes configuration is
//! allowed to override during the catalog merge.

use serde::Deserialize;
use serde_json::Value;

use super::field::{FieldKind, FieldMode};

/// One declared field from component configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigField {
    pub name: String,
    #[serde(default)]
    pub kind: Option<FieldKind>,
    #[serde(default)]
    pub mode: Option<FieldMode>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub default_value: Option<Value>,
}

impl ConfigField {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            mode: None,
            title: None,
            pattern: None,
            default_value: None,
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_mode(mut self, mode: FieldMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_parsed_configuration() {
        let json = r#"{"name": "page_title", "kind": "string", "title": "Title"}"#;
        let field: ConfigField = serde_json::from_str(json).unwrap();
        assert_eq!(field.name, "page_title");
        assert_eq!(field.kind, Some(FieldKind::String));
        assert_eq!(field.mode, None);
        assert_eq!(field.title.as_deref(), Some("Title"));
    }
}
