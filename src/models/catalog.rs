//! Field catalog
//!
//! The ordered field list driving both query construction and output
//! shaping. Built from schema-derived defaults, overlaid with declarative
//! configuration, then adjusted programmatically by component code.

use crate::models::config::ConfigField;
use crate::models::field::{FieldDescriptor, FieldKind, FieldMode};
use crate::schema::{LANG_ID_COLUMN, SchemaError, TableSchema};

/// Ordered mapping of field name to descriptor; names are unique
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCatalog {
    fields: Vec<FieldDescriptor>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor; duplicate names are developer errors
    pub fn push(&mut self, field: FieldDescriptor) -> Result<(), SchemaError> {
        if self.contains(&field.name) {
            return Err(SchemaError::DuplicateField(field.name));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Apply a programmatic override to one field; returns false when the
    /// field is absent
    pub fn modify(&mut self, name: &str, f: impl FnOnce(&mut FieldDescriptor)) -> bool {
        match self.fields.iter_mut().find(|field| field.name == name) {
            Some(field) => {
                f(field);
                true
            }
            None => false,
        }
    }

    /// Drop a field (e.g. hide a column from a component); returns the
    /// removed descriptor when it existed
    pub fn remove(&mut self, name: &str) -> Option<FieldDescriptor> {
        let index = self.fields.iter().position(|field| field.name == name)?;
        Some(self.fields.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The key field of the catalog, when present
    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.key)
    }

    /// Build schema-derived defaults for a base table and its optional
    /// translation table.
    ///
    /// Base columns come first in introspection order. Translation columns
    /// are appended minus the duplicated primary key; `lang_id` is demoted
    /// from key status, and the remaining translation fields are marked
    /// multilanguage.
    pub fn from_schema(
        base: &TableSchema,
        translation: Option<&TableSchema>,
    ) -> Result<Self, SchemaError> {
        let base_key = base.primary_key()?;
        let mut catalog = FieldCatalog::new();

        for column in &base.columns {
            let descriptor = FieldDescriptor::new(
                &column.name,
                FieldKind::from_sql_type(&column.sql_type),
                &base.name,
            )
            .with_key(column.primary_key)
            .with_required(!column.nullable && !column.primary_key);
            catalog.push(descriptor)?;
        }

        if let Some(translation) = translation {
            if !translation.has_column(LANG_ID_COLUMN) {
                return Err(SchemaError::NotATranslationTable(translation.name.clone()));
            }
            for column in &translation.columns {
                if column.name == base_key.name {
                    continue;
                }
                let descriptor = if column.name == LANG_ID_COLUMN {
                    // Physically part of the composite key, never exposed as one.
                    FieldDescriptor::new(LANG_ID_COLUMN, FieldKind::Int, &translation.name)
                        .with_mode(FieldMode::Read)
                } else {
                    FieldDescriptor::new(
                        &column.name,
                        FieldKind::from_sql_type(&column.sql_type),
                        &translation.name,
                    )
                    .with_multilanguage(true)
                    .with_required(!column.nullable)
                };
                catalog.push(descriptor)?;
            }
        }

        Ok(catalog)
    }

    /// Merge schema-derived fields with declared configuration fields.
    ///
    /// Empty configuration keeps the schema-derived catalog as is. A
    /// non-empty configuration intersects by name: a field survives only
    /// when present on both sides, configuration wins on
    /// kind/mode/title/pattern/default, the schema side keeps
    /// origin/multilanguage/key. An empty intersection is returned as an
    /// empty catalog; falling back to the schema-derived catalog is the
    /// caller's decision.
    pub fn merge(&self, config: &[ConfigField]) -> FieldCatalog {
        if config.is_empty() {
            return self.clone();
        }

        let mut merged = FieldCatalog::new();
        for declared in config {
            let Some(schema_field) = self.get(&declared.name) else {
                tracing::debug!(field = %declared.name, "configured field absent from schema, dropped");
                continue;
            };
            let mut field = schema_field.clone();
            if let Some(kind) = declared.kind {
                field.kind = kind;
            }
            if let Some(mode) = declared.mode {
                field.mode = mode;
            }
            if declared.title.is_some() {
                field.title = declared.title.clone();
            }
            if declared.pattern.is_some() {
                field.pattern = declared.pattern.clone();
            }
            if declared.default_value.is_some() {
                field.default_value = declared.default_value.clone();
            }
            // push cannot fail here: names are unique within self.
            let _ = merged.push(field);
        }
        merged
    }
}

impl<'a> IntoIterator for &'a FieldCatalog {
    type Item = &'a FieldDescriptor;
    type IntoIter = std::slice::Iter<'a, FieldDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
