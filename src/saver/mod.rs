//! Record validation and persistence
//!
//! Consumes a merged field catalog plus submitted rows, validates them
//! against the declared constraints, and writes base and translation rows
//! in a single transaction. Order-column bookkeeping is delegated to
//! [`OrderColumnManager`].

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use rusqlite::Connection;
use serde_json::{Value, json};
use thiserror::Error;

use crate::db::{Database, DbError, execute_on};
use crate::models::field::FieldDescriptor;
use crate::models::{FieldCatalog, FieldKind, LanguageRegistry, Row};
use crate::order::{OrderColumnManager, OrderError};
use crate::query::filter::quote_field;
use crate::query::{FilterExpression, QueryError};
use crate::schema::{LANG_ID_COLUMN, SchemaCatalog, SchemaError};

/// Submitted data failed catalog-declared constraints.
///
/// Carries one message per offending field; nothing is written when any
/// field fails.
#[derive(Error, Debug)]
#[error("Validation failed for {} field(s)", messages.len())]
pub struct ValidationError {
    pub messages: HashMap<String, String>,
}

impl ValidationError {
    fn from_messages(messages: HashMap<String, String>) -> Option<Self> {
        if messages.is_empty() {
            None
        } else {
            Some(Self { messages })
        }
    }

    /// Get a user-friendly error message for form display
    pub fn user_message(&self) -> String {
        let mut fields: Vec<&String> = self.messages.keys().collect();
        fields.sort_unstable();
        fields
            .iter()
            .map(|field| format!("{field}: {}", self.messages[*field]))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Errors raised by the save path
#[derive(Error, Debug)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Validates and persists submitted rows
pub struct RecordSaver<'a> {
    db: &'a Database,
    schema: &'a SchemaCatalog<'a>,
    languages: &'a LanguageRegistry,
}

impl<'a> RecordSaver<'a> {
    pub fn new(
        db: &'a Database,
        schema: &'a SchemaCatalog<'a>,
        languages: &'a LanguageRegistry,
    ) -> Self {
        Self {
            db,
            schema,
            languages,
        }
    }

    /// Validate one submitted row against the catalog's writable fields.
    ///
    /// `multilanguage` selects which side of the catalog applies: base
    /// fields for the base row, translation fields for translation rows.
    pub fn validate(
        &self,
        catalog: &FieldCatalog,
        row: &Row,
        multilanguage: bool,
    ) -> Result<(), ValidationError> {
        let mut messages = HashMap::new();
        for field in catalog {
            if !field.writable() || field.key || field.multilanguage != multilanguage {
                continue;
            }
            if let Some(message) = validate_value(field, row.get(&field.name)) {
                messages.insert(field.name.clone(), message);
            }
        }
        match ValidationError::from_messages(messages) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Insert a base row plus its translation rows in one transaction.
    ///
    /// When the table has a detected order column and the submitted row
    /// does not set it, the record is appended at the end of the grouping
    /// scope. Returns the primary-key value of the new record.
    pub fn insert(
        &self,
        table: &str,
        catalog: &FieldCatalog,
        base: &Row,
        translations: &[Row],
        group: &FilterExpression,
    ) -> Result<i64, SaveError> {
        self.validate(catalog, base, false)?;
        let mut messages = HashMap::new();
        for translation in translations {
            if let Err(err) = self.validate(catalog, translation, true) {
                messages.extend(err.messages);
            }
            if translation.is_null(LANG_ID_COLUMN) {
                messages.insert(
                    LANG_ID_COLUMN.to_string(),
                    "translation rows must carry a language id".to_string(),
                );
            }
        }
        if let Some(err) = ValidationError::from_messages(messages) {
            return Err(err.into());
        }

        let base_schema = self.schema.columns(table)?;
        let primary_key = base_schema.primary_key()?.name.clone();
        let translation_table = self.schema.translation_table(table)?;
        let order = OrderColumnManager::detect(self.db, self.schema, table)?;

        tracing::debug!(table, translations = translations.len(), "insert record");
        self.db.transaction(|conn| {
            let mut columns: Vec<(String, Value)> = base_field_values(catalog, base, table);
            if let Some(order) = &order {
                if base.is_null(order.column()) {
                    let next = order.next_order_on(conn, group)?;
                    columns.retain(|(name, _)| name != order.column());
                    columns.push((order.column().to_string(), json!(next)));
                }
            }
            if let Some(key_value) = base.get(&primary_key) {
                if !key_value.is_null() {
                    columns.push((primary_key.clone(), key_value.clone()));
                }
            }
            insert_row(conn, table, &columns)?;

            let key = match base.as_i64(&primary_key) {
                Some(key) => key,
                None => conn.last_insert_rowid(),
            };

            if let Some(translation_table) = &translation_table {
                for translation in translations {
                    let lang = translation.as_i64(LANG_ID_COLUMN).unwrap_or_default();
                    if self.languages.get(lang).is_none() {
                        tracing::warn!(lang, "translation row for unknown language, skipped");
                        continue;
                    }
                    let mut columns = translation_field_values(catalog, translation);
                    columns.push((primary_key.clone(), json!(key)));
                    columns.push((LANG_ID_COLUMN.to_string(), json!(lang)));
                    insert_row(conn, translation_table, &columns)?;
                }
            }
            Ok(key)
        })
    }

    /// Update a base row and replace its translation rows in one
    /// transaction. The order column is never touched on update.
    pub fn update(
        &self,
        table: &str,
        catalog: &FieldCatalog,
        key: &Value,
        base: &Row,
        translations: &[Row],
    ) -> Result<(), SaveError> {
        self.validate(catalog, base, false)?;
        for translation in translations {
            self.validate(catalog, translation, true)?;
        }

        let base_schema = self.schema.columns(table)?;
        let primary_key = base_schema.primary_key()?.name.clone();
        let translation_table = self.schema.translation_table(table)?;

        tracing::debug!(table, "update record");
        self.db.transaction(|conn| {
            let columns = base_field_values(catalog, base, table);
            if !columns.is_empty() {
                let assignments = columns
                    .iter()
                    .map(|(name, _)| Ok(format!("{} = ?", quote_field(name)?)))
                    .collect::<Result<Vec<_>, QueryError>>()?
                    .join(", ");
                let mut params: Vec<Value> =
                    columns.iter().map(|(_, value)| value.clone()).collect();
                params.push(key.clone());
                let sql = format!(
                    "UPDATE {} SET {assignments} WHERE {} = ?",
                    quote_field(table)?,
                    quote_field(&primary_key)?
                );
                let affected = execute_on(conn, &sql, &params)?;
                if affected == 0 {
                    return Err(SaveError::RecordNotFound(key.to_string()));
                }
            }

            if let Some(translation_table) = &translation_table {
                for translation in translations {
                    let lang = translation.as_i64(LANG_ID_COLUMN).unwrap_or_default();
                    if self.languages.get(lang).is_none() {
                        continue;
                    }
                    let mut columns = translation_field_values(catalog, translation);
                    columns.push((primary_key.clone(), key.clone()));
                    columns.push((LANG_ID_COLUMN.to_string(), json!(lang)));
                    replace_row(conn, translation_table, &columns)?;
                }
            }
            Ok(())
        })
    }
}

fn base_field_values(catalog: &FieldCatalog, row: &Row, table: &str) -> Vec<(String, Value)> {
    catalog
        .iter()
        .filter(|field| {
            field.writable() && !field.key && !field.multilanguage && field.table_origin == table
        })
        .filter_map(|field| {
            row.get(&field.name)
                .map(|value| (field.name.clone(), value.clone()))
        })
        .collect()
}

fn translation_field_values(catalog: &FieldCatalog, row: &Row) -> Vec<(String, Value)> {
    catalog
        .iter()
        .filter(|field| field.writable() && field.multilanguage)
        .map(|field| {
            (
                field.name.clone(),
                row.get(&field.name).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

fn insert_row(
    conn: &Connection,
    table: &str,
    columns: &[(String, Value)],
) -> Result<(), SaveError> {
    write_row(conn, "INSERT", table, columns)
}

fn replace_row(
    conn: &Connection,
    table: &str,
    columns: &[(String, Value)],
) -> Result<(), SaveError> {
    write_row(conn, "INSERT OR REPLACE", table, columns)
}

fn write_row(
    conn: &Connection,
    verb: &str,
    table: &str,
    columns: &[(String, Value)],
) -> Result<(), SaveError> {
    let names = columns
        .iter()
        .map(|(name, _)| quote_field(name))
        .collect::<Result<Vec<_>, QueryError>>()?
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let params: Vec<Value> = columns.iter().map(|(_, value)| value.clone()).collect();
    let sql = format!(
        "{verb} INTO {} ({names}) VALUES ({placeholders})",
        quote_field(table)?
    );
    execute_on(conn, &sql, &params)?;
    Ok(())
}

/// One message when the value violates the field's declared constraints
fn validate_value(field: &FieldDescriptor, value: Option<&Value>) -> Option<String> {
    let value = match value {
        None | Some(Value::Null) => {
            if field.required {
                return Some("a value is required".to_string());
            }
            return None;
        }
        Some(value) => value,
    };

    let kind_message = match field.kind {
        FieldKind::Int => {
            let ok = value.is_i64()
                || value
                    .as_str()
                    .is_some_and(|s| s.parse::<i64>().is_ok());
            (!ok).then(|| "must be an integer".to_string())
        }
        FieldKind::Float => {
            let ok = value.is_number()
                || value
                    .as_str()
                    .is_some_and(|s| s.parse::<f64>().is_ok());
            (!ok).then(|| "must be a number".to_string())
        }
        FieldKind::Bool => {
            let ok = value.is_boolean() || matches!(value.as_i64(), Some(0) | Some(1));
            (!ok).then(|| "must be a boolean".to_string())
        }
        FieldKind::Date => {
            let ok = value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
            (!ok).then(|| "must be a date (YYYY-MM-DD)".to_string())
        }
        FieldKind::DateTime => {
            let ok = value.as_str().is_some_and(|s| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
                    || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
            });
            (!ok).then(|| "must be a datetime (YYYY-MM-DD HH:MM:SS)".to_string())
        }
        FieldKind::Select => {
            let ok = field.available_values.is_empty() || field.available_values.contains(value);
            (!ok).then(|| "is not one of the allowed values".to_string())
        }
        _ => None,
    };
    if kind_message.is_some() {
        return kind_message;
    }

    if let Some(pattern) = &field.pattern {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(_) => return Some(format!("field pattern is invalid: {pattern}")),
        };
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !regex.is_match(&text) {
            return Some(format!("does not match pattern {pattern}"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::FieldDescriptor;

    fn field(kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor::new("f", kind, "t")
    }

    #[test]
    fn required_fields_reject_missing_and_null() {
        let required = field(FieldKind::String).with_required(true);
        assert!(validate_value(&required, None).is_some());
        assert!(validate_value(&required, Some(&Value::Null)).is_some());
        assert!(validate_value(&required, Some(&json!("x"))).is_none());

        let optional = field(FieldKind::String);
        assert!(validate_value(&optional, None).is_none());
    }

    #[test]
    fn kind_coercion_checks() {
        assert!(validate_value(&field(FieldKind::Int), Some(&json!(3))).is_none());
        assert!(validate_value(&field(FieldKind::Int), Some(&json!("17"))).is_none());
        assert!(validate_value(&field(FieldKind::Int), Some(&json!("abc"))).is_some());
        assert!(validate_value(&field(FieldKind::Bool), Some(&json!(1))).is_none());
        assert!(validate_value(&field(FieldKind::Bool), Some(&json!(2))).is_some());
        assert!(validate_value(&field(FieldKind::Date), Some(&json!("2024-02-29"))).is_none());
        assert!(validate_value(&field(FieldKind::Date), Some(&json!("2023-02-29"))).is_some());
        assert!(
            validate_value(&field(FieldKind::DateTime), Some(&json!("2024-01-01 10:00:00")))
                .is_none()
        );
    }

    #[test]
    fn pattern_and_select_checks() {
        let patterned = field(FieldKind::String).with_pattern("^[a-z]+$");
        assert!(validate_value(&patterned, Some(&json!("abc"))).is_none());
        assert!(validate_value(&patterned, Some(&json!("ABC"))).is_some());

        let mut select = field(FieldKind::Select);
        select.available_values = vec![json!("draft"), json!("live")];
        assert!(validate_value(&select, Some(&json!("draft"))).is_none());
        assert!(validate_value(&select, Some(&json!("gone"))).is_some());
    }
}
