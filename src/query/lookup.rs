//! Second-pass reference resolution
//!
//! `Value`-kind fields (foreign-key references) and `Multi`-kind fields
//! (many-to-many links) are resolved after the main query with one batched
//! lookup per field per page, never one query per row. Dangling references
//! resolve to a null label.

use std::collections::{HashMap, HashSet};

use serde_json::{Value, json};

use crate::db::Database;
use crate::models::field::{FieldDescriptor, MultiLink, ValueLookup};
use crate::models::{FieldCatalog, FieldKind, Row};
use crate::query::QueryError;
use crate::query::filter::quote_field;

/// Resolve all lookup-backed fields of the catalog across a page of rows
pub fn resolve_lookups(
    db: &Database,
    catalog: &FieldCatalog,
    primary_key: &str,
    rows: &mut [Row],
) -> Result<(), QueryError> {
    if rows.is_empty() {
        return Ok(());
    }
    for field in catalog {
        match field.kind {
            FieldKind::Value => {
                let lookup = field
                    .value_lookup
                    .as_ref()
                    .ok_or_else(|| QueryError::MissingLookup(field.name.clone()))?;
                resolve_value_field(db, field, lookup, rows)?;
            }
            FieldKind::Multi => {
                let link = field
                    .multi_link
                    .as_ref()
                    .ok_or_else(|| QueryError::MissingLookup(field.name.clone()))?;
                resolve_multi_field(db, field, link, primary_key, rows)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn distinct_values(rows: &[Row], field: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut values = Vec::new();
    for row in rows {
        match row.get(field) {
            None | Some(Value::Null) => {}
            Some(value) => {
                if seen.insert(value.to_string()) {
                    values.push(value.clone());
                }
            }
        }
    }
    values
}

fn resolve_value_field(
    db: &Database,
    field: &FieldDescriptor,
    lookup: &ValueLookup,
    rows: &mut [Row],
) -> Result<(), QueryError> {
    let ids = distinct_values(rows, &field.name);
    if ids.is_empty() {
        return Ok(());
    }

    let key = quote_field(&lookup.key_column)?;
    let label = quote_field(&lookup.label_column)?;
    let table = quote_field(&lookup.table)?;
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT {key} AS \"key\", {label} AS \"label\" FROM {table} WHERE {key} IN ({placeholders})"
    );
    tracing::debug!(field = %field.name, batch = ids.len(), "value lookup");
    let resolved = db.query(&sql, &ids)?;

    let mut labels: HashMap<String, Value> = HashMap::new();
    for row in &resolved {
        if let Some(id) = row.get("key") {
            labels.insert(
                id.to_string(),
                row.get("label").cloned().unwrap_or(Value::Null),
            );
        }
    }

    for row in rows {
        let Some(id) = row.get(&field.name).cloned() else {
            continue;
        };
        if id.is_null() {
            continue;
        }
        // Dangling reference: raw id kept, label null.
        let label = labels.get(&id.to_string()).cloned().unwrap_or(Value::Null);
        row.set(&field.name, json!({ "id": id, "label": label }));
    }
    Ok(())
}

fn resolve_multi_field(
    db: &Database,
    field: &FieldDescriptor,
    link: &MultiLink,
    primary_key: &str,
    rows: &mut [Row],
) -> Result<(), QueryError> {
    let keys = distinct_values(rows, primary_key);
    if keys.is_empty() {
        return Ok(());
    }

    let self_column = quote_field(&link.self_column)?;
    let value_column = quote_field(&link.value_column)?;
    let table = quote_field(&link.link_table)?;
    let placeholders = vec!["?"; keys.len()].join(", ");
    let sql = format!(
        "SELECT {self_column} AS \"self_key\", {value_column} AS \"value\" \
         FROM {table} WHERE {self_column} IN ({placeholders})"
    );
    tracing::debug!(field = %field.name, batch = keys.len(), "multi lookup");
    let resolved = db.query(&sql, &keys)?;

    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for row in &resolved {
        if let Some(key) = row.get("self_key") {
            grouped
                .entry(key.to_string())
                .or_default()
                .push(row.get("value").cloned().unwrap_or(Value::Null));
        }
    }

    for row in rows {
        let Some(key) = row.get(primary_key) else {
            continue;
        };
        let values = grouped.get(&key.to_string()).cloned().unwrap_or_default();
        row.set(&field.name, Value::Array(values));
    }
    Ok(())
}
