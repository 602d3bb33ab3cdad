//! Live schema catalog
//!
//! Reads per-table column metadata from the database and caches it for the
//! life of the catalog. The catalog is the single source of truth for
//! primary keys, translation-table detection and order-column discovery.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::json;
use thiserror::Error;

use crate::db::{Database, DbError};
use crate::query::filter::validate_identifier;

/// Column name shared by every translation table
pub const LANG_ID_COLUMN: &str = "lang_id";

/// Naming convention linking a base table to its translation table
pub const TRANSLATION_SUFFIX: &str = "_translation";

/// Developer-facing schema errors; never recovered locally
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    #[error("Table {0} has no primary key")]
    NoPrimaryKey(String),

    #[error("Table {0} has a composite primary key; a single key column is required")]
    CompositePrimaryKey(String),

    #[error("Table {0} looks like a translation table but has no {LANG_ID_COLUMN} column")]
    NotATranslationTable(String),

    #[error("Table {table} has more than one order column candidate: {candidates:?}")]
    AmbiguousOrderColumn {
        table: String,
        candidates: Vec<String>,
    },

    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Foreign-key reference of a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// Introspected metadata for one column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub foreign_key: Option<ForeignKeyRef>,
}

/// Introspected metadata for one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The single primary-key column of the table.
    ///
    /// Zero or multiple key columns are developer errors; translation
    /// tables (whose physical key is composite) are handled by callers that
    /// know the base table's key.
    pub fn primary_key(&self) -> Result<&ColumnInfo, SchemaError> {
        let mut keys = self.columns.iter().filter(|column| column.primary_key);
        match (keys.next(), keys.next()) {
            (Some(key), None) => Ok(key),
            (None, _) => Err(SchemaError::NoPrimaryKey(self.name.clone())),
            (Some(_), Some(_)) => Err(SchemaError::CompositePrimaryKey(self.name.clone())),
        }
    }

    /// Probe for the order column by the `_order_num` naming convention.
    ///
    /// Exactly one candidate is required; multiple matches are rejected
    /// rather than silently taking the first. Prefer an explicit
    /// [`OrderColumnSpec`](crate::order::OrderColumnSpec) over this probe.
    pub fn discover_order_column(&self) -> Result<Option<&ColumnInfo>, SchemaError> {
        let candidates: Vec<&ColumnInfo> = self
            .columns
            .iter()
            .filter(|column| column.name.contains("_order_num"))
            .collect();
        match candidates.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only)),
            many => Err(SchemaError::AmbiguousOrderColumn {
                table: self.name.clone(),
                candidates: many.iter().map(|column| column.name.clone()).collect(),
            }),
        }
    }
}

/// Cached, read-only view of the live database schema.
///
/// Lookups hit the database once per table and are cached for the life of
/// the catalog instance (a request in the typical deployment).
pub struct SchemaCatalog<'a> {
    db: &'a Database,
    cache: RefCell<HashMap<String, Rc<TableSchema>>>,
}

impl<'a> SchemaCatalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Whether a table exists in the database
    pub fn table_exists(&self, table: &str) -> Result<bool, SchemaError> {
        if self.cache.borrow().contains_key(table) {
            return Ok(true);
        }
        let count = self.db.query_scalar_i64(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[json!(table)],
        )?;
        Ok(count > 0)
    }

    /// Column metadata for a table; fails when the table does not exist
    pub fn columns(&self, table: &str) -> Result<Rc<TableSchema>, SchemaError> {
        if let Some(schema) = self.cache.borrow().get(table) {
            return Ok(Rc::clone(schema));
        }
        let schema = Rc::new(self.introspect(table)?);
        self.cache
            .borrow_mut()
            .insert(table.to_string(), Rc::clone(&schema));
        Ok(schema)
    }

    /// The translation table paired with `table`, when one exists.
    ///
    /// Detection follows the `<table>_translation` naming convention; a
    /// table matching the convention but lacking `lang_id` is a schema
    /// error, not a silent miss.
    pub fn translation_table(&self, table: &str) -> Result<Option<String>, SchemaError> {
        let candidate = format!("{table}{TRANSLATION_SUFFIX}");
        if !self.table_exists(&candidate)? {
            return Ok(None);
        }
        let schema = self.columns(&candidate)?;
        if !schema.has_column(LANG_ID_COLUMN) {
            return Err(SchemaError::NotATranslationTable(candidate));
        }
        Ok(Some(candidate))
    }

    fn introspect(&self, table: &str) -> Result<TableSchema, SchemaError> {
        validate_identifier(table)
            .map_err(|_| SchemaError::InvalidTableName(table.to_string()))?;
        if !self.table_exists(table)? {
            return Err(SchemaError::TableNotFound(table.to_string()));
        }

        // PRAGMA arguments cannot be parameterized; the name is validated above.
        let info = self
            .db
            .query(&format!("PRAGMA table_info(\"{table}\")"), &[])?;
        let fk_rows = self
            .db
            .query(&format!("PRAGMA foreign_key_list(\"{table}\")"), &[])?;

        let mut foreign_keys: HashMap<String, ForeignKeyRef> = HashMap::new();
        for fk in &fk_rows {
            if let (Some(from), Some(target)) = (fk.as_str("from"), fk.as_str("table")) {
                foreign_keys.insert(
                    from.to_string(),
                    ForeignKeyRef {
                        table: target.to_string(),
                        column: fk.as_str("to").unwrap_or("id").to_string(),
                    },
                );
            }
        }

        let columns = info
            .iter()
            .map(|row| {
                let name = row.as_str("name").unwrap_or_default().to_string();
                let foreign_key = foreign_keys.get(&name).cloned();
                ColumnInfo {
                    sql_type: row.as_str("type").unwrap_or_default().to_string(),
                    nullable: row.as_i64("notnull").unwrap_or(0) == 0,
                    primary_key: row.as_i64("pk").unwrap_or(0) > 0,
                    foreign_key,
                    name,
                }
            })
            .collect();

        tracing::debug!(table, "introspected table schema");
        Ok(TableSchema {
            name: table.to_string(),
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Database {
        let db = Database::memory().unwrap();
        db.execute_batch(
            "CREATE TABLE pages (
                 page_id INTEGER PRIMARY KEY,
                 page_name TEXT NOT NULL,
                 page_order_num INTEGER
             );
             CREATE TABLE pages_translation (
                 page_id INTEGER NOT NULL,
                 lang_id INTEGER NOT NULL,
                 page_title TEXT,
                 PRIMARY KEY (page_id, lang_id)
             );
             CREATE TABLE tags (tag_id INTEGER PRIMARY KEY, tag_name TEXT);
             CREATE TABLE posts (
                 post_id INTEGER PRIMARY KEY,
                 tag_id INTEGER REFERENCES tags (tag_id)
             );
             CREATE TABLE broken_translation (id INTEGER PRIMARY KEY);
             CREATE TABLE broken (id INTEGER PRIMARY KEY);",
        )
        .unwrap();
        db
    }

    #[test]
    fn columns_reads_names_types_and_keys() {
        let db = fixture();
        let catalog = SchemaCatalog::new(&db);
        let schema = catalog.columns("pages").unwrap();
        assert_eq!(schema.columns.len(), 3);
        let pk = schema.primary_key().unwrap();
        assert_eq!(pk.name, "page_id");
        assert!(!schema.column("page_name").unwrap().nullable);
        assert!(schema.column("page_order_num").unwrap().nullable);
    }

    #[test]
    fn missing_table_is_an_error() {
        let db = fixture();
        let catalog = SchemaCatalog::new(&db);
        assert!(matches!(
            catalog.columns("nope"),
            Err(SchemaError::TableNotFound(_))
        ));
    }

    #[test]
    fn composite_primary_key_is_rejected() {
        let db = fixture();
        let catalog = SchemaCatalog::new(&db);
        let schema = catalog.columns("pages_translation").unwrap();
        assert!(matches!(
            schema.primary_key(),
            Err(SchemaError::CompositePrimaryKey(_))
        ));
    }

    #[test]
    fn translation_table_detection() {
        let db = fixture();
        let catalog = SchemaCatalog::new(&db);
        assert_eq!(
            catalog.translation_table("pages").unwrap(),
            Some("pages_translation".to_string())
        );
        assert_eq!(catalog.translation_table("tags").unwrap(), None);
        assert!(matches!(
            catalog.translation_table("broken"),
            Err(SchemaError::NotATranslationTable(_))
        ));
    }

    #[test]
    fn foreign_keys_are_attached() {
        let db = fixture();
        let catalog = SchemaCatalog::new(&db);
        let schema = catalog.columns("posts").unwrap();
        let fk = schema.column("tag_id").unwrap().foreign_key.clone().unwrap();
        assert_eq!(fk.table, "tags");
        assert_eq!(fk.column, "tag_id");
    }

    #[test]
    fn order_column_discovery_requires_uniqueness() {
        let db = fixture();
        db.execute_batch(
            "CREATE TABLE dup (id INTEGER PRIMARY KEY, a_order_num INTEGER, b_order_num INTEGER);",
        )
        .unwrap();
        let catalog = SchemaCatalog::new(&db);

        let pages = catalog.columns("pages").unwrap();
        assert_eq!(
            pages.discover_order_column().unwrap().map(|c| c.name.as_str()),
            Some("page_order_num")
        );

        let tags = catalog.columns("tags").unwrap();
        assert!(tags.discover_order_column().unwrap().is_none());

        let dup = catalog.columns("dup").unwrap();
        assert!(matches!(
            dup.discover_order_column(),
            Err(SchemaError::AmbiguousOrderColumn { .. })
        ));
    }
}
