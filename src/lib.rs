//! Data Access SDK - Generic multilingual data-access layer
//!
//! Provides the building blocks admin grid and form components sit on:
//! - Live schema introspection with translation-table detection
//! - Field catalogs merging schema, configuration and runtime overrides
//! - Typed filter/sort/paging composition into parameterized SQL
//! - Multilingual queries with per-language row fan-out
//! - Dense order-column maintenance (insert/delete/swap/move)
//! - Record validation and transactional persistence

pub mod db;
pub mod models;
pub mod order;
pub mod query;
pub mod saver;
pub mod schema;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use models::{
    ConfigField, FieldCatalog, FieldDescriptor, FieldKind, FieldMode, Language, LanguageRegistry,
    MultiLink, Row, ValueLookup,
};
pub use order::{MoveTarget, OrderColumnManager, OrderColumnSpec, OrderError, SwapDirection};
pub use query::{
    DataSetQuery, Direction, FilterExpression, LanguageMode, Pager, Predicate, QueryError,
    SortSpec, TrustedSql,
};
pub use saver::{RecordSaver, SaveError, ValidationError};
pub use schema::{
    ColumnInfo, ForeignKeyRef, LANG_ID_COLUMN, SchemaCatalog, SchemaError, TRANSLATION_SUFFIX,
    TableSchema,
};
