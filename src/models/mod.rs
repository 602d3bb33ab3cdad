//! Data models: field metadata, catalogs, rows, languages

pub mod catalog;
pub mod config;
pub mod field;
pub mod language;
pub mod row;

pub use catalog::FieldCatalog;
pub use config::ConfigField;
pub use field::{FieldDescriptor, FieldKind, FieldMode, MultiLink, ValueLookup};
pub use language::{Language, LanguageRegistry};
pub use row::Row;
