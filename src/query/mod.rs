//! Query construction: filters, sorting, paging and the multilingual
//! dataset query itself.

pub mod builder;
pub mod filter;
pub mod lookup;
pub mod sort;

use thiserror::Error;

use crate::db::DbError;
use crate::schema::SchemaError;

pub use builder::{DataSetQuery, LanguageMode};
pub use filter::{FilterExpression, Predicate, TrustedSql};
pub use sort::{Direction, Pager, SortSpec};

/// Errors raised while composing or executing queries
#[derive(Error, Debug)]
pub enum QueryError {
    /// Field or table reference that is not a valid identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Escape-hatch fragment rejected by the SQL vetting pass
    #[error("Untrusted SQL fragment rejected: {0}")]
    UntrustedFragment(String),

    /// A lookup declaration is incomplete for the field kind
    #[error("Field {0} has no lookup declaration")]
    MissingLookup(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Db(#[from] DbError),
}
