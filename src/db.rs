//! Embedded database wrapper
//!
//! Thin wrapper around a `rusqlite::Connection` giving the rest of the crate
//! a uniform surface: JSON-valued parameters, JSON-valued result rows, and a
//! single transaction primitive that every multi-statement mutation goes
//! through.

use base64::{Engine as _, engine::general_purpose};
use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;

use crate::models::Row;

/// Errors raised by the database layer
#[derive(Error, Debug)]
pub enum DbError {
    /// Driver-level error (connection, statement, constraint, ...)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A value could not be bound as a SQL parameter
    #[error("Unsupported parameter value: {0}")]
    UnsupportedParameter(String),
}

/// Connection handle shared by the catalog, the query builder and the
/// order-column manager.
pub struct Database {
    conn: Connection,
    path: Option<String>,
}

impl Database {
    /// Open or create a database file at the given path
    pub fn open(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, path: None })
    }

    /// Get the database path (if not in-memory)
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Run a batch of semicolon-separated statements (DDL, fixtures)
    pub fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Execute a single statement, returning the number of affected rows
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        execute_on(&self.conn, sql, params)
    }

    /// Execute a query and return the result set as [`Row`]s
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        query_on(&self.conn, sql, params)
    }

    /// Execute a query expected to yield a single integer (COUNT, MAX, ...)
    pub fn query_scalar_i64(&self, sql: &str, params: &[Value]) -> Result<i64, DbError> {
        scalar_i64_on(&self.conn, sql, params)
    }

    /// Rowid of the most recent successful INSERT on this connection
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Borrow the underlying connection for non-transactional reads
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Install or remove a statement trace callback (diagnostics, query
    /// counting in tests)
    pub fn trace(&mut self, trace_fn: Option<fn(&str)>) {
        self.conn.trace(trace_fn);
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// The closure receives the underlying connection; statements issued
    /// through [`execute_on`] / [`query_on`] inside the closure are part of
    /// the transaction. The original error is re-thrown after rollback.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(DbError::Database)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(DbError::Database)?;
                Ok(value)
            }
            Err(err) => {
                // Dropping the transaction rolls it back; surface the cause.
                drop(tx);
                Err(err)
            }
        }
    }
}

/// Execute a statement against a borrowed connection (usable inside
/// [`Database::transaction`] closures).
pub fn execute_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize, DbError> {
    let bound = bind_params(params)?;
    let affected = conn.execute(sql, rusqlite::params_from_iter(bound))?;
    Ok(affected)
}

/// Query rows against a borrowed connection.
pub fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
    let bound = bind_params(params)?;
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(bound))?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        let mut out = Row::new();
        for (i, name) in column_names.iter().enumerate() {
            let value: rusqlite::types::Value = row.get(i)?;
            out.set(name, sql_to_json(value));
        }
        results.push(out);
    }
    Ok(results)
}

/// Query a single integer value against a borrowed connection.
pub fn scalar_i64_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<i64, DbError> {
    let bound = bind_params(params)?;
    let value = conn.query_row(sql, rusqlite::params_from_iter(bound), |row| row.get(0))?;
    Ok(value)
}

/// Query a single optional integer value (no rows maps to `None`).
pub fn opt_scalar_i64_on(
    conn: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Option<i64>, DbError> {
    let bound = bind_params(params)?;
    match conn.query_row(sql, rusqlite::params_from_iter(bound), |row| {
        row.get::<_, Option<i64>>(0)
    }) {
        Ok(value) => Ok(value),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(DbError::Database(err)),
    }
}

fn bind_params(params: &[Value]) -> Result<Vec<rusqlite::types::Value>, DbError> {
    params.iter().map(json_to_sql).collect()
}

/// Convert a JSON value into a bindable SQLite value
fn json_to_sql(value: &Value) -> Result<rusqlite::types::Value, DbError> {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Ok(Sql::Null),
        Value::Bool(b) => Ok(Sql::Integer(if *b { 1 } else { 0 })),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Sql::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Sql::Real(f))
            } else {
                Err(DbError::UnsupportedParameter(n.to_string()))
            }
        }
        Value::String(s) => Ok(Sql::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => {
            Err(DbError::UnsupportedParameter(value.to_string()))
        }
    }
}

/// Convert a SQLite value into its JSON representation
fn sql_to_json(value: rusqlite::types::Value) -> Value {
    use rusqlite::types::Value as Sql;
    match value {
        Sql::Null => Value::Null,
        Sql::Integer(i) => Value::Number(i.into()),
        Sql::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Sql::Text(s) => Value::String(s),
        Sql::Blob(bytes) => Value::String(general_purpose::STANDARD.encode(bytes)),
    }
}
