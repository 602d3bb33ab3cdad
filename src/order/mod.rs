//! Dense order-column maintenance
//!
//! Keeps an integer ordering column contiguous (`1..N`, no gaps, no
//! duplicates) within a grouping scope under insert, delete, swap and move
//! operations. Every multi-statement mutation runs inside one transaction;
//! a failing step rolls the whole mutation back.

use rusqlite::Connection;
use serde_json::{Value, json};
use thiserror::Error;

use crate::db::{Database, DbError, execute_on, opt_scalar_i64_on, query_on};
use crate::query::filter::quote_field;
use crate::query::{FilterExpression, QueryError};
use crate::schema::{SchemaCatalog, SchemaError};

/// Non-fatal and fatal failures of order mutations
#[derive(Error, Debug)]
pub enum OrderError {
    /// The requested move has no valid neighbor or target; a no-op for the
    /// caller, not a crash
    #[error("Cannot move record: {0}")]
    CannotMove(String),

    #[error("Record not found in ordering scope: {0}")]
    RecordNotFound(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl OrderError {
    /// Get a user-friendly error message for component output
    pub fn user_message(&self) -> String {
        match self {
            OrderError::CannotMove(_) => {
                "The record is already at the edge of its list and cannot be moved further."
                    .to_string()
            }
            OrderError::RecordNotFound(key) => format!("Record {key} no longer exists."),
            _ => self.to_string(),
        }
    }
}

/// Explicit declaration of the order column for a table.
///
/// Preferred over name-substring discovery, which exists for migration
/// compatibility only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderColumnSpec {
    pub column: String,
}

impl OrderColumnSpec {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
        }
    }
}

/// Swap direction relative to the current position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    Up,
    Down,
}

/// Target of a [`OrderColumnManager::move_to`] operation
#[derive(Debug, Clone, PartialEq)]
pub enum MoveTarget {
    First,
    Last,
    /// Directly above the record with the given key
    Above(Value),
    /// Directly below the record with the given key
    Below(Value),
}

/// Maintains the order column of one table
pub struct OrderColumnManager<'a> {
    db: &'a Database,
    table: String,
    column: String,
    primary_key: String,
}

impl<'a> OrderColumnManager<'a> {
    /// Build a manager for an explicitly declared order column
    pub fn new(
        db: &'a Database,
        schema: &SchemaCatalog,
        table: &str,
        spec: OrderColumnSpec,
    ) -> Result<Self, OrderError> {
        let table_schema = schema.columns(table)?;
        if !table_schema.has_column(&spec.column) {
            return Err(OrderError::Schema(SchemaError::ColumnNotFound {
                table: table.to_string(),
                column: spec.column,
            }));
        }
        let primary_key = table_schema.primary_key()?.name.clone();
        Ok(Self {
            db,
            table: table.to_string(),
            column: spec.column,
            primary_key,
        })
    }

    /// Probe the table for its order column; `None` when the table has no
    /// order column at all
    pub fn detect(
        db: &'a Database,
        schema: &SchemaCatalog,
        table: &str,
    ) -> Result<Option<Self>, OrderError> {
        let table_schema = schema.columns(table)?;
        let Some(column) = table_schema.discover_order_column()? else {
            return Ok(None);
        };
        let spec = OrderColumnSpec::new(&column.name);
        Ok(Some(Self::new(db, schema, table, spec)?))
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Order value for a record appended at the end of the group
    pub fn next_order(&self, group: &FilterExpression) -> Result<i64, OrderError> {
        self.next_order_on(self.db.conn(), group)
    }

    /// Transaction-scoped variant of [`Self::next_order`], for callers that
    /// assign the value inside their own insert transaction
    pub fn next_order_on(
        &self,
        conn: &Connection,
        group: &FilterExpression,
    ) -> Result<i64, OrderError> {
        let (scope, params) = self.scope(group, None)?;
        let sql = format!(
            "SELECT MAX({}) FROM {}{scope}",
            self.quoted_column()?,
            self.quoted_table()?
        );
        let max = opt_scalar_i64_on(conn, &sql, &params)?.unwrap_or(0);
        Ok(max + 1)
    }

    /// Shift trailing siblings up by one to open the given position for a
    /// positional insert. Must run inside the same transaction as the
    /// insert itself.
    pub fn make_room_on(
        &self,
        conn: &Connection,
        group: &FilterExpression,
        position: i64,
    ) -> Result<(), OrderError> {
        let column = self.quoted_column()?;
        let (scope, mut params) = self.scope(group, Some(format!("{column} >= ?")))?;
        params.push(json!(position));
        let sql = format!(
            "UPDATE {} SET {column} = {column} + 1{scope}",
            self.quoted_table()?
        );
        execute_on(conn, &sql, &params)?;
        Ok(())
    }

    /// Delete a record and close the gap it leaves, in one transaction
    pub fn delete(&self, group: &FilterExpression, key: &Value) -> Result<(), OrderError> {
        tracing::debug!(table = %self.table, "ordered delete");
        self.db.transaction(|conn| {
            let removed = self.order_of_on(conn, group, key)?;
            let (scope, mut params) = self.scope(group, Some(format!(
                "{} = ?",
                self.quoted_primary_key()?
            )))?;
            params.push(key.clone());
            let sql = format!("DELETE FROM {}{scope}", self.quoted_table()?);
            execute_on(conn, &sql, &params)?;
            self.compact_on(conn, group, removed)
        })
    }

    /// Shift siblings above a removed order value down by one. Must run
    /// inside the same transaction as the removal.
    pub fn compact_on(
        &self,
        conn: &Connection,
        group: &FilterExpression,
        removed_order: i64,
    ) -> Result<(), OrderError> {
        let column = self.quoted_column()?;
        let (scope, mut params) = self.scope(group, Some(format!("{column} > ?")))?;
        params.push(json!(removed_order));
        let sql = format!(
            "UPDATE {} SET {column} = {column} - 1{scope}",
            self.quoted_table()?
        );
        execute_on(conn, &sql, &params)?;
        Ok(())
    }

    /// Exchange order values with the nearest neighbor in the given
    /// direction; [`OrderError::CannotMove`] when the record is already at
    /// the edge of its group.
    pub fn swap(
        &self,
        group: &FilterExpression,
        key: &Value,
        direction: SwapDirection,
    ) -> Result<(), OrderError> {
        tracing::debug!(table = %self.table, ?direction, "order swap");
        self.db.transaction(|conn| {
            let current = self.order_of_on(conn, group, key)?;
            let column = self.quoted_column()?;
            let (comparison, ordering) = match direction {
                SwapDirection::Up => ("<", "DESC"),
                SwapDirection::Down => (">", "ASC"),
            };
            let (scope, mut params) =
                self.scope(group, Some(format!("{column} {comparison} ?")))?;
            params.push(json!(current));
            let sql = format!(
                "SELECT {} AS \"key\", {column} AS \"ord\" FROM {}{scope} ORDER BY {column} {ordering} LIMIT 1",
                self.quoted_primary_key()?,
                self.quoted_table()?
            );
            let neighbors = query_on(conn, &sql, &params)?;
            let Some(neighbor) = neighbors.first() else {
                return Err(OrderError::CannotMove(format!(
                    "no neighbor {} of record {key}",
                    match direction {
                        SwapDirection::Up => "above",
                        SwapDirection::Down => "below",
                    }
                )));
            };
            let neighbor_key = neighbor.get("key").cloned().unwrap_or(Value::Null);
            let neighbor_order = neighbor.as_i64("ord").unwrap_or(current);

            self.set_order_on(conn, key, neighbor_order)?;
            self.set_order_on(conn, &neighbor_key, current)?;
            Ok(())
        })
    }

    /// Move a record to an absolute or relative position, keeping the
    /// group's order values contiguous, in one transaction
    pub fn move_to(
        &self,
        group: &FilterExpression,
        key: &Value,
        target: MoveTarget,
    ) -> Result<(), OrderError> {
        tracing::debug!(table = %self.table, ?target, "order move");
        self.db.transaction(|conn| {
            let current = self.order_of_on(conn, group, key)?;
            let new_position = match &target {
                MoveTarget::First => self.bound_on(conn, group, "MIN")?,
                MoveTarget::Last => self.bound_on(conn, group, "MAX")?,
                MoveTarget::Above(other) => {
                    let anchor = self.order_of_on(conn, group, other)?;
                    if anchor == current {
                        return Err(OrderError::CannotMove(
                            "record cannot be moved relative to itself".to_string(),
                        ));
                    }
                    if current < anchor { anchor - 1 } else { anchor }
                }
                MoveTarget::Below(other) => {
                    let anchor = self.order_of_on(conn, group, other)?;
                    if anchor == current {
                        return Err(OrderError::CannotMove(
                            "record cannot be moved relative to itself".to_string(),
                        ));
                    }
                    if current > anchor { anchor + 1 } else { anchor }
                }
            };
            if new_position == current {
                return Ok(());
            }

            let column = self.quoted_column()?;
            if new_position < current {
                let (scope, mut params) = self.scope(
                    group,
                    Some(format!("{column} >= ? AND {column} < ?")),
                )?;
                params.push(json!(new_position));
                params.push(json!(current));
                let sql = format!(
                    "UPDATE {} SET {column} = {column} + 1{scope}",
                    self.quoted_table()?
                );
                execute_on(conn, &sql, &params)?;
            } else {
                let (scope, mut params) = self.scope(
                    group,
                    Some(format!("{column} > ? AND {column} <= ?")),
                )?;
                params.push(json!(current));
                params.push(json!(new_position));
                let sql = format!(
                    "UPDATE {} SET {column} = {column} - 1{scope}",
                    self.quoted_table()?
                );
                execute_on(conn, &sql, &params)?;
            }
            self.set_order_on(conn, key, new_position)
        })
    }

    fn order_of_on(
        &self,
        conn: &Connection,
        group: &FilterExpression,
        key: &Value,
    ) -> Result<i64, OrderError> {
        let (scope, mut params) = self.scope(group, Some(format!(
            "{} = ?",
            self.quoted_primary_key()?
        )))?;
        params.push(key.clone());
        let sql = format!(
            "SELECT {} FROM {}{scope}",
            self.quoted_column()?,
            self.quoted_table()?
        );
        opt_scalar_i64_on(conn, &sql, &params)?
            .ok_or_else(|| OrderError::RecordNotFound(key.to_string()))
    }

    fn bound_on(
        &self,
        conn: &Connection,
        group: &FilterExpression,
        aggregate: &str,
    ) -> Result<i64, OrderError> {
        let (scope, params) = self.scope(group, None)?;
        let sql = format!(
            "SELECT {aggregate}({}) FROM {}{scope}",
            self.quoted_column()?,
            self.quoted_table()?
        );
        opt_scalar_i64_on(conn, &sql, &params)?
            .ok_or_else(|| OrderError::CannotMove("ordering scope is empty".to_string()))
    }

    fn set_order_on(
        &self,
        conn: &Connection,
        key: &Value,
        order: i64,
    ) -> Result<(), OrderError> {
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            self.quoted_table()?,
            self.quoted_column()?,
            self.quoted_primary_key()?
        );
        execute_on(conn, &sql, &[json!(order), key.clone()])?;
        Ok(())
    }

    /// Compose the grouping filter plus an optional extra clause into a
    /// ` WHERE ...` suffix; parameters for the extra clause are appended by
    /// the caller after the group parameters.
    fn scope(
        &self,
        group: &FilterExpression,
        extra: Option<String>,
    ) -> Result<(String, Vec<Value>), OrderError> {
        let (group_sql, params) = group.compose()?;
        let mut clauses: Vec<String> = Vec::new();
        if let Some(group_sql) = group_sql {
            clauses.push(group_sql);
        }
        if let Some(extra) = extra {
            clauses.push(extra);
        }
        if clauses.is_empty() {
            Ok((String::new(), params))
        } else {
            Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
        }
    }

    fn quoted_table(&self) -> Result<String, OrderError> {
        Ok(quote_field(&self.table)?)
    }

    fn quoted_column(&self) -> Result<String, OrderError> {
        Ok(quote_field(&self.column)?)
    }

    fn quoted_primary_key(&self) -> Result<String, OrderError> {
        Ok(quote_field(&self.primary_key)?)
    }
}
