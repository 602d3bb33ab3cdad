//! Filter expressions
//!
//! A closed set of typed predicates composed into a parameterized WHERE
//! clause. The legacy raw-string filter survives only as the [`TrustedSql`]
//! escape hatch, which vets the fragment with `sqlparser` before accepting
//! it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::QueryError;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// Validate a bare (unqualified) identifier
pub fn validate_identifier(name: &str) -> Result<(), QueryError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote a field reference, optionally table-qualified (`table.column`)
pub fn quote_field(reference: &str) -> Result<String, QueryError> {
    let parts: Vec<&str> = reference.split('.').collect();
    if parts.len() > 2 {
        return Err(QueryError::InvalidIdentifier(reference.to_string()));
    }
    for part in &parts {
        validate_identifier(part)?;
    }
    Ok(parts
        .iter()
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

/// A pre-vetted SQL fragment usable as a verbatim predicate.
///
/// The constructor rejects fragments that do not parse as a single boolean
/// expression; it is still the caller's responsibility to never build one
/// from unfiltered request input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedSql(String);

impl TrustedSql {
    pub fn checked(fragment: &str) -> Result<Self, QueryError> {
        let fragment = fragment.trim();
        if fragment.is_empty() || fragment.contains(';') {
            return Err(QueryError::UntrustedFragment(fragment.to_string()));
        }
        let probe = format!("SELECT 1 WHERE {fragment}");
        let statements = Parser::parse_sql(&GenericDialect {}, &probe)
            .map_err(|err| QueryError::UntrustedFragment(format!("{fragment}: {err}")))?;
        if statements.len() != 1 {
            return Err(QueryError::UntrustedFragment(fragment.to_string()));
        }
        Ok(Self(fragment.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One condition of a filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field = value`; a NULL value composes to `IS NULL`
    Eq(String, Value),
    /// `field IN (...)`; an empty list matches nothing
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
    /// Inclusive range
    Range {
        field: String,
        low: Value,
        high: Value,
    },
    Like(String, String),
    /// Escape hatch for pre-vetted fragments
    Verbatim(TrustedSql),
}

/// Conjunction of predicates; insertion order does not affect semantics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterExpression {
    predicates: Vec<Predicate>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    /// Convenience for the most common condition
    pub fn eq(mut self, field: &str, value: Value) -> Self {
        self.predicates.push(Predicate::Eq(field.to_string(), value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Compose into `(where_sql, params)`.
    ///
    /// `where_sql` is `None` for an empty filter, otherwise the ANDed
    /// condition list without the `WHERE` keyword. Values are returned as
    /// positional parameters in clause order.
    pub fn compose(&self) -> Result<(Option<String>, Vec<Value>), QueryError> {
        if self.predicates.is_empty() {
            return Ok((None, Vec::new()));
        }

        let mut clauses = Vec::with_capacity(self.predicates.len());
        let mut params = Vec::new();
        for predicate in &self.predicates {
            match predicate {
                Predicate::Eq(field, value) => {
                    let field = quote_field(field)?;
                    if value.is_null() {
                        clauses.push(format!("{field} IS NULL"));
                    } else {
                        clauses.push(format!("{field} = ?"));
                        params.push(value.clone());
                    }
                }
                Predicate::In(field, values) => {
                    let field = quote_field(field)?;
                    if values.is_empty() {
                        clauses.push("0 = 1".to_string());
                    } else {
                        let placeholders = vec!["?"; values.len()].join(", ");
                        clauses.push(format!("{field} IN ({placeholders})"));
                        params.extend(values.iter().cloned());
                    }
                }
                Predicate::IsNull(field) => {
                    clauses.push(format!("{} IS NULL", quote_field(field)?));
                }
                Predicate::NotNull(field) => {
                    clauses.push(format!("{} IS NOT NULL", quote_field(field)?));
                }
                Predicate::Range { field, low, high } => {
                    clauses.push(format!("{} BETWEEN ? AND ?", quote_field(field)?));
                    params.push(low.clone());
                    params.push(high.clone());
                }
                Predicate::Like(field, pattern) => {
                    clauses.push(format!("{} LIKE ?", quote_field(field)?));
                    params.push(Value::String(pattern.clone()));
                }
                Predicate::Verbatim(fragment) => {
                    clauses.push(format!("({})", fragment.as_str()));
                }
            }
        }
        Ok((Some(clauses.join(" AND ")), params))
    }
}

impl FromIterator<Predicate> for FilterExpression {
    fn from_iter<I: IntoIterator<Item = Predicate>>(iter: I) -> Self {
        Self {
            predicates: iter.into_iter().collect(),
        }
    }
}
