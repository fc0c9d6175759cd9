//! Query execution against the monitored database.
//!
//! See [`Connection`] for details.

use std::sync::Arc;

/// Boxed error of the underlying database driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One raw column value as returned by the database.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Any integer or bit column.
    Int(i64),
    /// Any floating point or decimal column.
    Float(f64),
    /// Any character column.
    Text(String),
    /// A column type the exporter does not interpret, by SQL type name.
    Unsupported(&'static str),
}

impl Value {
    /// Numeric interpretation of the value. Text is accepted when it parses
    /// as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null | Value::Unsupported(_) => None,
        }
    }

    /// Short name of the value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Unsupported(name) => name,
        }
    }
}

/// One result row, columns in select order.
pub type Row = Vec<Value>;

/// A handle to the monitored database.
///
/// Calls are synchronous and issue exactly one statement each. Implementations
/// own whatever pooling or reconnection the driver needs; callers never retry.
pub trait Connection: std::fmt::Debug + Send + Sync + 'static {
    /// Lightweight connectivity check.
    fn ping(&self) -> Result<(), QueryError>;

    /// Runs `sql` and returns every row of its first result set.
    fn query(&self, sql: &str) -> Result<Vec<Row>, QueryError>;
}

impl<C: Connection> Connection for Arc<C> {
    fn ping(&self) -> Result<(), QueryError> {
        (**self).ping()
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>, QueryError> {
        (**self).query(sql)
    }
}

/// Errors returned by a [`Connection`].
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// No connection could be established, or it broke mid-statement.
    #[error("database unavailable: {0}")]
    Unavailable(#[source] BoxError),
    /// The database rejected the statement or its result could not be read.
    #[error("query failed: {0}")]
    Failed(#[source] BoxError),
}
