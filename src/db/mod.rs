//! Connection seam. The metadata engine and executor reach the database only through
//! [`ConnectionProvider`] and [`SqlConnection`], so tests can script them.

pub mod postgres;

pub use postgres::{PgPoolProvider, PgSqlConnection};

use crate::dialect::TableRef;
use crate::sql::Statement;
use async_trait::async_trait;
use serde_json::Value;

/// One result row, keyed by column label in select-list order.
pub type Record = serde_json::Map<String, Value>;

/// Shape of one result column as reported by the driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultColumn {
    pub label: String,
    /// Underlying column name when the driver can resolve it.
    pub column_name: Option<String>,
    /// Owning table; `None` for expressions.
    pub table: Option<TableRef>,
    pub type_name: String,
}

/// A single database connection. A logical request holds one for its whole duration.
#[async_trait]
pub trait SqlConnection: Send {
    /// Result shape of `sql` without fetching rows.
    async fn describe(&mut self, sql: &str) -> Result<Vec<ResultColumn>, sqlx::Error>;
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Record>, sqlx::Error>;
    /// Rows affected.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, sqlx::Error>;
    async fn begin(&mut self) -> Result<(), sqlx::Error>;
    async fn commit(&mut self) -> Result<(), sqlx::Error>;
    async fn rollback(&mut self) -> Result<(), sqlx::Error>;
}

#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Connection for a resource whose tables live in `default_database`.
    async fn acquire(&self, default_database: &str) -> Result<Box<dyn SqlConnection>, sqlx::Error>;
}

fn record_get<'a>(row: &'a Record, key: &str) -> Option<&'a Value> {
    row.get(key).or_else(|| {
        row.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// Catalog cell as text; keys match case-insensitively. Null and missing are `None`.
pub fn record_str(row: &Record, key: &str) -> Option<String> {
    match record_get(row, key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn record_bool(row: &Record, key: &str) -> bool {
    match record_get(row, key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(false),
        _ => false,
    }
}
