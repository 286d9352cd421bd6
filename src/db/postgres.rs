//! PostgreSQL connection and pool provider.

use super::{ConnectionProvider, Record, ResultColumn, SqlConnection};
use crate::dialect::{Dialect, PostgresDialect, TableRef};
use crate::sql::{PgBindValue, Statement};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Postgres, Row, TypeInfo};
use std::collections::HashMap;

const COLUMN_ORIGIN_SQL: &str = "SELECT current_database()::text, n.nspname::text, c.relname::text, a.attname::text \
     FROM pg_catalog.pg_attribute a \
     JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
     JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE a.attrelid = $1 AND a.attnum = $2";

pub struct PgSqlConnection {
    conn: PoolConnection<Postgres>,
    in_transaction: bool,
}

impl PgSqlConnection {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        PgSqlConnection {
            conn,
            in_transaction: false,
        }
    }

    /// Owning table and underlying column of a result column.
    async fn column_origin(&mut self, relation: Oid, attribute: i16) -> Result<Option<(TableRef, String)>, sqlx::Error> {
        let row = sqlx::query_as::<_, (String, String, String, String)>(COLUMN_ORIGIN_SQL)
            .bind(relation)
            .bind(attribute)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(row.map(|(database, schema, table, column)| {
            (
                TableRef {
                    database,
                    schema: Some(schema),
                    table,
                },
                column,
            )
        }))
    }

    fn bind_all<'q>(
        statement: &'q Statement,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        let mut query = sqlx::query(statement.sql());
        for p in statement.params() {
            query = query.bind(PgBindValue::from_json(p));
        }
        query
    }
}

impl Drop for PgSqlConnection {
    fn drop(&mut self) {
        // never hand an open transaction back to the pool
        if self.in_transaction {
            self.conn.close_on_drop();
        }
    }
}

#[async_trait]
impl SqlConnection for PgSqlConnection {
    async fn describe(&mut self, sql: &str) -> Result<Vec<ResultColumn>, sqlx::Error> {
        let described: Vec<(String, String, Option<Oid>, Option<i16>)> = {
            let stmt = (&mut *self.conn).prepare(sql).await?;
            sqlx::Statement::columns(&stmt)
                .iter()
                .map(|c| {
                    (
                        c.name().to_string(),
                        c.type_info().name().to_string(),
                        c.relation_id(),
                        c.relation_attribute_no(),
                    )
                })
                .collect()
        };
        let mut origins: HashMap<(Oid, i16), Option<(TableRef, String)>> = HashMap::new();
        let mut out = Vec::with_capacity(described.len());
        for (label, type_name, relation, attribute) in described {
            let origin = match (relation, attribute) {
                (Some(rel), Some(att)) if att > 0 => {
                    if !origins.contains_key(&(rel, att)) {
                        let found = self.column_origin(rel, att).await?;
                        origins.insert((rel, att), found);
                    }
                    origins.get(&(rel, att)).cloned().flatten()
                }
                _ => None,
            };
            let (table, column_name) = match origin {
                Some((t, c)) => (Some(t), Some(c)),
                None => (None, None),
            };
            out.push(ResultColumn {
                label,
                column_name,
                table,
                type_name,
            });
        }
        Ok(out)
    }

    async fn query(&mut self, statement: &Statement) -> Result<Vec<Record>, sqlx::Error> {
        let rows = Self::bind_all(statement).fetch_all(&mut *self.conn).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64, sqlx::Error> {
        let done = Self::bind_all(statement).execute(&mut *self.conn).await?;
        Ok(done.rows_affected())
    }

    async fn begin(&mut self) -> Result<(), sqlx::Error> {
        (&mut *self.conn).execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        (&mut *self.conn).execute("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        (&mut *self.conn).execute("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }
}

/// One pool for every resource. A Postgres connection is bound to one database, so
/// `default_database` names the catalog the pool already points at.
#[derive(Clone)]
pub struct PgPoolProvider {
    pool: PgPool,
}

impl PgPoolProvider {
    pub fn new(pool: PgPool) -> Self {
        PgPoolProvider { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Whether statements built by `dialect` can run on this provider's connections.
    pub fn supports(dialect: &dyn Dialect) -> bool {
        dialect.name() == PostgresDialect.name()
    }
}

#[async_trait]
impl ConnectionProvider for PgPoolProvider {
    async fn acquire(&self, _default_database: &str) -> Result<Box<dyn SqlConnection>, sqlx::Error> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSqlConnection::new(conn)))
    }
}

fn row_to_record(row: &PgRow) -> Record {
    let mut map = Record::new();
    for (i, col) in row.columns().iter().enumerate() {
        map.insert(col.name().to_string(), cell_to_value(row, i));
    }
    map
}

fn cell_to_value(row: &PgRow, i: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i16>, _>(i) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(i) {
        return v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<sqlx::types::Decimal>, _>(i) {
        return v
            .and_then(|d| d.to_string().parse::<serde_json::Number>().ok())
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(i) {
        return v.map(|u| Value::String(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
        return v.map(|d| Value::String(d.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(i) {
        return v
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(i) {
        return v
            .map(|t| Value::String(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Value>, _>(i) {
        return v.unwrap_or(Value::Null);
    }
    // enums and text domains arrive as their label bytes
    row.try_get_unchecked::<Option<String>, _>(i)
        .ok()
        .flatten()
        .map(Value::String)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::dialect_for;

    #[test]
    fn only_postgres_statements_run_on_the_pool() {
        for name in ["postgres", "postgresql", "pg"] {
            let dialect = dialect_for(name).unwrap();
            assert!(PgPoolProvider::supports(dialect.as_ref()), "{}", name);
        }
        for name in ["mysql", "oracle"] {
            let dialect = dialect_for(name).unwrap();
            assert!(!PgPoolProvider::supports(dialect.as_ref()), "{}", name);
        }
    }
}
