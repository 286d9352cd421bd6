//! Per-database capability set used by the metadata engine and the SQL builder.
//!
//! Everything that differs between databases lives behind [`Dialect`]: catalog queries,
//! name qualification, type classification, sequence detection, placeholder and limit
//! syntax, and driver quirks. The engine and builder are written once against it.

mod mysql;
mod oracle;
mod postgres;

pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

use crate::db::{record_bool, record_str, Record};
use crate::meta::{ColumnMetaData, TypeClass};
use crate::sql::Statement;
use std::fmt;
use std::sync::Arc;

/// Location of a table in the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub schema: Option<String>,
    pub table: String,
}

/// One row of a columns catalog query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub type_name: String,
    pub default: Option<String>,
    pub auto_increment: bool,
}

pub trait Dialect: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Base query constrained to at most one row, used only for its shape.
    fn probe_query(&self, base_query: &str) -> String {
        format!("{} LIMIT 1 OFFSET 0", trim_query(base_query))
    }

    fn qualified_table_name(&self, table: &TableRef) -> String;

    /// Table name used as the target of INSERT/UPDATE/DELETE.
    fn write_table_name(&self, table: &TableRef) -> String {
        self.qualified_table_name(table)
    }

    /// Column reference inside predicates and ORDER BY of the base query.
    fn column_reference(&self, column: &ColumnMetaData, multiple_databases: bool) -> String {
        if multiple_databases {
            format!(
                "{}.{}.{}",
                column.database_name, column.table_name, column.column_name
            )
        } else {
            format!("{}.{}", column.table_name, column.column_name)
        }
    }

    /// Rows with a `column_name` field, in key order.
    fn primary_keys_query(&self, table: &TableRef) -> Statement;

    /// Rows with `column_name`, `type_name`, `column_default` and `is_identity` or `extra`.
    fn columns_query(&self, table: &TableRef) -> Statement;

    /// Rows with `table_catalog`, optional `table_schema`, and `table_name` for a declared name.
    fn join_table_query(&self, declared_name: &str, default_database: &str) -> Statement;

    fn read_table_ref(&self, row: &Record) -> Option<TableRef> {
        Some(TableRef {
            database: record_str(row, "table_catalog")?,
            schema: record_str(row, "table_schema"),
            table: record_str(row, "table_name")?,
        })
    }

    fn read_catalog_column(&self, row: &Record) -> Option<CatalogColumn> {
        let extra = record_str(row, "extra").unwrap_or_default();
        Some(CatalogColumn {
            name: record_str(row, "column_name")?,
            type_name: record_str(row, "type_name").unwrap_or_default(),
            default: record_str(row, "column_default"),
            auto_increment: record_bool(row, "is_identity")
                || extra.to_ascii_lowercase().contains("auto_increment"),
        })
    }

    /// Sequence feeding the column, if its value is generated.
    fn sequence_name(&self, table: &TableRef, column: &CatalogColumn) -> Option<String>;

    fn type_class(&self, type_name: &str) -> TypeClass {
        default_type_class(type_name)
    }

    /// Driver quirk hook applied to every introspected column.
    fn adjust_column(&self, _column: &mut ColumnMetaData) {}

    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, _index: usize, _type_name: Option<&str>) -> String {
        "?".to_string()
    }

    fn limit_clause(&self, limit: u64, offset: u64) -> String {
        format!(" LIMIT {} OFFSET {}", limit, offset)
    }

    /// Clause returning generated columns from an INSERT, where supported.
    fn returning_clause(&self, _columns: &[&str]) -> Option<String> {
        None
    }
}

/// Dialect by configured name.
pub fn dialect_for(name: &str) -> Option<Arc<dyn Dialect>> {
    match name.to_ascii_lowercase().as_str() {
        "postgres" | "postgresql" | "pg" => Some(Arc::new(PostgresDialect)),
        "mysql" | "mariadb" => Some(Arc::new(MySqlDialect)),
        "oracle" => Some(Arc::new(OracleDialect)),
        _ => None,
    }
}

pub(crate) fn trim_query(q: &str) -> &str {
    q.trim().trim_end_matches(';').trim_end()
}

/// Split `db.schema.table`, `schema.table` or `table` into (qualifier, table).
pub(crate) fn split_declared(declared: &str) -> (Option<&str>, &str) {
    match declared.rsplit_once('.') {
        Some((qualifier, table)) => {
            let qualifier = qualifier.rsplit('.').next().unwrap_or(qualifier);
            (Some(qualifier), table)
        }
        None => (None, declared),
    }
}

pub fn default_type_class(type_name: &str) -> TypeClass {
    let lower = type_name.to_ascii_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c == ' ')
        .next()
        .unwrap_or("");
    match base {
        "char" | "character" | "varchar" | "bpchar" | "text" | "name" | "citext" | "nchar"
        | "nvarchar" | "varchar2" | "nvarchar2" | "clob" | "nclob" | "tinytext"
        | "mediumtext" | "longtext" | "uuid" | "json" | "jsonb" | "xml" | "enum" | "set"
        | "string" => TypeClass::Char,
        "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "datetime" | "interval"
        | "year" => TypeClass::DateTime,
        "int" | "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "serial4" | "serial8" | "bigserial" | "smallserial"
        | "numeric" | "decimal" | "number" | "float" | "float4" | "float8" | "real"
        | "double" | "money" | "oid" => TypeClass::Numeric,
        "bool" | "boolean" | "bit" => TypeClass::Boolean,
        "bytea" | "blob" | "binary" | "varbinary" | "tinyblob" | "mediumblob" | "longblob"
        | "raw" => TypeClass::Binary,
        _ => TypeClass::Other,
    }
}
