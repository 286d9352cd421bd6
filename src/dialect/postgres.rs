use super::{default_type_class, split_declared, CatalogColumn, Dialect, TableRef};
use crate::meta::{ColumnMetaData, TypeClass};
use crate::sql::{Statement, StatementBuilder};
use regex::Regex;
use std::sync::OnceLock;

const DEFAULT_SCHEMA: &str = "public";

#[derive(Clone, Copy, Debug, Default)]
pub struct PostgresDialect;

fn nextval_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)nextval\('([^']+)'").ok()).as_ref()
}

impl PostgresDialect {
    fn schema<'a>(&self, table: &'a TableRef) -> &'a str {
        table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn qualified_table_name(&self, table: &TableRef) -> String {
        format!("{}.{}.{}", table.database, self.schema(table), table.table)
    }

    /// Postgres cannot address another database in DML; schema-qualify only.
    fn write_table_name(&self, table: &TableRef) -> String {
        format!("{}.{}", self.schema(table), table.table)
    }

    fn column_reference(&self, column: &ColumnMetaData, multiple_databases: bool) -> String {
        match (&column.schema_name, multiple_databases) {
            (Some(schema), true) => {
                format!("{}.{}.{}", schema, column.table_name, column.column_name)
            }
            _ => format!("{}.{}", column.table_name, column.column_name),
        }
    }

    fn primary_keys_query(&self, table: &TableRef) -> Statement {
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT kcu.column_name::text AS column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
             ON kcu.constraint_schema = tc.constraint_schema \
             AND kcu.constraint_name = tc.constraint_name \
             AND kcu.table_name = tc.table_name \
             WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema::text = ",
        )
        .text_param(self.schema(table))
        .push(" AND tc.table_name::text = ")
        .text_param(&table.table)
        .push(" ORDER BY kcu.ordinal_position");
        b.finish()
    }

    fn columns_query(&self, table: &TableRef) -> Statement {
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT column_name::text AS column_name, udt_name::text AS type_name, \
             column_default::text AS column_default, (is_identity = 'YES') AS is_identity \
             FROM information_schema.columns WHERE table_schema::text = ",
        )
        .text_param(self.schema(table))
        .push(" AND table_name::text = ")
        .text_param(&table.table)
        .push(" ORDER BY ordinal_position");
        b.finish()
    }

    fn join_table_query(&self, declared_name: &str, _default_database: &str) -> Statement {
        let (schema, table) = split_declared(declared_name);
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT table_catalog::text AS table_catalog, table_schema::text AS table_schema, \
             table_name::text AS table_name FROM information_schema.tables \
             WHERE lower(table_name::text) = lower(",
        )
        .text_param(table)
        .push(")");
        if let Some(schema) = schema {
            b.push(" AND lower(table_schema::text) = lower(")
                .text_param(schema)
                .push(")");
        }
        b.push(" ORDER BY (table_schema::text = current_schema()) DESC LIMIT 1");
        b.finish()
    }

    fn sequence_name(&self, table: &TableRef, column: &CatalogColumn) -> Option<String> {
        if let Some(default) = &column.default {
            if let Some(caps) = nextval_re().and_then(|re| re.captures(default)) {
                return Some(caps[1].to_string());
            }
        }
        if column.auto_increment {
            return Some(format!("{}_{}_seq", table.table, column.name));
        }
        None
    }

    /// Enums, domains and arrays need quoting in literal SQL.
    fn type_class(&self, type_name: &str) -> TypeClass {
        match default_type_class(type_name) {
            TypeClass::Other => TypeClass::Char,
            class => class,
        }
    }

    fn placeholder(&self, index: usize, type_name: Option<&str>) -> String {
        match type_name {
            Some(t) if !t.is_empty() => format!("${}::{}", index, t.to_ascii_lowercase()),
            _ => format!("${}", index),
        }
    }

    fn returning_clause(&self, columns: &[&str]) -> Option<String> {
        if columns.is_empty() {
            None
        } else {
            Some(format!(" RETURNING {}", columns.join(", ")))
        }
    }
}
