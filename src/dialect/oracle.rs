use super::{split_declared, trim_query, CatalogColumn, Dialect, TableRef};
use crate::db::{record_str, Record};
use crate::sql::{Statement, StatementBuilder};
use regex::Regex;
use std::sync::OnceLock;

/// Oracle: the owner plays the database role; catalog names are upper case.
#[derive(Clone, Copy, Debug, Default)]
pub struct OracleDialect;

fn seq_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)([\w"$.]+)\.nextval"#).ok()).as_ref()
}

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn probe_query(&self, base_query: &str) -> String {
        format!("SELECT * FROM ({}) WHERE ROWNUM = 1", trim_query(base_query))
    }

    fn qualified_table_name(&self, table: &TableRef) -> String {
        format!("{}.{}", table.database, table.table)
    }

    fn primary_keys_query(&self, table: &TableRef) -> Statement {
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT cols.column_name AS column_name FROM all_constraints cons \
             JOIN all_cons_columns cols ON cons.constraint_name = cols.constraint_name \
             AND cons.owner = cols.owner \
             WHERE cons.constraint_type = 'P' AND cons.owner = ",
        )
        .text_param(&table.database.to_uppercase())
        .push(" AND cols.table_name = ")
        .text_param(&table.table.to_uppercase())
        .push(" ORDER BY cols.position");
        b.finish()
    }

    fn columns_query(&self, table: &TableRef) -> Statement {
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT column_name AS column_name, data_type AS type_name, \
             data_default AS column_default, identity_column AS extra \
             FROM all_tab_columns WHERE owner = ",
        )
        .text_param(&table.database.to_uppercase())
        .push(" AND table_name = ")
        .text_param(&table.table.to_uppercase())
        .push(" ORDER BY column_id");
        b.finish()
    }

    fn join_table_query(&self, declared_name: &str, default_database: &str) -> Statement {
        let (owner, table) = split_declared(declared_name);
        let mut b = StatementBuilder::new(self);
        b.push("SELECT owner AS table_catalog, table_name AS table_name FROM all_tables WHERE table_name = ")
            .text_param(&table.to_uppercase())
            .push(" AND owner = ")
            .text_param(&owner.unwrap_or(default_database).to_uppercase());
        b.finish()
    }

    fn read_table_ref(&self, row: &Record) -> Option<TableRef> {
        Some(TableRef {
            database: record_str(row, "table_catalog")?,
            schema: None,
            table: record_str(row, "table_name")?,
        })
    }

    fn read_catalog_column(&self, row: &Record) -> Option<CatalogColumn> {
        Some(CatalogColumn {
            name: record_str(row, "column_name")?,
            type_name: record_str(row, "type_name").unwrap_or_default(),
            default: record_str(row, "column_default"),
            auto_increment: record_str(row, "extra")
                .map(|e| e.eq_ignore_ascii_case("yes"))
                .unwrap_or(false),
        })
    }

    fn sequence_name(&self, _table: &TableRef, column: &CatalogColumn) -> Option<String> {
        if let Some(default) = &column.default {
            if let Some(caps) = seq_re().and_then(|re| re.captures(default)) {
                return Some(caps[1].replace('"', ""));
            }
        }
        column.auto_increment.then(|| column.name.clone())
    }

    fn placeholder(&self, index: usize, _type_name: Option<&str>) -> String {
        format!(":{}", index)
    }

    fn limit_clause(&self, limit: u64, offset: u64) -> String {
        format!(" OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }
}
