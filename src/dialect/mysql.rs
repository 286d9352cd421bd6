use super::{split_declared, CatalogColumn, Dialect, TableRef};
use crate::db::{record_str, Record};
use crate::meta::{ColumnMetaData, TypeClass};
use crate::sql::{Statement, StatementBuilder};

/// MySQL/MariaDB: the catalog "schema" is the database; tables are `db.table`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn qualified_table_name(&self, table: &TableRef) -> String {
        format!("{}.{}", table.database, table.table)
    }

    fn primary_keys_query(&self, table: &TableRef) -> Statement {
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT column_name AS column_name FROM information_schema.key_column_usage \
             WHERE constraint_name = 'PRIMARY' AND table_schema = ",
        )
        .text_param(&table.database)
        .push(" AND table_name = ")
        .text_param(&table.table)
        .push(" ORDER BY ordinal_position");
        b.finish()
    }

    fn columns_query(&self, table: &TableRef) -> Statement {
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT column_name AS column_name, data_type AS type_name, \
             column_default AS column_default, extra AS extra \
             FROM information_schema.columns WHERE table_schema = ",
        )
        .text_param(&table.database)
        .push(" AND table_name = ")
        .text_param(&table.table)
        .push(" ORDER BY ordinal_position");
        b.finish()
    }

    fn join_table_query(&self, declared_name: &str, default_database: &str) -> Statement {
        let (database, table) = split_declared(declared_name);
        let mut b = StatementBuilder::new(self);
        b.push(
            "SELECT table_schema AS table_catalog, table_name AS table_name \
             FROM information_schema.tables WHERE table_name = ",
        )
        .text_param(table)
        .push(" AND table_schema = ")
        .text_param(database.unwrap_or(default_database));
        b.finish()
    }

    fn read_table_ref(&self, row: &Record) -> Option<TableRef> {
        Some(TableRef {
            database: record_str(row, "table_catalog")?,
            schema: None,
            table: record_str(row, "table_name")?,
        })
    }

    fn sequence_name(&self, _table: &TableRef, column: &CatalogColumn) -> Option<String> {
        column.auto_increment.then(|| column.name.clone())
    }

    /// YEAR is reported as a date type but carries a plain integer.
    fn adjust_column(&self, column: &mut ColumnMetaData) {
        if column.type_name.eq_ignore_ascii_case("year") {
            column.type_class = TypeClass::Numeric;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::default_type_class;

    #[test]
    fn two_part_names() {
        let t = TableRef {
            database: "sakila".into(),
            schema: None,
            table: "film".into(),
        };
        assert_eq!(MySqlDialect.qualified_table_name(&t), "sakila.film");
        assert_eq!(MySqlDialect.write_table_name(&t), "sakila.film");
    }

    #[test]
    fn auto_increment_is_a_sequence() {
        let row: Record = serde_json::from_value(serde_json::json!({
            "column_name": "film_id",
            "type_name": "smallint",
            "column_default": null,
            "extra": "auto_increment"
        }))
        .unwrap();
        let col = MySqlDialect.read_catalog_column(&row).unwrap();
        assert!(col.auto_increment);
        let t = TableRef {
            database: "sakila".into(),
            schema: None,
            table: "film".into(),
        };
        assert_eq!(MySqlDialect.sequence_name(&t, &col), Some("film_id".into()));
    }

    #[test]
    fn year_is_numeric() {
        let mut col = ColumnMetaData {
            column_number: 1,
            label: "release_year".into(),
            column_name: "release_year".into(),
            qualified_column_name: "film.release_year".into(),
            table_name: "film".into(),
            qualified_table_name: "sakila.film".into(),
            database_name: "sakila".into(),
            schema_name: None,
            type_name: "YEAR".into(),
            type_class: default_type_class("YEAR"),
            primary_key: false,
            read_only: false,
            non_queried_foreign_key: false,
            sequence_name: None,
        };
        assert_eq!(col.type_class, TypeClass::DateTime);
        MySqlDialect.adjust_column(&mut col);
        assert_eq!(col.type_class, TypeClass::Numeric);
    }
}
