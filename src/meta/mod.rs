//! Metadata graph of a resource: tables, roles, columns and keys discovered from the live schema.
//! Built once by [`engine::introspect`], immutable afterwards.

pub mod engine;
pub mod registry;

pub use engine::introspect;
pub use registry::MetaDataRegistry;

use crate::config::{ResourceDefinition, TableRole};
use crate::dialect::TableRef;
use crate::error::MetaDataError;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Coarse type family of a column, used for literal quoting and value decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Char,
    Numeric,
    Boolean,
    DateTime,
    Binary,
    Other,
}

#[derive(Clone, Debug)]
pub struct ColumnMetaData {
    /// 1-based select-list position; synthetic columns are numbered after the select list.
    pub column_number: usize,
    pub label: String,
    pub column_name: String,
    pub qualified_column_name: String,
    pub table_name: String,
    pub qualified_table_name: String,
    pub database_name: String,
    pub schema_name: Option<String>,
    pub type_name: String,
    pub type_class: TypeClass,
    pub primary_key: bool,
    pub read_only: bool,
    /// Not in the declared query; added to link extension/child writes to their owner.
    pub non_queried_foreign_key: bool,
    pub sequence_name: Option<String>,
}

impl ColumnMetaData {
    pub fn is_sequence(&self) -> bool {
        self.sequence_name.is_some()
    }

    pub fn is_char_or_datetime(&self) -> bool {
        matches!(self.type_class, TypeClass::Char | TypeClass::DateTime)
    }

    /// Whether a request value named `name` addresses this column.
    pub fn answers_to(&self, name: &str) -> bool {
        self.label.eq_ignore_ascii_case(name)
    }

    /// Request text as the JSON value a read of this column would produce. Text that does
    /// not parse for the column's type stays a string.
    pub fn json_value(&self, text: &str) -> Value {
        let typed = match self.type_class {
            TypeClass::Numeric => text.trim().parse::<serde_json::Number>().ok().map(Value::Number),
            TypeClass::Boolean => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Some(Value::Bool(true)),
                "false" | "f" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        };
        typed.unwrap_or_else(|| Value::String(text.to_string()))
    }
}

impl PartialEq for ColumnMetaData {
    fn eq(&self, other: &Self) -> bool {
        self.column_number == other.column_number
            && self.qualified_column_name == other.qualified_column_name
    }
}

impl Eq for ColumnMetaData {}

impl PartialOrd for ColumnMetaData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnMetaData {
    fn cmp(&self, other: &Self) -> Ordering {
        self.column_number
            .cmp(&other.column_number)
            .then_with(|| self.qualified_column_name.cmp(&other.qualified_column_name))
    }
}

#[derive(Clone, Debug)]
pub struct TableMetaData {
    pub database_name: String,
    pub schema_name: Option<String>,
    pub table_name: String,
    pub qualified_table_name: String,
    pub role: TableRole,
    /// Labels of primary-key columns, in key order.
    pub primary_keys: Vec<String>,
    columns: HashMap<String, ColumnMetaData>,
}

impl TableMetaData {
    pub fn new(table: TableRef, qualified_table_name: String, role: TableRole) -> Self {
        TableMetaData {
            database_name: table.database,
            schema_name: table.schema,
            table_name: table.table,
            qualified_table_name,
            role,
            primary_keys: Vec::new(),
            columns: HashMap::new(),
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef {
            database: self.database_name.clone(),
            schema: self.schema_name.clone(),
            table: self.table_name.clone(),
        }
    }

    /// Column by label; exact match first, then case-insensitive.
    pub fn column(&self, label: &str) -> Option<&ColumnMetaData> {
        self.columns
            .get(label)
            .or_else(|| self.columns.values().find(|c| c.answers_to(label)))
    }

    pub(crate) fn column_mut_by_name(&mut self, column_name: &str) -> Option<&mut ColumnMetaData> {
        self.columns
            .values_mut()
            .find(|c| c.column_name.eq_ignore_ascii_case(column_name))
    }

    pub fn add_column(&mut self, column: ColumnMetaData) {
        self.columns.insert(column.label.clone(), column);
    }

    /// All columns ordered by column number.
    pub fn columns(&self) -> Vec<&ColumnMetaData> {
        let mut cols: Vec<_> = self.columns.values().collect();
        cols.sort();
        cols
    }

    pub fn primary_key_columns(&self) -> Vec<&ColumnMetaData> {
        self.primary_keys.iter().filter_map(|l| self.column(l)).collect()
    }
}

#[derive(Clone, Debug)]
pub struct ResourceMetaData {
    pub name: String,
    pub definition: ResourceDefinition,
    tables: Vec<TableMetaData>,
    parent: usize,
    child: Option<usize>,
    join: Option<usize>,
    multiple_databases: bool,
}

impl ResourceMetaData {
    /// Assemble the graph and resolve the special role references.
    pub fn assemble(
        definition: ResourceDefinition,
        tables: Vec<TableMetaData>,
    ) -> Result<Self, MetaDataError> {
        let find = |role: TableRole| tables.iter().position(|t| t.role == role);
        let parent = find(TableRole::Parent).ok_or_else(|| MetaDataError::Shape {
            resource: definition.name.clone(),
            message: "parent table not found in the query's select list".into(),
        })?;
        let child = find(TableRole::Child);
        let join = find(TableRole::Join);
        let databases: HashSet<&str> = tables.iter().map(|t| t.database_name.as_str()).collect();
        let multiple_databases = databases.len() > 1;
        Ok(ResourceMetaData {
            name: definition.name.clone(),
            definition,
            tables,
            parent,
            child,
            join,
            multiple_databases,
        })
    }

    pub fn tables(&self) -> &[TableMetaData] {
        &self.tables
    }

    pub fn parent(&self) -> &TableMetaData {
        &self.tables[self.parent]
    }

    pub fn child(&self) -> Option<&TableMetaData> {
        self.child.map(|i| &self.tables[i])
    }

    pub fn join(&self) -> Option<&TableMetaData> {
        self.join.map(|i| &self.tables[i])
    }

    pub fn is_hierarchical(&self) -> bool {
        self.child.is_some()
    }

    pub fn multiple_databases(&self) -> bool {
        self.multiple_databases
    }

    /// Parent followed by parent extensions.
    pub fn parent_tables(&self) -> Vec<&TableMetaData> {
        let mut out = vec![self.parent()];
        out.extend(self.tables_with_role(TableRole::ParentExtension));
        out
    }

    /// Child followed by child extensions; empty for flat resources.
    pub fn child_tables(&self) -> Vec<&TableMetaData> {
        let mut out = Vec::new();
        if let Some(child) = self.child() {
            out.push(child);
            out.extend(self.tables_with_role(TableRole::ChildExtension));
        }
        out
    }

    pub fn tables_with_role(&self, role: TableRole) -> impl Iterator<Item = &TableMetaData> {
        self.tables.iter().filter(move |t| t.role == role)
    }

    /// First column answering to `label` among `scope`, with its table.
    pub fn find_column<'a>(
        scope: &[&'a TableMetaData],
        label: &str,
    ) -> Option<(&'a TableMetaData, &'a ColumnMetaData)> {
        scope
            .iter()
            .find_map(|t| t.column(label).map(|c| (*t, c)))
    }

    /// Queried columns of all tables ordered by column number.
    pub fn read_columns(&self) -> Vec<&ColumnMetaData> {
        let mut cols: Vec<_> = self
            .tables
            .iter()
            .flat_map(|t| t.columns.values())
            .filter(|c| !c.non_queried_foreign_key)
            .collect();
        cols.sort();
        cols
    }

    /// Queried columns of the given tables ordered by column number.
    pub fn read_columns_of(tables: &[&TableMetaData]) -> Vec<ColumnMetaData> {
        let mut cols: Vec<ColumnMetaData> = tables
            .iter()
            .flat_map(|t| t.columns.values())
            .filter(|c| !c.non_queried_foreign_key)
            .cloned()
            .collect();
        cols.sort();
        cols
    }

    /// Declared output name; `alias` stands in for either specific alias.
    fn declared_alias(&self, table: &TableMetaData, row_set: bool) -> Option<String> {
        let declared = self.definition.tables_with_role(table.role).next()?;
        let specific = if row_set {
            &declared.row_set_alias
        } else {
            &declared.row_alias
        };
        specific.clone().or_else(|| declared.alias.clone())
    }

    /// Key under which child records are nested.
    pub fn child_row_set_name(&self) -> Option<String> {
        self.child()
            .map(|c| self.declared_alias(c, true).unwrap_or_else(|| c.table_name.clone()))
    }

    pub fn parent_row_set_name(&self) -> String {
        self.declared_alias(self.parent(), true)
            .unwrap_or_else(|| self.parent().table_name.clone())
    }

    /// Element name for one parent record.
    pub fn parent_row_name(&self) -> String {
        self.declared_alias(self.parent(), false)
            .unwrap_or_else(|| self.parent().table_name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn column(type_class: TypeClass) -> ColumnMetaData {
        ColumnMetaData {
            column_number: 1,
            label: "c".into(),
            column_name: "c".into(),
            qualified_column_name: "public.t.c".into(),
            table_name: "t".into(),
            qualified_table_name: "sakila.public.t".into(),
            database_name: "sakila".into(),
            schema_name: Some("public".into()),
            type_name: String::new(),
            type_class,
            primary_key: false,
            read_only: false,
            non_queried_foreign_key: false,
            sequence_name: None,
        }
    }

    #[test]
    fn request_text_takes_the_column_type() {
        let numeric = column(TypeClass::Numeric);
        assert_eq!(numeric.json_value("48"), json!(48));
        assert_eq!(numeric.json_value("4.99"), json!(4.99));
        assert_eq!(numeric.json_value("n/a"), json!("n/a"));
        let boolean = column(TypeClass::Boolean);
        assert_eq!(boolean.json_value("t"), json!(true));
        assert_eq!(boolean.json_value("false"), json!(false));
        assert_eq!(column(TypeClass::Char).json_value("48"), json!("48"));
        assert_eq!(column(TypeClass::DateTime).json_value("2006-02-15"), json!("2006-02-15"));
    }
}
