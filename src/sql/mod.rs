//! Safe SQL assembly: identifiers from metadata only, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;

use crate::dialect::Dialect;
use crate::meta::ColumnMetaData;
use serde_json::Value;

/// A finished statement: parameterized text, its ordered parameters, and a literal
/// rendering with values inlined (for logs and diagnostics only).
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    literal_sql: String,
}

impl Statement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn literal_sql(&self) -> &str {
        &self.literal_sql
    }
}

enum Fragment {
    Sql(String),
    Param {
        value: String,
        quoted: bool,
        type_name: Option<String>,
    },
}

/// Accumulates fragments in order; consumed by [`StatementBuilder::finish`].
pub struct StatementBuilder<'d> {
    dialect: &'d dyn Dialect,
    fragments: Vec<Fragment>,
}

impl<'d> StatementBuilder<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        StatementBuilder {
            dialect,
            fragments: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        match self.fragments.last_mut() {
            Some(Fragment::Sql(s)) => s.push_str(sql),
            _ => self.fragments.push(Fragment::Sql(sql.to_string())),
        }
        self
    }

    /// Value bound for `column`; quoting and placeholder casts follow the column's type.
    pub fn param(&mut self, value: &str, column: &ColumnMetaData) -> &mut Self {
        self.fragments.push(Fragment::Param {
            value: value.to_string(),
            quoted: column.is_char_or_datetime(),
            type_name: Some(column.type_name.clone()),
        });
        self
    }

    /// Untyped text value, e.g. a catalog lookup key.
    pub fn text_param(&mut self, value: &str) -> &mut Self {
        self.fragments.push(Fragment::Param {
            value: value.to_string(),
            quoted: true,
            type_name: None,
        });
        self
    }

    pub fn finish(self) -> Statement {
        let mut sql = String::new();
        let mut literal_sql = String::new();
        let mut params = Vec::new();
        for fragment in self.fragments {
            match fragment {
                Fragment::Sql(s) => {
                    sql.push_str(&s);
                    literal_sql.push_str(&s);
                }
                Fragment::Param {
                    value,
                    quoted,
                    type_name,
                } => {
                    params.push(Value::String(value.clone()));
                    sql.push_str(&self.dialect.placeholder(params.len(), type_name.as_deref()));
                    if quoted {
                        literal_sql.push('\'');
                        literal_sql.push_str(&value.replace('\'', "''"));
                        literal_sql.push('\'');
                    } else {
                        literal_sql.push_str(&value);
                    }
                }
            }
        }
        Statement {
            sql,
            params,
            literal_sql,
        }
    }
}
