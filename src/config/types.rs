//! Raw resource definition types, as read from `<resource>.json`.

use serde::{Deserialize, Serialize};

/// Role a declared table plays in a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableRole {
    Parent,
    ParentExtension,
    Child,
    ChildExtension,
    Join,
    /// Present in the query but not declared.
    Unknown,
}

impl TableRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableRole::Parent => "Parent",
            TableRole::ParentExtension => "ParentExtension",
            TableRole::Child => "Child",
            TableRole::ChildExtension => "ChildExtension",
            TableRole::Join => "Join",
            TableRole::Unknown => "Unknown",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDeclaration {
    /// Simple (`film`), schema-qualified (`public.film`) or fully qualified name.
    pub name: String,
    pub role: TableRole,
    /// Output name used where no row or row-set alias is declared.
    #[serde(default)]
    pub alias: Option<String>,
    /// Element name for one row of this table in serialized output.
    #[serde(default)]
    pub row_alias: Option<String>,
    /// Element name for a set of rows of this table in serialized output.
    #[serde(default)]
    pub row_set_alias: Option<String>,
}

impl TableDeclaration {
    pub fn new(name: impl Into<String>, role: TableRole) -> Self {
        TableDeclaration {
            name: name.into(),
            role,
            alias: None,
            row_alias: None,
            row_set_alias: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Filled from the file stem when loaded from a directory.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub default_database: String,
    #[serde(default)]
    pub tables: Vec<TableDeclaration>,
}

impl ResourceDefinition {
    pub fn tables_with_role(&self, role: TableRole) -> impl Iterator<Item = &TableDeclaration> {
        self.tables.iter().filter(move |t| t.role == role)
    }

    pub fn first_with_role(&self, role: TableRole) -> Option<&TableDeclaration> {
        self.tables_with_role(role).next()
    }

    /// Declared role for a table, matching qualified name before `schema.table` before simple name.
    pub fn role_of(&self, qualified: &str, schema_qualified: Option<&str>, simple: &str) -> TableRole {
        let candidates = [Some(qualified), schema_qualified, Some(simple)];
        for candidate in candidates.into_iter().flatten() {
            if let Some(t) = self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(candidate)) {
                return t.role;
            }
        }
        TableRole::Unknown
    }
}
