//! Resource definition validation: structural invariants only.

use crate::config::{ResourceDefinition, TableRole};
use crate::error::DefinitionError;

pub fn validate(def: &ResourceDefinition) -> Result<(), DefinitionError> {
    if def.query.trim().is_empty() {
        return Err(DefinitionError::MissingQuery(def.name.clone()));
    }
    if def.tables.is_empty() {
        return Err(DefinitionError::MissingTables(def.name.clone()));
    }

    let count = |role: TableRole| def.tables_with_role(role).count();

    let parents = count(TableRole::Parent);
    if parents != 1 {
        return Err(DefinitionError::ParentCount {
            resource: def.name.clone(),
            count: parents,
        });
    }
    for role in [TableRole::Child, TableRole::Join] {
        let n = count(role);
        if n > 1 {
            return Err(DefinitionError::TooMany {
                resource: def.name.clone(),
                role: role.as_str(),
                count: n,
            });
        }
    }
    if count(TableRole::Child) == 0 {
        for role in [TableRole::Join, TableRole::ChildExtension] {
            if count(role) > 0 {
                return Err(DefinitionError::OrphanRole {
                    resource: def.name.clone(),
                    role: role.as_str(),
                });
            }
        }
    }
    Ok(())
}
