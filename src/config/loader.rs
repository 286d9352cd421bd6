//! Load resource definitions and privileges from JSON files on disk.

use crate::config::{validate, ResourceDefinition};
use crate::error::DefinitionError;
use serde::Deserialize;
use std::path::Path;

/// Parse and validate one definition. `name` overrides any name inside the document.
pub fn parse_definition(name: &str, json: &str) -> Result<ResourceDefinition, DefinitionError> {
    let mut def: ResourceDefinition =
        serde_json::from_str(json).map_err(|e| DefinitionError::Load(format!("{}: {}", name, e)))?;
    def.name = name.to_string();
    validate(&def)?;
    Ok(def)
}

/// Load every `*.json` file in `dir` as a resource definition named after the file stem.
pub async fn load_definitions(dir: &Path) -> Result<Vec<ResourceDefinition>, DefinitionError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DefinitionError::Load(format!("{}: {}", dir.display(), e)))?;
    let mut defs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DefinitionError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DefinitionError::Load(format!("{}: {}", path.display(), e)))?;
        let def = parse_definition(name, &text)?;
        tracing::debug!(resource = %def.name, tables = def.tables.len(), "loaded definition");
        defs.push(def);
    }
    defs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(defs)
}

/// One privilege: `role` may run `method` (SELECT/INSERT/UPDATE/DELETE) on `resource`. `*` matches anything.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Privilege {
    pub role: String,
    pub resource: String,
    pub method: String,
}

pub async fn load_privileges(path: &Path) -> Result<Vec<Privilege>, DefinitionError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DefinitionError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| DefinitionError::Load(format!("{}: {}", path.display(), e)))
}
