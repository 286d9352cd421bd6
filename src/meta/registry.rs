//! Process-wide metadata cache: one graph per resource, built on first use.

use super::{introspect, ResourceMetaData};
use crate::config::{validate, ResourceDefinition};
use crate::db::SqlConnection;
use crate::dialect::Dialect;
use crate::error::{AppError, DefinitionError};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Arc<ResourceMetaData>>>;

pub struct MetaDataRegistry {
    definitions: HashMap<String, ResourceDefinition>,
    dialect: Arc<dyn Dialect>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl MetaDataRegistry {
    /// Validates every definition up front.
    pub fn new(
        definitions: Vec<ResourceDefinition>,
        dialect: Arc<dyn Dialect>,
    ) -> Result<Self, DefinitionError> {
        let mut by_name = HashMap::with_capacity(definitions.len());
        for def in definitions {
            validate(&def)?;
            by_name.insert(def.name.clone(), def);
        }
        Ok(MetaDataRegistry {
            definitions: by_name,
            dialect,
            slots: RwLock::new(HashMap::new()),
        })
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn definition(&self, name: &str) -> Option<&ResourceDefinition> {
        self.definitions.get(name)
    }

    /// Resource names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Graph if already built.
    pub fn cached(&self, name: &str) -> Option<Arc<ResourceMetaData>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(name).and_then(|s| s.get().cloned())
    }

    fn slot(&self, name: &str) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Graph for `name`, introspecting over `conn` on first use. Concurrent first callers
    /// wait for one build; a failed build is retried by the next caller.
    pub async fn get(
        &self,
        name: &str,
        conn: &mut dyn SqlConnection,
    ) -> Result<Arc<ResourceMetaData>, AppError> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("resource {}", name)))?;
        let slot = self.slot(name);
        let dialect = self.dialect.as_ref();
        let meta = slot
            .get_or_try_init(|| async move {
                introspect(definition, conn, dialect).await.map(Arc::new)
            })
            .await?;
        Ok(meta.clone())
    }
}
