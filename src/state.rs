//! Shared application state for all routes.

use crate::config::Settings;
use crate::response::SerializerRegistry;
use crate::service::ResourceService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ResourceService>,
    pub serializers: Arc<SerializerRegistry>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(service: ResourceService, settings: Settings) -> Self {
        AppState {
            service: Arc::new(service),
            serializers: Arc::new(SerializerRegistry::default()),
            settings: Arc::new(settings),
        }
    }

    pub fn with_serializers(mut self, serializers: SerializerRegistry) -> Self {
        self.serializers = Arc::new(serializers);
        self
    }
}
