//! resource-sql: declarative SQL resources exposed as structured reads and multi-table writes.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod meta;
pub mod request;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;

pub use config::{load_definitions, load_privileges, ResourceDefinition, Settings};
pub use db::{ConnectionProvider, PgPoolProvider, Record, SqlConnection};
pub use dialect::{dialect_for, Dialect};
pub use error::AppError;
pub use meta::{MetaDataRegistry, ResourceMetaData};
pub use request::{Request, RequestType, RequestValue};
pub use response::{JsonSerializer, Serializer, SerializerRegistry};
pub use routes::app;
pub use service::{ResourceService, SecurityContext, TriggerHook, TriggerRegistry};
pub use state::AppState;
