//! HTTP handlers mapping requests onto the resource service.

pub mod resource;
pub use resource::*;
