//! Request extractors.

pub mod security;
pub use security::*;
