//! Request execution: metadata lookup, SQL generation, statement sequencing and result assembly.

pub mod assembly;
mod executor;
pub mod hooks;

pub use executor::ResourceService;
pub use hooks::*;
