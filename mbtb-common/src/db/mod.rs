//! Database initialization, row models and lookup tables

pub mod init;
pub mod lookups;
pub mod models;

pub use init::*;
pub use lookups::LookupKind;
pub use models::*;
