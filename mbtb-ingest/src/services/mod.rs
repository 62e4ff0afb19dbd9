//! Services

pub mod upsert_resolver;

pub use upsert_resolver::UpsertResolver;
