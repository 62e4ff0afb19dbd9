//! # MBTB Common Library
//!
//! Shared code for the specimen registry:
//! - Database initialization, row models and lookup tables
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
