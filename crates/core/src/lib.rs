//! Core types and shared functionality for dredge.
//!
//! This crate provides:
//! - Document content caching (in-memory LRU and SQLite-backed store)
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheBackend, DocumentCache, MemoryCache, StoreCache, backend_from_config, document_key};
pub use config::{AppConfig, AuthMethod, CacheBackendKind, ConfigError};
pub use error::Error;
