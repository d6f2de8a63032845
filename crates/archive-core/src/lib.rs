//! # Archive Core
//!
//! Shared logic for Civic Archive: data models, average-hash image
//! fingerprinting, text normalization, near-duplicate text matching,
//! the image duplicate index, sentence-aware chunking and the storage
//! abstraction.
//!
//! This crate contains no tokio, sqlx, network or filesystem I/O. Every
//! operation that needs persisted state goes through the [`store::Store`]
//! trait, so the algorithms run unchanged against SQLite in production and
//! against [`store::memory::InMemoryStore`] in tests.

pub mod chunk;
pub mod duplicate;
pub mod fingerprint;
pub mod image_index;
pub mod models;
pub mod normalize;
pub mod store;
