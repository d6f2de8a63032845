//! # Civic Archive
//!
//! Duplicate detection and RAG chunking for a municipal document archive
//! of ordinances, resolutions and meeting minutes.
//!
//! The algorithms live in [`archive_core`]; this crate wires them to
//! SQLite, the filesystem, trusted remote storage, a CLI and a JSON API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────┐
//! │ Uploads /    │──▶│ Fingerprinter    │──▶│          │
//! │ trusted URLs │   │ (aHash)          │   │          │
//! └──────────────┘   └──────────────────┘   │  SQLite  │
//! ┌──────────────┐   ┌──────────────────┐   │  store   │
//! │ Document     │──▶│ Duplicate match  │◀──│          │
//! │ text         │   │ RAG chunking     │──▶│          │
//! └──────────────┘   └──────────────────┘   └────┬─────┘
//!                                                │
//!                         ┌──────────────────────┤
//!                         ▼                      ▼
//!                    ┌──────────┐          ┌──────────┐
//!                    │   CLI    │          │   HTTP   │
//!                    │(archive) │          │   API    │
//!                    └──────────┘          └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`fetch`] | Trusted-host validation and bounded downloads |
//! | [`fingerprint`] | Image fingerprinting over bytes, paths and URLs |
//! | [`images`] | Document-level image hashing, checks and backfill |
//! | [`rag`] | Batch chunking pipeline |
//! | [`stats`] | Archive statistics |
//! | [`extract`] | Text extraction from text, HTML and PDF files |
//! | [`server`] | JSON HTTP API |
//! | [`commands`] | CLI command implementations |

pub mod commands;
pub mod config;
pub mod db;
pub mod extract;
pub mod fetch;
pub mod fingerprint;
pub mod images;
pub mod migrate;
pub mod rag;
pub mod server;
pub mod sqlite_store;
pub mod stats;

#[cfg(test)]
mod test_support;
