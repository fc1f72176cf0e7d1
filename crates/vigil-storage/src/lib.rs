// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Vigil invalidation coordinator.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`, a SQLite-backed and
//! an in-memory [`KeyValueStore`](vigil_core::KeyValueStore), and
//! [`SqliteFeed`], a polling change feed over an append-only invalidation
//! table.

pub mod database;
pub mod feed;
pub mod kv;
pub mod memory;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use feed::SqliteFeed;
pub use kv::{SqliteStore, StorageScope};
pub use memory::MemoryStore;
