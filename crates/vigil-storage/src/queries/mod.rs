// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes `&Database` and runs through
//! the single tokio-rusqlite connection.

pub mod kv;
pub mod records;
