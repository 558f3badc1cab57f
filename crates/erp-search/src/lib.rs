//! # ERP Search
//!
//! **Hybrid keyword + semantic search over ERP business records.**
//!
//! This crate wires the ranking engine in `erp-search-core` to SQLite, an
//! HTTP embedding service and an Axum API, and ships the `erp-search` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Source tables│──▶│  Projection  │──▶│ search_index │
//! │ CRM/PMO/...  │   │ + Embedding  │   │   (SQLite)   │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                   ┌──────────┐         ┌──────────┐
//!                   │   CLI    │         │   HTTP   │
//!                   └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! erp-search init                      # create database
//! erp-search seed ./demos/seed.json    # load source tables
//! erp-search rebuild                   # project into the index
//! erp-search search "pembelian laptop" --explain
//! erp-search serve                     # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Idempotent schema migrations |
//! | [`sqlite_store`] | `IndexStore` backed by the `search_index` table |
//! | [`sources`] | Source-table loader and JSON seeding |
//! | [`embedding`] | HTTP embedding provider |
//! | [`search`] | `search` command |
//! | [`stats`] | `facets` and `stats` commands |
//! | [`index_cmd`] | `seed`, `rebuild`, `embed pending`, `remove` commands |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod embedding;
pub mod index_cmd;
pub mod logging;
pub mod migrate;
pub mod search;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod stats;
