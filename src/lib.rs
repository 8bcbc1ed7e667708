//! # Tiered Index
//!
//! A multi-tenant knowledge index that stores documents as chunks, attaches
//! graph facts (relationships, community reports) and a recursive summary
//! tree to them, and answers similarity queries by fusing several tiers
//! into one ranked list.
//!
//! The algorithms live in [`tiered_index_core`]; this crate adds SQLite
//! persistence, configuration, embedding providers, and the `tix` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │ paper add   │──▶│ Chunk+Embed  │──▶│  SQLite   │
//! │ graph/rollup│   │ Resolve link │   │ records   │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                                            ▼
//!                                     ┌─────────────┐
//!                                     │ tix query   │
//!                                     │ (fusion)    │
//!                                     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tix init                          # create database
//! tix group create lab              # create a tenant
//! tix group use 1                   # make it active
//! tix paper add ./papers            # ingest a directory
//! tix query 4 "protein folding"     # search base chunks
//! tix group delete 1                # cascade delete
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `Store` backend |
//! | [`embedding`] | Embedding provider selection |
//! | [`state`] | Active database / group side files |
//! | [`session`] | Per-invocation context |
//! | [`logger`] | Tracing initialisation |
//! | [`groups`], [`ingest`], [`graph`], [`query`], [`db_cmd`], [`stats`] | `tix` command handlers |

pub mod config;
pub mod db;
pub mod db_cmd;
pub mod embedding;
pub mod graph;
pub mod groups;
pub mod ingest;
pub mod logger;
pub mod migrate;
pub mod query;
pub mod session;
pub mod sqlite_store;
pub mod state;
pub mod stats;
