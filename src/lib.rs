//! # LDP → OAI-PMH harvester
//!
//! Walks a Linked Data Platform repository (Fedora-style) depth-first from
//! a root container and fills an OAI-PMH store: containers carrying a set
//! spec and set name become **sets**, everything else becomes a **record**
//! with metadata payloads fetched per configured format. Records name
//! their set by spec; those links are resolved after the walk.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────┐   ┌──────────┐   ┌──────────┐
//! │ LDP server │──▶│ Walker │──▶│ Dispatch │──▶│  Store   │
//! │ (JSON-LD)  │   │  DFS   │   │ per fmt  │   │ SQLite / │
//! └────────────┘   └───┬────┘   └──────────┘   │ memory   │
//!                      │ pending links         └────▲─────┘
//!                      └──────────▶ Linker ─────────┘
//! ```
//!
//! Every request goes through one [`fetch::FetchClient`], which applies the
//! rate limit and retries connection failures with exponential backoff.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Store-side data types |
//! | [`linked_data`] | JSON-LD resource decoding |
//! | [`classify`] | Set/record classification and timestamp parsing |
//! | [`dublin_core`] | Dublin Core payload decoding |
//! | [`fetch`] | HTTP transport, retry and request accounting |
//! | [`rate_limit`] | Minimum spacing between requests |
//! | [`dispatch`] | Per-format metadata fetch and storage |
//! | [`walker`] | Depth-first traversal |
//! | [`linker`] | Deferred record → set linking |
//! | [`harvest`] | Run orchestration and summary |
//! | [`store`] | Store trait and in-memory implementation |
//! | [`sqlite_store`] | SQLite store |
//! | [`db`] / [`migrate`] | Connection pool and schema |
//! | [`formats`] / [`stats`] | CLI commands |
//! | [`fixture`] | Canned-response transport for tests and dry runs |

pub mod classify;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod dublin_core;
pub mod error;
pub mod fetch;
pub mod fixture;
pub mod formats;
pub mod harvest;
pub mod linked_data;
pub mod linker;
pub mod migrate;
pub mod models;
pub mod rate_limit;
pub mod sqlite_store;
pub mod stats;
pub mod store;
pub mod walker;
