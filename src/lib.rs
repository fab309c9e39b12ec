//! # Course Compass
//!
//! Semantic course retrieval: recommend courses for a natural-language query
//! by comparing its embedding against pre-computed embeddings of a course
//! catalog.
//!
//! The catalog and its embedding matrix live in a local document store. A
//! build step embeds the whole catalog once; every query embeds only the
//! query text and ranks the stored rows by cosine similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  CSV files  │──▶│   Catalog    │──▶│ DatasetBuilder │
//! │   (seed)    │   │  (courses)   │   │  embed + store │
//! └─────────────┘   └──────┬───────┘   └───────┬───────┘
//!                          │                   ▼
//!                          │           ┌───────────────┐
//!                          └──────────▶│   Retriever   │◀── query
//!                                      │ cosine, top-k │
//!                                      └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! compass seed --dir ./catalog        # load CSV files into the catalog
//! compass build                       # embed the catalog
//! compass search "learn python programming" --top-k 3
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Store and retrieval error types |
//! | [`store`] | SQLite-backed document collections |
//! | [`delimited`] | CSV decoding for catalog seeding |
//! | [`catalog`] | Typed catalog and matrix access |
//! | [`embedding`] | Embedding providers and engine |
//! | [`dataset`] | Embedding dataset construction |
//! | [`search`] | Query-time ranking |
//! | [`stats`] | Collection counts |

pub mod catalog;
pub mod config;
pub mod dataset;
pub mod delimited;
pub mod embedding;
pub mod error;
pub mod models;
pub mod search;
pub mod stats;
pub mod store;
