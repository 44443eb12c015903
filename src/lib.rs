//! # RAG Engine
//!
//! A local-first retrieval-augmented chat engine. Text chunks are embedded
//! by a remote provider, persisted in SQLite, and held in an in-memory
//! vector index; queries are answered by similarity search and, for chat,
//! by a generative model grounded in the retrieved chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Embedding   │──▶│ VectorIndex  │──▶│  SQLite  │
//! │ Gemini/OAI/… │   │  (in memory) │   │  chunks  │
//! └──────────────┘   └──────┬───────┘   └──────────┘
//!                           │
//!                ┌──────────┴─────────┐
//!                ▼                    ▼
//!           ┌──────────┐        ┌──────────┐
//!           │   CLI    │        │   HTTP   │
//!           │  (rag)   │        │  (axum)  │
//!           └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init
//! rag add "Rust has a borrow checker." --document-id rust-notes
//! rag query "what checks borrows?"
//! rag chat "Explain the borrow checker"
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite chunk persistence |
//! | [`embedding`] | Remote embedding providers |
//! | [`generation`] | Remote generative providers |
//! | [`engine`] | Shared engine facade |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command runners |
//!
//! Retrieval, reranking, and prompt assembly live in the
//! [`rag_engine_core`] crate.

pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod generation;
pub mod http;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
