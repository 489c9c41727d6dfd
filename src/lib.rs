//! # File Finder
//!
//! Natural-language search and summarization over a local directory tree.
//!
//! A root directory is walked into one [`models::DocumentRecord`] per file
//! and subdirectory. Each record's description is embedded, and the vectors
//! go into an exact in-memory nearest-neighbour index. Queries are embedded
//! the same way and ranked by distance. Files can also be summarized by a
//! locally hosted language model.
//!
//! ## Architecture
//!
//! ```text
//!   corpus ──▶ extract ──▶ embedding ──▶ vector_index
//!   └──────────── manager (one atomic build) ───────┘
//!                         │
//!                      search      assistant ──▶ llm
//!                         └──── engine ───┘
//!                                │
//!                        CLI ────┴──── HTTP (axum)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`error`] | Engine error taxonomy |
//! | [`models`] | Shared data types |
//! | [`extract`] | Text extraction by file type |
//! | [`corpus`] | Directory walk into document records |
//! | [`embedding`] | Embedder trait and providers |
//! | [`vector_index`] | Exact L2 nearest-neighbour index |
//! | [`manager`] | Index lifecycle and snapshot publication |
//! | [`search`] | Retrieval and ranking |
//! | [`llm`] | Language model client |
//! | [`assistant`] | Summarization and chat |
//! | [`engine`] | Shared context for boundary layers |
//! | [`server`] | HTTP server |

pub mod assistant;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod llm;
pub mod manager;
pub mod models;
pub mod search;
pub mod server;
pub mod vector_index;
