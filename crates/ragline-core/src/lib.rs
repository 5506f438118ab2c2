//! # ragline-core
//!
//! Runtime-free core of ragline: data models, error taxonomy, chunking,
//! the BM25 and vector indexes, hybrid retrieval, the session store, and
//! the answer pipeline.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. The
//! application crate supplies the collaborators (embedding and generation
//! clients, text extraction) behind the [`pipeline::Embedder`] and
//! [`pipeline::Generator`] traits and drives everything from its HTTP
//! server and CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, chunks, messages, retrieval results |
//! | [`error`] | The `RagError` taxonomy |
//! | [`chunk`] | Sentence-boundary chunker with overlap |
//! | [`index`] | Shared dual-index store (BM25 + vector) |
//! | [`search`] | Hybrid retrieval with score fusion |
//! | [`session`] | Per-session chat history with lifecycle control |
//! | [`pipeline`] | Retrieval-augmented answer orchestration |

pub mod chunk;
pub mod error;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod session;

pub use error::{RagError, Result};
