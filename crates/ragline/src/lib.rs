//! # ragline
//!
//! A retrieval-augmented chat backend: documents are extracted, chunked,
//! embedded, and indexed into an in-process BM25 + vector store; queries
//! are answered by hybrid retrieval threaded through per-session chat
//! state and a generation collaborator, with source attribution.
//!
//! ```text
//! ┌───────────┐   ┌───────────────┐   ┌───────────────┐
//! │  Upload    │──▶│  Extract +    │──▶│  BM25 index    │
//! │ PDF/DOCX/ │   │  Chunk +      │   │  Vector index  │
//! │    TXT    │   │  Embed        │   └───────┬───────┘
//! └───────────┘   └───────────────┘           │
//!                                             ▼
//!                 ┌───────────────┐   ┌───────────────┐
//!                 │   Sessions    │◀──│    Hybrid      │
//!                 │   + Answer    │   │   retrieval    │
//!                 │   pipeline    │   └───────────────┘
//!                 └───────┬───────┘
//!                         ▼
//!                  HTTP (axum) / CLI
//! ```
//!
//! The domain logic lives in the `ragline-core` crate; this crate adds
//! configuration, text extraction, the HTTP collaborator clients, the
//! engine, the server, and the CLI.

pub mod config;
pub mod engine;
pub mod extract;
pub mod ingest_fs;
pub mod providers;
pub mod server;
