//! # lexrag
//!
//! Retrieval-augmented question answering over legal PDF documents.
//!
//! Uploaded PDFs are split into page texts, cut into overlapping chunks,
//! embedded and stored in a vector index. A question is answered by
//! retrieving the most similar chunks and synthesizing an answer that
//! cites them. When nothing relevant is indexed the answer says so
//! instead of inventing one.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌──────────────┐
//! │ Extract  │──▶│  Chunk  │──▶│  Embed   │──▶│ Vector index │
//! │ (PDF)    │   │ (window)│   │ (batched)│   │ memory/SQLite│
//! └──────────┘   └─────────┘   └──────────┘   └──────┬───────┘
//!                                                    │ top-k
//!                      ┌──────────────┐       ┌──────▼─────┐
//!        Answer ◀──────│  Synthesize  │◀──────│  Retrieve  │◀── query
//!                      └──────────────┘       └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexrag ingest lease.pdf nda.pdf
//! lexrag ask "What is the notice period for termination?"
//! lexrag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`extract`] | PDF page text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index backends |
//! | [`retrieve`] | Query embedding and search |
//! | [`synthesis`] | Grounded answer synthesis |
//! | [`retry`] | Timeout and backoff for backend calls |
//! | [`pipeline`] | Ingest and answer orchestration |
//! | [`server`] | JSON HTTP server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod retry;
pub mod server;
pub mod synthesis;
