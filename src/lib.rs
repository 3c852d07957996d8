//! # finrag
//!
//! Retrieval-augmented question answering over a private document corpus.
//!
//! Documents are extracted, chunked, and (optionally) summarized. Summaries
//! are embedded into a vector store while the original chunks go into a
//! content store under the same id. At query time the closest summaries are
//! found and their original content is handed to a generative model with an
//! investment-advice prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌────────────┐   ┌────────────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Summarizer │──▶│     Dual index     │
//! │ +Extract │   └─────────┘   └────────────┘   │ vectors │ contents │
//! └──────────┘                                  └────┬───────────────┘
//!                                                    │ k nearest
//!                                                    ▼
//!                      ┌──────────┐   ┌───────────────────┐
//!        query ───────▶│Retriever │──▶│ Generation chain  │──▶ answer
//!                      └──────────┘   └───────────────────┘
//! ```
//!
//! The index persists in SQLite; [`pipeline::Pipeline`] loads it on first
//! use or builds it when absent.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`loader`] | Corpus discovery and loading |
//! | [`extract`] | Per-format text extraction |
//! | [`chunk`] | Overlapping character chunking |
//! | [`summarize`] | Retrieval summaries |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Generative model abstraction |
//! | [`store`] | Vector and content stores |
//! | [`index`] | The dual index |
//! | [`retriever`] | Top-k retrieval |
//! | [`generate`] | Prompting and answer synthesis |
//! | [`pipeline`] | Initialization state machine and `answer` |
//! | [`server`] | HTTP chat server |
//! | [`logging`] | Subscriber setup for the binary |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod server;
pub mod store;
pub mod summarize;
