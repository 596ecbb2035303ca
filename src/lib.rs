//! # docquery
//!
//! Content-addressed question answering over uploaded files.
//!
//! docquery answers a user's question about a file by choosing between two
//! strategies: retrieval-augmented answering over a persisted semantic
//! index for documents, or OCR text extraction plus answering for images.
//! Files are identified by a content fingerprint, so re-uploads of the same
//! bytes (under any filename) reuse the persisted index instead of
//! re-embedding.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────────┐   ┌─────────────┐
//! │  upload  │──▶│ fingerprint + route │──▶│  SQLite     │
//! │  (file)  │   │ reuse / load / new  │   │ collections │
//! └──────────┘   └─────────┬──────────┘   └──────┬──────┘
//!                          │                     │
//!               ┌──────────┴─────────┐           │
//!               ▼                    ▼           ▼
//!         ┌───────────┐      ┌────────────┐  top-k search
//!         │  document │      │   image    │
//!         │  answerer │      │  answerer  │
//!         │ (RAG+LLM) │      │ (OCR+LLM)  │
//!         └───────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Streaming content fingerprinting |
//! | [`loaders`] | Suffix-registered document loaders |
//! | [`chunk`] | Bounded, overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`db`] | SQLite connection setup |
//! | [`store`] | Artifact store gateway + semantic index |
//! | [`migrate`] | Schema migrations |
//! | [`llm`] | Answering-model client |
//! | [`ocr`] | Image text extraction |
//! | [`ingest`] | Ingestion pipeline state machine |
//! | [`route`] | Document vs image routing |
//! | [`rag`] | Document answerer |
//! | [`vqa`] | Image answerer |
//! | [`session`] | Session state + orchestrator |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod fingerprint;
pub mod ingest;
pub mod llm;
pub mod loaders;
pub mod migrate;
pub mod models;
pub mod ocr;
pub mod rag;
pub mod route;
pub mod session;
pub mod store;
pub mod vqa;
