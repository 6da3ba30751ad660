//! # repo-atlas
//!
//! A Rust web service that ingests hosted git repositories, splits their
//! files into structure-aware chunks for retrieval, keeps a navigable file
//! tree with cumulative metrics, and renders that tree (or caller-supplied
//! entity graphs) as positioned diagrams.
//!
//! ## Architecture
//!
//! Ingestion runs in the background and is observed through a job record:
//!
//! ```text
//!            ┌──────────────────────────┐
//!            │  POST /api/ingest         │──────► 202 { job_id }
//!            └────────────┬─────────────┘
//!                         │ detached task (one per repository)
//!                         ▼
//!            ┌──────────────────────────┐
//!            │  SourceHost               │  GitHub REST or local git2
//!            │  branch → commit → tree   │
//!            └────────────┬─────────────┘
//!                         │ blob list
//!                         ▼
//!            ┌──────────────────────────┐
//!            │  FileFilter               │  defaults + .gitignore + caller
//!            │  root path, binaries      │
//!            └─────┬──────────────┬─────┘
//!                  │              │
//!                  ▼              ▼
//!     ┌──────────────────┐  ┌──────────────────────────┐
//!     │  build_tree       │  │  batches of N files       │
//!     │  + aggregate      │  │  fetch → chunk → store    │
//!     └────────┬─────────┘  └────────────┬─────────────┘
//!              │                         │ progress after each batch
//!              ▼                         ▼
//!     ┌──────────────────┐  ┌──────────────────────────┐
//!     │  TreeStore (JSON) │  │  ChunkStore (tantivy)     │
//!     └────────┬─────────┘  │  content-addressed ids    │
//!              │            └──────────────────────────┘
//!              ▼
//!     ┌──────────────────────────┐
//!     │  Diagram engine           │  tree / treemap / layered /
//!     │  layout → filter → stats  │  force / hierarchical
//!     └──────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, host, chunking and ingestion
//! - [`models`] - Shared data types: repository records, tree nodes, chunks, jobs, requests
//! - [`chunking`] - Structural chunker (brace/declaration aware) and markdown chunker
//! - [`tree`] - File-tree construction, delta patching and bottom-up aggregation
//! - [`git`] - Source hosts (GitHub, local checkout) and ingestion filtering
//! - [`store`] - Chunk store (tantivy), repository metadata and tree snapshots
//! - [`ingest`] - Background orchestrator, job registry and per-repository guard
//! - [`diagram`] - Layout strategies, post-layout filters and statistics
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state

pub mod api;
pub mod chunking;
pub mod config;
pub mod diagram;
pub mod git;
pub mod ingest;
pub mod models;
pub mod state;
pub mod store;
pub mod tree;
