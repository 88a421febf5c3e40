//! # askbase
//!
//! A role-scoped document ingestion and retrieval-augmented chat service.
//!
//! askbase lets an organization upload documents, extracts and indexes their
//! text, and answers natural-language questions by retrieving relevant
//! passages and streaming a grounded, cited answer back to the caller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────┐   ┌──────────┐
//! │  Upload  │──▶│  Pipeline             │──▶│  SQLite   │
//! │ (dedup)  │   │ Extract+Chunk+Embed  │   │   FTS5    │
//! └──────────┘   └──────────────────────┘   └────┬─────┘
//!                                                │
//!                          ┌─────────────────────┤
//!                          ▼                     ▼
//!                    ┌──────────┐         ┌──────────┐
//!                    │   CLI    │         │   HTTP   │
//!                    │(askbase) │         │ chat/SSE │
//!                    └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! askbase init                          # create database
//! askbase user add --email a@b.c --role admin
//! askbase serve                         # start the HTTP API
//! askbase search "vacation policy" --role hr
//! askbase ask "how do I request PTO?" --role hr
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types, category and role model |
//! | [`storage`] | Filesystem blob store |
//! | [`extract`] | Best-effort text extraction |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`dedup`] | Content-hash deduplication index |
//! | [`embedding`] | Optional embedding capability |
//! | [`retrieval`] | Role-scoped lexical retrieval |
//! | [`chat`] | Streaming chat orchestrator |
//! | [`stream`] | Chat stream consumer state machine |
//! | [`auth`] | Credential and request-shape gate |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod stream;
pub mod users;
