//! pixrate daemon - WebSocket rating relay
//!
//! This crate provides the server infrastructure for pixrate:
//! - `registry` - Connection registry actor assigning session identifiers
//! - `server` - WebSocket listener, per-connection queues and sessions
//! - `broadcast` - Best-effort fan-out to registered connections
//! - `heartbeat` - Periodic liveness broadcast
//! - `store` - Rating persistence (file-backed or in memory)
//! - `catalog` - Listing of the images offered for rating
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    pixrated                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  RatingServer   │────▶│     RegistryActor           │   │
//! │  │  (WebSocket)    │     │  (connection set owner)     │   │
//! │  └────────┬────────┘     └──────────────▲──────────────┘   │
//! │           │                             │ snapshot          │
//! │           │ connections                 │                   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐     ┌──────────────┴──────────────┐   │
//! │  │ SessionHandler  │────▶│   Broadcaster / heartbeat   │   │
//! │  │  (per client)   │     │   (fan-out via try_send)    │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │ save_rating                                     │
//! │           ▼                                                 │
//! │  ┌─────────────────┐                                        │
//! │  │  RatingStore    │                                        │
//! │  └─────────────────┘                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod heartbeat;
pub mod registry;
pub mod server;
pub mod store;
