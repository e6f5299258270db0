//! taskdeck — client-side session & task-workflow synchronization engine
//! for a GitHub-OAuth collaborative task tracker.
//!
//! Three components carry the real semantics:
//! - [`session`] — session lifecycle and the exactly-once OAuth code
//!   exchange
//! - [`workflow`] — the task status state machine and branch-assignment
//!   rules, enforced before the server sees a request
//! - [`cache`] — a TTL-aware read-through cache with single-flight
//!   fetches and mutation-driven invalidation
//!
//! [`engine::Engine`] wires them over a [`transport::Transport`]; the
//! CLI in `main.rs` is one thin consumer, a browser-style view layer
//! would be another.

pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod models;
pub mod session;
pub mod transport;
pub mod workflow;

pub use config::EngineConfig;
pub use engine::Engine;
