//! Subscription multiplexer
//!
//! One task owns the upstream link (and with it the registry) plus the
//! binding state of every client session. Client commands, upstream frames
//! and the reconnect timer are branches of a single `select!` loop, so every
//! registry mutation happens on one timeline without locks.
//!
//! ```text
//!   [Connection] ──Command──►┐
//!   [Connection] ──Command──►│   Multiplexer task        ┌─► [writer] ─► upstream
//!                            ├─► select! {             ──┤
//!   upstream ─► [reader] ───►│     commands, inbound,    └─ registry
//!   reconnect timer ────────►┘     connect results, timer }
//!                                      │
//!                                      └─► on_notify ─► bounded client queue
//! ```

pub mod config;
pub mod handle;
pub mod task;

pub use config::MultiplexerConfig;
pub use handle::MultiplexerHandle;
pub use task::Multiplexer;
