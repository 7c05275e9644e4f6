//! Downstream client sessions
//!
//! Binding state for each connected client: which subscription (if any) the
//! client currently owns, and the bounded queue its events are pushed into.

pub mod state;

pub use state::{Binding, SessionPhase, SessionState};
