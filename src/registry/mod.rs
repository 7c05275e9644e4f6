//! Subscription registry
//!
//! In-memory table of every logical subscription multiplexed over the
//! upstream connection. Records live in an arena keyed by the locally issued
//! request id, with a second index from the upstream-assigned subscription id
//! back to the arena key.
//!
//! # Architecture
//!
//! ```text
//!               SubscriptionRegistry
//!     ┌──────────────────────────────────────┐
//!     │ entries: BTreeMap<LocalId,           │
//!     │   Subscription {                     │
//!     │     method, params,                  │
//!     │     remote_id: Option<RemoteId>,     │
//!     │     on_notify,                       │
//!     │   }                                  │
//!     │ >                                    │
//!     │ by_remote: HashMap<RemoteId, LocalId>│
//!     └──────────────────────────────────────┘
//!          ▲ register / remove       ▲ find_by_remote_id
//!          │                         │
//!     [Gateway command]       [Upstream notification]
//! ```
//!
//! The registry does no I/O and takes no locks. It is owned by the
//! upstream link, which runs on the single multiplexer task.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{Delivery, LocalId, NotifyFn, RemoteId, Subscription};
pub use error::RegistryError;
pub use store::SubscriptionRegistry;
