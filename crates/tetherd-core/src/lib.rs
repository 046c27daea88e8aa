//! Pure domain logic for tetherd: the debounced connection-state machine,
//! startup reconciliation arithmetic, shared wire types, and configuration.
//!
//! No async, no I/O. The daemon crate supplies timers, persistence, and the
//! relay around these decisions.

pub mod config;
pub mod link;
pub mod reconcile;
pub mod types;

pub use config::Config;
pub use types::{ActivityEntry, CommandKind, DebounceRecord, LinkSnapshot, PendingCommand};
