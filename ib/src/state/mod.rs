//! Persistent state access
//!
//! A single actor owns the SQLite store; everything else holds a cloneable
//! [`StateManager`] handle.

mod manager;
mod messages;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
