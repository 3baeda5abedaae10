// Event envelope, mutations and wire codec
pub mod event;

// Event bus backends
pub mod bus;

// Mutation router
pub mod router;

// Rule matcher and runner
pub mod rule;

// Record store backends
pub mod store;

// Dispatch handler
pub mod dispatch;

// Fan-out notifications
pub mod notify;

// HTTP mutation surface
pub mod api;

// Service configuration
pub mod config;

pub use dispatch::{Acknowledgment, DispatchHandler};
pub use event::{DispatchEvent, Mutation};
