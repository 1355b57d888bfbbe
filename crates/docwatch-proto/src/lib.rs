//! docwatch protocol types.
//!
//! This crate defines the shapes shared by every docwatch component:
//!
//! - [`event`] - The normalized mutation event produced from a change feed
//! - [`message`] - Room-addressed messages handed to delivery transports
//! - [`error`] - Protocol error types
//!
//! It has no async or I/O dependencies so that transports can depend on the
//! message shape without pulling in the watcher.

pub mod error;
pub mod event;
pub mod message;

pub use error::Error;

pub use event::{Event, OperationKind};
pub use message::{data_keys, DispatchRequest, DispatchResponse, Message};
