//! # easyws-core
//!
//! Foundation types shared by every easyws crate.
//!
//! - [`ids`]: process-unique [`ClientId`] assignment
//! - [`message`]: the immutable [`Message`] passed between sessions and consumers
//! - [`auth`]: required-header [`AuthPolicy`] evaluated before a handshake
//! - [`logging`]: `tracing` subscriber bootstrap and test capture helpers

#![deny(unsafe_code)]

pub mod auth;
pub mod ids;
pub mod logging;
pub mod message;

pub use auth::{AuthPolicy, AuthRejection, HashAlgo};
pub use ids::ClientId;
pub use message::{Message, MessageKind};
