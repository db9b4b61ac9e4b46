//! # Built-in Handlers
//!
//! Two reference consumers wired at startup by typical embedders. They
//! illustrate the handler contract; the reusable core treats them like any
//! other registration.

pub mod key_expiry;
pub mod update_notify;

pub use key_expiry::{KeyExpiryHandler, SessionTerminator};
pub use update_notify::{UpdateAcceptor, UpdateNotificationHandler};
