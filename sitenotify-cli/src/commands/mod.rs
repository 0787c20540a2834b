//! Command implementations.

pub mod notification;
pub mod watch;
