//! IPC module for daemon-UI communication
//!
//! Exposes the conversation snapshot and manual activation to a UI process.

mod protocol;
mod server;

pub use server::Server;
