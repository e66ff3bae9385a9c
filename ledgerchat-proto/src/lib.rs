//! Shared row and payload definitions for the `LedgerChat` backend.

pub mod address;
pub mod message;
pub mod profile;
pub mod realtime;
pub mod thread;
