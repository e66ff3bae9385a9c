//! `LedgerChat` — wallet-addressed chat client core.

pub mod chat;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod realtime;
pub mod session;
pub mod store;
pub mod wallet;
