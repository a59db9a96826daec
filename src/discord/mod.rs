//! Discord bot integration.
//!
//! Connects to the gateway and feeds message events into the message log.

pub mod cache;
pub mod client;

pub use client::MessageLogBot;
