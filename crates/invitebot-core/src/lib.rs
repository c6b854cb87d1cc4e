//! Core domain + application logic for the invitation bot.
//!
//! This crate is intentionally framework-agnostic. The Mastodon API and the
//! Postgres ledger live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod logging;
pub mod mention;
pub mod ports;
pub mod streaming;
pub mod workflow;

pub use errors::{Error, Result};
