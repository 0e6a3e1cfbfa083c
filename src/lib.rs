//! Inbox Pilot — thread-aware sales-inbox processing.
//!
//! A labeled inbox event triggers one run: the thread is fetched and
//! normalized, classified through a staged oracle pipeline, labeled by
//! funnel stage and scenario, and a reply is drafted (or sent) unless a
//! gate halted the run first.

pub mod config;
pub mod delivery;
pub mod error;
pub mod labels;
pub mod llm;
pub mod mail;
pub mod pipeline;

pub use error::{Error, Result};
