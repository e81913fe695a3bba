//! StreamWatch core: liveness checking, metadata enrichment, persistence,
//! and playback supervision for a curated set of live-stream URLs.

pub mod cache;
pub mod checker;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod manager;
pub mod pipeline;
pub mod playback;
pub mod probe;
pub mod ratelimit;
pub mod resilience;
pub mod store;

pub use error::{Error, Result};
