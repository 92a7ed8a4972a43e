//! Setgen library crate.
//!
//! Synthesizes mock Shared Signals Framework security event tokens, queues
//! them in bounded batches with retries, and signs and delivers queued
//! tokens to an inbound endpoint.

pub mod core;
pub mod delivery;
pub mod formats;
pub mod sources;
pub mod transmit;

pub use core::config;
pub use core::event;
pub use core::probability;
pub use core::traits;
pub use delivery::{run_generation, GenerationError, GenerationReport};
