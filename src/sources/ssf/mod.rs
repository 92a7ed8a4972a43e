//! Shared Signals Framework source: mock relying parties and SET payloads.

pub mod generator;
pub mod registry;
pub mod templates;

pub use generator::{synthesize, SynthesisError};
