//! Shared model, configuration and collaborator traits.

pub mod config;
pub mod event;
pub mod probability;
pub mod traits;
