//! CLI command implementations.

pub mod create;
pub mod stats;
pub mod update;
