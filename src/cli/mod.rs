//! Command line interface module
//!
//! Argument parsing, the resolved [`MirrorConfig`], and the [`Runner`] that drives one mirror run.

pub mod args;
pub mod config;
pub mod runner;

pub use args::Args;
pub use config::{AuthConfig, MirrorConfig};
pub use runner::Runner;
