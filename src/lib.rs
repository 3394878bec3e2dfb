//! Docker Image Mirror Library
//!
//! Mirrors Docker Hub repositories into a single target account. New tags are copied once,
//! mutable tags (such as `latest`) are re-checked by content digest against a local cache
//! and re-copied when they move upstream.

pub mod cache;
pub mod cli;
pub mod common;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;
pub mod sync;
pub mod transfer;

pub use cache::DigestCache;
pub use cli::{AuthConfig, MirrorConfig};
pub use error::{MirrorError, Result};
pub use logging::Logger;
