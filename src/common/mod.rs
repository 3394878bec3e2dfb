//! Common module - retry policy, pacing and timing shared across the codebase

pub mod retry;
pub mod utils;

pub use retry::RetryPolicy;
pub use utils::{Pacing, Timer};
