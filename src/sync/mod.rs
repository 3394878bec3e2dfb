//! Incremental synchronization engine

pub mod batch;
pub mod planner;
pub mod report;

pub use batch::BatchDriver;
pub use planner::{SyncOptions, SyncPlanner};
pub use report::{BatchSummary, RepositoryReport, SkipReason, SyncOutcome, TagReport};
