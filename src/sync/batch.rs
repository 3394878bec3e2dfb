//! Batch driver: runs the planner over every mirror list entry in file order

use crate::cache::DigestCache;
use crate::error::Result;
use crate::image::MirrorEntry;
use crate::logging::Logger;
use crate::sync::planner::SyncPlanner;
use crate::sync::report::{BatchSummary, RepositoryReport};

pub struct BatchDriver<'a> {
    planner: SyncPlanner<'a>,
    logger: &'a Logger,
}

impl<'a> BatchDriver<'a> {
    pub fn new(planner: SyncPlanner<'a>, logger: &'a Logger) -> Self {
        Self { planner, logger }
    }

    /// Sync every entry. A rate limit stops the batch at once and is returned as the error;
    /// the cache keeps whatever was recorded before that point.
    pub async fn run(&self, entries: &[MirrorEntry], cache: &mut DigestCache) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let pacing = self.planner.options().pacing;

        for (i, entry) in entries.iter().enumerate() {
            if i > 0 {
                pacing.between_repositories().await;
            }
            self.logger.verbose(&format!(
                "Entry {}/{} (line {}): {}",
                i + 1,
                entries.len(),
                entry.line,
                entry.repository
            ));

            match self.planner.sync(entry, cache).await {
                Ok(report) => summary.absorb(&report),
                Err(err) if err.is_fatal() => {
                    self.logger.error(&format!(
                        "Stopping batch at {} ({} of {} entries processed): {}",
                        entry.repository, i, entries.len(), err
                    ));
                    return Err(err);
                }
                Err(err) => {
                    self.logger
                        .error(&format!("Sync of {} failed: {}", entry.repository, err));
                    let mut report = RepositoryReport::new(entry.repository.to_string());
                    report.abandoned = Some(err.to_string());
                    summary.absorb(&report);
                }
            }
        }

        summary.cache_changed |= cache.is_dirty();
        Ok(summary)
    }
}
