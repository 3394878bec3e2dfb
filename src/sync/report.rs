//! Per-tag outcomes and the reports threaded back to the caller

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Tag already present in the target repository
    AlreadyExists,
    /// Mutable tag whose current digest could not be retrieved
    DigestUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    /// New tag copied; no digest when the post-copy lookup failed
    Copied { digest: Option<String> },
    /// Mutable tag re-copied because its digest moved
    CopiedDigestChanged { old: Option<String>, new: String },
    /// Mutable tag whose digest still matches the cache
    Unchanged,
    /// Dry run: the tag would have been copied
    WouldCopy,
    Failed(String),
}

impl SyncOutcome {
    pub fn is_copy(&self) -> bool {
        matches!(
            self,
            SyncOutcome::Copied { .. } | SyncOutcome::CopiedDigestChanged { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagReport {
    pub tag: String,
    pub outcome: SyncOutcome,
}

/// Everything one mirror list entry produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryReport {
    pub repository: String,
    pub tags: Vec<TagReport>,
    /// Set when the entry was abandoned before any tag was processed
    pub abandoned: Option<String>,
    pub phase_two_ran: bool,
    pub cache_changed: bool,
}

impl RepositoryReport {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            ..Default::default()
        }
    }

    /// Record an outcome, replacing an earlier one for the same tag
    pub fn record(&mut self, tag: &str, outcome: SyncOutcome) {
        match self.tags.iter_mut().find(|t| t.tag == tag) {
            Some(existing) => existing.outcome = outcome,
            None => self.tags.push(TagReport {
                tag: tag.to_string(),
                outcome,
            }),
        }
    }

    pub fn outcome(&self, tag: &str) -> Option<&SyncOutcome> {
        self.tags.iter().find(|t| t.tag == tag).map(|t| &t.outcome)
    }

    pub fn copied(&self) -> usize {
        self.tags.iter().filter(|t| t.outcome.is_copy()).count()
    }

    pub fn failed(&self) -> usize {
        self.tags.iter().filter(|t| t.outcome.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.tags
            .iter()
            .filter(|t| matches!(t.outcome, SyncOutcome::Skipped(_) | SyncOutcome::Unchanged))
            .count()
    }
}

/// Aggregate over a whole mirror list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub repositories: usize,
    pub abandoned: usize,
    pub copied: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cache_changed: bool,
}

impl BatchSummary {
    pub fn absorb(&mut self, report: &RepositoryReport) {
        self.repositories += 1;
        if report.abandoned.is_some() {
            self.abandoned += 1;
        }
        self.copied += report.copied();
        self.failed += report.failed();
        self.skipped += report.skipped();
        self.cache_changed |= report.cache_changed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_replaces_previous_outcome() {
        let mut report = RepositoryReport::new("library/alpine");
        report.record("latest", SyncOutcome::Skipped(SkipReason::AlreadyExists));
        report.record("3.20", SyncOutcome::Copied { digest: None });
        report.record("latest", SyncOutcome::Unchanged);

        assert_eq!(report.tags.len(), 2);
        assert_eq!(report.outcome("latest"), Some(&SyncOutcome::Unchanged));
        assert_eq!(report.copied(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn summary_aggregates_cache_flag() {
        let mut summary = BatchSummary::default();
        let mut a = RepositoryReport::new("a/a");
        a.record("1", SyncOutcome::Failed("x".into()));
        let mut b = RepositoryReport::new("b/b");
        b.cache_changed = true;
        b.record(
            "latest",
            SyncOutcome::CopiedDigestChanged {
                old: None,
                new: "sha256:1".into(),
            },
        );

        summary.absorb(&a);
        assert!(!summary.cache_changed);
        summary.absorb(&b);
        assert!(summary.cache_changed);
        assert_eq!(summary.repositories, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.copied, 1);
    }
}
