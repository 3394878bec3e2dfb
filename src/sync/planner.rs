//! Incremental synchronization of one mirror list entry
//!
//! The planner walks a fixed sequence of states for each entry:
//!
//! 1. resolve the source tag list (pinned tags or a listing) and the target tag set
//! 2. diff them by exact name
//! 3. phase one: copy every tag missing from the target
//! 4. phase two, only when phase one copied something: re-check mutable tags by digest
//!    against the cache and re-copy the ones that moved
//! 5. mirror the repository description
//!
//! Failures are contained: a failed tag moves on to the next tag, a failed listing abandons
//! the entry. The only error returned to the caller is [`MirrorError::RateLimited`].

use crate::cache::{DigestCache, cache_key};
use crate::cli::config::MirrorConfig;
use crate::common::{Pacing, Timer};
use crate::error::{MirrorError, Result};
use crate::image::{MirrorEntry, Repository, RepositoryRef, TargetRepositoryRef};
use crate::logging::Logger;
use crate::registry::{Description, DescriptionUpdate, RegistryMetadata};
use crate::sync::report::{RepositoryReport, SkipReason, SyncOutcome};
use crate::transfer::{ImageTransfer, TransferOutcome};
use futures::TryStreamExt;
use std::collections::HashSet;

/// The subset of [`MirrorConfig`] the planner acts on
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub registry: String,
    pub target_account: String,
    pub mutable_tags: HashSet<String>,
    pub pacing: Pacing,
    pub dry_run: bool,
    pub sync_description: bool,
}

impl From<&MirrorConfig> for SyncOptions {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            registry: config.registry.clone(),
            target_account: config.target_account.clone(),
            mutable_tags: config.mutable_tags.clone(),
            pacing: config.pacing,
            dry_run: config.dry_run,
            sync_description: config.sync_description,
        }
    }
}

enum CopyResult {
    Copied { digest: Option<String> },
    Failed(String),
}

pub struct SyncPlanner<'a> {
    metadata: &'a dyn RegistryMetadata,
    transfer: &'a ImageTransfer,
    options: &'a SyncOptions,
    logger: &'a Logger,
}

impl<'a> SyncPlanner<'a> {
    pub fn new(
        metadata: &'a dyn RegistryMetadata,
        transfer: &'a ImageTransfer,
        options: &'a SyncOptions,
        logger: &'a Logger,
    ) -> Self {
        Self {
            metadata,
            transfer,
            options,
            logger,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        self.options
    }

    pub async fn sync(&self, entry: &MirrorEntry, cache: &mut DigestCache) -> Result<RepositoryReport> {
        let source = &entry.repository;
        let target = source.target(&self.options.target_account);
        let timer = Timer::start(format!("Sync of {}", source));
        let mut report = RepositoryReport::new(source.to_string());

        self.logger.section(&format!("{} -> {}", source, target));

        let (source_tags, existing) = match self.resolve_tags(entry, &target).await {
            Ok(tags) => tags,
            Err(err) if err.is_rate_limited() => return Err(err),
            Err(err) => {
                self.logger
                    .error(&format!("Abandoning {}: {}", source, err));
                report.abandoned = Some(err.to_string());
                return Ok(report);
            }
        };

        let new_tags: Vec<&String> = source_tags.iter().filter(|t| !existing.contains(*t)).collect();
        for tag in source_tags.iter().filter(|t| existing.contains(*t)) {
            report.record(tag, SyncOutcome::Skipped(SkipReason::AlreadyExists));
        }
        self.logger.info(&format!(
            "{} source tags, {} already mirrored, {} new",
            source_tags.len(),
            source_tags.len() - new_tags.len(),
            new_tags.len()
        ));

        let copied_now = self
            .copy_new_tags(source, &target, &new_tags, cache, &mut report)
            .await?;

        if copied_now.is_empty() {
            self.logger
                .info("No new tags copied, skipping mutable tag check");
        } else {
            report.phase_two_ran = true;
            self.recheck_mutable_tags(source, &target, &source_tags, &copied_now, cache, &mut report)
                .await?;
        }

        if self.options.sync_description {
            self.sync_description(source, &target).await?;
        }

        self.logger.success(&format!(
            "{}: {} copied, {} skipped, {} failed",
            source,
            report.copied(),
            report.skipped(),
            report.failed()
        ));
        timer.log_elapsed(self.logger);
        Ok(report)
    }

    /// Source tags in order without duplicates, plus the set already present on the target
    async fn resolve_tags(
        &self,
        entry: &MirrorEntry,
        target: &TargetRepositoryRef,
    ) -> Result<(Vec<String>, HashSet<String>)> {
        let listed = match &entry.tags {
            Some(pinned) => {
                self.logger
                    .verbose(&format!("Using {} pinned tags", pinned.len()));
                pinned.clone()
            }
            None => {
                self.logger
                    .step(&format!("Listing tags of {}", entry.repository));
                self.metadata
                    .list_tags(&entry.repository)
                    .try_collect::<Vec<_>>()
                    .await?
            }
        };

        let mut seen = HashSet::new();
        let source_tags: Vec<String> = listed.into_iter().filter(|t| seen.insert(t.clone())).collect();

        self.logger
            .step(&format!("Listing tags of {}", target));
        let existing: HashSet<String> = self.metadata.list_tags(target).try_collect().await?;

        Ok((source_tags, existing))
    }

    /// Phase one. Returns the tags copied during this run.
    async fn copy_new_tags(
        &self,
        source: &RepositoryRef,
        target: &TargetRepositoryRef,
        new_tags: &[&String],
        cache: &mut DigestCache,
        report: &mut RepositoryReport,
    ) -> Result<HashSet<String>> {
        let mut copied_now = HashSet::new();

        for (i, tag) in new_tags.iter().enumerate() {
            self.logger
                .step(&format!("[{}/{}] {}:{}", i + 1, new_tags.len(), source, tag));

            if self.options.dry_run {
                self.logger.info(&format!("Would copy {}:{}", source, tag));
                report.record(tag, SyncOutcome::WouldCopy);
                copied_now.insert(tag.to_string());
                continue;
            }

            match self.copy_tag(source, target, tag).await? {
                CopyResult::Copied { digest } => {
                    if let Some(digest) = &digest {
                        cache.put(cache_key(source, tag), digest.clone());
                        report.cache_changed = true;
                    }
                    report.record(tag, SyncOutcome::Copied { digest });
                    copied_now.insert(tag.to_string());
                }
                CopyResult::Failed(reason) => {
                    self.logger
                        .error(&format!("Failed to copy {}:{}: {}", source, tag, reason));
                    report.record(tag, SyncOutcome::Failed(reason));
                }
            }
        }

        Ok(copied_now)
    }

    /// Phase two
    async fn recheck_mutable_tags(
        &self,
        source: &RepositoryRef,
        target: &TargetRepositoryRef,
        source_tags: &[String],
        copied_now: &HashSet<String>,
        cache: &mut DigestCache,
        report: &mut RepositoryReport,
    ) -> Result<()> {
        let mutable: Vec<&String> = source_tags
            .iter()
            .filter(|t| self.options.mutable_tags.contains(*t))
            .collect();

        if mutable.is_empty() {
            self.logger.verbose("No mutable tags to re-check");
            return Ok(());
        }
        self.logger
            .step(&format!("Re-checking {} mutable tags", mutable.len()));

        for tag in mutable {
            let current = match self.metadata.get_digest(source, tag).await {
                Ok(Some(digest)) => digest,
                Ok(None) => {
                    self.logger
                        .warning(&format!("{}:{} no longer exists upstream, skipping", source, tag));
                    if !copied_now.contains(tag) {
                        report.record(tag, SyncOutcome::Skipped(SkipReason::DigestUnavailable));
                    }
                    continue;
                }
                Err(err) if err.is_rate_limited() => return Err(err),
                Err(err) => {
                    self.logger
                        .warning(&format!("Digest lookup for {}:{} failed, skipping: {}", source, tag, err));
                    if !copied_now.contains(tag) {
                        report.record(tag, SyncOutcome::Skipped(SkipReason::DigestUnavailable));
                    }
                    continue;
                }
            };

            let key = cache_key(source, tag);
            let cached = cache.get(&key).map(str::to_string);
            if cached.as_deref() == Some(current.as_str()) {
                self.logger
                    .detail(&format!("{}:{} unchanged ({})", source, tag, current));
                // Keep the phase one outcome of a tag copied moments ago
                if !copied_now.contains(tag) {
                    report.record(tag, SyncOutcome::Unchanged);
                }
                continue;
            }

            self.logger.info(&format!(
                "{}:{} digest changed ({} -> {})",
                source,
                tag,
                cached.as_deref().unwrap_or("uncached"),
                current
            ));

            if self.options.dry_run {
                report.record(tag, SyncOutcome::WouldCopy);
                continue;
            }

            match self.copy_tag(source, target, tag).await? {
                CopyResult::Copied { digest } => {
                    let new = digest.unwrap_or(current);
                    cache.put(key, new.clone());
                    report.cache_changed = true;
                    report.record(tag, SyncOutcome::CopiedDigestChanged { old: cached, new });
                }
                CopyResult::Failed(reason) => {
                    self.logger
                        .error(&format!("Failed to re-copy {}:{}: {}", source, tag, reason));
                    report.record(tag, SyncOutcome::Failed(reason));
                }
            }
        }

        Ok(())
    }

    /// Copy one tag, then read back the source digest to cache
    async fn copy_tag(
        &self,
        source: &RepositoryRef,
        target: &TargetRepositoryRef,
        tag: &str,
    ) -> Result<CopyResult> {
        let source_ref = source.image_ref(&self.options.registry, tag);
        let target_ref = target.image_ref(&self.options.registry, tag);

        match self.transfer.copy(&source_ref, &target_ref).await {
            TransferOutcome::RateLimited(reason) => {
                self.logger
                    .error(&format!("Rate limited while copying {}: {}", source_ref, reason));
                Err(MirrorError::RateLimited(format!("{}: {}", source_ref, reason)))
            }
            TransferOutcome::Failed(reason) => Ok(CopyResult::Failed(reason)),
            TransferOutcome::Copied { strategy } => {
                self.logger
                    .success(&format!("Copied {} via {}", source_ref, strategy));

                let digest = match self.metadata.get_digest(source, tag).await {
                    Ok(digest) => digest,
                    Err(err) if err.is_rate_limited() => return Err(err),
                    Err(err) => {
                        self.logger.warning(&format!(
                            "Copied {} but could not read its digest: {}",
                            source_ref, err
                        ));
                        None
                    }
                };

                self.options.pacing.after_copy().await;
                Ok(CopyResult::Copied { digest })
            }
        }
    }

    async fn sync_description(&self, source: &RepositoryRef, target: &TargetRepositoryRef) -> Result<()> {
        if self.options.dry_run {
            self.logger.verbose("Dry run, description not mirrored");
            return Ok(());
        }

        let description = match self.metadata.get_description(source).await {
            Ok(description) if description.is_empty() => {
                self.logger
                    .verbose(&format!("{} has no description, leaving {} as is", source, target));
                return Ok(());
            }
            Ok(description) => description,
            Err(err) if err.is_rate_limited() => return Err(err),
            Err(err) => {
                self.logger
                    .warning(&format!("Could not read description of {}: {}", source, err));
                return Ok(());
            }
        };

        match self.write_description(target, &description).await? {
            Some(DescriptionUpdate::Updated) => {
                self.logger
                    .verbose(&format!("Description of {} updated", target));
                return Ok(());
            }
            Some(DescriptionUpdate::Forbidden) => {}
            Some(DescriptionUpdate::Failed(code)) => {
                self.logger
                    .warning(&format!("Description update for {} failed with status {}", target, code));
                return Ok(());
            }
            None => return Ok(()),
        }

        self.logger.warning(&format!(
            "{} does not exist yet, initializing it with a placeholder description",
            target
        ));
        match self
            .metadata
            .create_repository(target, &Description::placeholder(source))
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_rate_limited() => return Err(err),
            Err(err) => {
                self.logger
                    .warning(&format!("Could not create {}: {}", target, err));
                return Ok(());
            }
        }

        match self.write_description(target, &description).await? {
            Some(DescriptionUpdate::Updated) => {
                self.logger
                    .verbose(&format!("Description of {} updated", target));
            }
            Some(DescriptionUpdate::Forbidden) => {
                self.logger
                    .warning(&format!("Description update for {} still forbidden", target));
            }
            Some(DescriptionUpdate::Failed(code)) => {
                self.logger
                    .warning(&format!("Description update for {} failed with status {}", target, code));
            }
            None => {}
        }
        Ok(())
    }

    /// `Ok(None)` when the write failed for a reason already logged
    async fn write_description(
        &self,
        target: &TargetRepositoryRef,
        description: &Description,
    ) -> Result<Option<DescriptionUpdate>> {
        match self.metadata.set_description(target, description).await {
            Ok(update) => Ok(Some(update)),
            Err(err) if err.is_rate_limited() => Err(err),
            Err(err) => {
                self.logger
                    .warning(&format!("Description update for {} failed: {}", target.path(), err));
                Ok(None)
            }
        }
    }
}
