//! Top-level workflow for one mirror run

use crate::cache::DigestCache;
use crate::cli::config::MirrorConfig;
use crate::error::{MirrorError, Result};
use crate::image::{MirrorList, MirrorListParser};
use crate::logging::Logger;
use crate::registry::{Auth, HubClient};
use crate::sync::{BatchDriver, BatchSummary, SyncOptions, SyncPlanner};
use crate::transfer::{ImageTransfer, ImagetoolsStrategy, SkopeoStrategy, TransferStrategy};
use std::fs;
use std::path::Path;

pub struct Runner {
    config: MirrorConfig,
    output: Logger,
}

impl Runner {
    pub fn new(config: MirrorConfig) -> Self {
        let output = if config.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(config.verbose)
        };

        Self { config, output }
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    pub async fn run(&self) -> Result<BatchSummary> {
        self.output.section("Docker Image Mirror");
        self.config.validate()?;

        let list = self.load_mirror_list()?;

        // A marker left over from an earlier run must not leak into this one
        clear_marker(&self.config.changed_marker)?;
        let mut cache = DigestCache::load(&self.config.cache_path)?;
        self.output.verbose(&format!(
            "Loaded {} cached digests from {}",
            cache.len(),
            self.config.cache_path.display()
        ));

        let client = self.create_hub_client().await?;
        let transfer = self.create_transfer().await?;

        if self.config.dry_run {
            self.output
                .warning("Dry run: nothing will be copied and the cache will not be written");
        }

        let options = SyncOptions::from(&self.config);
        let planner = SyncPlanner::new(&client, &transfer, &options, &self.output);
        let driver = BatchDriver::new(planner, &self.output);

        self.output.section("Syncing repositories");
        let result = driver.run(&list.entries, &mut cache).await;

        // Progress made before a rate limit is kept
        let persisted = persist_cache(&cache, &self.config, &self.output);

        let (summary, persisted) = settle(result, persisted, &self.output)?;
        self.print_summary(&summary, persisted);
        Ok(summary)
    }

    fn load_mirror_list(&self) -> Result<MirrorList> {
        self.output.subsection("Reading mirror list");
        let parser = MirrorListParser::new(self.config.default_namespace.clone());
        let list = parser.parse_file(&self.config.mirror_list)?;

        for rejected in &list.rejected {
            self.output.warning(&format!(
                "Ignoring line {} ({}): {}",
                rejected.line, rejected.content, rejected.error
            ));
        }
        self.output.info(&format!(
            "{} repositories to mirror into {}",
            list.entries.len(),
            self.config.target_account
        ));
        Ok(list)
    }

    async fn create_hub_client(&self) -> Result<HubClient> {
        self.output.subsection("Authenticating");
        let auth = Auth::new(
            &self.config.hub_url,
            self.config.timeout,
            self.config.metadata_retry,
        )?;
        let token = auth.login(&self.config.auth, &self.output).await?;

        HubClient::builder(self.config.hub_url.clone())
            .with_token(Some(token))
            .with_timeout(self.config.timeout)
            .with_page_size(self.config.page_size)
            .with_retry(self.config.metadata_retry)
            .with_logger(self.output.clone())
            .build()
    }

    async fn create_transfer(&self) -> Result<ImageTransfer> {
        let candidates: Vec<Box<dyn TransferStrategy>> = vec![
            Box::new(SkopeoStrategy::new(Some(self.config.auth.clone()))),
            Box::new(ImagetoolsStrategy::new()),
        ];
        let transfer = ImageTransfer::detect(
            candidates,
            self.config.transfer_retry,
            self.output.clone(),
        )
        .await?;
        self.output.info(&format!(
            "Copy strategies: {}",
            transfer.strategy_names().join(" -> ")
        ));
        Ok(transfer)
    }

    fn print_summary(&self, summary: &BatchSummary, persisted: bool) {
        self.output.summary_kv(
            "Mirror Summary",
            &[
                ("Repositories", summary.repositories.to_string()),
                ("Abandoned", summary.abandoned.to_string()),
                ("Tags copied", summary.copied.to_string()),
                ("Tags skipped", summary.skipped.to_string()),
                ("Tags failed", summary.failed.to_string()),
                ("Cache updated", persisted.to_string()),
                ("Elapsed", self.output.format_duration(self.output.elapsed())),
            ],
        );
        if summary.failed > 0 || summary.abandoned > 0 {
            self.output
                .warning("Some tags or repositories failed; rerun to retry them");
        } else {
            self.output.success("Mirror run completed");
        }
    }
}

fn clear_marker(marker: &Path) -> Result<()> {
    match fs::remove_file(marker) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MirrorError::Io(format!(
            "Failed to remove {}: {}",
            marker.display(),
            e
        ))),
    }
}

/// Combine the batch result with the cache write. The batch error wins so a rate limit
/// keeps its exit code even when saving fails as well.
fn settle(
    batch: Result<BatchSummary>,
    persisted: Result<bool>,
    output: &Logger,
) -> Result<(BatchSummary, bool)> {
    match (batch, persisted) {
        (Ok(summary), Ok(persisted)) => Ok((summary, persisted)),
        (Ok(_), Err(save_err)) => Err(save_err),
        (Err(batch_err), Ok(_)) => Err(batch_err),
        (Err(batch_err), Err(save_err)) => {
            output.error(&format!("Failed to save digest cache: {}", save_err));
            Err(batch_err)
        }
    }
}

/// Save the cache and drop the change marker when this run modified it.
/// Returns whether anything was written.
pub fn persist_cache(cache: &DigestCache, config: &MirrorConfig, output: &Logger) -> Result<bool> {
    if config.dry_run || !cache.is_dirty() {
        output.verbose("Digest cache unchanged");
        return Ok(false);
    }

    cache.save(&config.cache_path)?;
    fs::write(&config.changed_marker, b"")?;
    output.step(&format!(
        "Saved {} digests to {}",
        cache.len(),
        config.cache_path.display()
    ));
    Ok(true)
}
