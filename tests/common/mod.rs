//! In-memory registry and copier shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use docker_image_mirror::cache::DigestCache;
use docker_image_mirror::cli::config::default_mutable_tags;
use docker_image_mirror::common::{Pacing, RetryPolicy};
use docker_image_mirror::error::{MirrorError, Result};
use docker_image_mirror::image::{ImageRef, MirrorListParser, Repository};
use docker_image_mirror::logging::Logger;
use docker_image_mirror::registry::{Description, DescriptionUpdate, RegistryMetadata};
use docker_image_mirror::sync::{BatchDriver, BatchSummary, RepositoryReport, SyncOptions, SyncPlanner};
use docker_image_mirror::transfer::{ImageTransfer, TransferStrategy};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const ACCOUNT: &str = "me";

/// State of the fake registry: repositories by path, each an ordered tag -> digest map
#[derive(Default)]
pub struct World {
    pub repos: BTreeMap<String, BTreeMap<String, String>>,
    pub descriptions: BTreeMap<String, Description>,
    pub listed: Vec<String>,
    pub digest_lookups: Vec<String>,
    pub copies: Vec<(String, String)>,
    pub created: Vec<String>,
    pub description_writes: Vec<String>,
    /// Listing these repositories fails with an exhausted retry budget
    pub broken_listings: HashSet<String>,
    /// Copying from these repositories reports a rate limit
    pub rate_limited_sources: HashSet<String>,
    /// Copying these `repo:tag` references fails outright
    pub failing_copies: HashSet<String>,
    /// Remaining failures for digest lookups of `repo:tag`
    pub flaky_digests: HashMap<String, usize>,
}

impl World {
    pub fn push(&mut self, repository: &str, tag: &str, digest: &str) {
        self.repos
            .entry(repository.to_string())
            .or_default()
            .insert(tag.to_string(), digest.to_string());
    }

    pub fn tags(&self, repository: &str) -> Vec<String> {
        self.repos
            .get(repository)
            .map(|tags| tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn digest(&self, repository: &str, tag: &str) -> Option<String> {
        self.repos.get(repository).and_then(|tags| tags.get(tag).cloned())
    }
}

#[derive(Clone, Default)]
pub struct Shared(pub Arc<Mutex<World>>);

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, World> {
        self.0.lock().unwrap()
    }
}

pub struct FakeRegistry {
    pub world: Shared,
}

#[async_trait]
impl RegistryMetadata for FakeRegistry {
    fn list_tags<'a>(&'a self, repository: &'a dyn Repository) -> BoxStream<'a, Result<String>> {
        let path = repository.path();
        let mut world = self.world.lock();
        world.listed.push(path.clone());

        if world.broken_listings.contains(&path) {
            let err = MirrorError::MetadataUnavailable(format!("listing {} failed", path));
            return stream::iter(vec![Err(err)]).boxed();
        }
        let tags: Vec<Result<String>> = world.tags(&path).into_iter().map(Ok).collect();
        stream::iter(tags).boxed()
    }

    async fn get_digest(&self, repository: &dyn Repository, tag: &str) -> Result<Option<String>> {
        let path = repository.path();
        let mut world = self.world.lock();
        let reference = format!("{}:{}", path, tag);
        world.digest_lookups.push(reference.clone());
        if let Some(remaining) = world.flaky_digests.get_mut(&reference).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(MirrorError::MetadataUnavailable(format!(
                "digest lookup for {} failed",
                reference
            )));
        }
        Ok(world.digest(&path, tag))
    }

    async fn get_description(&self, repository: &dyn Repository) -> Result<Description> {
        let world = self.world.lock();
        Ok(world
            .descriptions
            .get(&repository.path())
            .cloned()
            .unwrap_or_default())
    }

    async fn set_description(
        &self,
        repository: &dyn Repository,
        description: &Description,
    ) -> Result<DescriptionUpdate> {
        let path = repository.path();
        let mut world = self.world.lock();
        if !world.repos.contains_key(&path) {
            return Ok(DescriptionUpdate::Forbidden);
        }
        world.description_writes.push(path.clone());
        world.descriptions.insert(path, description.clone());
        Ok(DescriptionUpdate::Updated)
    }

    async fn create_repository(&self, repository: &dyn Repository, description: &Description) -> Result<()> {
        let path = repository.path();
        let mut world = self.world.lock();
        world.created.push(path.clone());
        world.repos.entry(path.clone()).or_default();
        world.descriptions.insert(path, description.clone());
        Ok(())
    }
}

/// Copies a tag between repositories of the fake registry
pub struct FakeCopier {
    pub world: Shared,
}

#[async_trait]
impl TransferStrategy for FakeCopier {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn copy(&self, source: &ImageRef, target: &ImageRef) -> Result<()> {
        let mut world = self.world.lock();
        if world.rate_limited_sources.contains(&source.repository) {
            return Err(MirrorError::RateLimited(format!(
                "toomanyrequests: pull rate limit reached for {}",
                source
            )));
        }
        if world
            .failing_copies
            .contains(&format!("{}:{}", source.repository, source.tag))
        {
            return Err(MirrorError::Transfer(format!("manifest unknown: {}", source)));
        }

        let digest = world
            .digest(&source.repository, &source.tag)
            .ok_or_else(|| MirrorError::Transfer(format!("{} not found", source)))?;
        world.push(&target.repository, &target.tag, &digest);
        world
            .copies
            .push((source.to_string(), target.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub world: Shared,
    pub registry: FakeRegistry,
    pub transfer: ImageTransfer,
    pub options: SyncOptions,
    pub logger: Logger,
}

impl Harness {
    pub fn new() -> Self {
        let world = Shared::default();
        let transfer = ImageTransfer::new(
            vec![Box::new(FakeCopier {
                world: world.clone(),
            })],
            RetryPolicy::new(1, Duration::ZERO),
            Logger::new_quiet(),
        );
        let options = SyncOptions {
            registry: "docker.io".to_string(),
            target_account: ACCOUNT.to_string(),
            mutable_tags: default_mutable_tags(),
            pacing: Pacing::none(),
            dry_run: false,
            sync_description: true,
        };

        Self {
            registry: FakeRegistry {
                world: world.clone(),
            },
            world,
            transfer,
            options,
            logger: Logger::new_quiet(),
        }
    }

    pub fn planner(&self) -> SyncPlanner<'_> {
        SyncPlanner::new(&self.registry, &self.transfer, &self.options, &self.logger)
    }

    /// Sync a single mirror list line
    pub async fn sync_line(&self, line: &str, cache: &mut DigestCache) -> Result<RepositoryReport> {
        let entry = MirrorListParser::default()
            .parse_line(line, 1)?
            .ok_or_else(|| MirrorError::Config(format!("blank line: {:?}", line)))?;
        self.planner().sync(&entry, cache).await
    }

    pub async fn run_list(&self, list: &str, cache: &mut DigestCache) -> Result<BatchSummary> {
        let list = MirrorListParser::default().parse_str(list);
        assert!(list.rejected.is_empty(), "unexpected rejected lines");
        BatchDriver::new(self.planner(), &self.logger)
            .run(&list.entries, cache)
            .await
    }

    /// Reset the call logs while keeping registry contents
    pub fn clear_calls(&self) {
        let mut world = self.world.lock();
        world.listed.clear();
        world.digest_lookups.clear();
        world.copies.clear();
        world.created.clear();
        world.description_writes.clear();
    }
}
