//! Configuration management module

use crate::common::{Pacing, RetryPolicy};
use crate::error::{MirrorError, Result};
use crate::image::DEFAULT_NAMESPACE;
use crate::registry::DEFAULT_HUB_URL;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REGISTRY: &str = "docker.io";
pub const DEFAULT_MUTABLE_TAGS: &[&str] = &[
    "latest", "stable", "edge", "main", "master", "nightly", "alpine", "slim",
];

/// Authentication configuration
#[derive(Clone)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl AuthConfig {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(MirrorError::Config("Username cannot be empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(MirrorError::Config("Password cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Parse a comma separated tag list into a set
pub fn parse_tag_set(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn default_mutable_tags() -> HashSet<String> {
    DEFAULT_MUTABLE_TAGS.iter().map(|t| t.to_string()).collect()
}

/// Fully resolved settings for one mirror run
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub mirror_list: PathBuf,
    pub cache_path: PathBuf,
    pub changed_marker: PathBuf,
    pub auth: AuthConfig,
    pub target_account: String,
    pub default_namespace: String,
    pub mutable_tags: HashSet<String>,
    pub registry: String,
    pub hub_url: String,
    pub page_size: u32,
    pub timeout: u64,
    pub metadata_retry: RetryPolicy,
    pub transfer_retry: RetryPolicy,
    pub pacing: Pacing,
    pub dry_run: bool,
    pub sync_description: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl MirrorConfig {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            mirror_list: PathBuf::from("images.txt"),
            cache_path: PathBuf::from("digests.json"),
            changed_marker: PathBuf::from(".cache-changed"),
            target_account: auth.username.clone(),
            auth,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            mutable_tags: default_mutable_tags(),
            registry: DEFAULT_REGISTRY.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            page_size: 100,
            timeout: 60,
            metadata_retry: RetryPolicy::new(3, Duration::from_secs(2)),
            transfer_retry: RetryPolicy::new(2, Duration::from_secs(5)),
            pacing: Pacing::default(),
            dry_run: false,
            sync_description: true,
            verbose: false,
            quiet: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;

        if self.target_account.is_empty() {
            return Err(MirrorError::Config("Target account cannot be empty".to_string()));
        }
        if !self.mirror_list.is_file() {
            return Err(MirrorError::Config(format!(
                "Mirror list not found: {}",
                self.mirror_list.display()
            )));
        }
        if !self.hub_url.starts_with("http://") && !self.hub_url.starts_with("https://") {
            return Err(MirrorError::Config(format!(
                "Invalid hub URL: {}. Must start with http:// or https://",
                self.hub_url
            )));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(MirrorError::Config("page_size must be between 1 and 100".to_string()));
        }
        if self.timeout == 0 {
            return Err(MirrorError::Config("timeout must be greater than 0".to_string()));
        }
        Ok(())
    }
}
