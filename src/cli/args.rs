//! Command-line argument parsing

use crate::cli::config::{AuthConfig, MirrorConfig, parse_tag_set};
use crate::common::{Pacing, RetryPolicy};
use crate::error::{MirrorError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "docker-image-mirror")]
#[command(about = "Mirror Docker Hub repositories into your own namespace, re-syncing mutable tags by digest")]
#[command(version, author)]
pub struct Args {
    /// Mirror list file
    #[arg(
        long = "config",
        short = 'c',
        default_value = "images.txt",
        help = "Mirror list: one [namespace/]image[:tag1,tag2] per line"
    )]
    pub config: PathBuf,

    /// Digest cache file
    #[arg(
        long = "cache",
        default_value = "digests.json",
        help = "Digest cache file (created when missing)"
    )]
    pub cache: PathBuf,

    /// Marker written when the cache changed
    #[arg(
        long = "changed-marker",
        default_value = ".cache-changed",
        help = "File created after a run that modified the digest cache"
    )]
    pub changed_marker: PathBuf,

    /// Registry username
    #[arg(
        long = "username",
        short = 'u',
        help = "Docker Hub username (or DOCKER_USERNAME)"
    )]
    pub username: Option<String>,

    /// Registry password
    #[arg(
        long = "password",
        short = 'p',
        help = "Docker Hub password or access token (or DOCKER_PASSWORD)"
    )]
    pub password: Option<String>,

    /// Target account
    #[arg(
        long = "target-account",
        short = 't',
        help = "Account receiving the mirrors (defaults to the username)"
    )]
    pub target_account: Option<String>,

    #[arg(
        long = "default-namespace",
        default_value = "library",
        help = "Namespace used when a line has none"
    )]
    pub default_namespace: String,

    #[arg(
        long = "mutable-tags",
        help = "Comma separated tags re-checked by digest (default: latest,stable,edge,main,master,nightly,alpine,slim)"
    )]
    pub mutable_tags: Option<String>,

    #[arg(long = "registry", default_value = "docker.io", help = "Registry host used in image references")]
    pub registry: String,

    #[arg(
        long = "hub-url",
        default_value = "https://hub.docker.com/",
        help = "Base URL of the repository metadata API"
    )]
    pub hub_url: String,

    #[arg(long = "page-size", default_value = "100", help = "Tags requested per listing page")]
    pub page_size: u32,

    /// Retry attempts for failed operations
    #[arg(
        long = "retry",
        default_value = "3",
        help = "Attempts per metadata request before giving up"
    )]
    pub retry: u32,

    #[arg(long = "retry-delay", default_value = "2", help = "Seconds between metadata retries")]
    pub retry_delay: u64,

    #[arg(long = "copy-retry", default_value = "2", help = "Attempts per transfer strategy")]
    pub copy_retry: u32,

    #[arg(long = "copy-retry-delay", default_value = "5", help = "Seconds between transfer retries")]
    pub copy_retry_delay: u64,

    #[arg(long = "copy-delay", default_value = "1", help = "Seconds to pause after every copied tag")]
    pub copy_delay: u64,

    #[arg(
        long = "repository-delay",
        default_value = "2",
        help = "Seconds to pause between repositories"
    )]
    pub repository_delay: u64,

    /// Timeout in seconds for network operations
    #[arg(
        long = "timeout",
        default_value = "60",
        help = "Timeout for metadata requests in seconds"
    )]
    pub timeout: u64,

    /// Dry run mode (plan without copying)
    #[arg(
        long = "dry-run",
        short = 'n',
        help = "Report what would be copied without copying or writing the cache"
    )]
    pub dry_run: bool,

    #[arg(long = "skip-description", help = "Do not mirror repository descriptions")]
    pub skip_description: bool,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long = "quiet", short = 'q', help = "Only print warnings and errors")]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.page_size == 0 || self.page_size > 100 {
            return Err("Page size must be between 1 and 100".to_string());
        }
        if self.retry == 0 || self.copy_retry == 0 {
            return Err("Retry attempts must be greater than 0".to_string());
        }
        if self.timeout == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }
        if self.verbose && self.quiet {
            return Err("--verbose and --quiet are mutually exclusive".to_string());
        }
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn from_env(mut self) -> Self {
        if self.username.is_none() {
            self.username = std::env::var("DOCKER_USERNAME").ok();
        }

        if self.password.is_none() {
            self.password = std::env::var("DOCKER_PASSWORD").ok();
        }

        if self.target_account.is_none() {
            self.target_account = std::env::var("MIRROR_TARGET_ACCOUNT").ok();
        }

        if self.mutable_tags.is_none() {
            self.mutable_tags = std::env::var("MIRROR_MUTABLE_TAGS").ok();
        }

        if std::env::var("MIRROR_VERBOSE").is_ok() {
            self.verbose = true;
        }

        self
    }

    /// Resolve into a [`MirrorConfig`]; missing credentials are a configuration error
    pub fn into_config(self) -> Result<MirrorConfig> {
        self.validate().map_err(MirrorError::Config)?;

        let username = self
            .username
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MirrorError::Config("Missing username (DOCKER_USERNAME)".to_string()))?;
        let password = self
            .password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| MirrorError::Config("Missing password (DOCKER_PASSWORD)".to_string()))?;

        let mut config = MirrorConfig::new(AuthConfig::new(username, password));
        config.mirror_list = self.config;
        config.cache_path = self.cache;
        config.changed_marker = self.changed_marker;
        if let Some(account) = self.target_account.filter(|a| !a.is_empty()) {
            config.target_account = account;
        }
        config.default_namespace = self.default_namespace;
        if let Some(tags) = self.mutable_tags {
            config.mutable_tags = parse_tag_set(&tags);
        }
        config.registry = self.registry;
        config.hub_url = self.hub_url;
        config.page_size = self.page_size;
        config.timeout = self.timeout;
        config.metadata_retry = RetryPolicy::new(self.retry, Duration::from_secs(self.retry_delay));
        config.transfer_retry = RetryPolicy::new(self.copy_retry, Duration::from_secs(self.copy_retry_delay));
        config.pacing = Pacing {
            copy_delay: Duration::from_secs(self.copy_delay),
            repository_delay: Duration::from_secs(self.repository_delay),
        };
        config.dry_run = self.dry_run;
        config.sync_description = !self.skip_description;
        config.verbose = self.verbose;
        config.quiet = self.quiet;

        Ok(config)
    }
}
