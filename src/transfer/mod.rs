//! Image transfer: copying one source reference to one target reference
//!
//! Strategies are tried in order. Each one runs under the transfer [`RetryPolicy`]; a
//! rate-limit signal is returned at once without touching the remaining strategies.

pub mod command;

use crate::common::RetryPolicy;
use crate::error::{MirrorError, Result};
use crate::image::ImageRef;
use crate::logging::Logger;
use async_trait::async_trait;

pub use command::{ImagetoolsStrategy, SkopeoStrategy, ToolCommand};

/// Common transfer strategy trait
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    /// Get strategy name for logging
    fn name(&self) -> &'static str;

    /// Whether the backing tool can be used on this machine
    async fn is_available(&self) -> bool;

    async fn copy(&self, source: &ImageRef, target: &ImageRef) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Copied { strategy: &'static str },
    RateLimited(String),
    Failed(String),
}

pub struct ImageTransfer {
    strategies: Vec<Box<dyn TransferStrategy>>,
    retry: RetryPolicy,
    logger: Logger,
}

impl ImageTransfer {
    pub fn new(strategies: Vec<Box<dyn TransferStrategy>>, retry: RetryPolicy, logger: Logger) -> Self {
        Self {
            strategies,
            retry,
            logger,
        }
    }

    /// Keep only the strategies whose tools are present, preserving order
    pub async fn detect(
        candidates: Vec<Box<dyn TransferStrategy>>,
        retry: RetryPolicy,
        logger: Logger,
    ) -> Result<Self> {
        let mut available = Vec::new();
        for strategy in candidates {
            if strategy.is_available().await {
                logger.verbose(&format!("Transfer strategy available: {}", strategy.name()));
                available.push(strategy);
            } else {
                logger.warning(&format!(
                    "Transfer strategy {} unavailable, skipping it",
                    strategy.name()
                ));
            }
        }

        if available.is_empty() {
            return Err(MirrorError::Config(
                "No image copy tool available (install skopeo or docker buildx)".to_string(),
            ));
        }

        Ok(Self::new(available, retry, logger))
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn copy(&self, source: &ImageRef, target: &ImageRef) -> TransferOutcome {
        let mut reasons = Vec::new();

        for strategy in &self.strategies {
            self.logger
                .detail(&format!("{}: {} -> {}", strategy.name(), source, target));

            let context = format!("{} copy of {}", strategy.name(), source);
            let result = self
                .retry
                .run(&self.logger, &context, |e| !e.is_rate_limited(), || {
                    strategy.copy(source, target)
                })
                .await;

            match result {
                Ok(()) => {
                    return TransferOutcome::Copied {
                        strategy: strategy.name(),
                    };
                }
                Err(MirrorError::RateLimited(reason)) => return TransferOutcome::RateLimited(reason),
                Err(err) => {
                    self.logger
                        .warning(&format!("{} failed for {}: {}", strategy.name(), source, err));
                    reasons.push(format!("{}: {}", strategy.name(), err));
                }
            }
        }

        if reasons.is_empty() {
            reasons.push("no transfer strategy configured".to_string());
        }
        TransferOutcome::Failed(reasons.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        available: bool,
        results: Mutex<Vec<Result<()>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, available: bool, results: Vec<Result<()>>) -> Self {
            Self {
                name,
                available,
                results: Mutex::new(results),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TransferStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn copy(&self, _source: &ImageRef, _target: &ImageRef) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Ok(())
            } else {
                results.remove(0)
            }
        }
    }

    fn refs() -> (ImageRef, ImageRef) {
        (
            ImageRef::new("docker.io", "library/redis", "7.2"),
            ImageRef::new("docker.io", "me/library_redis", "7.2"),
        )
    }

    fn transfer(strategies: Vec<Box<dyn TransferStrategy>>, attempts: u32) -> ImageTransfer {
        ImageTransfer::new(
            strategies,
            RetryPolicy::new(attempts, std::time::Duration::ZERO),
            Logger::new_quiet(),
        )
    }

    #[tokio::test]
    async fn primary_success_skips_fallback() {
        let (source, target) = refs();
        let transfer = transfer(
            vec![
                Box::new(Scripted::new("primary", true, vec![])),
                Box::new(Scripted::new("fallback", true, vec![])),
            ],
            1,
        );
        assert_eq!(
            transfer.copy(&source, &target).await,
            TransferOutcome::Copied { strategy: "primary" }
        );
    }

    #[tokio::test]
    async fn falls_back_after_primary_exhausts_retries() {
        let (source, target) = refs();
        let transfer = transfer(
            vec![
                Box::new(Scripted::new(
                    "primary",
                    true,
                    vec![
                        Err(MirrorError::Transfer("boom".into())),
                        Err(MirrorError::Transfer("boom".into())),
                    ],
                )),
                Box::new(Scripted::new("fallback", true, vec![])),
            ],
            2,
        );
        assert_eq!(
            transfer.copy(&source, &target).await,
            TransferOutcome::Copied { strategy: "fallback" }
        );
    }

    #[tokio::test]
    async fn rate_limit_stops_without_fallback() {
        let (source, target) = refs();
        let fallback = std::sync::Arc::new(Scripted::new("fallback", true, vec![]));

        struct Shared(std::sync::Arc<Scripted>);
        #[async_trait]
        impl TransferStrategy for Shared {
            fn name(&self) -> &'static str {
                self.0.name()
            }
            async fn is_available(&self) -> bool {
                true
            }
            async fn copy(&self, source: &ImageRef, target: &ImageRef) -> Result<()> {
                self.0.copy(source, target).await
            }
        }

        let transfer = transfer(
            vec![
                Box::new(Scripted::new(
                    "primary",
                    true,
                    vec![Err(MirrorError::RateLimited("toomanyrequests".into()))],
                )),
                Box::new(Shared(fallback.clone())),
            ],
            3,
        );

        assert!(matches!(
            transfer.copy(&source, &target).await,
            TransferOutcome::RateLimited(_)
        ));
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn all_strategies_failing_reports_every_reason() {
        let (source, target) = refs();
        let transfer = transfer(
            vec![
                Box::new(Scripted::new("primary", true, vec![Err(MirrorError::Transfer("a".into()))])),
                Box::new(Scripted::new("fallback", true, vec![Err(MirrorError::Transfer("b".into()))])),
            ],
            1,
        );
        match transfer.copy(&source, &target).await {
            TransferOutcome::Failed(reason) => {
                assert!(reason.contains("primary"));
                assert!(reason.contains("fallback"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn detect_drops_unavailable_tools() {
        let transfer = ImageTransfer::detect(
            vec![
                Box::new(Scripted::new("primary", false, vec![])),
                Box::new(Scripted::new("fallback", true, vec![])),
            ],
            RetryPolicy::once(),
            Logger::new_quiet(),
        )
        .await
        .unwrap();
        assert_eq!(transfer.strategy_names(), vec!["fallback"]);

        let none = ImageTransfer::detect(
            vec![Box::new(Scripted::new("primary", false, vec![]))],
            RetryPolicy::once(),
            Logger::new_quiet(),
        )
        .await;
        assert!(matches!(none, Err(MirrorError::Config(_))));
    }
}
