//! Transfer strategies backed by external copy tools

use crate::cli::config::AuthConfig;
use crate::error::handlers::ToolErrorHandler;
use crate::error::{MirrorError, Result};
use crate::image::ImageRef;
use crate::transfer::TransferStrategy;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// A single tool invocation; secret arguments are kept out of the printable form
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    redacted: Vec<usize>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redacted: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.redacted.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Command line safe for logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for (i, arg) in self.args.iter().enumerate() {
            if self.redacted.contains(&i) {
                parts.push("***".to_string());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    /// Run to completion; non-zero exit becomes a `Transfer` or `RateLimited` error
    pub async fn run(&self) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MirrorError::Transfer(format!("Failed to start {}: {}", self.program, e)))?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push('\n');
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(ToolErrorHandler::handle_tool_failure(
            &self.program,
            output.status.code(),
            &combined,
        ))
    }

    /// True when the program can be started and exits cleanly
    pub async fn probe(&self) -> bool {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Primary path: `skopeo copy --all`, copying every platform of a manifest list
pub struct SkopeoStrategy {
    pub program: String,
    pub retry_times: u32,
    pub credentials: Option<AuthConfig>,
}

impl SkopeoStrategy {
    pub fn new(credentials: Option<AuthConfig>) -> Self {
        Self {
            program: "skopeo".to_string(),
            retry_times: 3,
            credentials,
        }
    }

    pub fn command(&self, source: &ImageRef, target: &ImageRef) -> ToolCommand {
        let mut command = ToolCommand::new(&self.program)
            .arg("copy")
            .arg("--all")
            .arg("--retry-times")
            .arg(self.retry_times.to_string());

        if let Some(creds) = &self.credentials {
            let pair = format!("{}:{}", creds.username, creds.password);
            command = command
                .arg("--src-creds")
                .secret_arg(pair.clone())
                .arg("--dest-creds")
                .secret_arg(pair);
        }

        command
            .arg(source.docker_transport())
            .arg(target.docker_transport())
    }
}

#[async_trait]
impl TransferStrategy for SkopeoStrategy {
    fn name(&self) -> &'static str {
        "skopeo"
    }

    async fn is_available(&self) -> bool {
        ToolCommand::new(&self.program).arg("--version").probe().await
    }

    async fn copy(&self, source: &ImageRef, target: &ImageRef) -> Result<()> {
        self.command(source, target).run().await
    }
}

/// Fallback path: recompose the manifest list on the target with `docker buildx imagetools`
pub struct ImagetoolsStrategy {
    pub program: String,
}

impl ImagetoolsStrategy {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    pub fn command(&self, source: &ImageRef, target: &ImageRef) -> ToolCommand {
        ToolCommand::new(&self.program)
            .arg("buildx")
            .arg("imagetools")
            .arg("create")
            .arg("--tag")
            .arg(target.to_string())
            .arg(source.to_string())
    }
}

impl Default for ImagetoolsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferStrategy for ImagetoolsStrategy {
    fn name(&self) -> &'static str {
        "imagetools"
    }

    async fn is_available(&self) -> bool {
        ToolCommand::new(&self.program)
            .arg("buildx")
            .arg("version")
            .probe()
            .await
    }

    async fn copy(&self, source: &ImageRef, target: &ImageRef) -> Result<()> {
        self.command(source, target).run().await
    }
}
