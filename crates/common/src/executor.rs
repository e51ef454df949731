//! Managed executable invocation
//!
//! Every node operation the console exposes is a single run of the
//! node-management executable (`tools/pop` by default). Shell integration is
//! kept behind [`CommandExecutor`] so the wizard and the HTTP handlers can be
//! tested against fakes or throwaway scripts.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured output of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs the managed executable with a list of arguments.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run once; `Ok` only on exit code 0.
    async fn run(&self, args: &[&str]) -> Result<CommandOutput>;
}

/// Spawns a real child process for each call.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: PathBuf,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        debug!("Running {} {:?}", self.program.display(), args);

        // No stdin, no timeout. Both pipes are drained concurrently by output().
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(
                "{} {:?} failed with {:?}",
                self.program.display(),
                args,
                output.status.code()
            );
            return Err(Error::CommandFailed {
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Label used for the backup taken when the wizard finishes
pub const INITIAL_BACKUP_LABEL: &str = "initial-setup";

/// Typed front for the managed executable's flag vocabulary.
#[derive(Clone)]
pub struct NodeControl {
    executor: Arc<dyn CommandExecutor>,
}

impl NodeControl {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    pub async fn status(&self) -> Result<CommandOutput> {
        self.executor.run(&["--status"]).await
    }

    pub async fn start(&self) -> Result<CommandOutput> {
        self.executor.run(&["--start"]).await
    }

    pub async fn stop(&self) -> Result<CommandOutput> {
        self.executor.run(&["--stop"]).await
    }

    pub async fn restart(&self) -> Result<CommandOutput> {
        self.executor.run(&["--restart"]).await
    }

    pub async fn config_show(&self) -> Result<CommandOutput> {
        self.executor.run(&["--config", "show"]).await
    }

    pub async fn logs(&self, limit: u32) -> Result<CommandOutput> {
        let limit = limit.to_string();
        self.executor.run(&["--logs", &limit]).await
    }

    pub async fn backup(&self, label: &str) -> Result<CommandOutput> {
        self.executor.run(&["--backup", label]).await
    }
}

/// Derive the node state from `--status` output.
///
/// Substring heuristic kept for compatibility with the managed executable's
/// free-text output; anything that does not mention "running" is `stopped`.
pub fn node_status_from_output(output: &str) -> &'static str {
    if output.contains("running") {
        "running"
    } else {
        "stopped"
    }
}
