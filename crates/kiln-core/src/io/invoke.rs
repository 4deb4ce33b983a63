//! Native build-tool invocation.
//!
//! Every step runs with a cleared environment; the caller supplies the full
//! variable set in [`Invocation::env`]. Output from both streams is captured
//! so the executor can append it to the build log.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[derive(Error, Debug)]
pub enum InvokeError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {}s", after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully rendered command ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Complete child environment. Nothing else is inherited.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: cwd.into(),
            timeout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `program arg1 arg2` for logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status and captured output of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs external programs on behalf of build steps and verification checks.
#[async_trait]
pub trait BuildTool: Send + Sync {
    async fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, InvokeError>;
}

/// [`BuildTool`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInvoker;

#[async_trait]
impl BuildTool for ProcessInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, InvokeError> {
        tracing::debug!(
            "Running `{}` in {}",
            invocation.command_line(),
            invocation.cwd.display()
        );

        let mut cmd = Command::new(&invocation.program);
        // Start from a blank slate so host env vars never leak in.
        cmd.env_clear()
            .envs(&invocation.env)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| InvokeError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let output = match invocation.timeout {
            Some(after) => match tokio::time::timeout(after, child.wait_with_output()).await {
                Ok(result) => result?,
                // Dropping the future drops the child, which kills it.
                Err(_) => {
                    return Err(InvokeError::Timeout {
                        program: invocation.program.clone(),
                        after,
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ToolOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}
