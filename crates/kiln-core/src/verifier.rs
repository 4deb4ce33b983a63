//! Post-install smoke checks.
//!
//! A failed check is reported but never rolls back the install.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kiln_schema::{Formula, PackageName, TestSpec};

use crate::builder::{BuildContext, Toolchain, tail_lines};
use crate::io::{BuildTool, Invocation};

/// Result of verifying one install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Pass,
    Fail(String),
}

impl Verification {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

pub struct Verifier {
    tool: Arc<dyn BuildTool>,
    toolchain: Toolchain,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("toolchain", &self.toolchain)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Verifier {
    pub fn new(tool: Arc<dyn BuildTool>, toolchain: Toolchain) -> Self {
        Self {
            tool,
            toolchain,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run every check declared by `formula` against `install_path`.
    ///
    /// `deps` supplies `{{deps.<name>}}` for checks that compile against
    /// dependencies.
    pub async fn verify(
        &self,
        formula: &Formula,
        install_path: &Path,
        deps: &[(PackageName, PathBuf)],
    ) -> Verification {
        if formula.tests.is_empty() {
            tracing::debug!("{}: no checks declared", formula.name());
            return Verification::Pass;
        }

        let scratch = match tempfile::Builder::new().prefix("kiln-test-").tempdir() {
            Ok(dir) => dir,
            Err(e) => return Verification::Fail(format!("cannot create scratch dir: {e}")),
        };

        let ctx = BuildContext {
            name: formula.name().clone(),
            version: formula.version().clone(),
            prefix: install_path.to_path_buf(),
            source_dir: scratch.path().to_path_buf(),
            workdir: scratch.path().to_path_buf(),
            deps: deps.to_vec(),
            resources: Vec::new(),
            toolchain: self.toolchain.clone(),
        };

        for check in &formula.tests {
            if let Err(reason) = self.run_check(check, &ctx).await {
                tracing::warn!("{} failed check `{}`: {reason}", formula.name(), check.label());
                return Verification::Fail(reason);
            }
        }

        Verification::Pass
    }

    async fn run_check(&self, check: &TestSpec, ctx: &BuildContext) -> Result<(), String> {
        let params = ctx.params();

        match check {
            TestSpec::PathExists { path } => {
                let rel = params.render(path).map_err(|e| e.to_string())?;
                let full = ctx.prefix.join(&rel);
                if full.exists() {
                    Ok(())
                } else {
                    Err(format!("{} does not exist", full.display()))
                }
            }
            TestSpec::Run {
                program,
                args,
                files,
                expect_stdout,
            } => {
                for (name, contents) in files {
                    let path = ctx.workdir.join(name);
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                    }
                    std::fs::write(&path, contents)
                        .map_err(|e| format!("cannot write {name}: {e}"))?;
                }

                let mut program = params.render(program).map_err(|e| e.to_string())?;
                if program.starts_with("./") {
                    program = ctx.workdir.join(&program).to_string_lossy().to_string();
                }

                let invocation = Invocation {
                    program,
                    args: params.render_all(args).map_err(|e| e.to_string())?,
                    env: ctx.env(),
                    cwd: ctx.workdir.clone(),
                    timeout: self.timeout,
                };

                let output = self
                    .tool
                    .invoke(&invocation)
                    .await
                    .map_err(|e| e.to_string())?;

                if !output.success() {
                    return Err(format!(
                        "`{}` exited with {}\n{}",
                        invocation.command_line(),
                        output
                            .exit_code
                            .map_or_else(|| "a signal".to_string(), |c| format!("code {c}")),
                        tail_lines(&output.output, 20)
                    ));
                }

                if let Some(expected) = expect_stdout {
                    if !output.output.contains(expected.as_str()) {
                        return Err(format!(
                            "`{}` output did not contain \"{expected}\"",
                            invocation.command_line()
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}
