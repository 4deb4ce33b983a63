//! Build executor: runs a [`BuildPlan`] against the install registry.
//!
//! Packages are started in plan order. With `jobs > 1` every package whose
//! planned dependencies have all been committed is scheduled onto a
//! [`JoinSet`], up to `jobs` at a time. Registry commits and verification
//! happen on the coordinating task, so a dependent is never started before
//! its dependency's record is visible.
//!
//! A failed package never takes down the run: its dependents are reported as
//! skipped and, under [`FailurePolicy::ContinueIndependent`], unrelated
//! branches keep building.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use kiln_schema::{Formula, PackageName, SourceRef, Version};

use crate::builder::{BuildContext, Toolchain, append_log, tail_lines};
use crate::host;
use crate::io::{
    BuildTool, FetchError, FilePatcher, InvokeError, PatchError, PatchOutcome, RegexPatcher,
    SourceFetcher,
};
use crate::params::ParamError;
use crate::paths::Layout;
use crate::registry::{InstallRecord, InstallRegistry, RegistryError};
use crate::reporter::{NullReporter, Reporter};
use crate::resolver::{BuildPlan, PlannedPackage};
use crate::verifier::{Verification, Verifier};

/// Lines of step output kept in a [`BuildError::StepFailed`].
const FAILURE_TAIL_LINES: usize = 20;

/// What happens to the rest of the plan after a package fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Skip only the failed package's dependents.
    #[default]
    ContinueIndependent,
    /// Start nothing new once any package has failed.
    Abort,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub layout: Layout,
    pub toolchain: Toolchain,
    /// Packages built concurrently. `1` builds strictly in plan order.
    pub jobs: usize,
    pub failure_policy: FailurePolicy,
    /// Per-step limit; an expired step fails with [`BuildError::StepTimeout`].
    pub step_timeout: Option<Duration>,
    /// Leave work directories in `<home>/tmp` for inspection.
    pub keep_work_dirs: bool,
}

impl ExecutorConfig {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            toolchain: Toolchain::default(),
            jobs: 1,
            failure_policy: FailurePolicy::default(),
            step_timeout: None,
            keep_work_dirs: false,
        }
    }
}

/// Why one package did not get installed.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Patch failed: {0}")]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Parameter(#[from] ParamError),

    #[error("Step {} (`{program}`) failed with {}\n{output}", .index + 1, format_exit(.exit_code))]
    StepFailed {
        /// Zero-based step index.
        index: usize,
        program: String,
        exit_code: Option<i32>,
        /// Tail of the step's combined output.
        output: String,
        /// Full build log.
        log: PathBuf,
    },

    #[error("Step {} (`{program}`) timed out after {}s", .index + 1, .after.as_secs())]
    StepTimeout {
        index: usize,
        program: String,
        after: Duration,
    },

    #[error("Failed to run build tool: {0}")]
    Invoke(#[from] InvokeError),

    #[error("Dependency '{name}' is not installed")]
    MissingDependency { name: PackageName },

    #[error("Host package '{name}' not found (tried {tried})")]
    HostNotFound { name: PackageName, tried: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Build task panicked: {0}")]
    Panicked(String),
}

fn format_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "a signal".to_string(), |c| format!("exit code {c}"))
}

/// Final state of one planned package.
#[derive(Debug)]
pub enum Outcome {
    /// Built and committed. Verification failures leave the install in place.
    Installed {
        record: Arc<InstallRecord>,
        verification: Verification,
    },
    Failed(BuildError),
    /// Not attempted because a dependency (transitively) failed.
    Skipped { blocked_by: PackageName },
    /// Not started before cancellation.
    Cancelled,
}

#[derive(Debug)]
pub struct PackageOutcome {
    pub name: PackageName,
    pub version: Version,
    pub outcome: Outcome,
    /// Wall time spent building, zero for packages never started.
    pub elapsed: Duration,
}

impl PackageOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self.outcome, Outcome::Installed { .. })
    }
}

/// Everything that happened during one [`Executor::execute`] call.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// One entry per planned package, in plan order.
    pub outcomes: Vec<PackageOutcome>,
    /// Packages the resolver left out as already satisfied.
    pub pruned: Vec<PackageName>,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn installed(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.outcomes.iter().filter(|o| o.is_installed())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&PackageOutcome, &BuildError)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Failed(e) => Some((o, e)),
            _ => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped { .. }))
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &PackageOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Cancelled))
    }

    /// Installed packages whose smoke checks failed, with the reason.
    pub fn verification_failures(&self) -> impl Iterator<Item = (&PackageOutcome, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Installed {
                verification: Verification::Fail(reason),
                ..
            } => Some((o, reason.as_str())),
            _ => None,
        })
    }

    /// `true` when every planned package was installed. Verification
    /// failures do not count against success.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(PackageOutcome::is_installed)
    }

    pub fn get(&self, name: &str) -> Option<&PackageOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

/// Sequences fetch, patch, build and verify for every package in a plan.
pub struct Executor {
    config: Arc<ExecutorConfig>,
    fetcher: Arc<dyn SourceFetcher>,
    tool: Arc<dyn BuildTool>,
    patcher: Arc<dyn FilePatcher>,
    reporter: Arc<dyn Reporter>,
    verifier: Verifier,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(
        config: ExecutorConfig,
        fetcher: Arc<dyn SourceFetcher>,
        tool: Arc<dyn BuildTool>,
    ) -> Self {
        let verifier = Verifier::new(Arc::clone(&tool), config.toolchain.clone())
            .with_timeout(config.step_timeout);
        Self {
            config: Arc::new(config),
            fetcher,
            tool,
            patcher: Arc::new(RegexPatcher),
            reporter: Arc::new(NullReporter),
            verifier,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_patcher(mut self, patcher: Arc<dyn FilePatcher>) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Share an externally owned token (e.g. one cancelled on Ctrl-C).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Build every package in `plan`, committing each success to `registry`.
    ///
    /// Never fails as a whole: every package ends up with an [`Outcome`] in
    /// the returned report. Cancellation is honoured between packages; a
    /// running step is left to finish.
    pub async fn execute(&self, plan: &BuildPlan, registry: &InstallRegistry) -> ExecutionReport {
        let started = Instant::now();
        let total = plan.len();
        let jobs = self.config.jobs.max(1);

        let overview: Vec<(PackageName, Version)> = plan
            .iter()
            .map(|p| (p.name().clone(), p.formula.version().clone()))
            .collect();
        self.reporter.prepare_plan(&overview);

        let mut states: Vec<Option<(Outcome, Duration)>> = (0..total).map(|_| None).collect();
        let mut running: HashSet<usize> = HashSet::new();
        let mut set: JoinSet<Finished> = JoinSet::new();
        let mut first_failure: Option<PackageName> = None;

        loop {
            if !self.cancel.is_cancelled() {
                for idx in 0..total {
                    if running.len() >= jobs {
                        break;
                    }
                    if states[idx].is_some() || running.contains(&idx) {
                        continue;
                    }
                    let pkg = &plan.packages[idx];

                    if self.config.failure_policy == FailurePolicy::Abort {
                        if let Some(cause) = &first_failure {
                            self.skip(pkg, cause.clone(), &mut states[idx]);
                            continue;
                        }
                    }

                    match readiness(pkg, plan, &states) {
                        Readiness::Waiting => continue,
                        Readiness::Blocked(cause) => {
                            self.skip(pkg, cause, &mut states[idx]);
                            continue;
                        }
                        Readiness::Ready => {}
                    }

                    match dependency_paths(pkg, registry) {
                        Ok(deps) => {
                            running.insert(idx);
                            set.spawn(self.job(idx, pkg, deps).run());
                        }
                        Err(e) => {
                            self.reporter
                                .failed(pkg.name(), pkg.formula.version(), &e.to_string());
                            first_failure.get_or_insert_with(|| pkg.name().clone());
                            states[idx] = Some((Outcome::Failed(e), Duration::ZERO));
                        }
                    }
                }
            }

            let Some(joined) = set.join_next().await else {
                break;
            };

            let finished = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    tracing::error!("Build task did not complete: {e}");
                    continue;
                }
            };
            running.remove(&finished.index);

            let pkg = &plan.packages[finished.index];
            let outcome = match finished.result {
                Ok(record) => self.commit(pkg, record, &finished.deps, registry).await,
                Err(e) => {
                    tracing::info!("{} failed: {e}", pkg.name());
                    self.reporter
                        .failed(pkg.name(), pkg.formula.version(), &e.to_string());
                    Outcome::Failed(e)
                }
            };
            if matches!(outcome, Outcome::Failed(_)) {
                first_failure.get_or_insert_with(|| pkg.name().clone());
            }
            states[finished.index] = Some((outcome, finished.elapsed));
        }

        let outcomes = plan
            .iter()
            .zip(states)
            .enumerate()
            .map(|(idx, (pkg, state))| {
                let (outcome, elapsed) = state.unwrap_or_else(|| {
                    if running.contains(&idx) {
                        (
                            Outcome::Failed(BuildError::Panicked(
                                "task aborted before reporting".to_string(),
                            )),
                            Duration::ZERO,
                        )
                    } else {
                        self.reporter
                            .skipped(pkg.name(), pkg.formula.version(), "cancelled");
                        (Outcome::Cancelled, Duration::ZERO)
                    }
                });
                PackageOutcome {
                    name: pkg.name().clone(),
                    version: pkg.formula.version().clone(),
                    outcome,
                    elapsed,
                }
            })
            .collect::<Vec<_>>();

        let elapsed = started.elapsed();
        let installed = outcomes.iter().filter(|o| o.is_installed()).count();
        if installed > 0 {
            self.reporter.summary(installed, "installed", elapsed.as_secs_f64());
        }

        ExecutionReport {
            outcomes,
            pruned: plan.pruned.clone(),
            elapsed,
        }
    }

    fn skip(
        &self,
        pkg: &PlannedPackage,
        blocked_by: PackageName,
        slot: &mut Option<(Outcome, Duration)>,
    ) {
        tracing::info!("Skipping {}: blocked by {blocked_by}", pkg.name());
        self.reporter.skipped(
            pkg.name(),
            pkg.formula.version(),
            &format!("blocked by {blocked_by}"),
        );
        *slot = Some((Outcome::Skipped { blocked_by }, Duration::ZERO));
    }

    fn job(&self, index: usize, pkg: &PlannedPackage, deps: Vec<(PackageName, PathBuf)>) -> BuildJob {
        BuildJob {
            index,
            formula: Arc::clone(&pkg.formula),
            deps,
            config: Arc::clone(&self.config),
            fetcher: Arc::clone(&self.fetcher),
            tool: Arc::clone(&self.tool),
            patcher: Arc::clone(&self.patcher),
            reporter: Arc::clone(&self.reporter),
        }
    }

    /// Publish a finished build and run its smoke checks.
    async fn commit(
        &self,
        pkg: &PlannedPackage,
        record: InstallRecord,
        deps: &[(PackageName, PathBuf)],
        registry: &InstallRegistry,
    ) -> Outcome {
        let name = pkg.name();
        let version = pkg.formula.version();

        let record = match registry.record(record) {
            Ok(record) => record,
            Err(e) => {
                let e = BuildError::from(e);
                self.reporter.failed(name, version, &e.to_string());
                return Outcome::Failed(e);
            }
        };

        let verification = if record.host {
            Verification::Pass
        } else {
            self.reporter.verifying(name, version);
            self.verifier
                .verify(&pkg.formula, &record.install_path, deps)
                .await
        };

        match &verification {
            Verification::Pass => {
                let detail = if record.host { "found on host" } else { "installed" };
                self.reporter.done(name, version, detail);
            }
            Verification::Fail(reason) => {
                self.reporter
                    .done(name, version, "installed, verification failed");
                self.reporter
                    .warning(&format!("{name} {version}: verification failed: {reason}"));
            }
        }

        tracing::info!("{name} {version} committed at {}", record.install_path.display());
        Outcome::Installed {
            record,
            verification,
        }
    }
}

enum Readiness {
    Ready,
    /// A planned dependency has not finished yet.
    Waiting,
    /// A planned dependency failed or was skipped; carries the root cause.
    Blocked(PackageName),
}

fn readiness(
    pkg: &PlannedPackage,
    plan: &BuildPlan,
    states: &[Option<(Outcome, Duration)>],
) -> Readiness {
    for dep in &pkg.planned_deps {
        let Some(pos) = plan.position(dep) else {
            continue;
        };
        match &states[pos] {
            None => return Readiness::Waiting,
            Some((Outcome::Installed { .. }, _)) => {}
            Some((Outcome::Failed(_), _)) => return Readiness::Blocked(dep.clone()),
            Some((Outcome::Skipped { blocked_by }, _)) => {
                return Readiness::Blocked(blocked_by.clone());
            }
            Some((Outcome::Cancelled, _)) => return Readiness::Waiting,
        }
    }
    Readiness::Ready
}

/// Install paths for every followed dependency, read from the registry.
fn dependency_paths(
    pkg: &PlannedPackage,
    registry: &InstallRegistry,
) -> Result<Vec<(PackageName, PathBuf)>, BuildError> {
    pkg.dependencies
        .iter()
        .map(|dep| {
            registry
                .lookup(&dep.name)
                .map(|record| (dep.name.clone(), record.install_path.clone()))
                .ok_or_else(|| BuildError::MissingDependency {
                    name: dep.name.clone(),
                })
        })
        .collect()
}

struct Finished {
    index: usize,
    deps: Vec<(PackageName, PathBuf)>,
    result: Result<InstallRecord, BuildError>,
    elapsed: Duration,
}

/// Owned inputs for building one package on a worker task.
struct BuildJob {
    index: usize,
    formula: Arc<Formula>,
    deps: Vec<(PackageName, PathBuf)>,
    config: Arc<ExecutorConfig>,
    fetcher: Arc<dyn SourceFetcher>,
    tool: Arc<dyn BuildTool>,
    patcher: Arc<dyn FilePatcher>,
    reporter: Arc<dyn Reporter>,
}

impl BuildJob {
    async fn run(self) -> Finished {
        let started = Instant::now();
        let result = match AssertUnwindSafe(self.build()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(BuildError::Panicked(msg))
            }
        };
        Finished {
            index: self.index,
            deps: self.deps,
            result,
            elapsed: started.elapsed(),
        }
    }

    async fn build(&self) -> Result<InstallRecord, BuildError> {
        let name = self.formula.name();
        let version = self.formula.version();
        tracing::info!("Starting {name} {version}");

        if let SourceRef::Host { host } = &self.formula.source {
            self.reporter.fetching(name, version);
            let prefix = host::locate(host).ok_or_else(|| BuildError::HostNotFound {
                name: name.clone(),
                tried: host::describe_search(host),
            })?;
            let mut record = InstallRecord::new(name.clone(), version.clone(), None, prefix);
            record.host = true;
            return Ok(record);
        }

        let layout = &self.config.layout;
        std::fs::create_dir_all(layout.tmp_path())?;
        let workdir = tempfile::Builder::new()
            .prefix(&format!("kiln-build-{name}-"))
            .tempdir_in(layout.tmp_path())?;
        std::fs::create_dir_all(workdir.path().join("tmp"))?;

        let resources_dir = workdir.path().join("resources");
        let ctx = BuildContext {
            name: name.clone(),
            version: version.clone(),
            prefix: layout.keg_path(name, version),
            source_dir: workdir.path().join("src"),
            workdir: workdir.path().to_path_buf(),
            deps: self.deps.clone(),
            resources: self
                .formula
                .resources
                .iter()
                .map(|r| (r.name.clone(), resources_dir.join(&r.name)))
                .collect(),
            toolchain: self.config.toolchain.clone(),
        };

        // Rendered up front so a bad template fails before any side effect.
        let params = ctx.params();
        let env = ctx.env();
        let invocations = self
            .formula
            .steps
            .iter()
            .map(|step| ctx.render_step(step, &params, &env, self.config.step_timeout))
            .collect::<Result<Vec<_>, _>>()?;

        self.reporter.fetching(name, version);
        let fetched = self.fetcher.fetch(&self.formula.source, &ctx.source_dir).await?;
        for (resource, (_, dest)) in self.formula.resources.iter().zip(&ctx.resources) {
            tracing::debug!("Fetching resource {} for {name}", resource.name);
            self.fetcher.fetch_resource(resource, dest).await?;
        }

        for patch in &self.formula.patches {
            match self.patcher.apply(&ctx.source_dir, patch)? {
                PatchOutcome::Applied { replacements } => {
                    tracing::debug!("Patched {} ({replacements} replacements)", patch.file);
                }
                PatchOutcome::Skipped => {
                    tracing::warn!("{name}: pattern '{}' not found in {}", patch.pattern, patch.file);
                    self.reporter.warning(&format!(
                        "{name}: optional patch to {} did not apply",
                        patch.file
                    ));
                }
            }
        }

        let keg = KegGuard::create(&ctx.prefix)?;
        let log = layout.build_log_path(name, version);
        let steps = invocations.len();

        for (index, (invocation, step)) in invocations.iter().zip(&self.formula.steps).enumerate() {
            self.reporter
                .building(name, version, index + 1, steps, &step.label());
            tracing::debug!("{name}: {}", invocation.command_line());

            let output = match self.tool.invoke(invocation).await {
                Ok(output) => output,
                Err(InvokeError::Timeout { after, .. }) => {
                    return Err(BuildError::StepTimeout {
                        index,
                        program: invocation.program.clone(),
                        after,
                    });
                }
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = append_log(&log, &invocation.command_line(), &output.output) {
                tracing::warn!("Could not write build log {}: {e}", log.display());
            }

            if !output.success() {
                return Err(BuildError::StepFailed {
                    index,
                    program: invocation.program.clone(),
                    exit_code: output.exit_code,
                    output: tail_lines(&output.output, FAILURE_TAIL_LINES),
                    log,
                });
            }
        }

        let prefix = keg.keep();
        if self.config.keep_work_dirs {
            let kept = workdir.keep();
            tracing::info!("Kept work directory {}", kept.display());
        }

        let revision = fetched
            .revision
            .or_else(|| self.formula.revision().map(String::from));
        tracing::info!("Finished {name} {version}");
        Ok(InstallRecord::new(name.clone(), version.clone(), revision, prefix))
    }
}

/// The keg a build installs into.
///
/// An existing keg at the same path is moved aside while the build runs. If
/// the build does not complete, the partial keg is removed and the previous
/// one is put back, so a registered install keeps its files.
struct KegGuard {
    path: PathBuf,
    previous: Option<PathBuf>,
    armed: bool,
}

impl KegGuard {
    fn create(path: &Path) -> std::io::Result<Self> {
        let previous = if path.exists() {
            let aside = aside_path(path);
            if aside.exists() {
                tracing::debug!("Removing stale keg {}", aside.display());
                std::fs::remove_dir_all(&aside)?;
            }
            tracing::debug!("Moving existing keg {} aside", path.display());
            std::fs::rename(path, &aside)?;
            Some(aside)
        } else {
            None
        };
        std::fs::create_dir_all(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            previous,
            armed: true,
        })
    }

    /// Accept the new keg and discard the one it replaces.
    fn keep(mut self) -> PathBuf {
        self.armed = false;
        if let Some(previous) = self.previous.take() {
            if let Err(e) = std::fs::remove_dir_all(&previous) {
                tracing::warn!("Could not remove replaced keg {}: {e}", previous.display());
            }
        }
        std::mem::take(&mut self.path)
    }
}

impl Drop for KegGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!("Could not remove partial keg {}: {e}", self.path.display());
        }
        if let Some(previous) = self.previous.take() {
            if let Err(e) = std::fs::rename(&previous, &self.path) {
                tracing::warn!(
                    "Could not restore keg {} from {}: {e}",
                    self.path.display(),
                    previous.display()
                );
            }
        }
    }
}

/// `<cellar>/<name>/<version>` becomes `<cellar>/<name>/.<version>.previous`.
fn aside_path(path: &Path) -> PathBuf {
    let version = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{version}.previous"))
}
