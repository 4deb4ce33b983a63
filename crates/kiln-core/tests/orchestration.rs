//! End-to-end resolve + execute runs with fake fetch and build collaborators.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use kiln_core::executor::{BuildError, FailurePolicy, Outcome};
use kiln_core::io::{BuildTool, FetchError, Fetched, Invocation, InvokeError, SourceFetcher, ToolOutput};
use kiln_core::resolver::check_graph;
use kiln_core::{
    DescriptorSet, Executor, ExecutorConfig, InstallRecord, InstallRegistry, Layout, Reporter,
    ResolveError, ResolveOptions, Verification, resolve, resolve_many,
};
use kiln_schema::{Formula, PackageName, SourceRef, Version};

const SHA: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Formula with one `make` step per package; `extra` is appended verbatim.
fn formula(name: &str, deps: &[&str], extra: &str) -> Formula {
    let deps = deps
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    Formula::parse(&format!(
        r#"
[package]
name = "{name}"
version = "1.0.0"

[source]
url = "/nonexistent/{name}.tar.gz"
sha256 = "{SHA}"

[dependencies]
runtime = [{deps}]

[[build]]
run = "command"
program = "make"
args = ["{name}", "{{{{prefix}}}}"]
{extra}
"#
    ))
    .unwrap()
}

#[derive(Default)]
struct FakeFetcher {
    fetched: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, _source: &SourceRef, dest: &Path) -> Result<Fetched, FetchError> {
        std::fs::create_dir_all(dest)?;
        std::fs::write(dest.join("CMakeLists.txt"), "project(fake)\n")?;
        self.fetched.lock().unwrap().push(dest.to_path_buf());
        Ok(Fetched::default())
    }
}

/// `make <name> <prefix>` installs `<prefix>/lib/lib<name>.so` unless `<name>`
/// is listed in `fail`. Every other program just succeeds.
#[derive(Default)]
struct FakeTool {
    fail: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<Invocation>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Cancel this token while `make <name>` runs.
    cancel_during: Option<(String, CancellationToken)>,
}

impl FakeTool {
    fn failing(names: &[&str]) -> Self {
        Self {
            fail: names.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    fn built(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == "make")
            .map(|c| c.args[0].clone())
            .collect()
    }
}

#[async_trait]
impl BuildTool for FakeTool {
    async fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, InvokeError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if invocation.program != "make" {
            return Ok(ToolOutput {
                exit_code: Some(0),
                output: String::new(),
            });
        }

        let name = &invocation.args[0];
        if let Some((during, token)) = &self.cancel_during {
            if during == name {
                token.cancel();
            }
        }
        if self.fail.contains(name) {
            return Ok(ToolOutput {
                exit_code: Some(2),
                output: format!("compiling {name}\nerror: {name} does not build\n"),
            });
        }

        let lib = Path::new(&invocation.args[1]).join("lib");
        std::fs::create_dir_all(&lib)?;
        std::fs::write(lib.join(format!("lib{name}.so")), "")?;
        Ok(ToolOutput {
            exit_code: Some(0),
            output: format!("built {name}\n"),
        })
    }
}

#[derive(Default)]
struct RecordingReporter {
    events: Mutex<Vec<String>>,
}

impl RecordingReporter {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn prepare_plan(&self, packages: &[(PackageName, Version)]) {
        self.push(format!("plan {}", packages.len()));
    }
    fn section(&self, _: &str) {}
    fn fetching(&self, name: &PackageName, _: &Version) {
        self.push(format!("fetch {name}"));
    }
    fn building(&self, name: &PackageName, _: &Version, step: usize, total: usize, _: &str) {
        self.push(format!("build {name} {step}/{total}"));
    }
    fn verifying(&self, name: &PackageName, _: &Version) {
        self.push(format!("verify {name}"));
    }
    fn removing(&self, _: &PackageName, _: &Version) {}
    fn done(&self, name: &PackageName, _: &Version, detail: &str) {
        self.push(format!("done {name} {detail}"));
    }
    fn failed(&self, name: &PackageName, _: &Version, _: &str) {
        self.push(format!("failed {name}"));
    }
    fn skipped(&self, name: &PackageName, _: &Version, reason: &str) {
        self.push(format!("skipped {name} {reason}"));
    }
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, msg: &str) {
        self.push(format!("warning {msg}"));
    }
    fn error(&self, _: &str) {}
    fn summary(&self, count: usize, action: &str, _: f64) {
        self.push(format!("summary {count} {action}"));
    }
}

struct Harness {
    home: TempDir,
    fetcher: Arc<FakeFetcher>,
    tool: Arc<FakeTool>,
    reporter: Arc<RecordingReporter>,
}

impl Harness {
    fn new(tool: FakeTool) -> Self {
        Self {
            home: TempDir::new().unwrap(),
            fetcher: Arc::new(FakeFetcher::default()),
            tool: Arc::new(tool),
            reporter: Arc::new(RecordingReporter::default()),
        }
    }

    fn layout(&self) -> Layout {
        Layout::new(self.home.path())
    }

    fn executor(&self, jobs: usize, policy: FailurePolicy) -> Executor {
        let mut config = ExecutorConfig::new(self.layout());
        config.jobs = jobs;
        config.failure_policy = policy;
        Executor::new(config, self.fetcher.clone(), self.tool.clone())
            .with_reporter(self.reporter.clone())
    }

    fn keg(&self, name: &str) -> PathBuf {
        self.layout().keg_path(name, "1.0.0")
    }
}

fn names(plan: &kiln_core::BuildPlan) -> Vec<&str> {
    plan.names().into_iter().map(PackageName::as_str).collect()
}

#[tokio::test]
async fn chain_resolves_and_installs_in_order() {
    let descriptors: DescriptorSet = [
        formula("c", &["b"], ""),
        formula("a", &[], ""),
        formula("b", &["a"], ""),
    ]
    .into_iter()
    .collect();
    let registry = InstallRegistry::in_memory();

    let plan = resolve("c", &registry, &descriptors, &ResolveOptions::default()).unwrap();
    assert_eq!(names(&plan), vec!["a", "b", "c"]);

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;

    assert!(report.is_success());
    assert_eq!(h.tool.built(), vec!["a", "b", "c"]);
    assert_eq!(registry.lookup("c").unwrap().install_path, h.keg("c"));
    assert!(h.keg("c").join("lib/libc.so").exists());
    assert!(h.reporter.events().contains(&"summary 3 installed".to_string()));
}

#[test]
fn two_node_cycle_is_rejected() {
    let descriptors: DescriptorSet = [formula("a", &["b"], ""), formula("b", &["a"], "")]
        .into_iter()
        .collect();
    let registry = InstallRegistry::in_memory();

    let err = resolve("a", &registry, &descriptors, &ResolveOptions::default()).unwrap_err();
    let ResolveError::CyclicDependency { cycle } = err else {
        panic!("expected a cycle, got {err:?}");
    };
    assert_eq!(cycle, vec![PackageName::new("a"), PackageName::new("b")]);
}

#[tokio::test]
async fn failed_package_blocks_its_dependents() {
    let descriptors: DescriptorSet = [
        formula("a", &[], ""),
        formula("b", &["a"], ""),
        formula("c", &["b"], ""),
    ]
    .into_iter()
    .collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("c", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::failing(&["b"]));
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;

    assert_eq!(report.installed().count(), 1);
    assert_eq!(report.failed().count(), 1);
    assert_eq!(report.skipped().count(), 1);
    assert!(!report.is_success());

    let (failed, err) = report.failed().next().unwrap();
    assert_eq!(failed.name, "b");
    match err {
        BuildError::StepFailed {
            index,
            exit_code,
            output,
            log,
            ..
        } => {
            assert_eq!(*index, 0);
            assert_eq!(*exit_code, Some(2));
            assert!(output.contains("b does not build"));
            assert!(log.exists());
        }
        other => panic!("unexpected error {other:?}"),
    }

    match &report.get("c").unwrap().outcome {
        Outcome::Skipped { blocked_by } => assert_eq!(blocked_by, "b"),
        other => panic!("unexpected outcome {other:?}"),
    }

    assert!(registry.lookup("a").is_some());
    assert!(registry.lookup("b").is_none());
    assert!(registry.lookup("c").is_none());
    assert!(!h.keg("b").exists());
    assert_eq!(h.tool.built(), vec!["a", "b"]);
}

#[tokio::test]
async fn verification_failure_keeps_the_install() {
    let descriptors: DescriptorSet = [formula(
        "a",
        &[],
        "[[test]]\ncheck = \"path-exists\"\npath = \"bin/a\"",
    )]
    .into_iter()
    .collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("a", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;

    assert!(report.is_success());
    assert!(registry.lookup("a").is_some());

    let failures: Vec<_> = report.verification_failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("bin/a"));
    assert!(
        h.reporter
            .events()
            .contains(&"done a installed, verification failed".to_string())
    );
}

#[tokio::test]
async fn failed_reinstall_keeps_registered_keg() {
    let descriptors: DescriptorSet = [formula("a", &[], "")].into_iter().collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("a", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;
    assert!(report.is_success());
    assert!(h.keg("a").join("lib/liba.so").exists());

    let reinstall = ResolveOptions {
        reinstall: true,
        ..ResolveOptions::default()
    };
    let plan = resolve("a", &registry, &descriptors, &reinstall).unwrap();
    assert_eq!(names(&plan), vec!["a"]);

    let failing = Harness {
        tool: Arc::new(FakeTool::failing(&["a"])),
        ..h
    };
    let report = failing
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;
    assert_eq!(report.failed().count(), 1);

    let record = registry.lookup("a").unwrap();
    assert_eq!(record.install_path, failing.keg("a"));
    assert!(failing.keg("a").join("lib/liba.so").exists());
    let siblings: Vec<_> = std::fs::read_dir(failing.keg("a").parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(siblings, vec!["1.0.0"]);
}

fn sibling_descriptors() -> DescriptorSet {
    [
        formula("a", &[], ""),
        formula("b", &[], ""),
        formula("c", &["a"], ""),
    ]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn independent_branch_continues_by_default() {
    let descriptors = sibling_descriptors();
    let registry = InstallRegistry::in_memory();
    let targets = [PackageName::new("c"), PackageName::new("b")];
    let plan = resolve_many(&targets, &registry, &descriptors, &ResolveOptions::default()).unwrap();
    assert_eq!(names(&plan), vec!["a", "c", "b"]);

    let h = Harness::new(FakeTool::failing(&["a"]));
    let report = h
        .executor(1, FailurePolicy::ContinueIndependent)
        .execute(&plan, &registry)
        .await;

    assert!(report.get("b").unwrap().is_installed());
    assert!(matches!(report.get("c").unwrap().outcome, Outcome::Skipped { .. }));
    assert!(registry.lookup("b").is_some());
}

#[tokio::test]
async fn abort_policy_skips_independent_branch() {
    let descriptors = sibling_descriptors();
    let registry = InstallRegistry::in_memory();
    let targets = [PackageName::new("c"), PackageName::new("b")];
    let plan = resolve_many(&targets, &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::failing(&["a"]));
    let report = h
        .executor(1, FailurePolicy::Abort)
        .execute(&plan, &registry)
        .await;

    match &report.get("b").unwrap().outcome {
        Outcome::Skipped { blocked_by } => assert_eq!(blocked_by, "a"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.skipped().count(), 2);
    assert!(registry.lookup("b").is_none());
    assert_eq!(h.tool.built(), vec!["a"]);
}

#[tokio::test]
async fn cancellation_before_start_cancels_everything() {
    let descriptors = sibling_descriptors();
    let registry = InstallRegistry::in_memory();
    let targets = [PackageName::new("c"), PackageName::new("b")];
    let plan = resolve_many(&targets, &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::default());
    let executor = h.executor(1, FailurePolicy::default());
    executor.cancellation_token().cancel();
    let report = executor.execute(&plan, &registry).await;

    assert_eq!(report.cancelled().count(), 3);
    assert!(h.tool.calls.lock().unwrap().is_empty());
    assert!(h.fetcher.fetched.lock().unwrap().is_empty());
    assert!(registry.list().is_empty());
}

#[tokio::test]
async fn cancellation_mid_run_finishes_running_package() {
    let descriptors: DescriptorSet = [
        formula("a", &[], ""),
        formula("b", &["a"], ""),
        formula("c", &["b"], ""),
    ]
    .into_iter()
    .collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("c", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let token = CancellationToken::new();
    let h = Harness::new(FakeTool {
        cancel_during: Some(("a".to_string(), token.clone())),
        ..FakeTool::default()
    });
    let report = h
        .executor(1, FailurePolicy::default())
        .with_cancellation(token)
        .execute(&plan, &registry)
        .await;

    assert!(report.get("a").unwrap().is_installed());
    assert!(matches!(report.get("b").unwrap().outcome, Outcome::Cancelled));
    assert!(matches!(report.get("c").unwrap().outcome, Outcome::Cancelled));
    assert_eq!(report.cancelled().count(), 2);
    assert!(!report.is_success());

    assert!(registry.lookup("a").is_some());
    assert!(h.keg("a").join("lib/liba.so").exists());
    assert!(registry.lookup("b").is_none());
    assert_eq!(h.tool.built(), vec!["a"]);
    assert!(
        h.reporter
            .events()
            .contains(&"skipped b cancelled".to_string())
    );
}

#[tokio::test]
async fn parallel_run_matches_sequential_run() {
    let descriptors: DescriptorSet = [
        formula("a", &[], ""),
        formula("b", &["a"], ""),
        formula("c", &["a"], ""),
        formula("d", &["b", "c"], ""),
    ]
    .into_iter()
    .collect();

    let mut installed_sets = Vec::new();
    for jobs in [1, 4] {
        let registry = InstallRegistry::in_memory();
        let plan = resolve("d", &registry, &descriptors, &ResolveOptions::default()).unwrap();

        let h = Harness::new(FakeTool {
            delay: Some(Duration::from_millis(50)),
            ..FakeTool::default()
        });
        let report = h
            .executor(jobs, FailurePolicy::default())
            .execute(&plan, &registry)
            .await;
        assert!(report.is_success());

        let built = h.tool.built();
        let pos = |n: &str| built.iter().position(|b| b == n).unwrap();
        assert!(pos("a") < pos("b") && pos("a") < pos("c"));
        assert!(pos("b") < pos("d") && pos("c") < pos("d"));

        let max = h.tool.max_in_flight.load(Ordering::SeqCst);
        if jobs == 1 {
            assert_eq!(max, 1);
        } else {
            assert_eq!(max, 2);
        }

        let mut installed: Vec<String> = registry
            .list()
            .iter()
            .map(|r| r.name.to_string())
            .collect();
        installed.sort();
        installed_sets.push(installed);
    }
    assert_eq!(installed_sets[0], installed_sets[1]);
}

#[tokio::test]
async fn dependency_paths_are_injected_into_steps() {
    let descriptors: DescriptorSet = [
        formula("a", &[], ""),
        formula(
            "b",
            &["a"],
            r#"
[[build]]
run = "command"
program = "configure"
args = ["--with-a={{deps.a}}"]
env = { A_LIB = "{{deps.a}}/lib" }
"#,
        ),
    ]
    .into_iter()
    .collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("b", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;
    assert!(report.is_success());

    let calls = h.tool.calls.lock().unwrap();
    let configure = calls.iter().find(|c| c.program == "configure").unwrap();
    let a = h.keg("a");
    assert_eq!(configure.args, vec![format!("--with-a={}", a.display())]);
    assert_eq!(configure.env["A_LIB"], a.join("lib").to_string_lossy());
    assert_eq!(configure.env["DEP_A"], a.to_string_lossy());
    assert!(configure.env["LDFLAGS"].contains(&format!("-L{}", a.join("lib").display())));
    assert!(configure.cwd.ends_with("src"));
}

#[tokio::test]
async fn unknown_placeholder_fails_before_anything_runs() {
    let descriptors: DescriptorSet = [formula(
        "a",
        &[],
        r#"
[[build]]
run = "command"
program = "cmake"
args = ["-DVTK_DIR={{deps.vtk}}/lib/cmake/vtk"]
"#,
    )]
    .into_iter()
    .collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("a", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;

    let (_, err) = report.failed().next().unwrap();
    assert!(matches!(err, BuildError::Parameter(_)));
    assert!(err.to_string().contains("deps.vtk"));
    assert!(h.tool.calls.lock().unwrap().is_empty());
    assert!(h.fetcher.fetched.lock().unwrap().is_empty());
    assert!(!h.keg("a").exists());
}

#[tokio::test]
async fn pruned_dependency_path_comes_from_registry() {
    let descriptors: DescriptorSet = [
        formula("a", &[], ""),
        formula(
            "b",
            &["a"],
            "[[build]]\nrun = \"command\"\nprogram = \"configure\"\nargs = [\"{{deps.a}}\"]",
        ),
    ]
    .into_iter()
    .collect();
    let registry = InstallRegistry::in_memory();
    registry
        .record(InstallRecord::new("a", "1.0.0", None, "/opt/kiln/a"))
        .unwrap();

    let plan = resolve("b", &registry, &descriptors, &ResolveOptions::default()).unwrap();
    assert_eq!(names(&plan), vec!["b"]);
    assert_eq!(plan.pruned, vec![PackageName::new("a")]);

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;
    assert!(report.is_success());
    assert_eq!(report.pruned, vec![PackageName::new("a")]);

    let calls = h.tool.calls.lock().unwrap();
    let configure = calls.iter().find(|c| c.program == "configure").unwrap();
    assert_eq!(configure.args, vec!["/opt/kiln/a".to_string()]);
}

#[tokio::test]
async fn host_package_is_located_not_built() {
    let host_prefix = TempDir::new().unwrap();
    std::fs::create_dir_all(host_prefix.path().join("lib/cmake/vtk")).unwrap();

    let vtk = Formula::parse(&format!(
        r#"
[package]
name = "vtk"
version = "9.3"

[source.host]
prefixes = ["{}"]
probe = "lib/cmake/vtk"
"#,
        host_prefix.path().display()
    ))
    .unwrap();
    let descriptors: DescriptorSet = [vtk, formula("a", &["vtk"], "")].into_iter().collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("a", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;
    assert!(report.is_success());

    let record = registry.lookup("vtk").unwrap();
    assert!(record.host);
    assert_eq!(record.install_path, host_prefix.path());
    assert_eq!(h.tool.built(), vec!["a"]);
    assert!(matches!(
        report.get("vtk").unwrap().outcome,
        Outcome::Installed {
            verification: Verification::Pass,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_host_package_fails_with_search_list() {
    let qt = Formula::parse(
        r#"
[package]
name = "qt"
version = "6"

[source.host]
which = "kiln-test-no-such-qmake"
prefixes = ["/nonexistent/kiln/qt"]
"#,
    )
    .unwrap();
    let descriptors: DescriptorSet = [qt, formula("a", &["qt"], "")].into_iter().collect();
    let registry = InstallRegistry::in_memory();
    let plan = resolve("a", &registry, &descriptors, &ResolveOptions::default()).unwrap();

    let h = Harness::new(FakeTool::default());
    let report = h
        .executor(1, FailurePolicy::default())
        .execute(&plan, &registry)
        .await;

    let (failed, err) = report.failed().next().unwrap();
    assert_eq!(failed.name, "qt");
    assert!(matches!(err, BuildError::HostNotFound { .. }));
    assert!(err.to_string().contains("/nonexistent/kiln/qt"));
    assert!(matches!(report.get("a").unwrap().outcome, Outcome::Skipped { .. }));
}

fn bundled_formula_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../formulas")
}

#[test]
fn bundled_formulas_resolve_openems() {
    let descriptors = DescriptorSet::load(&[bundled_formula_dir()]).unwrap();
    assert!(check_graph(&descriptors).is_empty());

    let registry = InstallRegistry::in_memory();
    let plan = resolve("openems", &registry, &descriptors, &ResolveOptions::default()).unwrap();
    let order = names(&plan);

    for pkg in plan.iter() {
        let me = plan.position(pkg.name()).unwrap();
        for dep in &pkg.planned_deps {
            assert!(plan.position(dep).unwrap() < me, "{dep} must precede {}", pkg.name());
        }
    }
    assert_eq!(order.last(), Some(&"openems"));
    assert!(order.contains(&"fparser") && order.contains(&"csxcad"));
    assert!(!order.contains(&"appcsxcad"));

    let with_gui = ResolveOptions {
        with_recommended: true,
        reinstall: false,
    };
    let plan = resolve("openems", &registry, &descriptors, &with_gui).unwrap();
    let order = names(&plan);
    let pos = |n: &str| order.iter().position(|o| *o == n).unwrap();
    assert!(pos("qcsxcad") < pos("appcsxcad"));
    assert!(pos("appcsxcad") < pos("openems"));
}
