//! End-to-end tests for the kiln CLI binary.

use std::path::PathBuf;
use std::process::{Command, Output};

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

const BUNDLED_FORMULAS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../formulas");

/// Isolated kiln home plus a private formula directory.
struct TestContext {
    temp_dir: TempDir,
    kiln_home: PathBuf,
    formulas: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let kiln_home = temp_dir.path().join(".kiln");
        let formulas = temp_dir.path().join("formulas");
        std::fs::create_dir_all(&kiln_home).expect("failed to create kiln home");
        std::fs::create_dir_all(&formulas).expect("failed to create formula dir");
        Self {
            temp_dir,
            kiln_home,
            formulas,
        }
    }

    fn kiln_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kiln"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("KILN_HOME", &self.kiln_home);
        cmd.env("KILN_FORMULA_DIR", &self.formulas);
        cmd.env_remove("RUST_LOG");
        cmd.current_dir(self.temp_dir.path());
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.kiln_cmd().args(args).output().expect("failed to run kiln")
    }

    fn write_formula(&self, name: &str, content: &str) {
        std::fs::write(self.formulas.join(format!("{name}.toml")), content).unwrap();
    }

    /// A `hello-1.0/` source tarball; returns its path and SHA256.
    fn source_tarball(&self) -> (PathBuf, String) {
        let path = self.temp_dir.path().join("hello-1.0.tar.gz");
        let file = std::fs::File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        let body = b"hello from kiln\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "hello-1.0/hello.txt", &body[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let sha = hex::encode(Sha256::digest(std::fs::read(&path).unwrap()));
        (path, sha)
    }

    /// `hello` builds from a local tarball; `greeter` depends on it.
    fn write_hello_formulas(&self) {
        let (tarball, sha) = self.source_tarball();
        self.write_formula(
            "hello",
            &format!(
                r#"
[package]
name = "hello"
version = "1.0"

[source]
url = "{}"
sha256 = "{sha}"

[[build]]
run = "command"
program = "/bin/sh"
args = ["-c", "mkdir -p {{{{prefix}}}}/share && cp hello.txt {{{{prefix}}}}/share/hello.txt"]

[[test]]
check = "path-exists"
path = "share/hello.txt"
"#,
                tarball.display()
            ),
        );
        self.write_formula(
            "greeter",
            &format!(
                r#"
[package]
name = "greeter"
version = "0.1.0"

[source]
url = "{}"
sha256 = "{sha}"

[dependencies]
runtime = ["hello"]

[[build]]
run = "command"
program = "/bin/sh"
args = ["-c", "mkdir -p {{{{prefix}}}} && cp {{{{deps.hello}}}}/share/hello.txt {{{{prefix}}}}/greeting"]

[[test]]
check = "run"
program = "/bin/cat"
args = ["{{{{prefix}}}}/greeting"]
expect_stdout = "hello from kiln"
"#,
                tarball.display()
            ),
        );
    }

    fn keg(&self, name: &str, version: &str) -> PathBuf {
        self.kiln_home.join("cellar").join(name).join(version)
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_list_creates_state_db() {
    let ctx = TestContext::new();
    let output = ctx.run(&["list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No packages installed"));
    assert!(
        ctx.kiln_home.join("state.db").exists(),
        "state.db should be created after running list"
    );
}

#[test]
fn test_completions_bash() {
    let ctx = TestContext::new();
    let output = ctx.run(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("kiln"));
}

#[test]
fn test_check_bundled_formulas() {
    let ctx = TestContext::new();
    let output = ctx.run(&["check", BUNDLED_FORMULAS]);
    assert!(output.status.success(), "{}", stdout(&output));
    assert!(stdout(&output).contains("formulas OK"));
}

#[test]
fn test_check_reports_dangling_dependency() {
    let ctx = TestContext::new();
    ctx.write_formula(
        "orphan",
        r#"
[package]
name = "orphan"
version = "1.0"

[source.host]
prefixes = ["/"]

[dependencies]
runtime = ["nowhere"]
"#,
    );
    let output = ctx.run(&["check"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("nowhere"));
}

#[test]
fn test_plan_openems_orders_dependencies_first() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--formula-dir", BUNDLED_FORMULAS, "plan", "openems"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let out = stdout(&output);
    let fparser = out.find("fparser").expect("fparser in plan");
    let csxcad = out.find("csxcad").expect("csxcad in plan");
    let openems = out.rfind("openems").expect("openems in plan");
    assert!(fparser < csxcad && csxcad < openems);
    assert!(!out.contains("appcsxcad"));
}

#[test]
fn test_unknown_package_fails() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--formula-dir", BUNDLED_FORMULAS, "plan", "no-such-package"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no-such-package"));
}

#[test]
fn test_install_dry_run_builds_nothing() {
    let ctx = TestContext::new();
    ctx.write_hello_formulas();

    let output = ctx.run(&["install", "greeter", "--dry-run"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("hello"));
    assert!(!ctx.keg("hello", "1.0").exists());
}

#[test]
fn test_install_list_test_remove() {
    let ctx = TestContext::new();
    ctx.write_hello_formulas();

    let output = ctx.run(&["install", "greeter"]);
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        stdout(&output),
        stderr(&output)
    );
    assert!(ctx.keg("hello", "1.0").join("share/hello.txt").exists());
    let greeting = std::fs::read_to_string(ctx.keg("greeter", "0.1.0").join("greeting")).unwrap();
    assert_eq!(greeting, "hello from kiln\n");

    let listed = stdout(&ctx.run(&["list"]));
    assert!(listed.contains("greeter"));
    assert!(listed.contains("hello"));

    // Already installed: nothing to do.
    let again = ctx.run(&["install", "greeter"]);
    assert!(again.status.success());
    assert!(stdout(&again).contains("already installed"));

    assert!(ctx.run(&["test", "greeter"]).status.success());

    // greeter still needs hello.
    let refused = ctx.run(&["remove", "hello"]);
    assert!(!refused.status.success());
    assert!(stderr(&refused).contains("greeter"));
    assert!(ctx.keg("hello", "1.0").exists());

    assert!(ctx.run(&["remove", "greeter", "hello"]).status.success());
    assert!(!ctx.keg("hello", "1.0").exists());
    assert!(!ctx.keg("greeter", "0.1.0").exists());
    assert!(stdout(&ctx.run(&["list"])).contains("No packages installed"));

    let history = stdout(&ctx.run(&["history", "hello"]));
    assert!(history.contains("No history"));
}

#[test]
fn test_failed_build_exits_non_zero() {
    let ctx = TestContext::new();
    let (tarball, sha) = ctx.source_tarball();
    ctx.write_formula(
        "broken",
        &format!(
            r#"
[package]
name = "broken"
version = "1.0"

[source]
url = "{}"
sha256 = "{sha}"

[[build]]
run = "command"
program = "/bin/sh"
args = ["-c", "echo configure failed; exit 3"]
"#,
            tarball.display()
        ),
    );

    let output = ctx.run(&["install", "broken"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("exit code 3"));
    assert!(!ctx.keg("broken", "1.0").exists());
    assert!(!stdout(&ctx.run(&["list"])).contains("broken"));
}

#[test]
fn test_info_json_prints_formula() {
    let ctx = TestContext::new();
    let output = ctx.run(&["--formula-dir", BUNDLED_FORMULAS, "info", "fparser", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("\"name\": \"fparser\""));
}
