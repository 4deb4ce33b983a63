//! Per-package build environment and step rendering.
//!
//! Every step runs with a sanitised environment: host variables are cleared
//! and only the set below is injected, with dependency install paths wired in.
//!
//! ## Environment contract
//!
//! | Variable | Value |
//! |---|---|
//! | `PATH` | Dependency `bin/` dirs, then the inherited `PATH`, then `/usr/bin:/bin:/usr/sbin:/sbin` |
//! | `HOME` | The package's work directory (prevents reading host dotfiles) |
//! | `TERM` | `dumb` |
//! | `LANG` | `en_US.UTF-8` |
//! | `TMPDIR` | `<workdir>/tmp` |
//! | `PREFIX` | Install prefix (`<home>/cellar/<name>/<version>`) |
//! | `JOBS` | Parallel compile jobs |
//! | `CC` / `CXX` | Configured compilers |
//! | `DEP_<NAME>` | Per-dependency install path (name uppercased, `-` and `.` to `_`) |
//! | `CMAKE_PREFIX_PATH` | `:`-separated dependency install paths |
//! | `PKG_CONFIG_PATH` | `:`-separated `lib/pkgconfig` and `share/pkgconfig` dirs |
//! | `CFLAGS` / `CPPFLAGS` | `-I` flags for each dependency's `include/` |
//! | `LDFLAGS` | `-L` flags for each dependency's `lib/` |
//! | `SOURCE_DATE_EPOCH` | `0` |
//!
//! The same values are available to step templates as named parameters; see
//! [`BuildContext::params`].

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kiln_schema::{BuildStep, CmakeStage, PackageName, Version};

use crate::io::Invocation;
use crate::params::{ParamError, Params};

/// Fixed epoch for `SOURCE_DATE_EPOCH`.
const SOURCE_DATE_EPOCH: &str = "0";

const SYSTEM_PATH: [&str; 4] = ["/usr/bin", "/bin", "/usr/sbin", "/sbin"];

/// Compilers and parallelism handed to every build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub cc: String,
    pub cxx: String,
    pub jobs: usize,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            cc: std::env::var("CC").unwrap_or_else(|_| "cc".to_string()),
            cxx: std::env::var("CXX").unwrap_or_else(|_| "c++".to_string()),
            jobs: num_cpus::get(),
        }
    }
}

/// Everything needed to render one package's steps.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub name: PackageName,
    pub version: Version,
    /// Install prefix (the keg).
    pub prefix: PathBuf,
    /// Root of the fetched source tree.
    pub source_dir: PathBuf,
    /// Private scratch directory for this package.
    pub workdir: PathBuf,
    /// Install paths of every followed dependency, in declaration order.
    pub deps: Vec<(PackageName, PathBuf)>,
    /// Unpacked auxiliary resources.
    pub resources: Vec<(String, PathBuf)>,
    pub toolchain: Toolchain,
}

impl BuildContext {
    /// CMake build tree.
    pub fn build_dir(&self) -> PathBuf {
        self.source_dir.join("build")
    }

    /// Named parameters for step templates.
    pub fn params(&self) -> Params {
        let mut params = Params::new();
        params
            .set("name", self.name.as_str())
            .set("version", self.version.as_str())
            .set_path("prefix", &self.prefix)
            .set_path("source", &self.source_dir)
            .set_path("workdir", &self.workdir)
            .set_path("build", &self.build_dir())
            .set("jobs", self.toolchain.jobs.to_string())
            .set("cc", self.toolchain.cc.as_str())
            .set("cxx", self.toolchain.cxx.as_str());

        for (dep, path) in &self.deps {
            params.set_dep(dep, path);
        }
        for (resource, path) in &self.resources {
            params.set_resource(resource, path);
        }
        params
    }

    /// Base environment for every step (see module docs).
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        let mut include_flags: Vec<String> = Vec::new();
        let mut lib_flags: Vec<String> = Vec::new();
        let mut pkg_config_paths: Vec<String> = Vec::new();
        let mut prefix_paths: Vec<String> = Vec::new();
        let mut path_dirs: Vec<String> = Vec::new();

        for (name, dep_path) in &self.deps {
            let dep = dep_path.to_string_lossy().to_string();
            env.insert(format!("DEP_{}", name.env_key()), dep.clone());
            prefix_paths.push(dep);

            let include = dep_path.join("include");
            if include.is_dir() {
                include_flags.push(format!("-I{}", include.display()));
            }
            let lib = dep_path.join("lib");
            if lib.is_dir() {
                lib_flags.push(format!("-L{}", lib.display()));
            }
            for pc in ["lib/pkgconfig", "share/pkgconfig"] {
                let dir = dep_path.join(pc);
                if dir.is_dir() {
                    pkg_config_paths.push(dir.to_string_lossy().to_string());
                }
            }
            // Add bin/ directory for each dependency for tool discovery (e.g. cmake, pkg-config)
            let bin = dep_path.join("bin");
            if bin.is_dir() {
                push_unique(&mut path_dirs, bin.to_string_lossy().to_string());
            }
        }

        if let Ok(inherited) = std::env::var("PATH") {
            for dir in inherited.split(':').filter(|d| !d.is_empty()) {
                push_unique(&mut path_dirs, dir.to_string());
            }
        }
        for dir in SYSTEM_PATH {
            push_unique(&mut path_dirs, dir.to_string());
        }

        let prefix = self.prefix.to_string_lossy().to_string();
        let workdir = self.workdir.to_string_lossy().to_string();

        env.insert("PATH".into(), path_dirs.join(":"));
        env.insert("HOME".into(), workdir);
        env.insert("TERM".into(), "dumb".into());
        env.insert("LANG".into(), "en_US.UTF-8".into());
        env.insert(
            "TMPDIR".into(),
            self.workdir.join("tmp").to_string_lossy().to_string(),
        );
        env.insert("PREFIX".into(), prefix);
        env.insert("JOBS".into(), self.toolchain.jobs.to_string());
        env.insert("CC".into(), self.toolchain.cc.clone());
        env.insert("CXX".into(), self.toolchain.cxx.clone());
        env.insert("SOURCE_DATE_EPOCH".into(), SOURCE_DATE_EPOCH.into());

        if !prefix_paths.is_empty() {
            env.insert("CMAKE_PREFIX_PATH".into(), prefix_paths.join(":"));
        }
        if !pkg_config_paths.is_empty() {
            env.insert("PKG_CONFIG_PATH".into(), pkg_config_paths.join(":"));
        }
        if !include_flags.is_empty() {
            let flags = include_flags.join(" ");
            env.insert("CFLAGS".into(), flags.clone());
            env.insert("CPPFLAGS".into(), flags);
        }
        if !lib_flags.is_empty() {
            env.insert("LDFLAGS".into(), lib_flags.join(" "));
        }

        env
    }

    /// Render `step` into a ready-to-run invocation.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError`] if any template references an unknown parameter.
    pub fn render_step(
        &self,
        step: &BuildStep,
        params: &Params,
        base_env: &BTreeMap<String, String>,
        timeout: Option<Duration>,
    ) -> Result<Invocation, ParamError> {
        let build_dir = self.build_dir().to_string_lossy().to_string();

        let (program, args, extra_env, cwd) = match step {
            BuildStep::Cmake {
                stage,
                defines,
                args,
                env,
            } => {
                let mut argv: Vec<String> = match stage {
                    CmakeStage::Configure => {
                        let mut argv = vec![
                            "-S".to_string(),
                            self.source_dir.to_string_lossy().to_string(),
                            "-B".to_string(),
                            build_dir,
                        ];
                        argv.extend(self.std_cmake_args());
                        for (key, value) in defines {
                            argv.push(format!("-D{key}={}", params.render(value)?));
                        }
                        argv
                    }
                    CmakeStage::Build => vec![
                        "--build".to_string(),
                        build_dir,
                        "--parallel".to_string(),
                        self.toolchain.jobs.to_string(),
                    ],
                    CmakeStage::Install => vec!["--install".to_string(), build_dir],
                };
                argv.extend(params.render_all(args)?);
                (
                    "cmake".to_string(),
                    argv,
                    params.render_map(env)?,
                    self.source_dir.clone(),
                )
            }
            BuildStep::Command {
                program,
                args,
                env,
                dir,
            } => {
                let cwd = match dir {
                    Some(dir) => self.source_dir.join(params.render(dir)?),
                    None => self.source_dir.clone(),
                };
                (
                    params.render(program)?,
                    params.render_all(args)?,
                    params.render_map(env)?,
                    cwd,
                )
            }
        };

        let mut env = base_env.clone();
        env.extend(extra_env);

        Ok(Invocation {
            program,
            args,
            env,
            cwd,
            timeout,
        })
    }

    /// Arguments every configure step gets before the formula's own defines.
    fn std_cmake_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("-DCMAKE_INSTALL_PREFIX={}", self.prefix.display()),
            "-DCMAKE_INSTALL_LIBDIR=lib".to_string(),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
            "-DCMAKE_FIND_FRAMEWORK=LAST".to_string(),
            "-DBUILD_TESTING=OFF".to_string(),
            "-Wno-dev".to_string(),
        ];
        if !self.deps.is_empty() {
            let paths: Vec<String> = self
                .deps
                .iter()
                .map(|(_, p)| p.to_string_lossy().to_string())
                .collect();
            args.push(format!("-DCMAKE_PREFIX_PATH={}", paths.join(";")));
        }
        args
    }
}

fn push_unique(dirs: &mut Vec<String>, dir: String) {
    if !dirs.contains(&dir) {
        dirs.push(dir);
    }
}

/// Append one step's output to the build log.
pub fn append_log(log_path: &Path, header: &str, output: &str) -> std::io::Result<()> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    writeln!(file, "==> {header}")?;
    file.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        writeln!(file)?;
    }
    Ok(())
}

/// Last `n` lines of a string.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
