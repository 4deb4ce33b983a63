//! Install command

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use crossterm::style::Stylize;
use tokio_util::sync::CancellationToken;

use kiln_core::io::{DefaultFetcher, ProcessInvoker};
use kiln_core::resolver::{ResolveOptions, resolve_many};
use kiln_core::{Executor, FailurePolicy, Reporter, USER_AGENT};

use crate::context::Context;
use crate::ui::table::plan_table;

/// Command-line overrides for one install.
#[derive(Debug, Clone, Default)]
pub struct InstallArgs {
    pub resolve: ResolveOptions,
    pub parallel: Option<usize>,
    pub fail_fast: bool,
    pub step_timeout: Option<u64>,
    pub dry_run: bool,
}

/// Resolve, build and verify `packages`.
///
/// Fails when any planned package was not installed. Verification failures
/// only warn.
pub async fn install(
    ctx: &Context,
    packages: &[String],
    args: &InstallArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let descriptors = ctx.descriptors()?;
    let plan = resolve_many(
        &super::package_names(packages),
        &ctx.registry,
        &descriptors,
        &args.resolve,
    )?;
    let output = &ctx.output;

    if plan.is_empty() {
        output.success(&format!("{} already installed", packages.join(", ")));
        output.wait();
        return Ok(());
    }

    if args.dry_run {
        println!();
        println!("{}", plan_table(&plan));
        println!();
        println!("  {}", "Dry run: nothing was built.".dark_grey());
        return Ok(());
    }

    let mut config = ctx.config.executor_config(ctx.layout.clone());
    if let Some(jobs) = args.parallel {
        config.jobs = jobs.max(1);
    }
    if args.fail_fast {
        config.failure_policy = FailurePolicy::Abort;
    }
    if let Some(secs) = args.step_timeout {
        config.step_timeout = Some(Duration::from_secs(secs));
    }
    tracing::debug!("Executor config: {config:?}");

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;
    let fetcher = DefaultFetcher::new(client, ctx.layout.cache_path());

    let executor = Executor::new(config, Arc::new(fetcher), Arc::new(ProcessInvoker))
        .with_reporter(Arc::new(output.clone()))
        .with_cancellation(cancel);

    output.section("Building");
    let report = executor.execute(&plan, &ctx.registry).await;

    for pkg in report.installed() {
        if let Some(formula) = descriptors.get(&pkg.name) {
            let hint = formula.hints.post_install.trim();
            if !hint.is_empty() {
                output.info(&format!("{}: {hint}", pkg.name));
            }
        }
    }

    for (pkg, reason) in report.verification_failures() {
        let first = reason.lines().next().unwrap_or(reason);
        output.warning(&format!(
            "{} installed but failed its checks: {first} (run `kiln test {}`)",
            pkg.name, pkg.name
        ));
    }

    let failed: Vec<String> = report.failed().map(|(pkg, _)| pkg.name.to_string()).collect();
    let skipped = report.skipped().count();
    let cancelled = report.cancelled().count();

    if cancelled > 0 {
        output.warning(&format!("Cancelled: {cancelled} package(s) not started"));
    }
    if !failed.is_empty() {
        output.error(&format!("Failed: {}", failed.join(", ")));
        if skipped > 0 {
            output.info(&format!(
                "{skipped} package(s) skipped because a dependency failed"
            ));
        }
        output.info(&format!("Build logs: {}", ctx.layout.log_dir().display()));
    }
    output.wait();

    if !report.is_success() {
        bail!(
            "{} of {} package(s) not installed",
            report.outcomes.len() - report.installed().count(),
            report.outcomes.len()
        );
    }
    Ok(())
}
