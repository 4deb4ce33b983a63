//! kiln - source builds for the openEMS stack

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kiln_cli::cmd;
use kiln_cli::cmd::install::InstallArgs;
use kiln_cli::context::Context;
use kiln_cli::{Cli, Commands};
use kiln_core::resolver::ResolveOptions;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }

    let ctx = Context::open(&cli.formula_dirs)?;

    match cli.command {
        Commands::Plan {
            packages,
            with_recommended,
            reinstall,
        } => {
            let options = ResolveOptions {
                with_recommended: with_recommended || ctx.config.with_recommended,
                reinstall,
            };
            cmd::plan::plan(&ctx, &packages, options)
        }
        Commands::Install {
            packages,
            with_recommended,
            reinstall,
            parallel,
            fail_fast,
            step_timeout,
            dry_run,
        } => {
            let args = InstallArgs {
                resolve: ResolveOptions {
                    with_recommended: with_recommended || ctx.config.with_recommended,
                    reinstall,
                },
                parallel,
                fail_fast,
                step_timeout,
                dry_run,
            };
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
            cmd::install::install(&ctx, &packages, &args, cancel).await
        }
        Commands::List => cmd::list::list(&ctx),
        Commands::Info { package, json } => cmd::info::info(&ctx, &package, json),
        Commands::Remove { packages, force } => cmd::remove::remove(&ctx, &packages, force),
        Commands::Test { package } => cmd::test::test(&ctx, &package).await,
        Commands::History { package } => cmd::history::history(&ctx, &package),
        Commands::Check { paths } => cmd::check::check(&ctx, &paths),
        Commands::Completions { .. } => Ok(()),
    }
}

/// Stop scheduling new packages on the first Ctrl-C; running steps finish.
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Interrupted: finishing running steps, no new packages will start");
        cancel.cancel();
    }
}
