//! Info command

use anyhow::{Result, bail};
use crossterm::style::Stylize;

use kiln_schema::Requirement;

use crate::context::Context;

/// Show formula metadata, dependencies and install state for `package`.
pub fn info(ctx: &Context, package: &str, json: bool) -> Result<()> {
    let descriptors = ctx.descriptors()?;
    let formula = descriptors.get(package);
    let installed = ctx.registry.lookup(package);

    if json {
        let Some(formula) = formula else {
            bail!("Package '{package}' not found");
        };
        println!("{}", serde_json::to_string_pretty(formula.as_ref())?);
        return Ok(());
    }

    if formula.is_none() && installed.is_none() {
        bail!("Package '{package}' not found");
    }

    let lw = 12;

    println!();
    if let Some(formula) = formula {
        println!(
            "  {} {}",
            package.white().bold(),
            formula.version().as_str().dark_grey()
        );
        if !formula.package.description.is_empty() {
            println!("  {}", formula.package.description);
        }
        println!();

        if !formula.package.homepage.is_empty() {
            println!("  {:<lw$}{}", "homepage", formula.package.homepage);
        }
        if !formula.package.license.is_empty() {
            println!("  {:<lw$}{}", "license", formula.package.license);
        }
        println!("  {:<lw$}{}", "source", formula.source.describe());

        for (kind, deps) in [
            ("build deps", &formula.dependencies.build),
            ("requires", &formula.dependencies.runtime),
            ("recommends", &formula.dependencies.recommended),
        ] {
            if !deps.is_empty() {
                let names: Vec<String> = deps
                    .iter()
                    .map(|d| match d.requirement() {
                        Requirement::Any => d.name().to_string(),
                        req => format!("{} {req}", d.name()),
                    })
                    .collect();
                println!("  {:<lw$}{}", kind, names.join(", "));
            }
        }
        if !formula.steps.is_empty() {
            println!("  {:<lw$}{} step(s)", "steps", formula.steps.len());
        }
        if !formula.tests.is_empty() {
            println!("  {:<lw$}{} check(s)", "tests", formula.tests.len());
        }
    } else {
        println!("  {}", package.white().bold());
        println!();
        println!("  {:<lw$}{}", "formula", "not on the search path".dark_grey());
    }

    if let Some(record) = &installed {
        let date = record
            .completed_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d");
        println!(
            "  {:<lw$}{} at {}, {}",
            "installed",
            record.version,
            record.install_path.display(),
            date
        );
        if let Some(rev) = &record.revision {
            println!("  {:<lw$}{}", "revision", rev);
        }
    }

    if let Some(formula) = formula {
        let hint = formula.hints.post_install.trim();
        if !hint.is_empty() {
            println!();
            println!("  {}", hint.dark_grey());
        }
    }
    println!();

    Ok(())
}
