use std::time::Instant;

use anyhow::{Context as _, Result, bail};

use kiln_core::resolver::dependents;
use kiln_core::{DescriptorSet, Reporter};
use kiln_schema::PackageName;

use crate::context::Context;

/// Remove installed packages: delete their kegs and forget their records.
///
/// Refuses when another installed package depends on one of `packages`,
/// unless `force` is set. Host packages only lose their record.
pub fn remove(ctx: &Context, packages: &[String], force: bool) -> Result<()> {
    let output = &ctx.output;
    let targets = super::package_names(packages);

    let mut records = Vec::new();
    for name in &targets {
        match ctx.registry.lookup(name) {
            Some(record) => records.push(record),
            None => output.warning(&format!("{name} is not installed")),
        }
    }
    if records.is_empty() {
        output.wait();
        return Ok(());
    }

    if !force {
        let (descriptors, errors) = DescriptorSet::load_lenient(ctx.formula_dirs());
        for e in &errors {
            tracing::debug!("Skipping unreadable formula {e}");
        }
        let blockers = installed_dependents(ctx, &descriptors, &targets);
        if !blockers.is_empty() {
            output.wait();
            bail!(
                "Refusing to remove: {} (use --force to remove anyway)",
                blockers.join("; ")
            );
        }
    }

    let start = Instant::now();
    output.section("Removing");

    for record in &records {
        output.removing(&record.name, &record.version);

        if record.host {
            tracing::debug!(
                "{} is a host package, leaving {}",
                record.name,
                record.install_path.display()
            );
        } else if record.install_path.exists() {
            std::fs::remove_dir_all(&record.install_path)
                .with_context(|| format!("Failed to delete {}", record.install_path.display()))?;
            if let Some(parent) = record.install_path.parent() {
                // Drops cellar/<name> once its last version is gone.
                let _ = std::fs::remove_dir(parent);
            }
        }

        ctx.registry.remove(&record.name)?;
        output.done(&record.name, &record.version, "removed");
    }

    output.summary(records.len(), "removed", start.elapsed().as_secs_f64());
    output.wait();
    Ok(())
}

/// "a is needed by b, c" for every target that an installed package outside
/// `targets` depends on.
fn installed_dependents(
    ctx: &Context,
    descriptors: &DescriptorSet,
    targets: &[PackageName],
) -> Vec<String> {
    targets
        .iter()
        .filter_map(|name| {
            let users: Vec<String> = dependents(name, descriptors)
                .into_iter()
                .filter(|d| !targets.contains(d) && ctx.registry.lookup(d).is_some())
                .map(|d| String::from(d.as_str()))
                .collect();
            (!users.is_empty()).then(|| format!("{name} is needed by {}", users.join(", ")))
        })
        .collect()
}
