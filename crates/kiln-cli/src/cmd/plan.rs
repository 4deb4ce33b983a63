//! Plan command

use anyhow::Result;
use crossterm::style::Stylize;

use kiln_core::resolver::{ResolveOptions, resolve_many};
use kiln_schema::PackageName;

use crate::context::Context;
use crate::ui::table::plan_table;

/// Print the build order for `packages` without building anything.
pub fn plan(ctx: &Context, packages: &[String], options: ResolveOptions) -> Result<()> {
    let descriptors = ctx.descriptors()?;
    let plan = resolve_many(
        &super::package_names(packages),
        &ctx.registry,
        &descriptors,
        &options,
    )?;

    println!();
    if plan.is_empty() {
        println!("  Nothing to build.");
    } else {
        println!("{}", plan_table(&plan));
    }

    if !plan.pruned.is_empty() {
        let pruned: Vec<&str> = plan.pruned.iter().map(PackageName::as_str).collect();
        println!();
        println!(
            "  {}",
            format!("Already installed: {}", pruned.join(", ")).dark_grey()
        );
    }
    println!();

    Ok(())
}
