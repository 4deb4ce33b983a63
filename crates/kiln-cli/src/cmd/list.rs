use anyhow::Result;
use crossterm::style::Stylize;

use crate::context::Context;
use crate::ui::table::installed_table;

/// List all installed packages
pub fn list(ctx: &Context) -> Result<()> {
    let records = ctx.registry.list();

    if records.is_empty() {
        println!();
        println!("  No packages installed.");
        println!("  Run 'kiln install <package>' to get started.");
        return Ok(());
    }

    println!();
    println!("{}", installed_table(&records));
    println!();
    println!(
        "  {}",
        format!("{} packages total", records.len()).dark_grey()
    );

    Ok(())
}
