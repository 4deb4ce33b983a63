//! History command

use anyhow::Result;
use kiln_core::Reporter;

use crate::context::Context;

pub fn history(ctx: &Context, package: &str) -> Result<()> {
    let entries = ctx.registry.history(package)?;
    let output = &ctx.output;

    if entries.is_empty() {
        output.info(&format!("No history found for '{package}'"));
        output.wait();
        return Ok(());
    }

    output.section(&format!("History for '{package}'"));
    output.wait();

    for entry in entries {
        let record = &entry.record;
        let time_str = record
            .completed_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S");
        let revision = record
            .revision
            .as_deref()
            .map(|r| format!(" @ {}", r.get(..7).unwrap_or(r)))
            .unwrap_or_default();
        let state = if entry.active { "active" } else { "superseded" };

        println!(
            "[{time_str}] {} {}{revision} ({state}) {}",
            record.name,
            record.version,
            record.install_path.display()
        );
    }
    println!();

    Ok(())
}
