//! Tables for `kiln plan` and `kiln list`.

use std::sync::Arc;

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table};

use kiln_core::InstallRecord;
use kiln_core::resolver::BuildPlan;

fn base_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).fg(Color::DarkGrey))
                .collect::<Vec<_>>(),
        );
    table
}

/// One row per planned package, in build order.
pub fn plan_table(plan: &BuildPlan) -> Table {
    let mut table = base_table(&["#", "package", "version", "source", "after"]);

    for (i, pkg) in plan.iter().enumerate() {
        let after = if pkg.planned_deps.is_empty() {
            "-".to_string()
        } else {
            pkg.planned_deps
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(pkg.name()).fg(Color::Cyan),
            Cell::new(pkg.formula.version()),
            Cell::new(pkg.formula.source.describe()).fg(Color::DarkGrey),
            Cell::new(after).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Installed packages with their keg and install date.
pub fn installed_table(records: &[Arc<InstallRecord>]) -> Table {
    let mut table = base_table(&["package", "version", "installed", "path"]);

    for record in records {
        let version = match record.revision.as_deref() {
            Some(rev) => format!("{} ({})", record.version, rev.get(..7).unwrap_or(rev)),
            None => record.version.to_string(),
        };
        let path = if record.host {
            format!("{} (host)", record.install_path.display())
        } else {
            record.install_path.display().to_string()
        };
        table.add_row(vec![
            Cell::new(&record.name).fg(Color::Cyan),
            Cell::new(version),
            Cell::new(
                record
                    .completed_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d"),
            ),
            Cell::new(path).fg(Color::DarkGrey),
        ]);
    }
    table
}
