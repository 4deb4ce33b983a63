//! Check command

use std::path::PathBuf;

use anyhow::{Result, bail};

use kiln_core::resolver::check_graph;
use kiln_core::{DescriptorSet, Reporter};
use kiln_schema::Formula;

use crate::context::Context;

/// Parse and validate formulas, then look for dangling dependencies and
/// cycles across the whole set.
///
/// `paths` may name formula files or directories; when empty the formula
/// search path is checked.
pub fn check(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    let output = &ctx.output;
    let paths = if paths.is_empty() {
        ctx.formula_dirs().to_vec()
    } else {
        paths.to_vec()
    };

    let (dirs, files): (Vec<PathBuf>, Vec<PathBuf>) = paths.into_iter().partition(|p| p.is_dir());

    let (mut descriptors, load_errors) = DescriptorSet::load_lenient(&dirs);
    let mut problems: Vec<String> = load_errors.iter().map(ToString::to_string).collect();

    for file in &files {
        match Formula::from_file(file) {
            Ok(formula) => {
                descriptors.insert(formula);
            }
            Err(e) => problems.push(format!("{}: {e}", file.display())),
        }
    }

    problems.extend(check_graph(&descriptors).iter().map(ToString::to_string));

    if problems.is_empty() {
        output.success(&format!("{} formulas OK", descriptors.len()));
        output.wait();
        return Ok(());
    }

    for problem in &problems {
        output.error(problem);
    }
    output.wait();
    bail!("{} problem(s) found", problems.len())
}
