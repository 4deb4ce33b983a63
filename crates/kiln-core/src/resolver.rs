use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use kiln_schema::{Dependency, DependencyKind, Formula, PackageName, Requirement};

use crate::formulas::DescriptorSet;
use crate::registry::InstallRegistry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Circular dependency: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<PackageName> },

    #[error("Unresolved dependency '{missing}'{}", format_requester(.requested_by))]
    UnresolvedDependency {
        missing: PackageName,
        requested_by: Option<PackageName>,
    },

    #[error("{requested_by} requires {package} {requirement}, but its formula provides {available}")]
    Unsatisfiable {
        package: PackageName,
        requirement: Requirement,
        available: String,
        requested_by: PackageName,
    },
}

fn format_cycle(cycle: &[PackageName]) -> String {
    let mut names: Vec<&str> = cycle.iter().map(PackageName::as_str).collect();
    if let Some(first) = names.first().copied() {
        names.push(first);
    }
    names.join(" -> ")
}

fn format_requester(requested_by: &Option<PackageName>) -> String {
    requested_by
        .as_ref()
        .map(|r| format!(" (required by {r})"))
        .unwrap_or_default()
}

/// Knobs for one resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Follow `recommended` edges too.
    pub with_recommended: bool,
    /// Plan the requested targets even when already installed.
    pub reinstall: bool,
}

impl ResolveOptions {
    fn follows(self, kind: DependencyKind) -> bool {
        match kind {
            DependencyKind::Build | DependencyKind::Runtime => true,
            DependencyKind::Recommended => self.with_recommended,
        }
    }
}

/// One package to build.
#[derive(Debug, Clone)]
pub struct PlannedPackage {
    pub formula: Arc<Formula>,
    /// Every followed dependency edge, pruned or not. The executor resolves
    /// each one to an install path.
    pub dependencies: Vec<Dependency>,
    /// The subset of `dependencies` that are themselves in the plan.
    pub planned_deps: Vec<PackageName>,
}

impl PlannedPackage {
    pub fn name(&self) -> &PackageName {
        self.formula.name()
    }
}

/// An ordered build sequence: dependencies before dependents.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    pub packages: Vec<PlannedPackage>,
    /// Packages left out because the registry already satisfies them.
    pub pruned: Vec<PackageName>,
}

impl BuildPlan {
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn names(&self) -> Vec<&PackageName> {
        self.packages.iter().map(PlannedPackage::name).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.packages.iter().position(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedPackage> {
        self.packages.iter()
    }
}

/// Resolves `target` into a build plan.
///
/// Performs a depth-first traversal of the dependency graph and emits each
/// package after all of its followed dependencies. Dependencies the registry
/// already satisfies are pruned, though they must still exist in
/// `descriptors`.
///
/// # Errors
///
/// Returns [`ResolveError`] on a missing formula, a cycle, or a requirement
/// no formula can satisfy. No partial plan is returned.
pub fn resolve(
    target: &str,
    registry: &InstallRegistry,
    descriptors: &DescriptorSet,
    options: &ResolveOptions,
) -> Result<BuildPlan, ResolveError> {
    resolve_many(&[PackageName::new(target)], registry, descriptors, options)
}

/// Resolves several targets into one merged plan; each package appears once.
///
/// A dependency pruned for one target may still have to be built for
/// another (say, a later target pins a revision the install lacks). When
/// that happens the walk is repeated with the package forced into the plan,
/// so it lands ahead of every package that depends on it.
///
/// # Errors
///
/// See [`resolve`].
pub fn resolve_many(
    targets: &[PackageName],
    registry: &InstallRegistry,
    descriptors: &DescriptorSet,
    options: &ResolveOptions,
) -> Result<BuildPlan, ResolveError> {
    let mut forced: HashSet<PackageName> = HashSet::new();
    loop {
        let walk = walk_targets(targets, registry, descriptors, options, &forced)?;

        let late: Vec<PackageName> = walk
            .plan
            .packages
            .iter()
            .map(PlannedPackage::name)
            .filter(|name| walk.skipped.contains(*name) && !forced.contains(*name))
            .cloned()
            .collect();
        if late.is_empty() {
            return Ok(walk.plan);
        }

        tracing::debug!("Re-planning with {late:?} built ahead of their dependents");
        forced.extend(late);
    }
}

fn walk_targets<'a>(
    targets: &[PackageName],
    registry: &'a InstallRegistry,
    descriptors: &'a DescriptorSet,
    options: &ResolveOptions,
    forced: &'a HashSet<PackageName>,
) -> Result<Walk<'a>, ResolveError> {
    let mut walk = Walk {
        registry,
        descriptors,
        options: *options,
        forced,
        plan: BuildPlan::default(),
        visited: HashSet::new(),
        skipped: HashSet::new(),
        stack: Vec::new(),
    };

    for target in targets {
        let formula = descriptors
            .get(target)
            .ok_or_else(|| ResolveError::UnresolvedDependency {
                missing: target.clone(),
                requested_by: None,
            })?;

        if !options.reinstall && !forced.contains(target) && is_current(registry, formula) {
            tracing::debug!("{target} {} is already installed", formula.version());
            walk.mark_pruned(target);
            continue;
        }

        walk.visit(target)?;
    }

    Ok(walk)
}

/// Installed at exactly the formula's version and revision.
fn is_current(registry: &InstallRegistry, formula: &Formula) -> bool {
    registry.lookup(formula.name()).is_some_and(|r| {
        r.version == *formula.version() && r.revision.as_deref() == formula.revision()
    })
}

struct Walk<'a> {
    registry: &'a InstallRegistry,
    descriptors: &'a DescriptorSet,
    options: ResolveOptions,
    /// Packages that must be planned even when the registry satisfies them.
    forced: &'a HashSet<PackageName>,
    plan: BuildPlan,
    visited: HashSet<PackageName>,
    /// Every package pruned at some point during the walk.
    skipped: HashSet<PackageName>,
    /// Packages currently being visited, outermost first.
    stack: Vec<PackageName>,
}

impl Walk<'_> {
    fn visit(&mut self, name: &PackageName) -> Result<(), ResolveError> {
        if self.visited.contains(name) {
            return Ok(());
        }

        if let Some(start) = self.stack.iter().position(|n| n == name) {
            return Err(ResolveError::CyclicDependency {
                cycle: self.stack[start..].to_vec(),
            });
        }

        let formula = self
            .descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnresolvedDependency {
                missing: name.clone(),
                requested_by: self.stack.last().cloned(),
            })?;

        self.stack.push(name.clone());

        let dependencies: Vec<Dependency> = formula
            .dependencies()
            .into_iter()
            .filter(|d| self.options.follows(d.kind))
            .collect();

        let descriptors = self.descriptors;
        let mut planned_deps = Vec::new();
        for dep in &dependencies {
            let Some(dep_formula) = descriptors.get(&dep.name) else {
                return Err(ResolveError::UnresolvedDependency {
                    missing: dep.name.clone(),
                    requested_by: Some(name.clone()),
                });
            };

            if !self.visited.contains(&dep.name)
                && !self.forced.contains(&dep.name)
                && self.registry.satisfies(&dep.name, &dep.requirement)
            {
                tracing::debug!("{name}: {} {} already satisfied", dep.name, dep.requirement);
                self.mark_pruned(&dep.name);
                continue;
            }

            if !dep
                .requirement
                .matches(dep_formula.version(), dep_formula.revision())
            {
                return Err(ResolveError::Unsatisfiable {
                    package: dep.name.clone(),
                    requirement: dep.requirement.clone(),
                    available: describe_available(dep_formula),
                    requested_by: name.clone(),
                });
            }

            self.visit(&dep.name)?;
            planned_deps.push(dep.name.clone());
        }

        self.stack.pop();
        self.visited.insert(name.clone());
        self.plan.pruned.retain(|p| p != name);
        self.plan.packages.push(PlannedPackage {
            formula,
            dependencies,
            planned_deps,
        });

        Ok(())
    }

    fn mark_pruned(&mut self, name: &PackageName) {
        self.skipped.insert(name.clone());
        if !self.visited.contains(name) && !self.plan.pruned.contains(name) {
            self.plan.pruned.push(name.clone());
        }
    }
}

fn describe_available(formula: &Formula) -> String {
    match formula.revision() {
        Some(rev) => format!("{} @{rev}", formula.version()),
        None => formula.version().to_string(),
    }
}

/// Packages that declare any kind of dependency on `name`, in declaration
/// order.
pub fn dependents(name: &str, descriptors: &DescriptorSet) -> Vec<PackageName> {
    descriptors
        .iter()
        .filter(|f| f.dependencies().iter().any(|d| d.name == name))
        .map(|f| f.name().clone())
        .collect()
}

/// Resolve every formula (recommended edges included) against an empty
/// registry and collect the distinct errors.
pub fn check_graph(descriptors: &DescriptorSet) -> Vec<ResolveError> {
    let registry = InstallRegistry::in_memory();
    let options = ResolveOptions {
        with_recommended: true,
        reinstall: true,
    };

    let mut errors: Vec<ResolveError> = Vec::new();
    for formula in descriptors.iter() {
        if let Err(e) = resolve(formula.name(), &registry, descriptors, &options) {
            let duplicate = errors.iter().any(|seen| match (seen, &e) {
                (
                    ResolveError::CyclicDependency { cycle: a },
                    ResolveError::CyclicDependency { cycle: b },
                ) => same_cycle(a, b),
                _ => *seen == e,
            });
            if !duplicate {
                errors.push(e);
            }
        }
    }
    errors
}

/// Same nodes in the same rotation order.
fn same_cycle(a: &[PackageName], b: &[PackageName]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let Some(offset) = b.iter().position(|n| Some(n) == a.first()) else {
        return false;
    };
    a.iter()
        .enumerate()
        .all(|(i, n)| *n == b[(i + offset) % b.len()])
}
