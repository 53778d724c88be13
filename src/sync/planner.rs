// src/sync/planner.rs

//! Merge of requirement sources and the install/uninstall diff

use super::installed::{InstalledDistribution, normalize_name};
use crate::error::{Error, Result};
use crate::requirement::marker::markers_disjoint;
use crate::requirement::{RequirementId, RequirementSpec, Version};
use crate::resolver::{ConflictingSpec, compatible};
use indexmap::IndexMap;
use pep508_rs::MarkerEnvironment;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Installed distributions that sync never removes, together with whatever
/// they depend on
pub const PACKAGES_TO_IGNORE: &[&str] = &[
    "-markerlib",
    "pip",
    "pip-tools",
    "pip-review",
    "pkg-resources",
    "setuptools",
    "wheel",
    "reqpin",
];

/// Installed distribution scheduled for removal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstalledKey {
    pub name: String,
    pub version: String,
}

impl InstalledKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl From<&InstalledDistribution> for InstalledKey {
    fn from(dist: &InstalledDistribution) -> Self {
        Self::new(dist.name.clone(), dist.version.clone())
    }
}

impl fmt::Display for InstalledKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

/// What a sync has to do to an environment
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Target entries to install, sorted by name
    pub to_install: Vec<RequirementSpec>,
    pub to_uninstall: BTreeSet<InstalledKey>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_uninstall.is_empty()
    }

    /// Names passed to the uninstall batch, sorted
    pub fn uninstall_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self.to_uninstall.iter().map(|k| k.name.as_str()).collect();
        names.into_iter().map(str::to_string).collect()
    }
}

/// Combine requirement sources into one target list
///
/// Specs are keyed by identity: the normalised name, or the URL for local
/// requirements. Duplicates that can hold together are merged. Duplicates
/// with mutually exclusive markers are kept side by side. Anything else is a
/// conflict, unless `ignore_conflicts` lets the later source replace the
/// earlier ones.
pub fn merge(
    sources: impl IntoIterator<Item = RequirementSpec>,
    ignore_conflicts: bool,
) -> Result<Vec<RequirementSpec>> {
    let mut by_key: IndexMap<RequirementId, Vec<RequirementSpec>> = IndexMap::new();

    for spec in sources {
        let entries = by_key.entry(spec.identity()).or_default();

        if let Some(existing) = entries.iter_mut().find(|e| compatible(e, &spec)) {
            *existing = existing.merge(&spec);
            continue;
        }
        if entries
            .iter()
            .all(|e| markers_disjoint(e.marker(), spec.marker()))
        {
            entries.push(spec);
            continue;
        }

        if ignore_conflicts {
            debug!("Replacing {} with {}", entries[0], spec);
            *entries = vec![spec];
        } else {
            let mut conflicts: Vec<ConflictingSpec> =
                entries.iter().map(ConflictingSpec::from_spec).collect();
            conflicts.push(ConflictingSpec::from_spec(&spec));
            return Err(Error::IncompatibleRequirements {
                package: spec.name().to_string(),
                conflicts,
            });
        }
    }

    Ok(by_key.into_values().flatten().collect())
}

/// Compares a target requirement set with an installed environment
#[derive(Debug, Clone, Default)]
pub struct SyncPlanner {
    environment: Option<MarkerEnvironment>,
    ignore: Vec<String>,
}

impl SyncPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate target markers against this environment
    pub fn with_environment(mut self, environment: MarkerEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Protect extra installed packages (and their dependencies) from removal
    pub fn with_ignored<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore
            .extend(names.into_iter().map(|n| normalize_name(n.as_ref())));
        self
    }

    /// Work out what to uninstall and install so `installed` matches `targets`
    ///
    /// A version change shows up on both sides: the old distribution is
    /// uninstalled and the target installed.
    pub fn diff(&self, targets: &[RequirementSpec], installed: &[InstalledDistribution]) -> SyncPlan {
        let mut wanted: BTreeMap<String, Vec<&RequirementSpec>> = BTreeMap::new();
        for target in targets {
            if !self.applies(target) {
                debug!("Skipping {}: marker does not match this environment", target);
                continue;
            }
            wanted
                .entry(normalize_name(target.name().as_ref()))
                .or_default()
                .push(target);
        }

        let protected = self.protected(installed);
        let mut satisfied: BTreeSet<&str> = BTreeSet::new();
        let mut to_uninstall = BTreeSet::new();

        for dist in installed {
            if protected.contains(&dist.name) {
                continue;
            }
            match wanted.get(&dist.name) {
                None => {
                    to_uninstall.insert(InstalledKey::from(dist));
                }
                Some(specs) if specs.iter().any(|s| s.is_local()) => {}
                Some(specs) => {
                    if specs.iter().any(|s| is_satisfied_by(s, &dist.version)) {
                        satisfied.insert(dist.name.as_str());
                    } else {
                        to_uninstall.insert(InstalledKey::from(dist));
                    }
                }
            }
        }

        let mut seen = BTreeSet::new();
        let to_install = wanted
            .iter()
            .filter(|(name, _)| !satisfied.contains(name.as_str()))
            .flat_map(|(_, specs)| specs.iter())
            .filter(|spec| seen.insert(spec.identity()))
            .map(|spec| (*spec).clone())
            .collect();

        SyncPlan {
            to_install,
            to_uninstall,
        }
    }

    fn applies(&self, target: &RequirementSpec) -> bool {
        match (&self.environment, target.marker()) {
            (Some(environment), Some(marker)) => marker.evaluate(environment),
            _ => true,
        }
    }

    /// Ignored packages plus everything they depend on, as installed
    fn protected(&self, installed: &[InstalledDistribution]) -> BTreeSet<String> {
        let by_name: BTreeMap<&str, &InstalledDistribution> =
            installed.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut protected: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = PACKAGES_TO_IGNORE
            .iter()
            .map(|n| n.to_string())
            .chain(self.ignore.iter().cloned())
            .collect();

        while let Some(name) = queue.pop_front() {
            if !protected.insert(name.clone()) {
                continue;
            }
            if let Some(dist) = by_name.get(name.as_str()) {
                queue.extend(dist.requires.iter().cloned());
            }
        }
        protected
    }
}

fn is_satisfied_by(target: &RequirementSpec, installed_version: &str) -> bool {
    let parsed = match Version::from_str(installed_version) {
        Ok(version) => version,
        Err(e) => {
            warn!("Cannot parse installed version '{}': {}", installed_version, e);
            return false;
        }
    };
    match target.pinned_version() {
        Some(pinned) => pinned.to_string() == parsed.to_string(),
        None => target.allows(&parsed),
    }
}
