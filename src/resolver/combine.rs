// src/resolver/combine.rs

//! Grouping of requirements into one merged spec per package
//!
//! Requirements for the same package are folded together in the order they
//! are seen. Normally that produces a single branch per package. Requirements
//! whose markers can never hold at the same time may stay apart when merging
//! them would leave no acceptable version, yielding one branch each.

use super::ConflictingSpec;
use crate::error::{Error, Result};
use crate::requirement::marker::markers_disjoint;
use crate::requirement::specifier::{canonical, intersect, is_satisfiable};
use crate::requirement::{PackageName, RequirementSpec};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

/// A merged requirement and the specs it was folded from
#[derive(Debug, Clone)]
pub struct Branch {
    pub spec: RequirementSpec,
    pub sources: Vec<RequirementSpec>,
}

impl Branch {
    fn new(spec: RequirementSpec) -> Self {
        Self {
            sources: vec![spec.clone()],
            spec,
        }
    }

    fn accepts(&self, spec: &RequirementSpec) -> bool {
        compatible(&self.spec, spec)
    }

    fn absorb(&mut self, spec: &RequirementSpec) {
        self.spec = self.spec.merge(spec);
        self.sources.push(spec.clone());
    }

    /// Take on the spec's version and extras without widening this branch's marker
    fn narrow(&mut self, spec: &RequirementSpec) {
        let marker = self.spec.marker().cloned();
        self.spec = self.spec.merge(spec).with_marker(marker);
        self.sources.push(spec.clone());
    }

    fn conflict(&self, spec: &RequirementSpec) -> Error {
        let mut conflicts: Vec<ConflictingSpec> =
            self.sources.iter().map(ConflictingSpec::from_spec).collect();
        conflicts.push(ConflictingSpec::from_spec(spec));
        Error::IncompatibleRequirements {
            package: spec.name().to_string(),
            conflicts,
        }
    }
}

/// Whether two specs for one package can be satisfied together
pub fn compatible(a: &RequirementSpec, b: &RequirementSpec) -> bool {
    match (a.source(), b.source()) {
        (Some(left), Some(right)) => left.url() == right.url(),
        // The local project decides its own version
        (Some(_), None) | (None, Some(_)) => true,
        (None, None) => is_satisfiable(&intersect(a.specifiers(), b.specifiers())),
    }
}

/// Fold specs into branches per package, keyed in first-seen order
pub fn combine(
    specs: impl IntoIterator<Item = RequirementSpec>,
) -> Result<IndexMap<PackageName, Vec<Branch>>> {
    let mut groups: IndexMap<PackageName, Vec<Branch>> = IndexMap::new();

    for spec in specs {
        let branches = groups.entry(spec.name().clone()).or_default();

        let overlapping: Vec<usize> = branches
            .iter()
            .enumerate()
            .filter(|(_, b)| !markers_disjoint(b.spec.marker(), spec.marker()))
            .map(|(i, _)| i)
            .collect();

        if let Some(&index) = overlapping.iter().find(|&&i| !branches[i].accepts(&spec)) {
            return Err(branches[index].conflict(&spec));
        }

        match overlapping.as_slice() {
            [index] => branches[*index].absorb(&spec),
            [] => match branches.iter().position(|b| b.accepts(&spec)) {
                Some(index) => branches[index].absorb(&spec),
                None => branches.push(Branch::new(spec)),
            },
            several => {
                for &index in several {
                    branches[index].narrow(&spec);
                }
            }
        }
    }

    Ok(groups)
}

/// Order-independent fingerprint of a set of specs, for comparing rounds
///
/// Unlike [`combine`] this never fails: conflicting specs are summarised side
/// by side and reported when the next round combines them.
pub fn summarize<'a>(specs: impl IntoIterator<Item = &'a RequirementSpec>) -> BTreeSet<SpecSummary> {
    let mut folded: BTreeMap<(String, Option<String>), SpecSummary> = BTreeMap::new();
    for spec in specs {
        let id = spec.identity();
        let key = (id.name.to_string(), id.url);
        let entry = folded.entry(key.clone()).or_insert_with(|| SpecSummary {
            name: key.0.clone(),
            url: key.1.clone(),
            specifiers: BTreeSet::new(),
            extras: BTreeSet::new(),
            markers: BTreeSet::new(),
            constraint: true,
        });
        entry.specifiers.extend(canonical(spec.specifiers()));
        entry.extras.extend(spec.extras().iter().map(|e| e.to_string()));
        entry
            .markers
            .insert(spec.marker().map(|m| m.to_string()).unwrap_or_default());
        entry.constraint &= spec.is_constraint();
    }
    folded.into_values().collect()
}

/// Summary of every spec seen for one requirement identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpecSummary {
    pub name: String,
    pub url: Option<String>,
    pub specifiers: BTreeSet<String>,
    pub extras: BTreeSet<String>,
    /// Marker texts; the empty string stands for "no marker"
    pub markers: BTreeSet<String>,
    pub constraint: bool,
}
