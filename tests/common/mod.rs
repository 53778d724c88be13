// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use reqpin::repository::{IndexDocument, LocalIndexRepository, VersionEntry};
use reqpin::requirement::{Origin, PackageName, Version};
use reqpin::{Candidate, PinnedRequirement, Repository, RequirementSpec, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Builds an in-memory JSON index document
#[derive(Default)]
pub struct IndexBuilder {
    document: IndexDocument,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a release with unconditional dependencies
    pub fn release(mut self, name: &str, version: &str, dependencies: &[&str]) -> Self {
        let entry = self.entry(name, version);
        entry.dependencies.insert(
            String::new(),
            dependencies.iter().map(|d| d.to_string()).collect(),
        );
        self
    }

    /// Add dependencies behind an extra to an existing release
    pub fn extra(mut self, name: &str, version: &str, extra: &str, dependencies: &[&str]) -> Self {
        let entry = self.entry(name, version);
        entry.dependencies.insert(
            extra.to_string(),
            dependencies.iter().map(|d| d.to_string()).collect(),
        );
        self
    }

    pub fn hashes(mut self, name: &str, version: &str, hashes: &[&str]) -> Self {
        let entry = self.entry(name, version);
        entry.hashes.extend(hashes.iter().map(|h| h.to_string()));
        self
    }

    pub fn document(self) -> IndexDocument {
        self.document
    }

    pub fn build(self) -> LocalIndexRepository {
        LocalIndexRepository::from_document(self.document, "test-index").unwrap()
    }

    fn entry(&mut self, name: &str, version: &str) -> &mut VersionEntry {
        self.document
            .packages
            .entry(name.to_string())
            .or_default()
            .entry(version.to_string())
            .or_default()
    }
}

/// Repository wrapper counting the queries it forwards
pub struct Counting<R> {
    pub inner: R,
    pub best_match_calls: BTreeMap<String, usize>,
    pub dependency_calls: BTreeMap<String, usize>,
    pub hash_calls: BTreeMap<String, usize>,
}

impl<R: Repository> Counting<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            best_match_calls: BTreeMap::new(),
            dependency_calls: BTreeMap::new(),
            hash_calls: BTreeMap::new(),
        }
    }

    pub fn best_matches(&self, name: &str) -> usize {
        self.best_match_calls.get(name).copied().unwrap_or(0)
    }

    pub fn dependency_lookups(&self, name: &str) -> usize {
        self.dependency_calls.get(name).copied().unwrap_or(0)
    }

    pub fn hash_lookups(&self, name: &str) -> usize {
        self.hash_calls.get(name).copied().unwrap_or(0)
    }
}

impl<R: Repository> Repository for Counting<R> {
    fn find_best_match(&mut self, requirement: &RequirementSpec, allow_prereleases: bool) -> Result<Candidate> {
        *self
            .best_match_calls
            .entry(requirement.name().to_string())
            .or_default() += 1;
        self.inner.find_best_match(requirement, allow_prereleases)
    }

    fn get_dependencies(&mut self, candidate: &Candidate) -> Result<Vec<RequirementSpec>> {
        *self
            .dependency_calls
            .entry(candidate.name().to_string())
            .or_default() += 1;
        self.inner.get_dependencies(candidate)
    }

    fn get_hashes(&mut self, pin: &PinnedRequirement) -> Result<BTreeSet<String>> {
        *self.hash_calls.entry(pin.name.to_string()).or_default() += 1;
        self.inner.get_hashes(pin)
    }

    fn copy_dependencies(&mut self, source: &PinnedRequirement, dest: &PinnedRequirement) {
        self.inner.copy_dependencies(source, dest);
    }
}

/// Every `chain-N` depends on `chain-(N+1)`, forever
#[derive(Default)]
pub struct EndlessChain;

impl Repository for EndlessChain {
    fn find_best_match(&mut self, requirement: &RequirementSpec, _allow_prereleases: bool) -> Result<Candidate> {
        Ok(Candidate::Pinned(pin(requirement.name().as_ref(), "1.0")))
    }

    fn get_dependencies(&mut self, candidate: &Candidate) -> Result<Vec<RequirementSpec>> {
        let next = candidate
            .name()
            .as_ref()
            .strip_prefix("chain-")
            .and_then(|n| n.parse::<usize>().ok())
            .map(|n| n + 1)
            .unwrap_or(0);
        Ok(vec![spec(&format!("chain-{}", next))])
    }

    fn get_hashes(&mut self, _pin: &PinnedRequirement) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }
}

pub fn spec(line: &str) -> RequirementSpec {
    RequirementSpec::parse(line).unwrap()
}

/// Top-level requirements as they would come from `requirements.in`
pub fn primary(lines: &[&str]) -> Vec<RequirementSpec> {
    lines
        .iter()
        .map(|l| spec(l).with_origin(Origin::File("requirements.in".to_string())))
        .collect()
}

pub fn name(name: &str) -> PackageName {
    PackageName::new(name.to_string()).unwrap()
}

pub fn pin(name: &str, version: &str) -> PinnedRequirement {
    PinnedRequirement::new(
        PackageName::new(name.to_string()).unwrap(),
        Version::from_str(version).unwrap(),
        BTreeSet::new(),
    )
}

/// Display strings of candidates, in order
pub fn pins(candidates: &[Candidate]) -> Vec<String> {
    candidates.iter().map(|c| c.to_string()).collect()
}
