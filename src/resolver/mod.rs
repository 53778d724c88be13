// src/resolver/mod.rs

//! Dependency resolution
//!
//! The resolver turns abstract requirements into a consistent set of pinned
//! versions by iterating to a fixed point. Each round:
//!
//! 1. combines every known requirement (ours plus the dependencies found in
//!    the previous round) into one merged spec per package,
//! 2. picks the best matching version for each,
//! 3. collects the dependencies of those versions, from the dependency cache
//!    when possible,
//! 4. compares the dependencies found with those of the previous round.
//!
//! When a round discovers exactly the dependencies the previous one did, the
//! selection is stable and becomes the result. Rounds are bounded by
//! [`ResolverOptions::max_rounds`].

mod combine;
mod conflict;
mod provenance;

pub use combine::{Branch, SpecSummary, combine, compatible, summarize};
pub use conflict::ConflictingSpec;
pub use provenance::Provenance;

use crate::cache::{CacheKey, DependencyCache};
use crate::error::{Error, Result};
use crate::repository::{FormatScope, Repository, RoundScope};
use crate::requirement::marker::markers_union;
use crate::requirement::{
    Candidate, CandidateId, Marker, Origin, PackageName, PinnedRequirement, RequirementSpec,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Packages left out of pinned output unless explicitly allowed
///
/// Pinning these can break the tooling that installs everything else.
pub const UNSAFE_PACKAGES: &[&str] = &["setuptools", "distribute", "pip"];

/// Default bound on resolution rounds
pub const DEFAULT_MAX_ROUNDS: usize = 10;

pub fn is_unsafe_package(name: &PackageName) -> bool {
    UNSAFE_PACKAGES.contains(&name.as_ref())
}

/// Resolver behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Consider prereleases even when final releases match
    pub prereleases: bool,
    /// Keep unsafe packages in the pinned requirements
    pub allow_unsafe: bool,
    /// Clear the dependency cache and repository caches before resolving
    pub clear_caches: bool,
    pub max_rounds: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            prereleases: false,
            allow_unsafe: false,
            clear_caches: false,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

/// A dependency discovered during a round
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub parent: CandidateId,
    pub child: RequirementSpec,
}

/// The result of a successful resolution
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Pinned (and local) requirements, sorted by name
    pub requirements: Vec<Candidate>,
    /// Entries considered unsafe; also present in `requirements` only when allowed
    pub unsafe_requirements: Vec<Candidate>,
    /// Merged environment marker of each entry that has one
    pub markers: BTreeMap<CandidateId, Marker>,
    pub provenance: Provenance,
    /// Rounds needed to reach the fixed point
    pub rounds: usize,
}

impl Resolution {
    pub fn marker(&self, candidate: &Candidate) -> Option<&Marker> {
        self.markers.get(&candidate.id())
    }

    /// Pinned index requirements, skipping local ones
    pub fn pins(&self) -> impl Iterator<Item = &PinnedRequirement> {
        self.requirements.iter().filter_map(Candidate::as_pinned)
    }

    pub fn is_unsafe(&self, candidate: &Candidate) -> bool {
        let id = candidate.id();
        self.unsafe_requirements.iter().any(|c| c.id() == id)
    }
}

/// A merged requirement and what was selected for it
#[derive(Debug, Clone)]
struct Selected {
    spec: RequirementSpec,
    /// `None` for constraint-only entries, which are never selected
    candidate: Option<Candidate>,
}

struct RoundOutcome {
    selected: Vec<Selected>,
    edges: Vec<DependencyEdge>,
}

/// Fixed-point dependency resolver
pub struct Resolver<R> {
    constraints: Vec<RequirementSpec>,
    repository: R,
    cache: DependencyCache,
    options: ResolverOptions,
    their_constraints: Vec<RequirementSpec>,
    resolved: bool,
}

impl<R: Repository> Resolver<R> {
    /// `constraints` are the primary requirements, constraint-only entries
    /// and upgrade targets, in input order
    pub fn new(
        constraints: impl IntoIterator<Item = RequirementSpec>,
        repository: R,
        cache: DependencyCache,
        options: ResolverOptions,
    ) -> Self {
        Self {
            constraints: constraints.into_iter().collect(),
            repository,
            cache,
            options,
            their_constraints: Vec::new(),
            resolved: false,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    pub fn cache(&self) -> &DependencyCache {
        &self.cache
    }

    pub fn into_parts(self) -> (R, DependencyCache) {
        (self.repository, self.cache)
    }

    /// Resolve the constraints to a stable set of pins
    pub fn resolve(&mut self) -> Result<Resolution> {
        self.resolved = false;
        if self.options.clear_caches {
            info!("Clearing dependency and repository caches");
            self.cache.clear();
            self.repository.clear_caches();
        }

        self.their_constraints.clear();
        let mut previous: BTreeSet<SpecSummary> = BTreeSet::new();
        let mut round = 0;

        let (selected, known) = loop {
            round += 1;
            if round > self.options.max_rounds {
                return Err(Error::TooManyRounds {
                    max_rounds: self.options.max_rounds,
                });
            }
            debug!("{:-^60}", format!(" ROUND {} ", round));

            let known: Vec<RequirementSpec> = self
                .constraints
                .iter()
                .chain(self.their_constraints.iter())
                .cloned()
                .collect();

            let outcome = {
                let mut repository = RoundScope::new(&mut self.repository);
                resolve_one_round(&mut *repository, &self.cache, &known, self.options.prereleases)?
            };

            let theirs: Vec<RequirementSpec> =
                outcome.edges.into_iter().map(|edge| edge.child).collect();
            let current = summarize(&theirs);
            let changed = current != previous;

            if changed {
                for added in current.difference(&previous) {
                    debug!("adding {:?}", added);
                }
                for removed in previous.difference(&current) {
                    debug!("removing {:?}", removed);
                }
            }
            debug!(
                "Result of round {}: {}",
                round,
                if changed { "not stable" } else { "stable, done" }
            );

            self.their_constraints = theirs;
            previous = current;
            if !changed {
                break (outcome.selected, known);
            }
        };

        let mut provenance = Provenance::new();
        for spec in &known {
            provenance.record(spec.name(), spec.origin());
        }

        let (mut requirements, markers) = collect_results(selected);
        requirements.sort_by(|a, b| (a.name(), a.id()).cmp(&(b.name(), b.id())));

        let pins: Vec<PinnedRequirement> =
            requirements.iter().filter_map(Candidate::as_pinned).cloned().collect();
        let reverse = self.cache.reverse_dependencies(&pins);
        let unsafe_requirements: Vec<Candidate> = requirements
            .iter()
            .filter(|candidate| {
                is_unsafe_package(candidate.name())
                    || reverse.get(candidate.name()).is_some_and(|required_by| {
                        !required_by.is_empty() && required_by.iter().all(is_unsafe_package)
                    })
            })
            .cloned()
            .collect();
        if !self.options.allow_unsafe {
            let unsafe_ids: BTreeSet<CandidateId> =
                unsafe_requirements.iter().map(Candidate::id).collect();
            requirements.retain(|candidate| !unsafe_ids.contains(&candidate.id()));
        }

        info!(
            "Resolved {} requirements in {} round{}",
            requirements.len(),
            round,
            if round == 1 { "" } else { "s" }
        );
        self.resolved = true;

        Ok(Resolution {
            requirements,
            unsafe_requirements,
            markers,
            provenance,
            rounds: round,
        })
    }

    /// Hashes for every pinned entry; local entries are skipped
    ///
    /// Only valid after [`Resolver::resolve`] succeeded.
    pub fn resolve_hashes<'a>(
        &mut self,
        candidates: impl IntoIterator<Item = &'a Candidate>,
    ) -> Result<BTreeMap<PinnedRequirement, BTreeSet<String>>> {
        if !self.resolved {
            return Err(Error::NotResolved);
        }

        debug!("Generating hashes:");
        let mut repository = FormatScope::new(&mut self.repository);
        let mut hashes = BTreeMap::new();
        for candidate in candidates {
            if let Candidate::Pinned(pin) = candidate {
                let found = repository.get_hashes(pin)?;
                debug!("  {}: {} hashes", pin, found.len());
                hashes.insert(pin.clone(), found);
            }
        }
        Ok(hashes)
    }
}

fn resolve_one_round<R: Repository + ?Sized>(
    repository: &mut R,
    cache: &DependencyCache,
    known: &[RequirementSpec],
    prereleases: bool,
) -> Result<RoundOutcome> {
    let groups = combine(known.iter().cloned())?;

    debug!("Current constraints:");
    for branch in groups.values().flatten() {
        debug!("  {}", branch.spec);
    }

    debug!("Finding the best candidates:");
    let mut selected = Vec::new();
    for branch in groups.values().flatten() {
        let candidate = best_match(repository, &branch.spec, prereleases)?;
        if let Some(candidate) = &candidate {
            debug!("  found candidate {} (constraint was {})", candidate, branch.spec);
        }
        selected.push(Selected {
            spec: branch.spec.clone(),
            candidate,
        });
    }

    debug!("Finding secondary dependencies:");
    let mut edges = Vec::new();
    for item in &selected {
        let Some(candidate) = &item.candidate else {
            continue;
        };
        let parent = candidate.id();
        for child in dependencies_of(repository, cache, candidate)? {
            edges.push(DependencyEdge {
                parent: parent.clone(),
                child,
            });
        }
    }

    Ok(RoundOutcome { selected, edges })
}

/// Pinned and local requirements are their own best match; constraints are
/// never selected
fn best_match<R: Repository + ?Sized>(
    repository: &mut R,
    spec: &RequirementSpec,
    prereleases: bool,
) -> Result<Option<Candidate>> {
    if spec.is_constraint() {
        return Ok(None);
    }
    if spec.is_local() {
        return Ok(Some(Candidate::Local(spec.clone())));
    }
    if let Some(version) = spec.pinned_version() {
        return Ok(Some(Candidate::Pinned(PinnedRequirement::new(
            spec.name().clone(),
            version.clone(),
            spec.extras().clone(),
        ))));
    }
    repository.find_best_match(spec, prereleases).map(Some)
}

/// Dependencies of a candidate, tagged with the candidate as their origin
///
/// Pinned candidates go through the dependency cache. Local candidates are
/// always asked for, since their metadata can change at any time.
fn dependencies_of<R: Repository + ?Sized>(
    repository: &mut R,
    cache: &DependencyCache,
    candidate: &Candidate,
) -> Result<Vec<RequirementSpec>> {
    let origin = Origin::Package(candidate.name().to_string());

    let dependencies = match candidate {
        Candidate::Local(_) => repository.get_dependencies(candidate)?,
        Candidate::Pinned(pin) => {
            let key = CacheKey::from(pin);
            match cache.read(&key).and_then(|lines| parse_cached(pin, &lines)) {
                Some(dependencies) => dependencies,
                None => {
                    debug!("  {} not in cache, need to check index", pin);
                    let fetched = repository.get_dependencies(candidate)?;
                    let mut lines: Vec<String> = fetched.iter().map(|d| d.to_string()).collect();
                    lines.sort();
                    cache.write(&key, &lines);
                    match parse_cached(pin, &lines) {
                        Some(dependencies) => dependencies,
                        None => fetched,
                    }
                }
            }
        }
    };

    let names: Vec<String> = dependencies.iter().map(|d| d.to_string()).collect();
    debug!(
        "  {:25} requires {}",
        candidate.to_string(),
        if names.is_empty() { "-".to_string() } else { names.join(", ") }
    );

    Ok(dependencies
        .into_iter()
        .map(|dependency| dependency.as_requirement().with_origin(origin.clone()))
        .collect())
}

/// Parse cached requirement strings; any unparsable line invalidates the entry
fn parse_cached(pin: &PinnedRequirement, lines: &[String]) -> Option<Vec<RequirementSpec>> {
    let mut dependencies = Vec::with_capacity(lines.len());
    for line in lines {
        match RequirementSpec::parse(line) {
            Ok(dependency) => dependencies.push(dependency),
            Err(e) => {
                debug!("  ignoring cache entry of {}: {}", pin, e);
                return None;
            }
        }
    }
    Some(dependencies)
}

/// Selected non-constraint candidates, deduplicated, with their markers
fn collect_results(selected: Vec<Selected>) -> (Vec<Candidate>, BTreeMap<CandidateId, Marker>) {
    let mut requirements: Vec<Candidate> = Vec::new();
    let mut markers: BTreeMap<CandidateId, Option<Marker>> = BTreeMap::new();

    for item in selected {
        if item.spec.is_constraint() {
            continue;
        }
        let Some(candidate) = item.candidate else {
            continue;
        };
        let id = candidate.id();
        let marker = item.spec.marker().cloned();
        match markers.get_mut(&id) {
            // Two branches chose the same pin; it applies wherever either does
            Some(existing) => *existing = markers_union(existing.as_ref(), marker.as_ref()),
            None => {
                markers.insert(id, marker);
                requirements.push(candidate);
            }
        }
    }

    let markers = markers
        .into_iter()
        .filter_map(|(id, marker)| marker.map(|m| (id, m)))
        .collect();
    (requirements, markers)
}
