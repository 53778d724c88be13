// src/repository/pinning.rs

//! Reuse of pins from a previous output
//!
//! Recompiling should not churn versions that still satisfy the inputs. The
//! proxy answers `find_best_match` from the prior pin whenever that pin is
//! acceptable, and only consults the wrapped repository otherwise.

use super::{InstallOptions, Repository};
use crate::error::Result;
use crate::hash::{FAVORITE_HASH, has_algorithm};
use crate::requirement::{Candidate, PackageName, PinnedRequirement, RequirementSpec};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

/// A pin read from a previous output, with the hashes recorded for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingPin {
    pub pin: PinnedRequirement,
    pub hashes: BTreeSet<String>,
}

impl ExistingPin {
    pub fn new(pin: PinnedRequirement, hashes: BTreeSet<String>) -> Self {
        Self { pin, hashes }
    }
}

/// Repository decorator preferring previously pinned versions
pub struct LocalPinningProxy<R> {
    inner: R,
    existing_pins: IndexMap<PackageName, ExistingPin>,
    reuse_hashes: bool,
}

impl<R: Repository> LocalPinningProxy<R> {
    /// Wrap `inner`, ignoring prior pins for packages being upgraded
    pub fn new(
        inner: R,
        existing_pins: impl IntoIterator<Item = ExistingPin>,
        upgrade_targets: &BTreeSet<PackageName>,
    ) -> Self {
        let existing_pins = existing_pins
            .into_iter()
            .filter(|existing| !upgrade_targets.contains(&existing.pin.name))
            .map(|existing| (existing.pin.name.clone(), existing))
            .collect();
        Self {
            inner,
            existing_pins,
            reuse_hashes: true,
        }
    }

    /// Whether prior hashes may be returned instead of querying the index
    pub fn with_reuse_hashes(mut self, reuse_hashes: bool) -> Self {
        self.reuse_hashes = reuse_hashes;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// The prior pin for a package, if one is still held
    pub fn existing_pin(&self, name: &PackageName) -> Option<&ExistingPin> {
        self.existing_pins.get(name)
    }

    fn reusable_pin(&self, requirement: &RequirementSpec) -> Option<&ExistingPin> {
        if requirement.is_local() {
            return None;
        }
        let existing = self.existing_pins.get(requirement.name())?;
        requirement
            .allows(&existing.pin.version)
            .then_some(existing)
    }
}

impl<R: Repository> Repository for LocalPinningProxy<R> {
    fn find_best_match(
        &mut self,
        requirement: &RequirementSpec,
        allow_prereleases: bool,
    ) -> Result<Candidate> {
        if let Some(existing) = self.reusable_pin(requirement) {
            debug!("Reusing existing pin {} for {}", existing.pin, requirement);
            return Ok(Candidate::Pinned(PinnedRequirement::new(
                existing.pin.name.clone(),
                existing.pin.version.clone(),
                requirement.extras().clone(),
            )));
        }

        let candidate = self.inner.find_best_match(requirement, allow_prereleases)?;
        if let Some(stale) = self.existing_pins.shift_remove(requirement.name()) {
            debug!(
                "Existing pin {} no longer satisfies {}; using {}",
                stale.pin, requirement, candidate
            );
        }
        Ok(candidate)
    }

    fn get_dependencies(&mut self, candidate: &Candidate) -> Result<Vec<RequirementSpec>> {
        if let Candidate::Pinned(pin) = candidate {
            if let Some(existing) = self.existing_pins.get(&pin.name) {
                if existing.pin.version == pin.version {
                    self.inner.copy_dependencies(&existing.pin, pin);
                }
            }
        }
        self.inner.get_dependencies(candidate)
    }

    fn get_hashes(&mut self, pin: &PinnedRequirement) -> Result<BTreeSet<String>> {
        if self.reuse_hashes {
            if let Some(existing) = self.existing_pins.get(&pin.name) {
                if existing.pin.version == pin.version {
                    let hashes: BTreeSet<String> = existing
                        .hashes
                        .iter()
                        .filter(|hash| has_algorithm(hash, FAVORITE_HASH))
                        .cloned()
                        .collect();
                    if !hashes.is_empty() {
                        debug!("Reusing {} recorded hashes for {}", hashes.len(), pin);
                        return Ok(hashes);
                    }
                }
            }
        }
        self.inner.get_hashes(pin)
    }

    fn begin_round(&mut self) {
        self.inner.begin_round()
    }

    fn end_round(&mut self) {
        self.inner.end_round()
    }

    fn allow_all_formats(&mut self) {
        self.inner.allow_all_formats()
    }

    fn restore_formats(&mut self) {
        self.inner.restore_formats()
    }

    fn copy_dependencies(&mut self, source: &PinnedRequirement, dest: &PinnedRequirement) {
        self.inner.copy_dependencies(source, dest)
    }

    fn clear_caches(&mut self) {
        self.inner.clear_caches()
    }

    fn install_options(&self) -> InstallOptions {
        self.inner.install_options()
    }
}
