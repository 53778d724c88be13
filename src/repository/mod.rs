// src/repository/mod.rs

//! Package repositories
//!
//! The resolver never talks to an index directly. It goes through the
//! [`Repository`] trait, which answers three questions: which version best
//! matches a requirement, what a pinned version depends on, and which hashes
//! its artifacts have.
//!
//! Implementations:
//! - [`LocalIndexRepository`]: an offline index described by a JSON document
//! - [`LocalPinningProxy`]: wraps another repository and prefers versions
//!   already pinned in a previous output

mod local_index;
mod options;
mod pinning;

pub use local_index::{ArtifactFile, IndexDocument, LocalIndexRepository, LocalMetadata, VersionEntry};
pub use options::InstallOptions;
pub use pinning::{ExistingPin, LocalPinningProxy};

use crate::error::Result;
use crate::requirement::{Candidate, PinnedRequirement, RequirementSpec, Version, VersionSpecifiers};
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

/// Capability boundary over a package index
///
/// Methods take `&mut self` so implementations can memoise freely. Results
/// must be deterministic for identical inputs.
pub trait Repository {
    /// The highest version satisfying the requirement
    ///
    /// Editable and URL requirements come back unchanged as
    /// [`Candidate::Local`].
    fn find_best_match(
        &mut self,
        requirement: &RequirementSpec,
        allow_prereleases: bool,
    ) -> Result<Candidate>;

    /// Runtime dependencies of a candidate, including those of its extras
    fn get_dependencies(&mut self, candidate: &Candidate) -> Result<Vec<RequirementSpec>>;

    /// All known `algorithm:hexdigest` hashes of a pinned version's artifacts
    fn get_hashes(&mut self, pin: &PinnedRequirement) -> Result<BTreeSet<String>>;

    /// Start of a resolution round; per-round build state may be reset here
    fn begin_round(&mut self) {}

    /// End of a resolution round
    fn end_round(&mut self) {}

    /// Make artifacts of every format eligible (used while hashing)
    fn allow_all_formats(&mut self) {}

    /// Undo [`Repository::allow_all_formats`]
    fn restore_formats(&mut self) {}

    /// Seed dependency memoisation for `dest` from what is known about `source`
    fn copy_dependencies(&mut self, _source: &PinnedRequirement, _dest: &PinnedRequirement) {}

    /// Drop any repository-side memoisation
    fn clear_caches(&mut self) {}

    /// Index settings to hand to an installer
    fn install_options(&self) -> InstallOptions {
        InstallOptions::default()
    }
}

impl<R: Repository + ?Sized> Repository for Box<R> {
    fn find_best_match(
        &mut self,
        requirement: &RequirementSpec,
        allow_prereleases: bool,
    ) -> Result<Candidate> {
        (**self).find_best_match(requirement, allow_prereleases)
    }

    fn get_dependencies(&mut self, candidate: &Candidate) -> Result<Vec<RequirementSpec>> {
        (**self).get_dependencies(candidate)
    }

    fn get_hashes(&mut self, pin: &PinnedRequirement) -> Result<BTreeSet<String>> {
        (**self).get_hashes(pin)
    }

    fn begin_round(&mut self) {
        (**self).begin_round()
    }

    fn end_round(&mut self) {
        (**self).end_round()
    }

    fn allow_all_formats(&mut self) {
        (**self).allow_all_formats()
    }

    fn restore_formats(&mut self) {
        (**self).restore_formats()
    }

    fn copy_dependencies(&mut self, source: &PinnedRequirement, dest: &PinnedRequirement) {
        (**self).copy_dependencies(source, dest)
    }

    fn clear_caches(&mut self) {
        (**self).clear_caches()
    }

    fn install_options(&self) -> InstallOptions {
        (**self).install_options()
    }
}

/// Keeps a resolution round open for as long as it lives
///
/// `end_round` runs when the scope is dropped, on every exit path.
pub struct RoundScope<'a, R: Repository + ?Sized> {
    repository: &'a mut R,
}

impl<'a, R: Repository + ?Sized> RoundScope<'a, R> {
    pub fn new(repository: &'a mut R) -> Self {
        repository.begin_round();
        Self { repository }
    }
}

impl<R: Repository + ?Sized> Deref for RoundScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.repository
    }
}

impl<R: Repository + ?Sized> DerefMut for RoundScope<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.repository
    }
}

impl<R: Repository + ?Sized> Drop for RoundScope<'_, R> {
    fn drop(&mut self) {
        self.repository.end_round();
    }
}

/// Makes every artifact format eligible for as long as it lives
pub struct FormatScope<'a, R: Repository + ?Sized> {
    repository: &'a mut R,
}

impl<'a, R: Repository + ?Sized> FormatScope<'a, R> {
    pub fn new(repository: &'a mut R) -> Self {
        repository.allow_all_formats();
        Self { repository }
    }
}

impl<R: Repository + ?Sized> Deref for FormatScope<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.repository
    }
}

impl<R: Repository + ?Sized> DerefMut for FormatScope<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        self.repository
    }
}

impl<R: Repository + ?Sized> Drop for FormatScope<'_, R> {
    fn drop(&mut self) {
        self.repository.restore_formats();
    }
}

/// Outcome of choosing among available versions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSelection {
    pub best: Option<Version>,
    /// Matching prereleases passed over because a final release matched
    pub skipped_prereleases: Vec<Version>,
}

/// Pick the highest version allowed by `specifiers`
///
/// Prereleases are eligible when `allow_prereleases` is set or a specifier
/// itself names a prerelease. Otherwise they are only chosen when no final
/// release matches.
pub fn select_best_version<'a>(
    specifiers: &VersionSpecifiers,
    versions: impl IntoIterator<Item = &'a Version>,
    allow_prereleases: bool,
) -> VersionSelection {
    let prereleases_ok =
        allow_prereleases || specifiers.iter().any(|s| s.version().any_prerelease());

    let mut finals: Vec<&Version> = Vec::new();
    let mut prereleases: Vec<&Version> = Vec::new();
    for version in versions {
        if !specifiers.contains(version) {
            continue;
        }
        if version.any_prerelease() {
            prereleases.push(version);
        } else {
            finals.push(version);
        }
    }

    let best_final = finals.iter().max().copied();
    let best_pre = prereleases.iter().max().copied();

    if prereleases_ok {
        let best = best_final.into_iter().chain(best_pre).max().cloned();
        return VersionSelection {
            best,
            skipped_prereleases: Vec::new(),
        };
    }

    match best_final {
        Some(best) => {
            let mut skipped: Vec<Version> = prereleases.into_iter().cloned().collect();
            skipped.sort();
            VersionSelection {
                best: Some(best.clone()),
                skipped_prereleases: skipped,
            }
        }
        None => VersionSelection {
            best: best_pre.cloned(),
            skipped_prereleases: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn versions(list: &[&str]) -> Vec<Version> {
        list.iter().map(|v| Version::from_str(v).unwrap()).collect()
    }

    fn specs(s: &str) -> VersionSpecifiers {
        VersionSpecifiers::from_str(s).unwrap()
    }

    #[test]
    fn test_select_highest_final() {
        let available = versions(&["1.0", "1.5", "2.0b1", "1.9"]);
        let selection = select_best_version(&specs(">=1.0"), &available, false);
        assert_eq!(selection.best.unwrap().to_string(), "1.9");
        assert_eq!(selection.skipped_prereleases.len(), 1);
    }

    #[test]
    fn test_select_prerelease_when_allowed() {
        let available = versions(&["1.0", "2.0b1"]);
        let selection = select_best_version(&specs(">=1.0"), &available, true);
        assert_eq!(selection.best.unwrap().to_string(), "2.0b1");
    }

    #[test]
    fn test_prerelease_named_in_specifier() {
        let available = versions(&["1.0", "2.0b1", "2.0b2"]);
        let selection = select_best_version(&specs(">=2.0b1"), &available, false);
        assert_eq!(selection.best.unwrap().to_string(), "2.0b2");
    }

    #[test]
    fn test_prerelease_fallback() {
        let available = versions(&["0.9", "2.0rc1"]);
        let selection = select_best_version(&specs(">=1.0"), &available, false);
        assert_eq!(selection.best.unwrap().to_string(), "2.0rc1");
    }

    #[test]
    fn test_nothing_matches() {
        let available = versions(&["0.9"]);
        assert!(select_best_version(&specs(">=1.0"), &available, false).best.is_none());
    }

    #[derive(Default)]
    struct Hooks {
        events: Vec<&'static str>,
    }

    impl Repository for Hooks {
        fn find_best_match(&mut self, _: &RequirementSpec, _: bool) -> Result<Candidate> {
            Err(crate::error::Error::Repository("unused".into()))
        }
        fn get_dependencies(&mut self, _: &Candidate) -> Result<Vec<RequirementSpec>> {
            Ok(Vec::new())
        }
        fn get_hashes(&mut self, _: &PinnedRequirement) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::new())
        }
        fn begin_round(&mut self) {
            self.events.push("begin");
        }
        fn end_round(&mut self) {
            self.events.push("end");
        }
        fn allow_all_formats(&mut self) {
            self.events.push("allow");
        }
        fn restore_formats(&mut self) {
            self.events.push("restore");
        }
    }

    fn fails_inside(repo: &mut Hooks) -> Result<()> {
        let mut scope = RoundScope::new(repo);
        scope.events.push("work");
        Err(crate::error::Error::Repository("boom".into()))
    }

    #[test]
    fn test_round_scope_releases_on_error() {
        let mut repo = Hooks::default();
        assert!(fails_inside(&mut repo).is_err());
        assert_eq!(repo.events, vec!["begin", "work", "end"]);
    }

    #[test]
    fn test_format_scope_through_box() {
        let mut repo = Box::new(Hooks::default());
        {
            let mut scope = FormatScope::new(&mut repo);
            scope.events.push("hash");
        }
        assert_eq!(repo.events, vec!["allow", "hash", "restore"]);
    }
}
