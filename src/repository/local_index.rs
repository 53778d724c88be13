// src/repository/local_index.rs

//! Offline repository backed by a JSON index document
//!
//! ```json
//! {
//!   "packages": {
//!     "flask": {
//!       "1.0": {
//!         "dependencies": { "": ["jinja2>=2.4"], "async": ["asgiref>=3.2"] },
//!         "hashes": ["sha256:..."],
//!         "files": [{ "filename": "Flask-1.0-py3-none-any.whl", "hash": "sha256:..." }]
//!       }
//!     }
//!   },
//!   "local": {
//!     "file:///src/app": { "dependencies": { "": ["flask"] } }
//!   }
//! }
//! ```
//!
//! Dependencies are keyed by extra; `""` holds the unconditional ones. When
//! `find_links` directories are configured, artifacts found there named
//! `<name>-<version>...` are hashed with SHA-256 and added to the known hashes.

use super::{InstallOptions, Repository, select_best_version};
use crate::error::{Error, Result};
use crate::hash::{FAVORITE_HASH, hash_file};
use crate::requirement::{
    Candidate, CandidateId, PackageName, PinnedRequirement, RequirementSpec, Version,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Serialized index document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(default)]
    pub packages: BTreeMap<String, BTreeMap<String, VersionEntry>>,
    /// Metadata of editable and URL requirements, keyed by URL
    #[serde(default)]
    pub local: BTreeMap<String, LocalMetadata>,
}

/// One released version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionEntry {
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub hashes: BTreeSet<String>,
    #[serde(default)]
    pub files: Vec<ArtifactFile>,
}

/// A distribution file of a release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub filename: String,
    #[serde(default)]
    pub hash: Option<String>,
}

impl ArtifactFile {
    pub fn is_wheel(&self) -> bool {
        self.filename.ends_with(".whl")
    }
}

/// Metadata of a local (editable or URL) project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalMetadata {
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
struct Release {
    version: Version,
    entry: VersionEntry,
}

/// Repository reading a JSON index document
#[derive(Debug)]
pub struct LocalIndexRepository {
    source: String,
    packages: BTreeMap<PackageName, Vec<Release>>,
    local: BTreeMap<String, LocalMetadata>,
    options: InstallOptions,
    all_formats: bool,
    memo: HashMap<CandidateId, Vec<RequirementSpec>>,
    hash_memo: HashMap<PinnedRequirement, BTreeSet<String>>,
    round: usize,
}

impl LocalIndexRepository {
    /// Load an index document from disk
    pub fn open(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Repository(format!("Cannot read index {}: {}", path.display(), e))
        })?;
        let document: IndexDocument = serde_json::from_str(&content)?;
        Self::from_document(document, path.display().to_string())
    }

    /// Build from an in-memory document; `source` names it in diagnostics
    pub fn from_document(document: IndexDocument, source: impl Into<String>) -> Result<Self> {
        let mut packages: BTreeMap<PackageName, Vec<Release>> = BTreeMap::new();
        for (raw_name, versions) in document.packages {
            let name = PackageName::new(raw_name.clone()).map_err(|e| {
                Error::Repository(format!("Invalid package name '{}' in index: {}", raw_name, e))
            })?;
            let releases = packages.entry(name).or_default();
            for (raw_version, entry) in versions {
                let version = Version::from_str(&raw_version).map_err(|e| {
                    Error::Repository(format!(
                        "Invalid version '{}' for {} in index: {}",
                        raw_version, raw_name, e
                    ))
                })?;
                releases.push(Release { version, entry });
            }
            releases.sort_by(|a, b| a.version.cmp(&b.version));
        }

        Ok(Self {
            source: source.into(),
            packages,
            local: document.local,
            options: InstallOptions::default(),
            all_formats: false,
            memo: HashMap::new(),
            hash_memo: HashMap::new(),
            round: 0,
        })
    }

    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }

    /// Rounds started so far
    pub fn rounds(&self) -> usize {
        self.round
    }

    fn locations(&self) -> Vec<String> {
        let mut locations = vec![self.source.clone()];
        locations.extend(self.options.find_links.iter().cloned());
        locations
    }

    /// The release behind an exact pin; a missing one is reported like any
    /// other unmatched requirement
    fn release(&self, pin: &PinnedRequirement) -> Result<&Release> {
        let releases = self.packages.get(&pin.name).map(Vec::as_slice).unwrap_or_default();
        releases
            .iter()
            .find(|r| r.version == pin.version)
            .ok_or_else(|| Error::NoCandidateFound {
                requirement: pin.to_string(),
                tried_versions: releases.iter().map(|r| r.version.to_string()).collect(),
                skipped_prereleases: Vec::new(),
                locations: self.locations(),
            })
    }

    /// Whether a file is allowed by the configured format controls
    fn format_allowed(&self, name: &PackageName, file: &ArtifactFile) -> bool {
        if self.all_formats {
            return true;
        }
        let listed =
            |set: &BTreeSet<String>| set.contains(":all:") || set.iter().any(|n| names_match(n, name));
        if file.is_wheel() {
            !listed(&self.options.no_binary)
        } else {
            !listed(&self.options.only_binary)
        }
    }

    /// A release without file listings is always available
    fn is_available(&self, name: &PackageName, release: &Release) -> bool {
        release.entry.files.is_empty()
            || release
                .entry
                .files
                .iter()
                .any(|file| self.format_allowed(name, file))
    }

    fn find_links_hashes(&self, pin: &PinnedRequirement) -> BTreeSet<String> {
        let mut hashes = BTreeSet::new();
        for link in &self.options.find_links {
            let dir = PathBuf::from(link.strip_prefix("file://").unwrap_or(link));
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            paths.sort();
            for path in paths {
                let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
                    continue;
                };
                if !artifact_matches(filename, pin) {
                    continue;
                }
                let file = ArtifactFile {
                    filename: filename.to_string(),
                    hash: None,
                };
                if !self.format_allowed(&pin.name, &file) {
                    continue;
                }
                match hash_file(FAVORITE_HASH, &path) {
                    Ok(hash) => {
                        hashes.insert(hash.to_string());
                    }
                    Err(e) => warn!("Cannot hash {}: {}", path.display(), e),
                }
            }
        }
        hashes
    }
}

impl Repository for LocalIndexRepository {
    fn find_best_match(
        &mut self,
        requirement: &RequirementSpec,
        allow_prereleases: bool,
    ) -> Result<Candidate> {
        if requirement.is_local() {
            return Ok(Candidate::Local(requirement.clone()));
        }

        let releases: Vec<&Release> = self
            .packages
            .get(requirement.name())
            .map(|releases| {
                releases
                    .iter()
                    .filter(|r| self.is_available(requirement.name(), r))
                    .collect()
            })
            .unwrap_or_default();

        let selection = select_best_version(
            requirement.specifiers(),
            releases.iter().map(|r| &r.version),
            allow_prereleases,
        );

        match selection.best {
            Some(version) => {
                debug!("{} matched {} in {}", requirement, version, self.source);
                Ok(Candidate::Pinned(PinnedRequirement::new(
                    requirement.name().clone(),
                    version,
                    requirement.extras().clone(),
                )))
            }
            None => Err(Error::NoCandidateFound {
                requirement: requirement.to_string(),
                tried_versions: releases.iter().map(|r| r.version.to_string()).collect(),
                skipped_prereleases: selection
                    .skipped_prereleases
                    .iter()
                    .map(|v| v.to_string())
                    .collect(),
                locations: self.locations(),
            }),
        }
    }

    fn get_dependencies(&mut self, candidate: &Candidate) -> Result<Vec<RequirementSpec>> {
        let id = candidate.id();
        if let Some(memoised) = self.memo.get(&id) {
            return Ok(memoised.clone());
        }

        let (by_extra, extras) = match candidate {
            Candidate::Pinned(pin) => (&self.release(pin)?.entry.dependencies, &pin.extras),
            Candidate::Local(spec) => {
                let url = spec.source().map(|s| s.url()).unwrap_or_default();
                let metadata = self.local.get(url).ok_or_else(|| {
                    Error::Repository(format!("No metadata for local requirement {}", spec))
                })?;
                (&metadata.dependencies, spec.extras())
            }
        };

        let mut dependencies = Vec::new();
        let mut groups = vec![""];
        for extra in extras {
            let extra = extra.as_ref();
            if by_extra.contains_key(extra) {
                groups.push(extra);
            } else {
                warn!("{} does not provide the extra '{}'", candidate, extra);
            }
        }
        for group in groups {
            for line in by_extra.get(group).into_iter().flatten() {
                dependencies.push(RequirementSpec::parse(line)?);
            }
        }

        self.memo.insert(id, dependencies.clone());
        Ok(dependencies)
    }

    fn get_hashes(&mut self, pin: &PinnedRequirement) -> Result<BTreeSet<String>> {
        if let Some(hashes) = self.hash_memo.get(pin) {
            return Ok(hashes.clone());
        }
        let release = self.release(pin)?;
        let mut hashes = release.entry.hashes.clone();
        for file in &release.entry.files {
            if let Some(hash) = &file.hash {
                if self.format_allowed(&pin.name, file) {
                    hashes.insert(hash.clone());
                }
            }
        }
        hashes.extend(self.find_links_hashes(pin));
        // Format controls change which files count, so only memoise the unrestricted view
        if self.all_formats {
            self.hash_memo.insert(pin.clone(), hashes.clone());
        }
        Ok(hashes)
    }

    fn begin_round(&mut self) {
        self.round += 1;
    }

    fn allow_all_formats(&mut self) {
        self.all_formats = true;
    }

    fn restore_formats(&mut self) {
        self.all_formats = false;
    }

    fn copy_dependencies(&mut self, source: &PinnedRequirement, dest: &PinnedRequirement) {
        if source.extras != dest.extras {
            return;
        }
        let source_id = CandidateId::Pinned(source.clone());
        if let Some(dependencies) = self.memo.get(&source_id).cloned() {
            self.memo
                .entry(CandidateId::Pinned(dest.clone()))
                .or_insert(dependencies);
        }
    }

    fn clear_caches(&mut self) {
        self.memo.clear();
        self.hash_memo.clear();
    }

    fn install_options(&self) -> InstallOptions {
        self.options.clone()
    }
}

fn names_match(raw: &str, name: &PackageName) -> bool {
    PackageName::new(raw.to_string()).is_ok_and(|n| &n == name)
}

/// `<name>-<version>-...whl` or `<name>-<version>.tar.gz`, compared normalised
fn artifact_matches(filename: &str, pin: &PinnedRequirement) -> bool {
    let stem = filename
        .strip_suffix(".whl")
        .or_else(|| filename.strip_suffix(".tar.gz"))
        .or_else(|| filename.strip_suffix(".zip"));
    let Some(stem) = stem else {
        return false;
    };
    let mut parts = stem.splitn(3, '-');
    let (Some(name), Some(version)) = (parts.next(), parts.next()) else {
        return false;
    };
    names_match(name, &pin.name)
        && Version::from_str(version).is_ok_and(|v| v == pin.version)
}
