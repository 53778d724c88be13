// src/requirement/mod.rs

//! Requirement model
//!
//! A [`RequirementSpec`] is an abstract request for a package: a normalised
//! name, a (possibly empty) set of version specifiers, requested extras, an
//! optional environment marker, and where the request came from. Resolution
//! turns those into [`PinnedRequirement`]s, each naming exactly one version.
//!
//! Specs are values. Builders such as [`RequirementSpec::with_origin`] return
//! new specs instead of mutating in place.

pub mod file;
pub mod marker;
pub mod specifier;

pub use marker::Marker;
pub use pep440_rs::{Version, VersionSpecifiers};
pub use pep508_rs::{ExtraName, PackageName};

use crate::error::{Error, Result};
use pep508_rs::{Requirement, VerbatimUrl, VersionOrUrl};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Where a requirement entered the resolution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    /// Given directly (command line or API caller)
    Direct,
    /// Read from a requirements file
    File(String),
    /// Declared as a dependency of another package
    Package(String),
    /// Added because the user asked to upgrade the package
    Upgrade,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Direct => write!(f, "direct"),
            Origin::File(path) => write!(f, "-r {}", path),
            Origin::Package(parent) => write!(f, "{}", parent),
            Origin::Upgrade => write!(f, "--upgrade-package"),
        }
    }
}

/// A requirement satisfied by a specific location rather than the index
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSource {
    /// `name @ url`
    Url(String),
    /// `-e url`
    Editable(String),
}

impl LocalSource {
    pub fn url(&self) -> &str {
        match self {
            LocalSource::Url(url) | LocalSource::Editable(url) => url,
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, LocalSource::Editable(_))
    }
}

/// Deduplication identity of a requirement
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequirementId {
    pub name: PackageName,
    pub url: Option<String>,
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} @ {}", self.name, url),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An abstract package requirement
#[derive(Debug, Clone)]
pub struct RequirementSpec {
    name: PackageName,
    specifiers: VersionSpecifiers,
    extras: BTreeSet<ExtraName>,
    marker: Option<Marker>,
    origin: Option<Origin>,
    constraint: bool,
    source: Option<LocalSource>,
}

impl RequirementSpec {
    /// A bare requirement for any version of `name`
    pub fn new(name: PackageName) -> Self {
        Self {
            name,
            specifiers: VersionSpecifiers::from_iter(Vec::new()),
            extras: BTreeSet::new(),
            marker: None,
            origin: None,
            constraint: false,
            source: None,
        }
    }

    /// Parse a PEP 508 requirement line, or an `-e <url>` editable line
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if let Some(url) = line
            .strip_prefix("--editable")
            .or_else(|| line.strip_prefix("-e"))
        {
            return Self::editable(url.trim_start_matches('=').trim());
        }

        let parsed = Requirement::<VerbatimUrl>::from_str(line).map_err(|e| {
            Error::InvalidRequirement {
                line: line.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut spec = Self::new(parsed.name.clone());
        spec.extras = parsed.extras.iter().cloned().collect();
        spec.marker = Marker::from_tree(parsed.marker.clone());
        match parsed.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => spec.specifiers = specifiers,
            Some(VersionOrUrl::Url(url)) => spec.source = Some(LocalSource::Url(url.to_string())),
            None => {}
        }
        Ok(spec)
    }

    /// An editable requirement for a local project or VCS URL
    ///
    /// The package name comes from an `#egg=` fragment when present, otherwise
    /// from the last path component.
    pub fn editable(url: &str) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidRequirement {
                line: "-e".to_string(),
                reason: "editable requirement without a location".to_string(),
            });
        }
        let raw_name = editable_name(url).ok_or_else(|| Error::InvalidRequirement {
            line: format!("-e {}", url),
            reason: "cannot determine the package name".to_string(),
        })?;
        let name = PackageName::new(raw_name.to_string()).map_err(|e| {
            Error::InvalidRequirement {
                line: format!("-e {}", url),
                reason: e.to_string(),
            }
        })?;
        let mut spec = Self::new(name);
        spec.source = Some(LocalSource::Editable(url.to_string()));
        Ok(spec)
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// The same requirement, restricting versions without requesting installation
    pub fn as_constraint(mut self) -> Self {
        self.constraint = true;
        self
    }

    /// The same requirement as a regular (installable) entry
    pub fn as_requirement(mut self) -> Self {
        self.constraint = false;
        self
    }

    pub fn with_specifiers(mut self, specifiers: VersionSpecifiers) -> Self {
        self.specifiers = specifiers;
        self
    }

    pub fn with_extras(mut self, extras: BTreeSet<ExtraName>) -> Self {
        self.extras = extras;
        self
    }

    pub fn with_marker(mut self, marker: Option<Marker>) -> Self {
        self.marker = marker;
        self
    }

    pub fn name(&self) -> &PackageName {
        &self.name
    }

    pub fn specifiers(&self) -> &VersionSpecifiers {
        &self.specifiers
    }

    pub fn extras(&self) -> &BTreeSet<ExtraName> {
        &self.extras
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    pub fn is_constraint(&self) -> bool {
        self.constraint
    }

    pub fn source(&self) -> Option<&LocalSource> {
        self.source.as_ref()
    }

    /// Editable or URL requirement
    pub fn is_local(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_editable(&self) -> bool {
        self.source.as_ref().is_some_and(LocalSource::is_editable)
    }

    /// Exactly one `==` version and no URL
    pub fn is_pinned(&self) -> bool {
        !self.is_local() && specifier::is_pinned(&self.specifiers)
    }

    pub fn pinned_version(&self) -> Option<&Version> {
        if self.is_local() {
            return None;
        }
        specifier::pinned_version(&self.specifiers)
    }

    /// Whether a concrete version is allowed by this requirement's specifiers
    pub fn allows(&self, version: &Version) -> bool {
        self.specifiers.contains(version)
    }

    pub fn identity(&self) -> RequirementId {
        RequirementId {
            name: self.name.clone(),
            url: self.source.as_ref().map(|s| s.url().to_string()),
        }
    }

    /// Combine two requirements for the same package
    ///
    /// Specifiers are intersected, extras united and markers OR-ed. The result
    /// is a constraint only if both inputs are. A local source wins over an
    /// index requirement, and the first origin is kept.
    pub fn merge(&self, other: &RequirementSpec) -> RequirementSpec {
        RequirementSpec {
            name: self.name.clone(),
            specifiers: specifier::intersect(&self.specifiers, &other.specifiers),
            extras: self.extras.union(&other.extras).cloned().collect(),
            marker: marker::markers_union(self.marker.as_ref(), other.marker.as_ref()),
            origin: self.origin.clone().or_else(|| other.origin.clone()),
            constraint: self.constraint && other.constraint,
            source: self.source.clone().or_else(|| other.source.clone()),
        }
    }

    /// Name with extras, e.g. `requests[security]`
    pub fn display_name(&self) -> String {
        format_name(&self.name, &self.extras)
    }
}

impl fmt::Display for RequirementSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(LocalSource::Editable(url)) => write!(f, "-e {}", url)?,
            Some(LocalSource::Url(url)) => write!(f, "{} @ {}", self.display_name(), url)?,
            None => write!(
                f,
                "{}{}",
                self.display_name(),
                format_specifiers(&self.specifiers)
            )?,
        }
        if let Some(marker) = &self.marker {
            // A URL must be separated from the marker by whitespace
            write!(f, " ; {}", marker)?;
        }
        Ok(())
    }
}

impl FromStr for RequirementSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A requirement resolved to exactly one version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinnedRequirement {
    pub name: PackageName,
    pub version: Version,
    pub extras: BTreeSet<ExtraName>,
}

impl PinnedRequirement {
    pub fn new(name: PackageName, version: Version, extras: BTreeSet<ExtraName>) -> Self {
        Self {
            name,
            version,
            extras,
        }
    }

    /// The `name[extras]==version` requirement for this pin
    pub fn to_spec(&self) -> RequirementSpec {
        let pin = VersionSpecifiers::from_str(&format!("=={}", self.version))
            .unwrap_or_else(|_| VersionSpecifiers::from_iter(Vec::new()));
        RequirementSpec::new(self.name.clone())
            .with_specifiers(pin)
            .with_extras(self.extras.clone())
    }
}

impl fmt::Display for PinnedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", format_name(&self.name, &self.extras), self.version)
    }
}

/// Identity of a selected candidate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateId {
    Pinned(PinnedRequirement),
    Local(RequirementId),
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateId::Pinned(pin) => write!(f, "{}", pin),
            CandidateId::Local(id) => write!(f, "{}", id),
        }
    }
}

/// The outcome of best-match selection
#[derive(Debug, Clone)]
pub enum Candidate {
    /// A concrete index version
    Pinned(PinnedRequirement),
    /// An editable or URL requirement, which is its own version
    Local(RequirementSpec),
}

impl Candidate {
    pub fn name(&self) -> &PackageName {
        match self {
            Candidate::Pinned(pin) => &pin.name,
            Candidate::Local(spec) => spec.name(),
        }
    }

    pub fn id(&self) -> CandidateId {
        match self {
            Candidate::Pinned(pin) => CandidateId::Pinned(pin.clone()),
            Candidate::Local(spec) => CandidateId::Local(spec.identity()),
        }
    }

    pub fn as_pinned(&self) -> Option<&PinnedRequirement> {
        match self {
            Candidate::Pinned(pin) => Some(pin),
            Candidate::Local(_) => None,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Pinned(pin) => write!(f, "{}", pin),
            Candidate::Local(spec) => write!(f, "{}", spec),
        }
    }
}

/// Render a specifier set as comma-joined clauses without spaces
pub fn format_specifiers(specifiers: &VersionSpecifiers) -> String {
    specifiers
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn format_name(name: &PackageName, extras: &BTreeSet<ExtraName>) -> String {
    if extras.is_empty() {
        name.to_string()
    } else {
        let extras: Vec<String> = extras.iter().map(|e| e.to_string()).collect();
        format!("{}[{}]", name, extras.join(","))
    }
}

fn editable_name(url: &str) -> Option<&str> {
    if let Some((_, fragment)) = url.split_once('#') {
        for part in fragment.split('&') {
            if let Some(egg) = part.strip_prefix("egg=") {
                return Some(egg.split('[').next().unwrap_or(egg));
            }
        }
    }
    let path = url.split(['#', '?']).next()?.trim_end_matches('/');
    let last = path.rsplit('/').next()?;
    let last = last.rsplit('@').last().unwrap_or(last);
    if last.ends_with(".whl") {
        return last.split('-').next();
    }
    let stem = [".tar.gz", ".zip", ".git"]
        .iter()
        .find_map(|suffix| last.strip_suffix(suffix))
        .unwrap_or(last);
    if stem.is_empty() || stem == "." || stem == ".." {
        None
    } else {
        Some(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalises_name() {
        let spec = RequirementSpec::parse("Django_Rest.Framework>=3.0").unwrap();
        assert_eq!(spec.name().as_ref(), "django-rest-framework");
        assert_eq!(spec.to_string(), "django-rest-framework>=3.0");
    }

    #[test]
    fn test_parse_extras_and_marker() {
        let spec =
            RequirementSpec::parse("requests[security,socks]>=2.0 ; python_version < '3.8'")
                .unwrap();
        assert_eq!(spec.extras().len(), 2);
        assert!(spec.marker().is_some());
        assert_eq!(spec.display_name(), "requests[security,socks]");
    }

    #[test]
    fn test_parse_invalid() {
        let err = RequirementSpec::parse("not a requirement ===").unwrap_err();
        assert!(matches!(err, Error::InvalidRequirement { .. }));
    }

    #[test]
    fn test_editable_names() {
        let spec = RequirementSpec::parse("-e git+https://host/repo.git#egg=My_Pkg").unwrap();
        assert_eq!(spec.name().as_ref(), "my-pkg");
        assert!(spec.is_editable());
        assert_eq!(spec.to_string(), "-e git+https://host/repo.git#egg=My_Pkg");

        let spec = RequirementSpec::editable("file:///src/projects/small_fake/").unwrap();
        assert_eq!(spec.name().as_ref(), "small-fake");
        assert!(!spec.is_pinned());
    }

    #[test]
    fn test_url_requirement() {
        let spec =
            RequirementSpec::parse("pkg @ https://example.com/pkg-1.0-py3-none-any.whl").unwrap();
        assert!(spec.is_local());
        assert!(!spec.is_editable());
        assert_eq!(
            spec.identity().url.as_deref(),
            Some("https://example.com/pkg-1.0-py3-none-any.whl")
        );
    }

    #[test]
    fn test_pinned() {
        let pinned = RequirementSpec::parse("flask==1.0").unwrap();
        assert!(pinned.is_pinned());
        assert_eq!(pinned.pinned_version().unwrap().to_string(), "1.0");
        assert!(!RequirementSpec::parse("flask>=1.0").unwrap().is_pinned());
    }

    #[test]
    fn test_merge() {
        let a = RequirementSpec::parse("django>=1.4.2,<1.9")
            .unwrap()
            .with_origin(Origin::File("base.in".into()))
            .as_constraint();
        let b = RequirementSpec::parse("Django[bcrypt]~=1.5").unwrap();
        let merged = a.merge(&b);
        assert_eq!(merged.specifiers().len(), 3);
        assert_eq!(merged.extras().len(), 1);
        assert!(!merged.is_constraint());
        assert_eq!(merged.origin(), Some(&Origin::File("base.in".into())));
    }

    #[test]
    fn test_merge_marker_drops_when_one_unconditional() {
        let a = RequirementSpec::parse("six ; python_version < '3'").unwrap();
        let b = RequirementSpec::parse("six").unwrap();
        assert!(a.merge(&b).marker().is_none());
    }

    #[test]
    fn test_pinned_requirement_display() {
        let pin = PinnedRequirement::new(
            PackageName::new("celery".to_string()).unwrap(),
            Version::from_str("5.3.1").unwrap(),
            [ExtraName::new("redis".to_string()).unwrap()]
                .into_iter()
                .collect(),
        );
        assert_eq!(pin.to_string(), "celery[redis]==5.3.1");
        assert!(pin.to_spec().is_pinned());
    }

    #[test]
    fn test_display_reparses() {
        let spec = RequirementSpec::parse("jinja2>=2.4,<4 ; sys_platform == 'linux'").unwrap();
        let again = RequirementSpec::parse(&spec.to_string()).unwrap();
        assert_eq!(spec.to_string(), again.to_string());
    }
}
