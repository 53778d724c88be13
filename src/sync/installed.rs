// src/sync/installed.rs

//! Snapshot of installed distributions
//!
//! Reads `*.dist-info/METADATA` files from a site-packages directory. Only the
//! header fields needed to plan a sync are kept: name, version and the names
//! of unconditional runtime dependencies.

use crate::error::Result;
use crate::requirement::RequirementSpec;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// An installed distribution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct InstalledDistribution {
    /// Normalised project name
    pub name: String,
    pub version: String,
    /// Normalised names of declared runtime dependencies
    pub requires: Vec<String>,
}

impl InstalledDistribution {
    pub fn new(name: &str, version: &str, requires: &[&str]) -> Self {
        Self {
            name: normalize_name(name),
            version: version.to_string(),
            requires: requires.iter().map(|r| normalize_name(r)).collect(),
        }
    }

    /// Parse the header of a METADATA (or PKG-INFO) document
    pub fn from_metadata(content: &str) -> Option<Self> {
        let mut name = None;
        let mut version = None;
        let mut requires = Vec::new();

        for line in content.lines() {
            if line.trim().is_empty() {
                break;
            }
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match field.trim() {
                "Name" => name = Some(value.to_string()),
                "Version" => version = Some(value.to_string()),
                "Requires-Dist" => {
                    if let Some(dependency) = runtime_dependency(value) {
                        requires.push(dependency);
                    }
                }
                _ => {}
            }
        }

        Some(Self {
            name: normalize_name(&name?),
            version: version?,
            requires,
        })
    }
}

/// Lowercase with runs of `-`, `_` and `.` collapsed to `-`
///
/// Unlike [`crate::requirement::PackageName`] this accepts legacy names such
/// as `_markerlib` that still show up in old environments.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.push(ch.to_ascii_lowercase());
            in_separator = false;
        }
    }
    normalized
}

/// Dependency name of a `Requires-Dist` value, skipping extra-only entries
fn runtime_dependency(value: &str) -> Option<String> {
    if let Some((_, marker)) = value.split_once(';') {
        if marker.contains("extra") {
            return None;
        }
    }
    match RequirementSpec::parse(value) {
        Ok(spec) => Some(spec.name().to_string()),
        Err(_) => {
            let name: String = value
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
                .collect();
            (!name.is_empty()).then(|| normalize_name(&name))
        }
    }
}

/// Every distribution with a readable `*.dist-info/METADATA` in `site_packages`
pub fn scan_site_packages(site_packages: &Path) -> Result<Vec<InstalledDistribution>> {
    let mut distributions = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(site_packages)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "dist-info"))
        .collect();
    entries.sort();

    for dist_info in entries {
        let metadata = dist_info.join("METADATA");
        let content = match fs::read_to_string(&metadata) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {}: {}", dist_info.display(), e);
                continue;
            }
        };
        match InstalledDistribution::from_metadata(&content) {
            Some(distribution) => distributions.push(distribution),
            None => warn!("Skipping {}: missing Name or Version", metadata.display()),
        }
    }

    debug!(
        "Found {} installed distributions in {}",
        distributions.len(),
        site_packages.display()
    );
    Ok(distributions)
}
