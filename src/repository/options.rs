// src/repository/options.rs

//! Package index options shared by repositories, requirement files and the installer

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Index and artifact-format settings
///
/// These are read from requirement files, configuration and the command line,
/// and handed to the installer so that syncing uses the same sources the
/// resolution did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallOptions {
    /// Primary index URL; `None` means the default index
    pub index_url: Option<String>,
    pub extra_index_urls: Vec<String>,
    pub trusted_hosts: Vec<String>,
    /// Local directories or URLs to search for artifacts
    pub find_links: Vec<String>,
    pub no_index: bool,
    /// Packages (or `:all:`) that must be built from source
    pub no_binary: BTreeSet<String>,
    /// Packages (or `:all:`) that must be installed from wheels
    pub only_binary: BTreeSet<String>,
}

impl InstallOptions {
    /// Fold `other` into `self`; scalar settings from `other` win, lists are
    /// extended without duplicates
    pub fn extend(&mut self, other: &InstallOptions) {
        if other.index_url.is_some() {
            self.index_url = other.index_url.clone();
        }
        self.no_index |= other.no_index;
        push_unique(&mut self.extra_index_urls, &other.extra_index_urls);
        push_unique(&mut self.trusted_hosts, &other.trusted_hosts);
        push_unique(&mut self.find_links, &other.find_links);
        self.no_binary.extend(other.no_binary.iter().cloned());
        self.only_binary.extend(other.only_binary.iter().cloned());
    }

    /// Whether any wheel restriction is in effect
    pub fn restricts_formats(&self) -> bool {
        !self.no_binary.is_empty() || !self.only_binary.is_empty()
    }
}

fn push_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
