// src/resolver/provenance.rs

//! Record of why each package is part of a resolution

use crate::requirement::{Origin, PackageName};
use std::collections::{BTreeMap, BTreeSet};

/// Origins that introduced each package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    entries: BTreeMap<PackageName, BTreeSet<Origin>>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &PackageName, origin: Option<&Origin>) {
        let origins = self.entries.entry(name.clone()).or_default();
        if let Some(origin) = origin {
            origins.insert(origin.clone());
        }
    }

    pub fn origins(&self, name: &PackageName) -> Option<&BTreeSet<Origin>> {
        self.entries.get(name)
    }

    /// Human readable `# via` entries: parent packages, then files
    pub fn via(&self, name: &PackageName) -> Vec<String> {
        let Some(origins) = self.entries.get(name) else {
            return Vec::new();
        };
        let mut packages = Vec::new();
        let mut others = Vec::new();
        for origin in origins {
            match origin {
                Origin::Package(parent) => packages.push(parent.clone()),
                Origin::Direct => {}
                other => others.push(other.to_string()),
            }
        }
        packages.extend(others);
        packages
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
