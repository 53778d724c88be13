// src/requirement/marker.rs

//! Environment markers attached to requirements
//!
//! A [`Marker`] keeps the parsed PEP 508 marker tree next to the text it was
//! written as. The tree answers the algebraic questions the resolver and the
//! sync planner need (disjointness, evaluation); the text is what ends up in
//! pinned output and diagnostics.

use crate::error::{Error, Result};
use pep508_rs::{MarkerEnvironment, MarkerTree};
use std::fmt;
use std::str::FromStr;

/// A parsed environment marker
#[derive(Debug, Clone)]
pub struct Marker {
    tree: MarkerTree,
    text: String,
}

impl Marker {
    /// Parse a marker expression such as `python_version < "3.8"`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let tree = MarkerTree::from_str(text).map_err(|e| Error::InvalidMarker {
            marker: text.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            tree,
            text: text.to_string(),
        })
    }

    /// Wrap a marker tree coming out of a parsed requirement
    ///
    /// Returns `None` for the always-true marker.
    pub(crate) fn from_tree(tree: MarkerTree) -> Option<Self> {
        if tree.is_true() {
            return None;
        }
        let text = tree.try_to_string()?;
        Some(Self { tree, text })
    }

    /// The marker as written
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The underlying marker tree
    pub fn tree(&self) -> &MarkerTree {
        &self.tree
    }

    /// True when no environment can satisfy both markers at once
    pub fn is_disjoint(&self, other: &Marker) -> bool {
        let mut both = self.tree.clone();
        both.and(other.tree.clone());
        both.is_false()
    }

    /// Disjunction of two markers
    pub fn or(&self, other: &Marker) -> Marker {
        if self.text == other.text {
            return self.clone();
        }
        let mut tree = self.tree.clone();
        tree.or(other.tree.clone());
        Marker {
            tree,
            text: format!("({}) or ({})", self.text, other.text),
        }
    }

    /// Evaluate the marker against a concrete target environment
    pub fn evaluate(&self, environment: &MarkerEnvironment) -> bool {
        self.tree.evaluate(environment, &[])
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Disjointness of two optional markers; a missing marker always applies
pub fn markers_disjoint(a: Option<&Marker>, b: Option<&Marker>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_disjoint(b),
        _ => false,
    }
}

/// Disjunction of two optional markers; a missing marker always applies
pub fn markers_union(a: Option<&Marker>, b: Option<&Marker>) -> Option<Marker> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.or(b)),
        _ => None,
    }
}
