// src/requirement/specifier.rs

//! Version specifier set algebra
//!
//! Combining requirements means intersecting their specifier sets and asking
//! whether anything is left. The check here is conservative: it only reports
//! a set as unsatisfiable when that is certain.
//!
//! - Every exact pin (`==V`) must be contained in the whole set.
//! - The lower bounds (`>`, `>=`, `~=`) and upper bounds (`<`, `<=`, `~=`,
//!   `==V.*`) must leave a non-empty interval.

use pep440_rs::{Operator, Version, VersionSpecifier, VersionSpecifiers};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One side of a version interval
#[derive(Debug, Clone)]
struct Bound {
    version: Version,
    inclusive: bool,
}

impl Bound {
    fn new(version: Version, inclusive: bool) -> Self {
        Self { version, inclusive }
    }
}

/// Intersection of two specifier sets, dropping duplicate clauses
pub fn intersect(a: &VersionSpecifiers, b: &VersionSpecifiers) -> VersionSpecifiers {
    let mut clauses: Vec<VersionSpecifier> = a.iter().cloned().collect();
    for clause in b.iter() {
        if !clauses.contains(clause) {
            clauses.push(clause.clone());
        }
    }
    VersionSpecifiers::from_iter(clauses)
}

/// Order-independent form of a specifier set, for equality between rounds
pub fn canonical(specifiers: &VersionSpecifiers) -> BTreeSet<String> {
    specifiers.iter().map(|s| s.to_string()).collect()
}

/// True when the set is a single `==`/`===` clause without a wildcard
pub fn is_pinned(specifiers: &VersionSpecifiers) -> bool {
    pinned_version(specifiers).is_some()
}

/// The version of a pinned specifier set
pub fn pinned_version(specifiers: &VersionSpecifiers) -> Option<&Version> {
    if specifiers.len() != 1 {
        return None;
    }
    let clause = specifiers.iter().next()?;
    match clause.operator() {
        Operator::Equal | Operator::ExactEqual => Some(clause.version()),
        _ => None,
    }
}

/// True unless the set provably excludes every version
pub fn is_satisfiable(specifiers: &VersionSpecifiers) -> bool {
    let mut lower: Option<Bound> = None;
    let mut upper: Option<Bound> = None;
    let mut exact: Vec<&Version> = Vec::new();

    for clause in specifiers.iter() {
        let version = clause.version();
        match clause.operator() {
            Operator::Equal => {
                exact.push(version);
                tighten_lower(&mut lower, Bound::new(version.clone(), true));
                tighten_upper(&mut upper, Bound::new(version.clone(), true));
            }
            Operator::GreaterThan => tighten_lower(&mut lower, Bound::new(version.clone(), false)),
            Operator::GreaterThanEqual => {
                tighten_lower(&mut lower, Bound::new(version.clone(), true))
            }
            Operator::LessThan => tighten_upper(&mut upper, Bound::new(version.clone(), false)),
            Operator::LessThanEqual => {
                tighten_upper(&mut upper, Bound::new(version.clone(), true))
            }
            Operator::TildeEqual => {
                tighten_lower(&mut lower, Bound::new(version.clone(), true));
                let release = version.release();
                if release.len() >= 2 {
                    if let Some(ceiling) = bump(version, release.len() - 1) {
                        tighten_upper(&mut upper, Bound::new(ceiling, false));
                    }
                }
            }
            Operator::EqualStar => {
                if let Some(ceiling) = bump(version, version.release().len()) {
                    tighten_upper(&mut upper, Bound::new(ceiling, false));
                }
            }
            // Arbitrary equality and exclusions never narrow the interval
            _ => {}
        }
    }

    if exact.iter().any(|version| !specifiers.contains(version)) {
        return false;
    }

    match (lower, upper) {
        (Some(lower), Some(upper)) => match lower.version.cmp(&upper.version) {
            Ordering::Less => true,
            Ordering::Equal => lower.inclusive && upper.inclusive,
            Ordering::Greater => false,
        },
        _ => true,
    }
}

fn tighten_lower(current: &mut Option<Bound>, candidate: Bound) {
    let replace = match current {
        None => true,
        Some(bound) => match candidate.version.cmp(&bound.version) {
            Ordering::Greater => true,
            Ordering::Equal => bound.inclusive && !candidate.inclusive,
            Ordering::Less => false,
        },
    };
    if replace {
        *current = Some(candidate);
    }
}

fn tighten_upper(current: &mut Option<Bound>, candidate: Bound) {
    let replace = match current {
        None => true,
        Some(bound) => match candidate.version.cmp(&bound.version) {
            Ordering::Less => true,
            Ordering::Equal => bound.inclusive && !candidate.inclusive,
            Ordering::Greater => false,
        },
    };
    if replace {
        *current = Some(candidate);
    }
}

/// First release after every version sharing the first `prefix_len` segments
///
/// `bump(1.4.5, 2)` is `1.5`; `bump(1.2, 2)` is `1.3`. Versions with an epoch
/// are left alone since the result would not order against them correctly.
fn bump(version: &Version, prefix_len: usize) -> Option<Version> {
    if version.epoch() != 0 || prefix_len == 0 {
        return None;
    }
    let mut release: Vec<u64> = version.release().iter().take(prefix_len).copied().collect();
    let last = release.last_mut()?;
    *last += 1;
    Some(Version::new(release))
}
