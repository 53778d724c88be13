// src/resolver/conflict.rs

//! Conflict reporting for dependency resolution

use crate::requirement::RequirementSpec;
use std::fmt;

/// One of the requirements taking part in an unsatisfiable combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictingSpec {
    /// The requirement as written, e.g. `django<1.0`
    pub requirement: String,
    /// Where it came from, e.g. `-r base.in` or a parent package
    pub origin: Option<String>,
}

impl ConflictingSpec {
    pub fn new(requirement: impl Into<String>, origin: Option<String>) -> Self {
        Self {
            requirement: requirement.into(),
            origin,
        }
    }

    pub fn from_spec(spec: &RequirementSpec) -> Self {
        Self::new(spec.to_string(), spec.origin().map(|o| o.to_string()))
    }
}

impl fmt::Display for ConflictingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(f, "{} (from {})", self.requirement, origin),
            None => write!(f, "{}", self.requirement),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::Origin;

    #[test]
    fn test_from_spec_keeps_origin() {
        let spec = RequirementSpec::parse("django<1.0")
            .unwrap()
            .with_origin(Origin::Package("legacy-app".into()));
        let conflict = ConflictingSpec::from_spec(&spec);
        assert_eq!(conflict.to_string(), "django<1.0 (from legacy-app)");
    }

    #[test]
    fn test_display_without_origin() {
        assert_eq!(ConflictingSpec::new("six==1.0", None).to_string(), "six==1.0");
    }
}
