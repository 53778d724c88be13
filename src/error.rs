// src/error.rs

//! Error types for resolution, caching and environment sync

use crate::resolver::ConflictingSpec;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the resolution and sync engine
///
/// Every variant produced by the engine itself is derived from its inputs:
/// re-running with identical inputs yields the same error.
#[derive(Error, Debug)]
pub enum Error {
    /// No version in the repository satisfies a requirement
    #[error("{}", format_no_candidate(.requirement, .tried_versions, .skipped_prereleases, .locations))]
    NoCandidateFound {
        requirement: String,
        tried_versions: Vec<String>,
        skipped_prereleases: Vec<String>,
        locations: Vec<String>,
    },

    /// Two or more requirements for one package cannot hold together
    #[error("{}", format_incompatible(.package, .conflicts))]
    IncompatibleRequirements {
        package: String,
        conflicts: Vec<ConflictingSpec>,
    },

    /// Resolution did not reach a fixed point within the round budget
    #[error(
        "No stable configuration of concrete packages could be found for the given \
         constraints after {max_rounds} rounds of resolving"
    )]
    TooManyRounds { max_rounds: usize },

    /// Hashes were requested before resolution reached a fixed point
    #[error("Hashes can only be resolved after a successful resolution")]
    NotResolved,

    /// A requirement line could not be parsed
    #[error("Invalid requirement '{line}': {reason}")]
    InvalidRequirement { line: String, reason: String },

    /// An environment marker could not be parsed
    #[error("Invalid environment marker '{marker}': {reason}")]
    InvalidMarker { marker: String, reason: String },

    /// The package index backend failed
    #[error("Repository error: {0}")]
    Repository(String),

    /// The install/uninstall collaborator failed
    #[error("Installer error: {0}")]
    Installer(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid command usage or missing input
    #[error("{0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// SQLite error from the dependency cache store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Process exit status the CLI should report for this error
    ///
    /// Validation, usage and resolution problems map to 2; failures of the
    /// index, the cache store, the installer or I/O map to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Installer(_) | Error::Io(_) | Error::Repository(_) | Error::Database(_) => 1,
            _ => 2,
        }
    }
}

fn format_no_candidate(
    requirement: &str,
    tried_versions: &[String],
    skipped_prereleases: &[String],
    locations: &[String],
) -> String {
    let mut lines = vec![format!(
        "Could not find a version that matches {}",
        requirement
    )];

    if tried_versions.is_empty() {
        lines.push("No versions found".to_string());
    } else {
        lines.push(format!("Tried: {}", tried_versions.join(", ")));
    }
    if !skipped_prereleases.is_empty() {
        lines.push(format!(
            "Skipped pre-versions: {}",
            skipped_prereleases.join(", ")
        ));
    }
    if !locations.is_empty() {
        lines.push(format!("Searched: {}", locations.join(", ")));
    }

    lines.join("\n")
}

fn format_incompatible(package: &str, conflicts: &[ConflictingSpec]) -> String {
    let mut message = format!("Incompatible requirements found for {}:", package);
    for conflict in conflicts {
        message.push_str("\n  - ");
        message.push_str(&conflict.to_string());
    }
    message
}
