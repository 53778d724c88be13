// src/lib.rs

//! reqpin
//!
//! Compiles loosely versioned Python requirements into a fully pinned,
//! reproducible set, and reconciles installed environments against it.
//!
//! # Architecture
//!
//! - Fixed-point resolver: rounds of combine, select and expand until the
//!   discovered dependencies stop changing
//! - Repository trait: the index is an explicit capability, decorated by a
//!   pinning proxy that reuses prior pins
//! - Dependency cache: SQLite store of dependency lists per exact version
//! - Sync: merge requirement sources, diff against installed distributions,
//!   uninstall then install

pub mod cache;
pub mod config;
mod error;
pub mod hash;
pub mod output;
pub mod repository;
pub mod requirement;
pub mod resolver;
pub mod sync;

pub use error::{Error, Result};
pub use hash::{ArtifactHash, HashAlgorithm};
pub use repository::{LocalIndexRepository, LocalPinningProxy, Repository};
pub use requirement::{Candidate, PinnedRequirement, RequirementSpec};
pub use resolver::{Resolution, Resolver, ResolverOptions};
pub use sync::{SyncExecutor, SyncPlan, SyncPlanner};
