// src/sync/mod.rs

//! Environment synchronisation
//!
//! Brings an installed environment in line with a pinned requirement set:
//! - [`merge`] combines requirement sources into one target list
//! - [`SyncPlanner::diff`] compares targets with what is installed
//! - [`SyncExecutor`] uninstalls, then installs, through an [`Installer`]

mod executor;
mod flags;
mod installed;
mod planner;

pub use executor::{CommandInstaller, Installer, Prompt, StdinPrompt, SyncExecutor, SyncMode, SyncStatus};
pub use flags::{DEFAULT_INDEX_URL, InstallFlags, compose_install_flags};
pub use installed::{InstalledDistribution, normalize_name, scan_site_packages};
pub use planner::{InstalledKey, PACKAGES_TO_IGNORE, SyncPlan, SyncPlanner, merge};
