// src/cache/mod.rs

//! Persistent dependency cache
//!
//! Maps a fully resolved package identity (name, exact version, extras) to the
//! dependency requirement strings it declared the last time it was inspected.
//! A cached entry saves the resolver a round trip to the repository, which may
//! mean downloading and building an artifact.
//!
//! The store is a single SQLite database, `depcache.db`, in an explicitly
//! configured directory. It runs in WAL mode with a busy timeout so several
//! resolver processes can share it. The cache is an accelerator only: every
//! storage failure is logged and reported as a miss, and a database that
//! cannot be opened is moved aside and recreated.

pub mod schema;

use crate::requirement::{ExtraName, PackageName, PinnedRequirement, RequirementSpec, Version};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// File name of the cache database inside the cache directory
pub const CACHE_FILE: &str = "depcache.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Normalised cache key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    name: String,
    version: String,
    extras: String,
}

impl CacheKey {
    pub fn new(name: &PackageName, version: &Version, extras: &BTreeSet<ExtraName>) -> Self {
        let extras: Vec<String> = extras.iter().map(|e| e.to_string()).collect();
        Self {
            name: name.to_string(),
            version: version.to_string(),
            extras: extras.join(","),
        }
    }
}

impl From<&PinnedRequirement> for CacheKey {
    fn from(pin: &PinnedRequirement) -> Self {
        Self::new(&pin.name, &pin.version, &pin.extras)
    }
}

/// Dependency cache backed by SQLite
pub struct DependencyCache {
    /// `None` once every way of opening a store has failed; all lookups miss
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DependencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCache")
            .field("path", &self.path)
            .field("available", &self.conn.is_some())
            .finish()
    }
}

impl DependencyCache {
    /// Open (or create) the cache in `cache_dir`
    ///
    /// Never fails. A corrupt or unreadable database is quarantined and a fresh
    /// one created; if that fails as well, an in-memory store is used.
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(CACHE_FILE);

        if let Err(e) = fs::create_dir_all(cache_dir) {
            warn!(
                "Cannot create cache directory {}: {}; using an in-memory dependency cache",
                cache_dir.display(),
                e
            );
            return Self::in_memory();
        }

        match connect(&path) {
            Ok(conn) => {
                debug!("Using dependency cache at {}", path.display());
                return Self {
                    conn: Some(conn),
                    path: Some(path),
                };
            }
            Err(e) => warn!("Dependency cache {} is unusable: {}", path.display(), e),
        }

        let quarantine = path.with_extension("db.corrupt");
        match fs::rename(&path, &quarantine) {
            Ok(()) => warn!("Moved unusable dependency cache to {}", quarantine.display()),
            Err(e) => warn!("Cannot move unusable dependency cache aside: {}", e),
        }
        for suffix in ["db-wal", "db-shm"] {
            let sidecar = path.with_extension(suffix);
            if let Err(e) = fs::remove_file(&sidecar) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("Cannot remove {}: {}", sidecar.display(), e);
                }
            }
        }

        match connect(&path) {
            Ok(conn) => Self {
                conn: Some(conn),
                path: Some(path),
            },
            Err(e) => {
                warn!(
                    "Cannot recreate dependency cache {}: {}; using an in-memory cache",
                    path.display(),
                    e
                );
                Self::in_memory()
            }
        }
    }

    /// A cache that lives only as long as this value
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory()
            .map_err(crate::error::Error::from)
            .and_then(|conn| {
                schema::migrate(&conn)?;
                Ok(conn)
            });
        match conn {
            Ok(conn) => Self {
                conn: Some(conn),
                path: None,
            },
            Err(e) => {
                warn!("In-memory dependency cache unavailable: {}; caching disabled", e);
                Self {
                    conn: None,
                    path: None,
                }
            }
        }
    }

    /// Location of the database file, if on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cached dependency strings for a package, or `None` on a miss
    pub fn read(&self, key: &CacheKey) -> Option<Vec<String>> {
        let conn = self.conn.as_ref()?;
        let payload: Option<String> = match conn
            .query_row(
                "SELECT requirements FROM dependencies
                 WHERE name = ?1 AND version = ?2 AND extras = ?3",
                params![key.name, key.version, key.extras],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dependency cache read failed for {}=={}: {}", key.name, key.version, e);
                return None;
            }
        };

        match serde_json::from_str::<Vec<String>>(&payload?) {
            Ok(requirements) => Some(requirements),
            Err(e) => {
                warn!(
                    "Ignoring undecodable dependency cache entry for {}=={}: {}",
                    key.name, key.version, e
                );
                None
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.read(key).is_some()
    }

    /// Store dependency strings; the latest write for a key wins
    pub fn write(&self, key: &CacheKey, requirements: &[String]) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        let payload = match serde_json::to_string(requirements) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Cannot encode dependency cache entry for {}: {}", key.name, e);
                return;
            }
        };
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO dependencies (name, version, extras, requirements)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.name, key.version, key.extras, payload],
        ) {
            warn!("Dependency cache write failed for {}=={}: {}", key.name, key.version, e);
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        match conn.execute("DELETE FROM dependencies", []) {
            Ok(removed) => debug!("Cleared {} dependency cache entries", removed),
            Err(e) => warn!("Failed to clear dependency cache: {}", e),
        }
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        let Some(conn) = self.conn.as_ref() else {
            return 0;
        };
        conn.query_row("SELECT COUNT(*) FROM dependencies", [], |row| {
            row.get::<_, i64>(0)
        })
        .map(|count| usize::try_from(count).unwrap_or(0))
        .unwrap_or_else(|e| {
            warn!("Failed to count dependency cache entries: {}", e);
            0
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which of the given pins require each package, per cached entries
    ///
    /// The result maps a dependency name to the names of the pins that
    /// declare it. Pins without a cache entry contribute nothing.
    pub fn reverse_dependencies<'a>(
        &self,
        pins: impl IntoIterator<Item = &'a PinnedRequirement>,
    ) -> BTreeMap<PackageName, BTreeSet<PackageName>> {
        let mut reverse: BTreeMap<PackageName, BTreeSet<PackageName>> = BTreeMap::new();
        for pin in pins {
            let Some(requirements) = self.read(&CacheKey::from(pin)) else {
                continue;
            };
            for line in requirements {
                match RequirementSpec::parse(&line) {
                    Ok(dependency) => {
                        reverse
                            .entry(dependency.name().clone())
                            .or_default()
                            .insert(pin.name.clone());
                    }
                    Err(e) => warn!("Ignoring cached requirement '{}': {}", line, e),
                }
            }
        }
        reverse
    }
}

fn connect(path: &Path) -> crate::error::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        debug!("Dependency cache journal mode is {}", mode);
    }
    schema::migrate(&conn)?;
    Ok(conn)
}
