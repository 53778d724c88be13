// src/hash.rs

//! Artifact hashes
//!
//! Hashes travel through the system as `algorithm:hexdigest` strings, the
//! form used by `--hash` options in requirement files. This module computes
//! digests of local artifact files and tells which algorithm a recorded hash
//! string uses.
//!
//! | Algorithm | Digest length | Notes |
//! |-----------|---------------|-------|
//! | SHA-256   | 32 bytes      | Preferred; the only one reused from prior pins |
//! | SHA-384   | 48 bytes      | Recognised in recorded hashes |
//! | SHA-512   | 64 bytes      | Recognised in recorded hashes |

use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

/// Algorithm used when computing hashes and when reusing prior ones
pub const FAVORITE_HASH: HashAlgorithm = HashAlgorithm::Sha256;

impl HashAlgorithm {
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Look up an algorithm by the name pip writes before the digest
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "sha256" | "sha-256" => Some(Self::Sha256),
            "sha384" | "sha-384" => Some(Self::Sha384),
            "sha512" | "sha-512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A digest together with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactHash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub value: String,
}

impl fmt::Display for ArtifactHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha384 => Self::Sha384(Sha384::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha384(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    fn finalize(self, algorithm: HashAlgorithm) -> ArtifactHash {
        let value = match self {
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
            Self::Sha384(hasher) => hex::encode(hasher.finalize()),
            Self::Sha512(hasher) => hex::encode(hasher.finalize()),
        };
        ArtifactHash { algorithm, value }
    }
}

/// Hash a file on disk, streaming its content
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<ArtifactHash> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize(algorithm))
}

/// Hash of an in-memory buffer
#[cfg(test)]
pub(crate) fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> ArtifactHash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize(algorithm)
}

/// Whether an `algorithm:hexdigest` string uses the given algorithm
pub fn has_algorithm(hash: &str, algorithm: HashAlgorithm) -> bool {
    hash.split_once(':')
        .and_then(|(name, _)| HashAlgorithm::from_name(name))
        == Some(algorithm)
}
