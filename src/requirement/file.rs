// src/requirement/file.rs

//! Requirements file reader
//!
//! Understands the subset of the pip requirements format that input and
//! pinned files use:
//!
//! - one requirement per line, `#` comments, `\` line continuations
//! - `-e`/`--editable` lines
//! - `-r` includes and `-c` constraint files (resolved relative to the file)
//! - `--hash=algo:hex` options trailing a requirement
//! - index options: `-i`, `--extra-index-url`, `--trusted-host`, `-f`,
//!   `--no-index`, `--no-binary`, `--only-binary`

use super::{Origin, PackageName, PinnedRequirement, RequirementSpec};
use crate::error::{Error, Result};
use crate::repository::{ExistingPin, InstallOptions};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The parsed content of one requirements file and everything it includes
#[derive(Debug, Clone, Default)]
pub struct RequirementsFile {
    pub requirements: Vec<RequirementSpec>,
    /// `--hash` options by package
    pub hashes: BTreeMap<PackageName, BTreeSet<String>>,
    pub options: InstallOptions,
}

impl RequirementsFile {
    /// Read a file from disk, following `-r` and `-c` references
    pub fn read(path: &Path) -> Result<Self> {
        let mut file = Self::default();
        let mut visited = HashSet::new();
        file.read_into(path, false, &mut visited)?;
        Ok(file)
    }

    /// Parse file content; references resolve relative to `base_dir`
    pub fn parse(content: &str, origin: &str, base_dir: &Path) -> Result<Self> {
        let mut file = Self::default();
        let mut visited = HashSet::new();
        file.parse_into(content, origin, base_dir, false, &mut visited)?;
        Ok(file)
    }

    /// Pinned entries as prior pins, with their hashes
    pub fn pins(&self) -> Vec<ExistingPin> {
        self.requirements
            .iter()
            .filter(|spec| !spec.is_constraint())
            .filter_map(|spec| {
                let version = spec.pinned_version()?.clone();
                let pin = PinnedRequirement::new(spec.name().clone(), version, spec.extras().clone());
                let hashes = self.hashes.get(spec.name()).cloned().unwrap_or_default();
                Some(ExistingPin::new(pin, hashes))
            })
            .collect()
    }

    fn read_into(
        &mut self,
        path: &Path,
        constraint: bool,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !visited.insert(canonical) {
            debug!("Skipping already included file {}", path.display());
            return Ok(());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Usage(format!("Cannot read requirements file {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let origin = path.display().to_string();
        self.parse_into(&content, &origin, base_dir, constraint, visited)
    }

    fn parse_into(
        &mut self,
        content: &str,
        origin: &str,
        base_dir: &Path,
        constraint: bool,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        for line in logical_lines(content) {
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else { continue };

            if let Some((flag, value)) = option_with_value(first, &mut tokens) {
                match flag {
                    "-r" | "--requirement" => {
                        self.read_into(&base_dir.join(&value), constraint, visited)?
                    }
                    "-c" | "--constraint" => self.read_into(&base_dir.join(&value), true, visited)?,
                    "-e" | "--editable" => {
                        let spec = RequirementSpec::editable(&value)?
                            .with_origin(Origin::File(origin.to_string()));
                        self.push(spec, constraint);
                    }
                    "-i" | "--index-url" => self.options.index_url = Some(value),
                    "--extra-index-url" => self.options.extra_index_urls.push(value),
                    "--trusted-host" => self.options.trusted_hosts.push(value),
                    "-f" | "--find-links" => self.options.find_links.push(value),
                    "--no-binary" => self.options.no_binary.extend(split_packages(&value)),
                    "--only-binary" => self.options.only_binary.extend(split_packages(&value)),
                    _ => unreachable_flag(flag)?,
                }
                continue;
            }
            if first == "--no-index" {
                self.options.no_index = true;
                continue;
            }
            if first.starts_with('-') {
                return Err(Error::InvalidRequirement {
                    line: line.clone(),
                    reason: format!("unsupported option {}", first),
                });
            }

            let (requirement, hashes) = split_hashes(&line)?;
            let spec =
                RequirementSpec::parse(&requirement)?.with_origin(Origin::File(origin.to_string()));
            if !hashes.is_empty() {
                self.hashes
                    .entry(spec.name().clone())
                    .or_default()
                    .extend(hashes);
            }
            self.push(spec, constraint);
        }
        Ok(())
    }

    fn push(&mut self, spec: RequirementSpec, constraint: bool) {
        let spec = if constraint { spec.as_constraint() } else { spec };
        self.requirements.push(spec);
    }
}

const VALUE_FLAGS: &[&str] = &[
    "-r",
    "--requirement",
    "-c",
    "--constraint",
    "-e",
    "--editable",
    "-i",
    "--index-url",
    "--extra-index-url",
    "--trusted-host",
    "-f",
    "--find-links",
    "--no-binary",
    "--only-binary",
];

/// Recognise `--flag value`, `--flag=value` and `-rvalue`
fn option_with_value<'a>(
    first: &'a str,
    rest: &mut impl Iterator<Item = &'a str>,
) -> Option<(&'static str, String)> {
    for &flag in VALUE_FLAGS {
        if first == flag {
            let value = rest.collect::<Vec<_>>().join(" ");
            return Some((flag, value));
        }
        let Some(value) = first.strip_prefix(flag) else {
            continue;
        };
        let value = if flag.starts_with("--") {
            match value.strip_prefix('=') {
                Some(value) => value,
                None => continue,
            }
        } else {
            value.trim_start_matches('=')
        };
        if value.is_empty() {
            continue;
        }
        let mut joined = vec![value];
        joined.extend(rest);
        return Some((flag, joined.join(" ")));
    }
    None
}

fn unreachable_flag(flag: &str) -> Result<()> {
    Err(Error::Usage(format!("Unhandled requirements file option {}", flag)))
}

fn split_packages(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Separate trailing `--hash` options from the requirement text
fn split_hashes(line: &str) -> Result<(String, Vec<String>)> {
    let mut requirement = Vec::new();
    let mut hashes = Vec::new();
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "--hash" {
            let value = tokens.next().ok_or_else(|| Error::InvalidRequirement {
                line: line.to_string(),
                reason: "--hash without a value".to_string(),
            })?;
            hashes.push(value.to_string());
        } else if let Some(value) = token.strip_prefix("--hash=") {
            hashes.push(value.to_string());
        } else {
            requirement.push(token);
        }
    }
    Ok((requirement.join(" "), hashes))
}

/// Join continuation lines and strip comments and blank lines
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for raw in content.lines() {
        let without_comment = strip_comment(raw);
        if let Some(continued) = without_comment.trim_end().strip_suffix('\\') {
            current.push_str(continued);
            current.push(' ');
            continue;
        }
        current.push_str(without_comment);
        let line = current.trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
        current.clear();
    }
    let tail = current.trim();
    if !tail.is_empty() {
        lines.push(tail.to_string());
    }
    lines
}

/// A `#` starts a comment at the beginning of a line or after whitespace
fn strip_comment(line: &str) -> &str {
    let mut previous_is_space = true;
    for (index, ch) in line.char_indices() {
        if ch == '#' && previous_is_space {
            return &line[..index];
        }
        previous_is_space = ch.is_whitespace();
    }
    line
}
