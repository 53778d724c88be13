// src/output.rs

//! Pinned requirements file writer
//!
//! Renders a [`Resolution`] as a requirements file that the reader in
//! [`crate::requirement::file`] can load again, so the output of one compile
//! seeds the prior pins of the next. Files are written to a temporary file
//! next to the target and renamed into place, so a failed run never leaves a
//! partial output behind.

use crate::error::Result;
use crate::repository::InstallOptions;
use crate::requirement::{Candidate, PinnedRequirement};
use crate::resolver::Resolution;
use crate::sync::DEFAULT_INDEX_URL;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

pub const UNSAFE_HEADER: &str =
    "# The following packages are considered to be unsafe in a requirements file:";

/// Hashes for each pinned entry
pub type Hashes = BTreeMap<PinnedRequirement, BTreeSet<String>>;

/// Serialises resolutions into requirements files
#[derive(Debug, Clone)]
pub struct OutputWriter {
    header: bool,
    annotate: bool,
    allow_unsafe: bool,
    /// Command line shown in the header
    command: Option<String>,
    options: InstallOptions,
}

impl Default for OutputWriter {
    fn default() -> Self {
        Self {
            header: true,
            annotate: true,
            allow_unsafe: false,
            command: None,
            options: InstallOptions::default(),
        }
    }
}

impl OutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Add `# via` comments
    pub fn with_annotations(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Write unsafe packages as regular pins instead of comments
    pub fn with_allow_unsafe(mut self, allow_unsafe: bool) -> Self {
        self.allow_unsafe = allow_unsafe;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Index options to record at the top of the file
    pub fn with_options(mut self, options: InstallOptions) -> Self {
        self.options = options;
        self
    }

    /// The full file content
    pub fn render(&self, resolution: &Resolution, hashes: &Hashes) -> String {
        let mut out = String::new();

        if self.header {
            out.push_str("#\n# This file is autogenerated by reqpin\n");
            if let Some(command) = &self.command {
                out.push_str("# To update, run:\n#\n");
                let _ = writeln!(out, "#    {}", command);
            }
            out.push_str("#\n");
        }

        let option_lines = self.option_lines();
        for line in &option_lines {
            let _ = writeln!(out, "{}", line);
        }
        if !option_lines.is_empty() {
            out.push('\n');
        }

        let (unsafe_entries, safe_entries): (Vec<&Candidate>, Vec<&Candidate>) = resolution
            .requirements
            .iter()
            .partition(|candidate| resolution.is_unsafe(candidate));

        for candidate in safe_entries {
            self.render_entry(&mut out, resolution, candidate, hashes);
        }

        let unsafe_entries: Vec<&Candidate> = if self.allow_unsafe {
            unsafe_entries
        } else {
            resolution.unsafe_requirements.iter().collect()
        };
        if !unsafe_entries.is_empty() {
            let _ = writeln!(out, "\n{}", UNSAFE_HEADER);
            for candidate in unsafe_entries {
                if self.allow_unsafe {
                    self.render_entry(&mut out, resolution, candidate, hashes);
                } else {
                    let _ = writeln!(out, "# {}", candidate.name());
                }
            }
        }

        out
    }

    /// Render and atomically replace `path`
    pub fn write(&self, path: &Path, resolution: &Resolution, hashes: &Hashes) -> Result<()> {
        let content = self.render(resolution, hashes);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        file.persist(path).map_err(|e| e.error)?;

        debug!("Wrote {} entries to {}", resolution.requirements.len(), path.display());
        Ok(())
    }

    fn option_lines(&self) -> Vec<String> {
        let options = &self.options;
        let mut lines = Vec::new();
        if options.no_index {
            lines.push("--no-index".to_string());
        }
        if let Some(url) = options.index_url.as_deref().filter(|url| *url != DEFAULT_INDEX_URL) {
            lines.push(format!("--index-url {}", url));
        }
        lines.extend(options.extra_index_urls.iter().map(|u| format!("--extra-index-url {}", u)));
        lines.extend(options.trusted_hosts.iter().map(|h| format!("--trusted-host {}", h)));
        lines.extend(options.find_links.iter().map(|l| format!("--find-links {}", l)));
        if !options.no_binary.is_empty() {
            lines.push(format!("--no-binary {}", join(&options.no_binary)));
        }
        if !options.only_binary.is_empty() {
            lines.push(format!("--only-binary {}", join(&options.only_binary)));
        }
        lines
    }

    fn render_entry(&self, out: &mut String, resolution: &Resolution, candidate: &Candidate, hashes: &Hashes) {
        let mut line = match candidate {
            Candidate::Pinned(pin) => pin.to_string(),
            Candidate::Local(spec) => spec.clone().with_marker(None).to_string(),
        };
        if let Some(marker) = resolution.marker(candidate) {
            let _ = write!(line, " ; {}", marker);
        }

        let entry_hashes = candidate
            .as_pinned()
            .and_then(|pin| hashes.get(pin))
            .filter(|h| !h.is_empty());
        match entry_hashes {
            Some(entry_hashes) => {
                let _ = write!(out, "{} \\", line);
                let count = entry_hashes.len();
                for (index, hash) in entry_hashes.iter().enumerate() {
                    let continuation = if index + 1 < count { " \\" } else { "" };
                    let _ = write!(out, "\n    --hash={}{}", hash, continuation);
                }
                out.push('\n');
            }
            None => {
                let _ = writeln!(out, "{}", line);
            }
        }

        if self.annotate {
            match resolution.provenance.via(candidate.name()).as_slice() {
                [] => {}
                [single] => {
                    let _ = writeln!(out, "    # via {}", single);
                }
                several => {
                    out.push_str("    # via\n");
                    for source in several {
                        let _ = writeln!(out, "    #   {}", source);
                    }
                }
            }
        }
    }
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}
