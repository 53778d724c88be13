// src/cli.rs
//! CLI definitions for reqpin
//!
//! Only clap types live here so `build.rs` can render the man page from the
//! same definitions. The command implementations are in `commands`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reqpin")]
#[command(version)]
#[command(about = "Compile loose requirements into pinned ones and sync environments to them", long_about = None)]
pub struct Cli {
    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./reqpin.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve requirement files into a pinned requirements file
    Compile(CompileArgs),
    /// Make the installed environment match pinned requirement files
    Sync(SyncArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct CompileArgs {
    /// Input files (default: requirements.in)
    #[arg(value_name = "SRC_FILES")]
    pub src_files: Vec<PathBuf>,

    /// Output file (default: requirements.txt, or <src>.txt for a single input)
    #[arg(short, long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Ignore all prior pins and pick the newest matching versions
    #[arg(short = 'U', long)]
    pub upgrade: bool,

    /// Upgrade only this package; may be repeated
    #[arg(short = 'P', long = "upgrade-package", value_name = "PKG")]
    pub upgrade_packages: Vec<String>,

    /// Allow prereleases
    #[arg(long)]
    pub pre: bool,

    /// Pin packages considered unsafe in a requirements file
    #[arg(long)]
    pub allow_unsafe: bool,

    /// Add --hash options for every pin
    #[arg(long)]
    pub generate_hashes: bool,

    /// Ask the repository for hashes even for reused pins
    #[arg(long)]
    pub no_reuse_hashes: bool,

    /// Clear the dependency cache before resolving
    #[arg(long)]
    pub rebuild: bool,

    /// Give up after this many resolution rounds
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<usize>,

    /// JSON index document to resolve against
    #[arg(long, value_name = "PATH")]
    pub index: Option<PathBuf>,

    /// Dependency cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Leave out `# via` comments
    #[arg(long)]
    pub no_annotate: bool,

    /// Print the result instead of writing the output file
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Pinned requirement files (default: requirements.txt)
    #[arg(value_name = "SRC_FILES")]
    pub src_files: Vec<PathBuf>,

    /// Only show what would happen
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Show what would happen, then ask whether to continue
    #[arg(short, long, conflicts_with = "dry_run")]
    pub ask: bool,

    /// Proceed even when inputs look wrong (e.g. `.in` files)
    #[arg(long)]
    pub force: bool,

    /// Directory to scan for installed distributions
    #[arg(long, value_name = "DIR")]
    pub site_packages: Option<PathBuf>,

    /// Python interpreter used to run pip
    #[arg(long, value_name = "EXE", default_value = "python")]
    pub python: PathBuf,

    /// Base package index URL
    #[arg(short, long, value_name = "URL")]
    pub index_url: Option<String>,

    /// Extra package index URL; may be repeated
    #[arg(long = "extra-index-url", value_name = "URL")]
    pub extra_index_urls: Vec<String>,

    /// Host to trust without HTTPS; may be repeated
    #[arg(long = "trusted-host", value_name = "HOST")]
    pub trusted_hosts: Vec<String>,

    /// Directory or URL to look for packages in; may be repeated
    #[arg(short = 'f', long = "find-links", value_name = "LINK")]
    pub find_links: Vec<String>,

    /// Ignore package indexes
    #[arg(long)]
    pub no_index: bool,

    /// Install into the user site
    #[arg(long)]
    pub user: bool,

    /// CA bundle for the index
    #[arg(long, value_name = "PATH")]
    pub cert: Option<String>,

    /// Client certificate for the index
    #[arg(long, value_name = "PATH")]
    pub client_cert: Option<String>,

    /// Extra arguments passed to pip install
    #[arg(long, value_name = "ARGS", allow_hyphen_values = true)]
    pub pip_args: Option<String>,
}
