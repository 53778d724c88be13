// src/commands/sync.rs

//! `reqpin sync`: make the environment match pinned requirement files

use crate::cli::SyncArgs;
use anyhow::Result;
use reqpin::config::Config;
use reqpin::requirement::file::RequirementsFile;
use reqpin::sync::{
    CommandInstaller, InstallFlags, StdinPrompt, SyncExecutor, SyncMode, SyncPlanner,
    compose_install_flags, merge, scan_site_packages,
};
use reqpin::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

pub const DEFAULT_SYNC_FILE: &str = "requirements.txt";

/// Sync the environment; returns the process exit code
pub fn cmd_sync(args: &SyncArgs, config: &Config) -> Result<i32> {
    let src_files = source_files(&args.src_files)?;

    if src_files
        .iter()
        .any(|src| src.extension().is_some_and(|ext| ext == "in"))
    {
        let message = "Some input files have the .in extension, which is most likely an error \
                       and can cause weird behaviour. You probably meant to use the \
                       corresponding *.txt file?";
        if args.force {
            warn!("{}", message);
        } else {
            return Err(Error::Usage(message.to_string()).into());
        }
    }

    let mut requirements = Vec::new();
    let mut options = config.install.clone();
    let mut hashes = BTreeMap::new();
    for src in &src_files {
        let file = RequirementsFile::read(src)?;
        options.extend(&file.options);
        for (name, found) in file.hashes {
            hashes.entry(name).or_insert_with(BTreeSet::new).extend(found);
        }
        requirements.extend(file.requirements.into_iter().filter(|spec| !spec.is_constraint()));
    }
    let targets = merge(requirements, args.force)?;

    let mut installer = CommandInstaller::new(&args.python);
    let site_packages = match &args.site_packages {
        Some(dir) => dir.clone(),
        None => installer.site_packages()?,
    };
    info!("Scanning {}", site_packages.display());
    let installed = scan_site_packages(&site_packages)?;

    let mut planner = SyncPlanner::new();
    if let Some(environment) = config.marker_environment()? {
        planner = planner.with_environment(environment);
    }
    let plan = planner.diff(&targets, &installed);

    let flags = compose_install_flags(&options, &install_flags(args))?;
    let mode = if args.dry_run {
        SyncMode::DryRun
    } else if args.ask {
        SyncMode::Ask
    } else {
        SyncMode::Apply
    };

    let status = SyncExecutor::new(flags).with_hashes(hashes).execute(
        &plan,
        mode,
        &mut installer,
        &mut StdinPrompt,
        &mut io::stdout(),
    )?;
    Ok(status.exit_code())
}

fn source_files(given: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !given.is_empty() {
        return Ok(given.to_vec());
    }
    let default = PathBuf::from(DEFAULT_SYNC_FILE);
    if default.exists() {
        Ok(vec![default])
    } else {
        Err(Error::Usage(format!(
            "No requirement files given and no {} found in the current directory",
            DEFAULT_SYNC_FILE
        ))
        .into())
    }
}

fn install_flags(args: &SyncArgs) -> InstallFlags {
    InstallFlags {
        no_index: args.no_index,
        index_url: args.index_url.clone(),
        extra_index_urls: args.extra_index_urls.clone(),
        trusted_hosts: args.trusted_hosts.clone(),
        find_links: args.find_links.clone(),
        user: args.user,
        cert: args.cert.clone(),
        client_cert: args.client_cert.clone(),
        pip_args: args.pip_args.clone(),
    }
}
