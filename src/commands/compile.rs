// src/commands/compile.rs

//! `reqpin compile`: resolve requirement files into a pinned output

use crate::cli::CompileArgs;
use anyhow::{Context, Result};
use reqpin::cache::DependencyCache;
use reqpin::config::Config;
use reqpin::output::{Hashes, OutputWriter};
use reqpin::repository::{ExistingPin, InstallOptions, LocalIndexRepository, LocalPinningProxy};
use reqpin::requirement::file::RequirementsFile;
use reqpin::requirement::{Origin, PackageName, RequirementSpec};
use reqpin::resolver::{Resolver, ResolverOptions};
use reqpin::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_REQUIREMENTS_FILE: &str = "requirements.in";
pub const DEFAULT_REQUIREMENTS_OUTPUT_FILE: &str = "requirements.txt";

/// Compile requirement files; returns the process exit code
pub fn cmd_compile(args: &CompileArgs, config: &Config) -> Result<i32> {
    let src_files = source_files(&args.src_files)?;
    let output_file = output_file(&src_files, args.output_file.as_deref())?;

    let index = args
        .index
        .clone()
        .or_else(|| config.index.clone())
        .ok_or_else(|| {
            Error::Usage("No package index given; pass --index or set `index` in reqpin.toml".into())
        })?;

    let mut requirements = Vec::new();
    let mut options = config.install.clone();
    for src in &src_files {
        let file = RequirementsFile::read(src)?;
        options.extend(&file.options);
        requirements.extend(file.requirements);
    }

    let upgrades = upgrade_requirements(&args.upgrade_packages)?;
    let upgrade_names: BTreeSet<PackageName> = upgrades.keys().cloned().collect();

    let existing_pins = if args.upgrade {
        Vec::new()
    } else {
        prior_pins(&output_file)?
    };
    let pins_to_upgrade: BTreeSet<PackageName> = existing_pins
        .iter()
        .map(|existing| existing.pin.name.clone())
        .filter(|name| upgrade_names.contains(name))
        .collect();

    let primary: BTreeSet<PackageName> = requirements
        .iter()
        .filter(|spec| !spec.is_constraint())
        .map(|spec| spec.name().clone())
        .collect();
    for (name, spec) in upgrades {
        if primary.contains(&name) || pins_to_upgrade.contains(&name) {
            requirements.push(spec);
        } else {
            debug!("Ignoring --upgrade-package {}: not required", name);
        }
    }

    if let Some(environment) = config.marker_environment()? {
        requirements.retain(|spec| spec.marker().is_none_or(|m| m.evaluate(&environment)));
    }

    let repository = LocalIndexRepository::open(&index)?.with_options(options.clone());
    let repository = LocalPinningProxy::new(repository, existing_pins, &upgrade_names)
        .with_reuse_hashes(config.reuse_hashes && !args.no_reuse_hashes);

    let cache_dir = args.cache_dir.clone().unwrap_or_else(|| config.cache_dir.clone());
    let cache = DependencyCache::open(&cache_dir);
    let resolver_options = ResolverOptions {
        prereleases: args.pre || config.prereleases,
        allow_unsafe: args.allow_unsafe || config.allow_unsafe,
        clear_caches: args.rebuild,
        max_rounds: args.max_rounds.unwrap_or(config.max_rounds),
    };

    info!("Resolving {} requirement(s) against {}", requirements.len(), index.display());
    let mut resolver = Resolver::new(requirements, repository, cache, resolver_options);
    let resolution = resolver.resolve()?;

    let hashes: Hashes = if args.generate_hashes {
        resolver.resolve_hashes(
            resolution
                .requirements
                .iter()
                .chain(&resolution.unsafe_requirements),
        )?
    } else {
        BTreeMap::new()
    };

    let writer = OutputWriter::new()
        .with_annotations(!args.no_annotate)
        .with_allow_unsafe(resolver_options.allow_unsafe)
        .with_command(command_line(&src_files, &output_file, args))
        .with_options(emitted_options(options));

    if args.dry_run {
        print!("{}", writer.render(&resolution, &hashes));
        info!("Dry-run, so nothing updated.");
    } else {
        writer
            .write(&output_file, &resolution, &hashes)
            .with_context(|| format!("Failed to write {}", output_file.display()))?;
        info!("Wrote {}", output_file.display());
    }
    Ok(0)
}

fn source_files(given: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if !given.is_empty() {
        return Ok(given.to_vec());
    }
    let default = PathBuf::from(DEFAULT_REQUIREMENTS_FILE);
    if default.exists() {
        Ok(vec![default])
    } else {
        Err(Error::Usage(format!(
            "If you do not specify an input file, the default is {}",
            DEFAULT_REQUIREMENTS_FILE
        ))
        .into())
    }
}

/// The explicit output, or `<src>.txt` for a single input
fn output_file(src_files: &[PathBuf], given: Option<&Path>) -> Result<PathBuf> {
    if let Some(given) = given {
        return Ok(given.to_path_buf());
    }
    match src_files {
        [single] if single.extension().is_some_and(|ext| ext == "txt") => Err(Error::Usage(
            format!("--output-file is required to avoid overwriting {}", single.display()),
        )
        .into()),
        [single] => Ok(single.with_extension("txt")),
        _ => Err(Error::Usage(
            "--output-file is required if two or more input files are given.".into(),
        )
        .into()),
    }
}

fn upgrade_requirements(packages: &[String]) -> Result<BTreeMap<PackageName, RequirementSpec>> {
    let mut upgrades = BTreeMap::new();
    for package in packages {
        let spec = RequirementSpec::parse(package)?.with_origin(Origin::Upgrade);
        upgrades.insert(spec.name().clone(), spec);
    }
    Ok(upgrades)
}

fn prior_pins(output_file: &Path) -> Result<Vec<ExistingPin>> {
    if !output_file.exists() {
        return Ok(Vec::new());
    }
    let pins = RequirementsFile::read(output_file)?.pins();
    debug!("Loaded {} prior pins from {}", pins.len(), output_file.display());
    Ok(pins)
}

/// Options worth recording in the output; find-links are machine specific
fn emitted_options(options: InstallOptions) -> InstallOptions {
    InstallOptions {
        find_links: Vec::new(),
        ..options
    }
}

fn command_line(src_files: &[PathBuf], output_file: &Path, args: &CompileArgs) -> String {
    let mut parts = vec!["reqpin compile".to_string()];
    if args.allow_unsafe {
        parts.push("--allow-unsafe".to_string());
    }
    if args.generate_hashes {
        parts.push("--generate-hashes".to_string());
    }
    parts.push(format!("--output-file={}", output_file.display()));
    parts.extend(src_files.iter().map(|src| src.display().to_string()));
    parts.join(" ")
}
