// src/sync/executor.rs

//! Applying a sync plan
//!
//! The uninstall batch always runs to completion before the install batch
//! starts, and a failed uninstall stops the sync before anything is installed.

use super::planner::SyncPlan;
use crate::error::{Error, Result};
use crate::requirement::PackageName;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// How to treat a non-empty plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Apply the plan
    #[default]
    Apply,
    /// Report the plan without touching the environment
    DryRun,
    /// Report the plan and apply it only after confirmation
    Ask,
}

/// Outcome of a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    UpToDate,
    Applied,
    WouldChange,
    Declined,
}

impl SyncStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncStatus::UpToDate | SyncStatus::Applied => 0,
            SyncStatus::WouldChange | SyncStatus::Declined => 1,
        }
    }
}

/// Performs the two sync batches
pub trait Installer {
    /// Remove distributions by name
    fn uninstall(&mut self, names: &[String]) -> Result<()>;

    /// Install requirement lines, using `flags` for index selection
    fn install(&mut self, lines: &[String], flags: &[String]) -> Result<()>;
}

/// Yes/no confirmation
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Asks on the terminal; anything but `y`/`yes` declines
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let mut stdout = io::stdout();
        write!(stdout, "{} [y/N]: ", question)?;
        stdout.flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Runs `python -m pip`
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    python: PathBuf,
    quiet: bool,
}

impl CommandInstaller {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            quiet: false,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// The interpreter's pure-Python site-packages directory
    pub fn site_packages(&self) -> Result<PathBuf> {
        let output = Command::new(&self.python)
            .args(["-c", "import sysconfig; print(sysconfig.get_paths()['purelib'])"])
            .output()
            .map_err(|e| {
                Error::Installer(format!("Failed to run {}: {}", self.python.display(), e))
            })?;
        if !output.status.success() {
            return Err(Error::Installer(format!(
                "Cannot locate site-packages: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(PathBuf::from(String::from_utf8_lossy(&output.stdout).trim()))
    }

    fn run(&self, args: &[String]) -> Result<()> {
        debug!("Running {} -m pip {}", self.python.display(), args.join(" "));
        let output = Command::new(&self.python)
            .args(["-m", "pip"])
            .args(args)
            .output()
            .map_err(|e| {
                Error::Installer(format!(
                    "Failed to run {}: {}",
                    self.python.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::Installer(format!(
                "pip {} failed: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Default for CommandInstaller {
    fn default() -> Self {
        Self::new("python")
    }
}

impl Installer for CommandInstaller {
    fn uninstall(&mut self, names: &[String]) -> Result<()> {
        let mut args = vec!["uninstall".to_string(), "-y".to_string()];
        if self.quiet {
            args.push("-q".to_string());
        }
        args.extend(names.iter().cloned());
        self.run(&args)
    }

    fn install(&mut self, lines: &[String], flags: &[String]) -> Result<()> {
        let mut requirements = NamedTempFile::new()?;
        for line in lines {
            writeln!(requirements, "{}", line)?;
        }
        requirements.flush()?;

        let mut args = vec![
            "install".to_string(),
            "-r".to_string(),
            requirements.path().display().to_string(),
        ];
        if self.quiet {
            args.push("-q".to_string());
        }
        args.extend(flags.iter().cloned());
        self.run(&args)
    }
}

/// Applies, reports or asks about a [`SyncPlan`]
#[derive(Debug, Clone, Default)]
pub struct SyncExecutor {
    flags: Vec<String>,
    hashes: BTreeMap<PackageName, BTreeSet<String>>,
    quiet: bool,
}

impl SyncExecutor {
    pub fn new(flags: Vec<String>) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    /// Hashes to pin each installed package to
    pub fn with_hashes(mut self, hashes: BTreeMap<PackageName, BTreeSet<String>>) -> Self {
        self.hashes = hashes;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Requirement lines for the install batch, with `--hash` options
    pub fn install_lines(&self, plan: &SyncPlan) -> Vec<String> {
        plan.to_install
            .iter()
            .map(|spec| {
                let mut line = spec.to_string();
                if let Some(hashes) = self.hashes.get(spec.name()) {
                    for hash in hashes {
                        line.push_str(" --hash=");
                        line.push_str(hash);
                    }
                }
                line
            })
            .collect()
    }

    pub fn execute(
        &self,
        plan: &SyncPlan,
        mode: SyncMode,
        installer: &mut dyn Installer,
        prompt: &mut dyn Prompt,
        out: &mut dyn Write,
    ) -> Result<SyncStatus> {
        if plan.is_empty() {
            if !self.quiet {
                writeln!(out, "Everything up-to-date")?;
            }
            return Ok(SyncStatus::UpToDate);
        }

        match mode {
            SyncMode::DryRun => {
                self.report(plan, out)?;
                Ok(SyncStatus::WouldChange)
            }
            SyncMode::Ask => {
                self.report(plan, out)?;
                if prompt.confirm("Would you like to proceed with these changes?")? {
                    self.apply(plan, installer)?;
                    Ok(SyncStatus::Applied)
                } else {
                    Ok(SyncStatus::Declined)
                }
            }
            SyncMode::Apply => {
                self.apply(plan, installer)?;
                Ok(SyncStatus::Applied)
            }
        }
    }

    fn report(&self, plan: &SyncPlan, out: &mut dyn Write) -> Result<()> {
        if !plan.to_uninstall.is_empty() {
            writeln!(out, "Would uninstall:")?;
            for name in plan.uninstall_names() {
                writeln!(out, "  {}", name)?;
            }
        }
        if !plan.to_install.is_empty() {
            writeln!(out, "Would install:")?;
            for spec in &plan.to_install {
                writeln!(out, "  {}", spec)?;
            }
        }
        Ok(())
    }

    fn apply(&self, plan: &SyncPlan, installer: &mut dyn Installer) -> Result<()> {
        let names = plan.uninstall_names();
        if !names.is_empty() {
            info!("Uninstalling {} distribution(s)", names.len());
            installer.uninstall(&names)?;
        }
        if !plan.to_install.is_empty() {
            info!("Installing {} requirement(s)", plan.to_install.len());
            installer.install(&self.install_lines(plan), &self.flags)?;
        }
        Ok(())
    }
}
