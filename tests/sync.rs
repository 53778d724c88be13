// tests/sync.rs

//! Environment sync: merging pinned files, planning and applying changes.

mod common;

use common::{IndexBuilder, primary, spec};
use reqpin::cache::DependencyCache;
use reqpin::config::EnvironmentConfig;
use reqpin::output::OutputWriter;
use reqpin::repository::InstallOptions;
use reqpin::requirement::file::RequirementsFile;
use reqpin::sync::{
    InstallFlags, InstalledDistribution, InstalledKey, Installer, Prompt, SyncMode, SyncStatus,
    compose_install_flags, merge, scan_site_packages,
};
use reqpin::{Error, Resolver, ResolverOptions, SyncExecutor, SyncPlanner};
use std::collections::BTreeSet;
use std::fs;
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
    fail_uninstall: bool,
}

impl Installer for Recorder {
    fn uninstall(&mut self, names: &[String]) -> reqpin::Result<()> {
        self.calls.push(format!("uninstall {}", names.join(" ")));
        if self.fail_uninstall {
            return Err(Error::Installer("uninstall failed".into()));
        }
        Ok(())
    }

    fn install(&mut self, lines: &[String], flags: &[String]) -> reqpin::Result<()> {
        self.calls
            .push(format!("install {} [{}]", lines.join(", "), flags.join(" ")));
        Ok(())
    }
}

struct Answer(bool);

impl Prompt for Answer {
    fn confirm(&mut self, _question: &str) -> reqpin::Result<bool> {
        Ok(self.0)
    }
}

fn installed(entries: &[(&str, &str)]) -> Vec<InstalledDistribution> {
    entries
        .iter()
        .map(|(name, version)| InstalledDistribution::new(name, version, &[]))
        .collect()
}

fn install_names(plan: &reqpin::SyncPlan) -> Vec<String> {
    plan.to_install.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_merge_keeps_later_source_when_ignoring_conflicts() {
    let sources = vec![spec("django==1.0"), spec("six==1.16"), spec("django==2.0")];

    let err = merge(sources.clone(), false).unwrap_err();
    assert!(matches!(err, Error::IncompatibleRequirements { ref package, .. } if package == "django"));

    let merged = merge(sources, true).unwrap();
    let lines: Vec<String> = merged.iter().map(|s| s.to_string()).collect();
    assert_eq!(lines, vec!["django==2.0", "six==1.16"]);
}

#[test]
fn test_merge_folds_compatible_duplicates() {
    let merged = merge(vec![spec("django>=1.0"), spec("Django==1.8")], false).unwrap();
    assert_eq!(merged.len(), 1);
    assert!(merged[0].specifiers().to_string().contains("==1.8"));
}

#[test]
fn test_diff_installs_uninstalls_and_upgrades() {
    let targets = vec![spec("a==1.0"), spec("b==2.0")];
    let plan = SyncPlanner::new().diff(&targets, &installed(&[("a", "1.0"), ("b", "1.0"), ("c", "3.0")]));

    assert_eq!(install_names(&plan), vec!["b==2.0"]);
    let expected: BTreeSet<InstalledKey> =
        [InstalledKey::new("b", "1.0"), InstalledKey::new("c", "3.0")].into_iter().collect();
    assert_eq!(plan.to_uninstall, expected);
}

#[test]
fn test_diff_skips_targets_for_other_environments() {
    let targets = vec![
        spec("a==1.0"),
        spec("legacy==1.0 ; python_version < '3.0'"),
        spec("modern==1.0 ; python_version >= '3.8'"),
    ];
    let environment = EnvironmentConfig::default().marker_environment().unwrap();
    let plan = SyncPlanner::new()
        .with_environment(environment)
        .diff(&targets, &installed(&[("a", "1.0"), ("legacy", "1.0")]));

    let names: Vec<String> = plan.to_install.iter().map(|s| s.name().to_string()).collect();
    assert_eq!(names, vec!["modern"]);
    let expected: BTreeSet<InstalledKey> = [InstalledKey::new("legacy", "1.0")].into_iter().collect();
    assert_eq!(plan.to_uninstall, expected);
}

#[test]
fn test_diff_protects_tooling_and_its_dependencies() {
    let mut environment = installed(&[("a", "1.0"), ("setuptools", "68.0"), ("stray", "0.1")]);
    environment.push(InstalledDistribution::new("pip", "23.0", &["helper"]));
    environment.push(InstalledDistribution::new("helper", "1.0", &[]));
    environment.push(InstalledDistribution::new("linter", "5.0", &["linter-plugins"]));
    environment.push(InstalledDistribution::new("linter-plugins", "1.0", &[]));

    let plan = SyncPlanner::new()
        .with_ignored(["Linter"])
        .diff(&[spec("a==1.0")], &environment);

    assert!(plan.to_install.is_empty());
    let expected: BTreeSet<InstalledKey> = [InstalledKey::new("stray", "0.1")].into_iter().collect();
    assert_eq!(plan.to_uninstall, expected);
}

#[test]
fn test_diff_compares_canonical_versions() {
    let plan = SyncPlanner::new().diff(&[spec("django==1.10")], &installed(&[("django", "1.10.0")]));
    assert!(plan.is_empty());
}

#[test]
fn test_scan_site_packages_feeds_diff() {
    let dir = TempDir::new().unwrap();
    let dist_info = dir.path().join("Requests-2.31.0.dist-info");
    fs::create_dir(&dist_info).unwrap();
    fs::write(
        dist_info.join("METADATA"),
        "Metadata-Version: 2.1\nName: Requests\nVersion: 2.31.0\nRequires-Dist: idna (<4,>=2.5)\n\nBody\n",
    )
    .unwrap();

    let found = scan_site_packages(dir.path()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "requests");

    let plan = SyncPlanner::new().diff(&[spec("requests==2.31.0"), spec("idna==3.4")], &found);
    assert_eq!(install_names(&plan), vec!["idna==3.4"]);
    assert!(plan.to_uninstall.is_empty());
}

#[test]
fn test_executor_uninstalls_before_installing() {
    let plan = SyncPlanner::new().diff(&[spec("b==2.0")], &installed(&[("b", "1.0"), ("c", "3.0")]));
    let flags = compose_install_flags(&InstallOptions::default(), &InstallFlags::default()).unwrap();

    let mut recorder = Recorder::default();
    let mut out = Vec::new();
    let status = SyncExecutor::new(flags)
        .execute(&plan, SyncMode::Apply, &mut recorder, &mut Answer(false), &mut out)
        .unwrap();

    assert_eq!(status, SyncStatus::Applied);
    assert_eq!(status.exit_code(), 0);
    assert_eq!(recorder.calls, vec!["uninstall b c", "install b==2.0 []"]);
}

#[test]
fn test_executor_stops_after_failed_uninstall() {
    let plan = SyncPlanner::new().diff(&[spec("b==2.0")], &installed(&[("b", "1.0")]));
    let mut recorder = Recorder {
        fail_uninstall: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    let err = SyncExecutor::new(Vec::new())
        .execute(&plan, SyncMode::Apply, &mut recorder, &mut Answer(true), &mut out)
        .unwrap_err();

    assert!(matches!(err, Error::Installer(_)));
    assert_eq!(recorder.calls, vec!["uninstall b"]);
}

#[test]
fn test_executor_statuses() {
    let executor = SyncExecutor::new(Vec::new());
    let plan = SyncPlanner::new().diff(&[spec("a==1.0")], &[]);

    let mut recorder = Recorder::default();
    let mut out = Vec::new();
    let status = executor
        .execute(&plan, SyncMode::DryRun, &mut recorder, &mut Answer(true), &mut out)
        .unwrap();
    assert_eq!(status, SyncStatus::WouldChange);
    assert_eq!(status.exit_code(), 1);
    assert!(recorder.calls.is_empty());
    assert_eq!(String::from_utf8(out).unwrap(), "Would install:\n  a==1.0\n");

    let mut out = Vec::new();
    let status = executor
        .execute(&plan, SyncMode::Ask, &mut recorder, &mut Answer(false), &mut out)
        .unwrap();
    assert_eq!(status, SyncStatus::Declined);
    assert!(recorder.calls.is_empty());

    let mut out = Vec::new();
    let status = executor
        .execute(&plan, SyncMode::Ask, &mut recorder, &mut Answer(true), &mut out)
        .unwrap();
    assert_eq!(status, SyncStatus::Applied);
    assert_eq!(recorder.calls, vec!["install a==1.0 []"]);

    let mut out = Vec::new();
    let status = executor
        .execute(&reqpin::SyncPlan::default(), SyncMode::DryRun, &mut recorder, &mut Answer(true), &mut out)
        .unwrap();
    assert_eq!(status, SyncStatus::UpToDate);
    assert_eq!(String::from_utf8(out).unwrap(), "Everything up-to-date\n");
}

#[test]
fn test_install_flags_prefer_command_line() {
    let file_options = InstallOptions {
        index_url: Some("https://mirror.example/simple".to_string()),
        extra_index_urls: vec!["https://extra.example/simple".to_string()],
        ..Default::default()
    };

    let from_file = compose_install_flags(&file_options, &InstallFlags::default()).unwrap();
    assert_eq!(
        from_file,
        vec![
            "--index-url",
            "https://mirror.example/simple",
            "--extra-index-url",
            "https://extra.example/simple",
        ]
    );

    let flags = InstallFlags {
        index_url: Some("https://cli.example/simple".to_string()),
        user: true,
        pip_args: Some("--retries 3 --timeout '10'".to_string()),
        ..Default::default()
    };
    let from_cli = compose_install_flags(&file_options, &flags).unwrap();
    assert_eq!(
        from_cli,
        vec![
            "--index-url",
            "https://cli.example/simple",
            "--user",
            "--retries",
            "3",
            "--timeout",
            "10",
        ]
    );

    let no_index = InstallOptions {
        no_index: true,
        ..Default::default()
    };
    assert_eq!(
        compose_install_flags(&no_index, &InstallFlags::default()).unwrap(),
        vec!["--no-index"]
    );
}

#[test]
fn test_compiled_file_syncs_environment() {
    let index = IndexBuilder::new()
        .release("flask", "2.0", &["click>=7.1"])
        .release("click", "8.1", &[])
        .hashes("flask", "2.0", &["sha256:aaaa"]);
    let mut resolver = Resolver::new(
        primary(&["flask"]),
        index.build(),
        DependencyCache::in_memory(),
        ResolverOptions::default(),
    );
    let resolution = resolver.resolve().unwrap();
    let hashes = resolver.resolve_hashes(&resolution.requirements).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("requirements.txt");
    OutputWriter::new()
        .with_command("reqpin compile")
        .write(&path, &resolution, &hashes)
        .unwrap();

    let file = RequirementsFile::read(&path).unwrap();
    let targets = merge(file.requirements.clone(), false).unwrap();
    let plan = SyncPlanner::new().diff(&targets, &installed(&[("click", "8.1"), ("flask", "1.0")]));
    assert_eq!(install_names(&plan), vec!["flask==2.0"]);

    let executor = SyncExecutor::new(Vec::new()).with_hashes(file.hashes.clone());
    assert_eq!(executor.install_lines(&plan), vec!["flask==2.0 --hash=sha256:aaaa"]);

    let mut recorder = Recorder::default();
    let mut out = Vec::new();
    executor
        .execute(&plan, SyncMode::Apply, &mut recorder, &mut Answer(true), &mut out)
        .unwrap();
    assert_eq!(
        recorder.calls,
        vec!["uninstall flask", "install flask==2.0 --hash=sha256:aaaa []"]
    );
}
