// tests/resolver.rs

//! End-to-end resolution tests against an in-memory index.

mod common;

use common::{Counting, EndlessChain, IndexBuilder, name, pin, pins, primary, spec};
use reqpin::cache::DependencyCache;
use reqpin::repository::{ExistingPin, LocalPinningProxy};
use reqpin::requirement::Origin;
use reqpin::{Candidate, Error, Repository, Resolver, ResolverOptions};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn web_index() -> IndexBuilder {
    IndexBuilder::new()
        .release("flask", "1.0", &["jinja2>=2.4", "werkzeug>=0.7", "click"])
        .release("flask", "2.0", &["jinja2>=3.0", "werkzeug>=2.0", "click>=7.1"])
        .release("jinja2", "2.11", &["markupsafe>=0.23"])
        .release("jinja2", "3.1", &["markupsafe>=2.0"])
        .release("markupsafe", "1.1", &[])
        .release("markupsafe", "2.1", &[])
        .release("werkzeug", "1.0", &[])
        .release("werkzeug", "2.3", &[])
        .release("click", "7.0", &[])
        .release("click", "8.1", &[])
        .hashes("flask", "2.0", &["sha256:aaaa", "md5:bbbb"])
        .hashes("click", "8.1", &["sha256:cccc"])
}

fn resolve<R: Repository>(constraints: Vec<reqpin::RequirementSpec>, repository: R) -> reqpin::Result<reqpin::Resolution> {
    Resolver::new(constraints, repository, DependencyCache::in_memory(), ResolverOptions::default()).resolve()
}

#[test]
fn test_resolution_is_deterministic() {
    let first = resolve(primary(&["flask<2", "click<8"]), web_index().build()).unwrap();
    let second = resolve(primary(&["flask<2", "click<8"]), web_index().build()).unwrap();

    assert_eq!(pins(&first.requirements), pins(&second.requirements));
    assert_eq!(first.rounds, second.rounds);
    assert_eq!(
        pins(&first.requirements),
        vec!["click==7.0", "flask==1.0", "jinja2==3.1", "markupsafe==2.1", "werkzeug==2.3"]
    );
}

#[test]
fn test_every_dependency_is_pinned() {
    let mut repository = web_index().build();
    let resolution = resolve(primary(&["flask"]), web_index().build()).unwrap();

    for candidate in &resolution.requirements {
        for dependency in repository.get_dependencies(candidate).unwrap() {
            let chosen = resolution
                .pins()
                .find(|p| &p.name == dependency.name())
                .unwrap_or_else(|| panic!("{} is missing from the result", dependency));
            assert!(dependency.allows(&chosen.version), "{} does not satisfy {}", chosen, dependency);
        }
    }
}

#[test]
fn test_incompatible_requirements() {
    let index = IndexBuilder::new().release("a", "0.5", &[]).release("a", "2.0", &[]);
    let err = resolve(primary(&["a>1.0", "a<1.0"]), index.build()).unwrap_err();
    match err {
        Error::IncompatibleRequirements { package, conflicts } => {
            assert_eq!(package, "a");
            assert_eq!(conflicts.len(), 2);
            assert_eq!(conflicts[0].origin.as_deref(), Some("-r requirements.in"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_marker_isolated_requirements_resolve_side_by_side() {
    let index = IndexBuilder::new().release("a", "0.5", &[]).release("a", "2.0", &[]);
    let resolution = resolve(
        primary(&["a>1.0 ; python_version >= '3.8'", "a<1.0 ; python_version < '3.8'"]),
        index.build(),
    )
    .unwrap();

    assert_eq!(pins(&resolution.requirements), vec!["a==0.5", "a==2.0"]);
    for candidate in &resolution.requirements {
        assert!(resolution.marker(candidate).is_some());
    }
}

#[test]
fn test_conflict_discovered_through_dependencies() {
    let index = IndexBuilder::new()
        .release("app", "1.0", &["lib>=2"])
        .release("lib", "1.0", &[])
        .release("lib", "2.0", &[]);
    let err = resolve(primary(&["app", "lib<2"]), index.build()).unwrap_err();
    assert!(matches!(err, Error::IncompatibleRequirements { .. }));
}

#[test]
fn test_prior_pin_is_reused() {
    let repository = Counting::new(IndexBuilder::new().release("foo", "1.0", &[]).release("foo", "2.0", &[]).build());
    let proxy = LocalPinningProxy::new(
        repository,
        vec![ExistingPin::new(pin("foo", "1.0"), BTreeSet::new())],
        &BTreeSet::new(),
    );
    let mut resolver = Resolver::new(primary(&["foo"]), proxy, DependencyCache::in_memory(), ResolverOptions::default());
    let resolution = resolver.resolve().unwrap();

    assert_eq!(pins(&resolution.requirements), vec!["foo==1.0"]);
    assert_eq!(resolver.repository().inner().best_matches("foo"), 0);
}

#[test]
fn test_upgrade_target_bypasses_prior_pin() {
    let repository = Counting::new(IndexBuilder::new().release("foo", "1.0", &[]).release("foo", "2.0", &[]).build());
    let upgrade: BTreeSet<_> = [name("foo")].into_iter().collect();
    let proxy = LocalPinningProxy::new(
        repository,
        vec![ExistingPin::new(pin("foo", "1.0"), BTreeSet::new())],
        &upgrade,
    );
    let mut constraints = primary(&["foo"]);
    constraints.push(spec("foo").with_origin(Origin::Upgrade));
    let mut resolver = Resolver::new(constraints, proxy, DependencyCache::in_memory(), ResolverOptions::default());
    let resolution = resolver.resolve().unwrap();

    assert_eq!(pins(&resolution.requirements), vec!["foo==2.0"]);
    assert!(resolver.repository().inner().best_matches("foo") > 0);
}

#[test]
fn test_stale_prior_pin_is_replaced() {
    let repository = IndexBuilder::new().release("foo", "1.0", &[]).release("foo", "2.0", &[]).build();
    let proxy = LocalPinningProxy::new(
        repository,
        vec![ExistingPin::new(pin("foo", "1.0"), BTreeSet::new())],
        &BTreeSet::new(),
    );
    let resolution = resolve(primary(&["foo>=2"]), proxy).unwrap();
    assert_eq!(pins(&resolution.requirements), vec!["foo==2.0"]);
}

#[test]
fn test_reused_pins_keep_their_hashes() {
    let repository = Counting::new(web_index().build());
    let prior: BTreeSet<String> = ["sha256:prior".to_string(), "md5:old".to_string()].into_iter().collect();
    let proxy = LocalPinningProxy::new(repository, vec![ExistingPin::new(pin("click", "8.1"), prior)], &BTreeSet::new());
    let mut resolver = Resolver::new(primary(&["click"]), proxy, DependencyCache::in_memory(), ResolverOptions::default());
    let resolution = resolver.resolve().unwrap();
    let hashes = resolver.resolve_hashes(&resolution.requirements).unwrap();

    let expected: BTreeSet<String> = ["sha256:prior".to_string()].into_iter().collect();
    assert_eq!(hashes[&pin("click", "8.1")], expected);
    assert_eq!(resolver.repository().inner().hash_lookups("click"), 0);
}

#[test]
fn test_hashes_for_every_pin() {
    let mut resolver = Resolver::new(
        primary(&["flask>=2"]),
        web_index().build(),
        DependencyCache::in_memory(),
        ResolverOptions::default(),
    );
    let resolution = resolver.resolve().unwrap();
    let hashes = resolver.resolve_hashes(&resolution.requirements).unwrap();

    assert_eq!(hashes.len(), resolution.requirements.len());
    assert_eq!(hashes[&pin("flask", "2.0")].len(), 2);
    assert!(hashes[&pin("werkzeug", "2.3")].is_empty());
}

#[test]
fn test_unsafe_packages_are_partitioned() {
    let index = || {
        IndexBuilder::new()
            .release("setuptools", "68.0", &["setuptools-scm-helper"])
            .release("setuptools-scm-helper", "1.0", &[])
            .release("requests", "2.31", &[])
    };

    let resolution = resolve(primary(&["requests", "setuptools"]), index().build()).unwrap();
    assert_eq!(pins(&resolution.requirements), vec!["requests==2.31"]);
    assert_eq!(
        pins(&resolution.unsafe_requirements),
        vec!["setuptools==68.0", "setuptools-scm-helper==1.0"]
    );

    let resolution = Resolver::new(
        primary(&["requests", "setuptools"]),
        index().build(),
        DependencyCache::in_memory(),
        ResolverOptions {
            allow_unsafe: true,
            ..Default::default()
        },
    )
    .resolve()
    .unwrap();
    assert_eq!(
        pins(&resolution.requirements),
        vec!["requests==2.31", "setuptools==68.0", "setuptools-scm-helper==1.0"]
    );
    assert_eq!(resolution.unsafe_requirements.len(), 2);
}

#[test]
fn test_cache_avoids_repeat_lookups() {
    let dir = TempDir::new().unwrap();

    let mut resolver = Resolver::new(
        primary(&["flask"]),
        Counting::new(web_index().build()),
        DependencyCache::open(dir.path()),
        ResolverOptions::default(),
    );
    let first = resolver.resolve().unwrap();
    let (repository, cache) = resolver.into_parts();
    assert_eq!(repository.dependency_lookups("flask"), 1);
    assert!(!cache.is_empty());
    drop(cache);

    let mut resolver = Resolver::new(
        primary(&["flask"]),
        Counting::new(web_index().build()),
        DependencyCache::open(dir.path()),
        ResolverOptions::default(),
    );
    let second = resolver.resolve().unwrap();
    assert_eq!(pins(&first.requirements), pins(&second.requirements));
    assert_eq!(resolver.repository().dependency_lookups("flask"), 0);

    let mut resolver = Resolver::new(
        primary(&["flask"]),
        Counting::new(web_index().build()),
        DependencyCache::open(dir.path()),
        ResolverOptions {
            clear_caches: true,
            ..Default::default()
        },
    );
    resolver.resolve().unwrap();
    assert_eq!(resolver.repository().dependency_lookups("flask"), 1);
}

#[test]
fn test_corrupt_cache_is_recovered() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(reqpin::cache::CACHE_FILE), b"definitely not sqlite").unwrap();

    let resolution = Resolver::new(
        primary(&["flask"]),
        web_index().build(),
        DependencyCache::open(dir.path()),
        ResolverOptions::default(),
    )
    .resolve()
    .unwrap();
    assert_eq!(resolution.requirements.len(), 5);
}

#[test]
fn test_endless_dependency_chain_hits_round_bound() {
    let err = Resolver::new(
        vec![spec("chain-0")],
        EndlessChain,
        DependencyCache::in_memory(),
        ResolverOptions {
            max_rounds: 5,
            ..Default::default()
        },
    )
    .resolve()
    .unwrap_err();
    assert!(matches!(err, Error::TooManyRounds { max_rounds: 5 }));
}

#[test]
fn test_two_round_scenario() {
    let index = IndexBuilder::new()
        .release("x", "1.0", &["y>=1.0"])
        .release("y", "1.0", &[])
        .release("y", "2.0", &[]);
    let resolution = resolve(primary(&["x"]), index.build()).unwrap();
    assert_eq!(pins(&resolution.requirements), vec!["x==1.0", "y==2.0"]);
    assert_eq!(resolution.rounds, 2);
}

#[test]
fn test_differing_specifiers_use_most_restrictive_set() {
    let index = IndexBuilder::new()
        .release("app", "1.0", &["lib<3"])
        .release("tool", "1.0", &["lib!=2.0"])
        .release("lib", "1.0", &[])
        .release("lib", "2.0", &[])
        .release("lib", "2.5", &[])
        .release("lib", "3.0", &[]);
    let resolution = resolve(primary(&["app", "tool", "lib>=1.0"]), index.build()).unwrap();
    assert_eq!(
        pins(&resolution.requirements),
        vec!["app==1.0", "lib==2.5", "tool==1.0"]
    );
    let lib = resolution
        .requirements
        .iter()
        .find(|c| c.name() == &name("lib"))
        .and_then(Candidate::as_pinned)
        .unwrap();
    assert_eq!(lib.version.to_string(), "2.5");
}

#[test]
fn test_extras_pull_in_extra_dependencies() {
    let index = IndexBuilder::new()
        .release("requests", "2.31", &["idna"])
        .extra("requests", "2.31", "socks", &["pysocks"])
        .release("idna", "3.4", &[])
        .release("pysocks", "1.7", &[]);
    let resolution = resolve(primary(&["requests[socks]"]), index.build()).unwrap();
    assert_eq!(
        pins(&resolution.requirements),
        vec!["idna==3.4", "pysocks==1.7", "requests[socks]==2.31"]
    );
    let via = resolution.provenance.via(&name("pysocks"));
    assert_eq!(via, vec!["requests"]);
}

#[test]
fn test_no_candidate_found() {
    let index = IndexBuilder::new().release("six", "1.0", &[]);
    let err = resolve(primary(&["six>=2"]), index.build()).unwrap_err();
    match err {
        Error::NoCandidateFound { tried_versions, locations, .. } => {
            assert_eq!(tried_versions, vec!["1.0"]);
            assert_eq!(locations, vec!["test-index"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_exact_pin_reports_no_candidate() {
    let index = IndexBuilder::new().release("six", "1.0", &[]);
    let err = resolve(primary(&["six==3.0"]), index.build()).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    match err {
        Error::NoCandidateFound { requirement, tried_versions, locations, .. } => {
            assert_eq!(requirement, "six==3.0");
            assert_eq!(tried_versions, vec!["1.0"]);
            assert_eq!(locations, vec!["test-index"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}
