// Dependency resolution: topological order, dedup, cycle detection, and
// error propagation.


use chatr::error::ChatrError;
use chatr::traits::State;
use chatr::Resolver;
use chrono::Utc;
use std::sync::Arc;
use test_helpers::{formula, MockRegistry, TestEnvironment};

fn resolver(env: &TestEnvironment, formulae: Vec<chatr::Formula>) -> Resolver {
    let registry = Arc::new(MockRegistry::new(formulae));
    let state: Arc<dyn State> = Arc::new(env.state());
    Resolver::new(registry, state)
}

fn position(plan: &[chatr::ResolvedPackage], name: &str) -> usize {
    plan.iter()
        .position(|n| n.formula.name == name)
        .unwrap_or_else(|| panic!("{} missing from plan", name))
}

#[tokio::test]
async fn chain_resolves_dependencies_first() {
    let env = TestEnvironment::new();
    let resolver = resolver(
        &env,
        vec![
            formula("a", "1.0", &["b"]),
            formula("b", "1.0", &["c"]),
            formula("c", "1.0", &[]),
        ],
    );

    let plan = resolver.resolve("a").await.unwrap();

    assert_eq!(plan.len(), 3);
    assert!(position(&plan, "c") < position(&plan, "b"));
    assert!(position(&plan, "b") < position(&plan, "a"));
    assert_eq!(plan.last().unwrap().formula.name, "a");
    assert!(!plan.last().unwrap().is_dep);
    assert!(plan[0].is_dep);
}

#[tokio::test]
async fn diamond_dependency_appears_once() {
    let env = TestEnvironment::new();
    let resolver = resolver(
        &env,
        vec![
            formula("a", "1.0", &["b", "c"]),
            formula("b", "1.0", &["d"]),
            formula("c", "1.0", &["d"]),
            formula("d", "1.0", &[]),
        ],
    );

    let plan = resolver.resolve("a").await.unwrap();

    assert_eq!(plan.len(), 4);
    let names: Vec<&str> = plan.iter().map(|n| n.formula.name.as_str()).collect();
    assert_eq!(
        names.iter().filter(|n| **n == "d").count(),
        1,
        "shared dep must be deduplicated"
    );

    assert!(position(&plan, "d") < position(&plan, "b"));
    assert!(position(&plan, "d") < position(&plan, "c"));
    assert_eq!(plan.last().unwrap().formula.name, "a");
}

#[tokio::test]
async fn every_dependency_precedes_its_dependents() {
    let env = TestEnvironment::new();
    let resolver = resolver(
        &env,
        vec![
            formula("root", "1.0", &["x", "y"]),
            formula("x", "1.0", &["z"]),
            formula("y", "1.0", &["z", "w"]),
            formula("z", "1.0", &["w"]),
            formula("w", "1.0", &[]),
        ],
    );

    let plan = resolver.resolve("root").await.unwrap();

    for node in &plan {
        for dep in &node.formula.dependencies {
            assert!(
                position(&plan, dep) < position(&plan, &node.formula.name),
                "{} must precede {}",
                dep,
                node.formula.name
            );
        }
    }
}

#[tokio::test]
async fn installed_dependencies_are_flagged() {
    let env = TestEnvironment::new();
    let state = env.state();
    state
        .add(&chatr::InstalledPackage {
            name: "c".to_string(),
            version: "1.0".to_string(),
            revision: String::new(),
            url: String::new(),
            path: env.packages_dir.join("c/1.0"),
            binaries: Vec::new(),
            libs: Vec::new(),
            apps: Vec::new(),
            dependencies: Vec::new(),
            is_dep: true,
            is_cask: false,
            installed_at: Utc::now(),
        })
        .unwrap();

    let resolver = resolver(
        &env,
        vec![formula("a", "1.0", &["c"]), formula("c", "1.0", &[])],
    );

    let plan = resolver.resolve("a").await.unwrap();

    let c = &plan[position(&plan, "c")];
    assert!(c.is_dep);
    assert!(c.already_installed);

    // The root itself is never marked already-installed.
    let a = plan.last().unwrap();
    assert!(!a.already_installed);
}

#[tokio::test]
async fn missing_dependency_names_the_culprit() {
    let env = TestEnvironment::new();
    let resolver = resolver(&env, vec![formula("a", "1.0", &["ghost"])]);

    let err = resolver.resolve("a").await.unwrap_err();
    match err {
        ChatrError::Resolve { name, .. } => assert_eq!(name, "ghost"),
        other => panic!("expected Resolve error, got {other}"),
    }
}

#[tokio::test]
async fn cycle_is_reported() {
    let env = TestEnvironment::new();
    let resolver = resolver(
        &env,
        vec![
            formula("a", "1.0", &["b"]),
            formula("b", "1.0", &["a"]),
        ],
    );

    let err = resolver.resolve("a").await.unwrap_err();
    assert!(matches!(err, ChatrError::Cycle(_)));
}

#[tokio::test]
async fn dependency_free_root_resolves_alone() {
    let env = TestEnvironment::new();
    let resolver = resolver(&env, vec![formula("solo", "2.0", &[])]);

    let plan = resolver.resolve("solo").await.unwrap();
    assert_eq!(plan.len(), 1);
    assert!(!plan[0].is_dep);
    assert_eq!(plan[0].formula.version, "2.0");
}
