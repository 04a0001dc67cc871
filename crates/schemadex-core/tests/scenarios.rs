//! End-to-end behaviour of the analysis pass on small hand-built graphs.

use schemadex_core::{
    BuildCoordinates, GraphError, IndexNodePool, LivenessReason, NodeId, PlatformModule,
};

fn module(pool: &IndexNodePool, project: &str) -> NodeId {
    let identity = pool.identity(
        &BuildCoordinates::new("demo", "com.example", "1.0"),
        project,
        &PlatformModule::new("main", "main"),
    );
    pool.node(&identity)
}

fn live(pool: &IndexNodePool, id: NodeId) {
    pool.add_liveness(id, LivenessReason::HasSource)
        .expect("population phase");
}

fn all_dependencies(pool: &IndexNodePool, id: NodeId) -> Vec<NodeId> {
    pool.get(id)
        .and_then(|node| node.all_dependencies().cloned())
        .map(|set| set.into_iter().collect())
        .unwrap_or_default()
}

fn compressed(pool: &IndexNodePool, id: NodeId) -> Vec<NodeId> {
    pool.get(id)
        .and_then(|node| node.compressed_dependencies().cloned())
        .map(|set| set.into_iter().collect())
        .unwrap_or_default()
}

fn is_deleted(pool: &IndexNodePool, id: NodeId) -> bool {
    pool.get(id).is_some_and(|node| node.is_deleted())
}

#[test]
fn required_module_with_source_stays_live() {
    let mut pool = IndexNodePool::new();
    let a = module(&pool, ":a");
    let b = module(&pool, ":b");
    pool.require(a, b).expect("require");
    pool.add_liveness(a, LivenessReason::HasDependencies)
        .expect("reason");
    pool.add_liveness(b, LivenessReason::IsDependency)
        .expect("reason");
    live(&pool, b);

    let report = pool.analyze().expect("analyze");

    assert_eq!(all_dependencies(&pool, a), vec![b]);
    assert_eq!(compressed(&pool, a), vec![b]);
    assert!(pool.is_live(a));
    assert!(pool.is_live(b));
    assert_eq!(report.live, 2);
    assert_eq!(report.deleted, 0);
}

#[test]
fn empty_include_is_deleted_and_takes_its_aggregator_along() {
    let mut pool = IndexNodePool::new();
    let c = module(&pool, ":c");
    let d = module(&pool, ":d");
    pool.include(c, d).expect("include");
    pool.add_liveness(c, LivenessReason::HasIncludes)
        .expect("reason");

    let report = pool.analyze().expect("analyze");

    assert!(is_deleted(&pool, d));
    assert!(is_deleted(&pool, c));
    assert_eq!(report.live, 0);
    assert_eq!(report.deleted, 2);
    let c_identity = pool.identity_of(c).expect("identity");
    assert_eq!(pool.deleted_node(&c_identity), Some(c));
}

#[test]
fn include_already_reached_through_a_require_is_compressed_away() {
    let mut pool = IndexNodePool::new();
    let e = module(&pool, ":e");
    let f = module(&pool, ":f");
    let g = module(&pool, ":g");
    pool.require(e, f).expect("require");
    pool.require(g, e).expect("require");
    pool.include(g, f).expect("include");
    for id in [e, f, g] {
        live(&pool, id);
    }

    pool.analyze().expect("analyze");

    assert_eq!(compressed(&pool, g), vec![e]);
    assert_eq!(all_dependencies(&pool, g), vec![e, f]);
}

#[test]
fn two_module_cycle_names_both_ends() {
    let mut pool = IndexNodePool::new();
    let x = module(&pool, ":x");
    let y = module(&pool, ":y");
    pool.require(x, y).expect("require");
    pool.require(y, x).expect("require");
    live(&pool, x);
    live(&pool, y);

    let err = pool.analyze().expect_err("cycle");
    let GraphError::CycleDetected { from, to } = &err else {
        panic!("expected a cycle, got {err}");
    };
    let mut ends = [from.project_path(), to.project_path()];
    ends.sort_unstable();
    assert_eq!(ends, [":x", ":y"]);
    assert!(err.to_string().contains("demo:x@main:main"));
    assert!(err.to_string().contains("demo:y@main:main"));
}

#[test]
fn self_dependency_is_rejected_before_analysis() {
    let pool = IndexNodePool::new();
    let x = module(&pool, ":x");
    let err = pool.require(x, x).expect_err("self edge");
    assert!(matches!(err, GraphError::SelfDependency { .. }));
    assert_eq!(err.to_string(), "demo:x@main:main cannot depend on itself");
}

#[test]
fn deletion_cascades_through_chains_of_aggregators() {
    let mut pool = IndexNodePool::new();
    let app = module(&pool, ":app");
    let outer = module(&pool, ":outer");
    let inner = module(&pool, ":inner");
    let empty = module(&pool, ":empty");
    let lib = module(&pool, ":lib");
    pool.include(app, outer).expect("include");
    pool.include(outer, inner).expect("include");
    pool.include(inner, empty).expect("include");
    pool.require(app, lib).expect("require");
    live(&pool, app);
    pool.add_liveness(lib, LivenessReason::IsDependency)
        .expect("reason");
    for id in [outer, inner] {
        pool.add_liveness(id, LivenessReason::HasIncludes)
            .expect("reason");
    }

    pool.analyze().expect("analyze");

    for id in [outer, inner, empty] {
        assert!(is_deleted(&pool, id));
    }
    assert!(!is_deleted(&pool, app));
    assert_eq!(compressed(&pool, app), vec![lib]);
    let lib_node = pool.get(lib).expect("lib");
    assert_eq!(lib_node.outgoing().iter().copied().collect::<Vec<_>>(), vec![app]);
}

#[test]
fn aggregator_of_live_modules_survives_while_referenced() {
    let mut pool = IndexNodePool::new();
    let app = module(&pool, ":app");
    let bundle = module(&pool, ":bundle");
    let left = module(&pool, ":left");
    let right = module(&pool, ":right");
    pool.include(app, bundle).expect("include");
    pool.include(bundle, left).expect("include");
    pool.include(bundle, right).expect("include");
    live(&pool, app);
    live(&pool, left);
    live(&pool, right);
    pool.add_liveness(bundle, LivenessReason::HasIncludes)
        .expect("reason");

    pool.analyze().expect("analyze");

    assert!(pool.is_live(bundle));
    assert_eq!(compressed(&pool, bundle), vec![left, right]);
    assert_eq!(compressed(&pool, app), vec![bundle]);
}
