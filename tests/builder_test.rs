use dockbuild::error::{Action, BuildError, Result};
use dockbuild::index::{ImageIndexer, StaticIndexer};
use dockbuild::logging::RunSummary;
use dockbuild::runtime::{CommandOutput, ContainerRuntime};
use dockbuild::{Builder, Image, ImageManifest, RunOptions, Stage};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::PathBuf;

/// Runtime double that records every call and fails the configured targets.
#[derive(Default)]
struct RecordingRuntime {
    calls: RefCell<Vec<(Action, String)>>,
    failing: HashSet<String>,
}

impl RecordingRuntime {
    fn failing(targets: &[&str]) -> Self {
        Self {
            failing: targets.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    fn record(&self, action: Action, target: String) -> Result<CommandOutput> {
        let failed = self.failing.contains(&target);
        self.calls.borrow_mut().push((action, target));
        if failed {
            Ok(CommandOutput::failure(1, "simulated failure"))
        } else {
            Ok(CommandOutput::success())
        }
    }

    fn calls(&self) -> Vec<(Action, String)> {
        self.calls.borrow().clone()
    }

    fn targets(&self, action: Action) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(a, _)| *a == action)
            .map(|(_, t)| t)
            .collect()
    }
}

impl ContainerRuntime for RecordingRuntime {
    fn pull(&self, reference: &str) -> Result<CommandOutput> {
        self.record(Action::Pull, reference.to_string())
    }

    fn build(&self, image: &Image) -> Result<CommandOutput> {
        self.record(Action::Build, image.name.clone())
    }

    fn push(&self, image: &Image, registry: &str) -> Result<CommandOutput> {
        let target = image
            .registry_reference(registry)
            .unwrap_or_else(|| image.name.clone());
        self.record(Action::Push, target)
    }
}

/// Indexer that counts how often it is asked for images.
struct CountingIndexer {
    inner: StaticIndexer,
    calls: Cell<usize>,
}

impl ImageIndexer for CountingIndexer {
    fn index(&self, dirs: &[PathBuf]) -> Result<Vec<Image>> {
        self.calls.set(self.calls.get() + 1);
        self.inner.index(dirs)
    }
}

fn image(name: &str, deps: &[&str]) -> Image {
    Image::new(name, deps.iter().copied())
}

fn pushable(name: &str, deps: &[&str]) -> Image {
    image(name, deps).with_manifest(ImageManifest {
        local_tag: Some(name.to_string()),
        registry_tag: Some(format!("team/{}", name)),
        ..Default::default()
    })
}

/// d(); c(d, remote2); a(c); e(a); b(d, remote1); f(a)
fn six_images() -> Vec<Image> {
    vec![
        image("d", &[]),
        image("c", &["d", "remote2"]),
        image("a", &["c"]),
        image("e", &["a"]),
        image("b", &["d", "remote1"]),
        image("f", &["a"]),
    ]
}

/// The six images plus h(); i(h); g(h)
fn nine_images() -> Vec<Image> {
    let mut images = six_images();
    images.extend([image("h", &[]), image("i", &["h"]), image("g", &["h"])]);
    images
}

fn options() -> RunOptions {
    RunOptions {
        directories: vec![PathBuf::from(".")],
        ..Default::default()
    }
}

fn resolved(images: Vec<Image>, runtime: &RecordingRuntime) -> Builder<&RecordingRuntime> {
    let mut builder = Builder::new(options(), runtime);
    builder.load_images(images).unwrap();
    builder.build_dependency_graph().unwrap();
    builder.resolve_dependencies().unwrap();
    builder
}

fn position(list: &[String], name: &str) -> usize {
    list.iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{} not in {:?}", name, list))
}

#[test]
fn test_full_resolve_with_remotes() {
    let runtime = RecordingRuntime::default();
    let builder = resolved(six_images(), &runtime);

    let local = builder.local_dependencies();
    assert_eq!(local.len(), 6);
    assert!(position(local, "d") < position(local, "c"));
    assert!(position(local, "c") < position(local, "a"));
    assert!(position(local, "a") < position(local, "e"));
    assert!(position(local, "a") < position(local, "f"));
    assert!(position(local, "d") < position(local, "b"));

    let remote: HashSet<&str> = builder.remote_dependencies().iter().map(String::as_str).collect();
    assert_eq!(remote, HashSet::from(["remote1", "remote2"]));
    assert_eq!(builder.stage(), Stage::Resolved);
}

#[test]
fn test_cycle_aborts_before_any_action() {
    let runtime = RecordingRuntime::default();
    let indexer = StaticIndexer::new(vec![
        image("a", &["b"]),
        image("b", &["c"]),
        image("c", &["a"]),
    ]);
    let mut builder = Builder::new(options(), &runtime);

    match builder.run(&indexer) {
        Err(BuildError::CyclicDependency { nodes }) => assert_eq!(nodes, vec!["a", "b", "c"]),
        other => panic!("expected a cycle error, got {:?}", other),
    }
    assert!(runtime.calls().is_empty());
    assert!(builder.local_dependencies().is_empty());
}

#[test]
fn test_resolve_single_dependency() {
    let runtime = RecordingRuntime::default();
    let mut builder = Builder::new(options(), &runtime);
    builder.load_images(nine_images()).unwrap();
    builder.build_dependency_graph().unwrap();
    builder.resolve_dependency("c").unwrap();

    let local = builder.local_dependencies();
    assert_eq!(local[0], "d");
    assert!(!local.iter().any(|n| n == "b"));
    let kept: HashSet<&str> = local.iter().map(String::as_str).collect();
    assert_eq!(kept, HashSet::from(["a", "c", "d", "e", "f"]));
    assert_eq!(builder.remote_dependencies(), ["remote2"]);
}

#[test]
fn test_filter_downstream() {
    let runtime = RecordingRuntime::default();
    let mut builder = resolved(nine_images(), &runtime);
    builder.filter_dependencies_downstream(&["a"]).unwrap();

    let local = builder.local_dependencies();
    assert_eq!(local[0], "a");
    let kept: HashSet<&str> = local.iter().map(String::as_str).collect();
    assert_eq!(kept, HashSet::from(["a", "e", "f"]));
    assert!(builder.remote_dependencies().is_empty());
    assert_eq!(builder.stage(), Stage::Filtered);
}

#[test]
fn test_filter_upstream_and_downstream() {
    let runtime = RecordingRuntime::default();
    let mut builder = resolved(nine_images(), &runtime);
    builder.filter_dependencies(&["c", "h"]).unwrap();

    let local = builder.local_dependencies();
    let kept: HashSet<&str> = local.iter().map(String::as_str).collect();
    assert_eq!(kept, HashSet::from(["a", "c", "d", "e", "f", "g", "h", "i"]));
    assert!(position(local, "d") < position(local, "c"));
    assert!(position(local, "h") < position(local, "i"));
    assert_eq!(builder.remote_dependencies(), ["remote2"]);
}

#[test]
fn test_filter_unknown_image() {
    let runtime = RecordingRuntime::default();
    let mut builder = resolved(six_images(), &runtime);
    assert!(matches!(
        builder.filter_dependencies(&["nope"]),
        Err(BuildError::UnknownImage(name)) if name == "nope"
    ));
    assert!(matches!(
        builder.filter_dependencies_downstream(&["remote1"]),
        Err(BuildError::UnknownImage(_))
    ));
}

#[test]
fn test_run_orders_pulls_builds_and_pushes() {
    let runtime = RecordingRuntime::default();
    let indexer = StaticIndexer::new(vec![
        pushable("base", &["alpine"]),
        pushable("app", &["base", "node:20"]),
        image("tools", &["base"]),
    ]);
    let options = RunOptions {
        push: true,
        registries: vec!["r1.example.com".to_string(), "r2.example.com/".to_string()],
        ..options()
    };
    let mut builder = Builder::new(options, &runtime);
    let summary = builder.run(&indexer).unwrap();

    let calls = runtime.calls();
    let last_pull = calls.iter().rposition(|(a, _)| *a == Action::Pull).unwrap();
    let first_build = calls.iter().position(|(a, _)| *a == Action::Build).unwrap();
    let last_build = calls.iter().rposition(|(a, _)| *a == Action::Build).unwrap();
    let first_push = calls.iter().position(|(a, _)| *a == Action::Push).unwrap();
    assert!(last_pull < first_build);
    assert!(last_build < first_push);

    let built = runtime.targets(Action::Build);
    assert_eq!(built[0], "base");
    assert_eq!(built.len(), 3);

    let pushed: HashSet<String> = runtime.targets(Action::Push).into_iter().collect();
    assert_eq!(
        pushed,
        HashSet::from([
            "r1.example.com/team/base".to_string(),
            "r2.example.com/team/base".to_string(),
            "r1.example.com/team/app".to_string(),
            "r2.example.com/team/app".to_string(),
        ])
    );

    assert_eq!(summary.pulled, 2);
    assert_eq!(summary.built, 3);
    assert_eq!(summary.pushed, 4);
    assert_eq!(summary.push_skipped, 1);
    assert!(summary.is_clean());
    assert_eq!(builder.stage(), Stage::Pushed);
}

#[test]
fn test_pull_failure_continues_by_default() {
    let runtime = RecordingRuntime::failing(&["alpine"]);
    let indexer = StaticIndexer::new(vec![image("base", &["alpine"])]);
    let mut builder = Builder::new(options(), &runtime);

    let summary = builder.run(&indexer).unwrap();
    assert_eq!(summary.pull_failures, 1);
    assert_eq!(summary.built, 1);
    assert_eq!(runtime.targets(Action::Build), ["base"]);
}

#[test]
fn test_pull_failure_aborts_when_configured() {
    let runtime = RecordingRuntime::failing(&["alpine"]);
    let indexer = StaticIndexer::new(vec![image("base", &["alpine"])]);
    let options = RunOptions {
        abort_on_pull_failure: true,
        ..options()
    };
    let mut builder = Builder::new(options, &runtime);

    let err = builder.run(&indexer).unwrap_err();
    assert!(matches!(
        err,
        BuildError::ExternalCommand { action: Action::Pull, ref target, code: 1, .. } if target == "alpine"
    ));
    assert!(runtime.targets(Action::Build).is_empty());
}

#[test]
fn test_build_failure_does_not_skip_dependents() {
    let runtime = RecordingRuntime::failing(&["base"]);
    let indexer = StaticIndexer::new(vec![image("base", &["alpine"]), image("app", &["base"])]);
    let mut builder = Builder::new(options(), &runtime);

    let summary = builder.run(&indexer).unwrap();
    assert_eq!(runtime.targets(Action::Build), ["base", "app"]);
    assert_eq!(summary.build_failures, 1);
    assert_eq!(summary.built, 1);
    assert_eq!(summary.failed[0].target, "base");
    assert!(!summary.is_clean());
}

#[test]
fn test_fail_fast_stops_at_first_build_failure() {
    let runtime = RecordingRuntime::failing(&["base"]);
    let indexer = StaticIndexer::new(vec![image("base", &["alpine"]), image("app", &["base"])]);
    let options = RunOptions {
        fail_fast: true,
        ..options()
    };
    let mut builder = Builder::new(options, &runtime);

    assert!(matches!(
        builder.run(&indexer),
        Err(BuildError::ExternalCommand { action: Action::Build, .. })
    ));
    assert_eq!(runtime.targets(Action::Build), ["base"]);
}

#[test]
fn test_configuration_checked_before_indexing() {
    let runtime = RecordingRuntime::default();
    let indexer = CountingIndexer {
        inner: StaticIndexer::new(six_images()),
        calls: Cell::new(0),
    };

    let mut builder = Builder::new(RunOptions::default(), &runtime);
    assert!(matches!(builder.run(&indexer), Err(BuildError::Configuration(_))));

    let options = RunOptions {
        push: true,
        ..options()
    };
    let mut builder = Builder::new(options, &runtime);
    assert!(matches!(builder.run(&indexer), Err(BuildError::Configuration(_))));

    assert_eq!(indexer.calls.get(), 0);
    assert!(runtime.calls().is_empty());
}

#[test]
fn test_stage_violations_are_rejected() {
    let runtime = RecordingRuntime::default();
    let mut builder = Builder::new(options(), &runtime);

    assert!(matches!(builder.resolve_dependencies(), Err(BuildError::InvalidStage { .. })));
    assert!(matches!(builder.pull_images(), Err(BuildError::InvalidStage { .. })));

    builder.load_images(six_images()).unwrap();
    assert!(matches!(
        builder.filter_dependencies(&["a"]),
        Err(BuildError::InvalidStage { .. })
    ));
    builder.build_dependency_graph().unwrap();
    builder.resolve_dependencies().unwrap();
    assert!(matches!(builder.push_images(), Err(BuildError::InvalidStage { .. })));
    assert!(runtime.calls().is_empty());
}

#[test]
fn test_plan_with_selection() {
    let runtime = RecordingRuntime::default();
    let indexer = StaticIndexer::new(nine_images());
    let options = RunOptions {
        images: vec!["a".to_string()],
        downstream: true,
        ..options()
    };
    let mut builder = Builder::new(options, &runtime);

    let plan = builder.plan(&indexer).unwrap();
    let kept: HashSet<&str> = plan.build.iter().map(String::as_str).collect();
    assert_eq!(kept, HashSet::from(["a", "e", "f"]));
    assert!(plan.pull.is_empty());
    assert!(plan.push.is_empty());
    assert!(runtime.calls().is_empty());
}

#[test]
fn test_repeated_steps_do_not_accumulate_counts() {
    let runtime = RecordingRuntime::failing(&["remote1"]);
    let mut builder = resolved(six_images(), &runtime);

    builder.pull_images().unwrap();
    builder.build_images().unwrap();
    builder.build_images().unwrap();
    assert_eq!(builder.summary().pulled, 1);
    assert_eq!(builder.summary().pull_failures, 1);
    assert_eq!(builder.summary().built, 6);
    assert_eq!(runtime.targets(Action::Build).len(), 12);

    builder.pull_images().unwrap();
    assert_eq!(builder.summary().pulled, 1);
    assert_eq!(builder.summary().built, 0);
    assert_eq!(builder.summary().failed.len(), 1);

    builder.filter_dependencies_downstream(&["a"]).unwrap();
    assert_eq!(builder.stage(), Stage::Filtered);
    assert_eq!(builder.summary(), &RunSummary::new());
}
