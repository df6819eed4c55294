//! Orchestration of a full run: index → graph → resolve → select → pull →
//! build → push.
//!
//! A [`Builder`] owns the image registry, the dependency graph and the
//! derived order for exactly one run. Each step requires the previous one to
//! have completed; going back to an earlier step discards everything derived
//! after it.

use crate::config::{DuplicatePolicy, RunOptions};
use crate::error::{Action, BuildError, Result};
use crate::filter;
use crate::graph::{BuildGraph, Node};
use crate::image::Image;
use crate::index::ImageIndexer;
use crate::logging::RunSummary;
use crate::resolver::{Resolver, Strategy};
use crate::runtime::{CommandOutput, ContainerRuntime};
use crate::{log_action_failed, log_action_start, log_run_complete};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    Created,
    Indexed,
    GraphBuilt,
    Resolved,
    Filtered,
    Pulled,
    Built,
    Pushed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Indexed => "indexed",
            Self::GraphBuilt => "graph built",
            Self::Resolved => "resolved",
            Self::Filtered => "filtered",
            Self::Pulled => "pulled",
            Self::Built => "built",
            Self::Pushed => "pushed",
        };
        f.write_str(name)
    }
}

/// What a run is going to do, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildPlan {
    pub pull: Vec<String>,
    pub build: Vec<String>,
    pub push: Vec<String>,
    pub registries: Vec<String>,
}

pub struct Builder<R: ContainerRuntime> {
    options: RunOptions,
    runtime: R,
    strategy: Strategy,
    images: Vec<Image>,
    image_index: HashMap<String, usize>,
    graph: BuildGraph,
    local_dependencies: Vec<String>,
    remote_dependencies: Vec<String>,
    stage: Stage,
    summary: RunSummary,
}

impl<R: ContainerRuntime> Builder<R> {
    pub fn new(options: RunOptions, runtime: R) -> Self {
        Self {
            options,
            runtime,
            strategy: Strategy::default(),
            images: Vec::new(),
            image_index: HashMap::new(),
            graph: BuildGraph::new(),
            local_dependencies: Vec::new(),
            remote_dependencies: Vec::new(),
            stage: Stage::Created,
            summary: RunSummary::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn image(&self, name: &str) -> Option<&Image> {
        self.image_index.get(name).map(|&idx| &self.images[idx])
    }

    /// Local images to build, dependency-first.
    pub fn local_dependencies(&self) -> &[String] {
        &self.local_dependencies
    }

    /// Referenced images to pull before building, dependency-first.
    pub fn remote_dependencies(&self) -> &[String] {
        &self.remote_dependencies
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    fn require(&self, operation: &'static str, required: Stage) -> Result<()> {
        if self.stage < required {
            return Err(BuildError::InvalidStage {
                operation,
                required: required.to_string(),
                current: self.stage.to_string(),
            });
        }
        Ok(())
    }

    // Moving to `stage` drops whatever was derived by later stages.
    fn enter(&mut self, stage: Stage) {
        if stage <= Stage::Indexed {
            self.graph = BuildGraph::new();
        }
        if stage < Stage::Pulled {
            self.summary = RunSummary::new();
        }
        if stage <= Stage::GraphBuilt {
            self.local_dependencies.clear();
            self.remote_dependencies.clear();
        }
        self.stage = stage;
    }

    /// Asks `indexer` for the images under the configured scan directories.
    pub fn index_images(&mut self, indexer: &dyn ImageIndexer) -> Result<()> {
        let images = indexer.index(&self.options.directories)?;
        self.load_images(images)
    }

    /// Registers already-indexed images, replacing any previous registry.
    pub fn load_images(&mut self, images: impl IntoIterator<Item = Image>) -> Result<()> {
        self.images.clear();
        self.image_index.clear();

        for image in images {
            match self.image_index.get(&image.name) {
                Some(&idx) => {
                    let previous = &self.images[idx];
                    if self.options.duplicates == DuplicatePolicy::Error {
                        return Err(BuildError::DuplicateImage {
                            name: image.name.clone(),
                            first: previous.dockerfile.clone(),
                            second: image.dockerfile.clone(),
                        });
                    }
                    tracing::warn!(
                        image = %image.name,
                        discarded = %previous.dockerfile.display(),
                        kept = %image.dockerfile.display(),
                        "Duplicate image name, keeping the later definition"
                    );
                    self.images[idx] = image;
                }
                None => {
                    self.image_index.insert(image.name.clone(), self.images.len());
                    self.images.push(image);
                }
            }
        }

        tracing::info!(count = self.images.len(), "Indexed images");
        self.enter(Stage::Indexed);
        Ok(())
    }

    /// One local node per image, one node per referenced identifier (local if
    /// it names an indexed image, remote otherwise), one edge per reference.
    pub fn build_dependency_graph(&mut self) -> Result<()> {
        self.require("build the dependency graph", Stage::Indexed)?;
        self.enter(Stage::Indexed);

        let mut graph = BuildGraph::new();
        for image in &self.images {
            if !graph.contains(&image.name) {
                graph.add_local(Node::local(&image.name));
            }
            for dep in &image.dependencies {
                if graph.contains(dep) {
                    continue;
                }
                if self.image_index.contains_key(dep) {
                    graph.add_local(Node::local(dep));
                } else {
                    graph.add_remote(Node::remote(dep));
                }
            }
            for dep in &image.dependencies {
                graph.add_edge(&image.name, dep)?;
            }
        }

        tracing::info!(
            nodes = graph.len(),
            local = graph.local_nodes().count(),
            remote = graph.remote_nodes().count(),
            "Built dependency graph"
        );
        self.graph = graph;
        self.enter(Stage::GraphBuilt);
        Ok(())
    }

    /// Orders the whole graph.
    pub fn resolve_dependencies(&mut self) -> Result<()> {
        self.require("resolve dependencies", Stage::GraphBuilt)?;
        self.enter(Stage::GraphBuilt);

        let order: Vec<String> = Resolver::new(&self.graph)
            .with_strategy(self.strategy)
            .resolve()?
            .into_iter()
            .map(|n| n.name.clone())
            .collect();
        self.partition(order);
        self.enter(Stage::Resolved);
        Ok(())
    }

    /// Orders only what building `name` involves: the image, everything
    /// built on top of it and all their prerequisites.
    pub fn resolve_dependency(&mut self, name: &str) -> Result<()> {
        self.require("resolve a dependency", Stage::GraphBuilt)?;
        self.ensure_local(name)?;
        self.enter(Stage::GraphBuilt);

        let order: Vec<String> = Resolver::new(&self.graph)
            .with_strategy(self.strategy)
            .resolve_nodes(&[name], false)?
            .into_iter()
            .map(|n| n.name)
            .collect();
        self.partition(order);
        self.enter(Stage::Resolved);
        Ok(())
    }

    /// Narrows the resolved order to `names` and everything downstream of
    /// them. Prerequisites, remote ones included, are assumed to exist.
    pub fn filter_dependencies_downstream(&mut self, names: &[&str]) -> Result<()> {
        self.require("filter dependencies", Stage::Resolved)?;
        for name in names {
            self.ensure_local(name)?;
        }

        let closure_graph = filter::downstream(&self.graph, names)?;
        let closure = names_of(&closure_graph);
        let start = names
            .iter()
            .filter_map(|name| self.local_dependencies.iter().position(|d| d == name))
            .min();
        let Some(start) = start else {
            tracing::warn!(images = ?names, "Requested images are not part of the resolved order");
            self.local_dependencies.clear();
            self.remote_dependencies.clear();
            self.enter(Stage::Filtered);
            return Ok(());
        };

        self.local_dependencies = self.local_dependencies[start..]
            .iter()
            .filter(|d| closure.contains(d.as_str()))
            .cloned()
            .collect();
        self.remote_dependencies.clear();
        tracing::info!(images = ?self.local_dependencies, "Selected downstream images");
        self.enter(Stage::Filtered);
        Ok(())
    }

    /// Narrows the resolved order to `names`, their prerequisites and
    /// everything downstream of them. Only the prerequisites' remote images
    /// are kept for pulling.
    pub fn filter_dependencies(&mut self, names: &[&str]) -> Result<()> {
        self.require("filter dependencies", Stage::Resolved)?;
        for name in names {
            self.ensure_local(name)?;
        }

        let upstream_graph = filter::upstream(&self.graph, names)?;
        let downstream_graph = filter::downstream(&self.graph, names)?;
        let upstream = names_of(&upstream_graph);
        let downstream = names_of(&downstream_graph);

        self.local_dependencies
            .retain(|d| upstream.contains(d.as_str()) || downstream.contains(d.as_str()));
        self.remote_dependencies
            .retain(|d| upstream.contains(d.as_str()));
        tracing::info!(
            images = ?self.local_dependencies,
            remote = ?self.remote_dependencies,
            "Selected images"
        );
        self.enter(Stage::Filtered);
        Ok(())
    }

    /// Pulls every remote dependency, in order.
    pub fn pull_images(&mut self) -> Result<()> {
        self.require("pull images", Stage::Resolved)?;

        self.summary.discard(&[Action::Pull, Action::Build, Action::Push]);
        for reference in self.remote_dependencies.clone() {
            log_action_start!(Action::Pull, reference);
            let outcome = self.runtime.pull(&reference);
            self.settle(Action::Pull, &reference, outcome, self.options.abort_on_pull_failure)?;
        }

        self.stage = Stage::Pulled;
        Ok(())
    }

    /// Builds every local dependency, in order. A failed build does not stop
    /// its dependents from being attempted unless `fail_fast` is set.
    pub fn build_images(&mut self) -> Result<()> {
        self.require("build images", Stage::Pulled)?;
        self.summary.discard(&[Action::Build, Action::Push]);

        for name in self.local_dependencies.clone() {
            let idx = *self
                .image_index
                .get(&name)
                .ok_or_else(|| BuildError::UnknownImage(name.clone()))?;
            log_action_start!(Action::Build, name);
            let outcome = self.runtime.build(&self.images[idx]);
            self.settle(Action::Build, &name, outcome, self.options.fail_fast)?;
        }

        self.stage = Stage::Built;
        Ok(())
    }

    /// Pushes every built image to every registry. Images without both a
    /// local and a registry tag are skipped.
    pub fn push_images(&mut self) -> Result<()> {
        self.require("push images", Stage::Built)?;
        self.summary.discard(&[Action::Push]);
        if !self.options.push {
            tracing::debug!("Push disabled, skipping");
            return Ok(());
        }
        if self.options.registries.is_empty() {
            return Err(BuildError::Configuration(
                "push is enabled but no registries are configured".to_string(),
            ));
        }

        for name in self.local_dependencies.clone() {
            let idx = *self
                .image_index
                .get(&name)
                .ok_or_else(|| BuildError::UnknownImage(name.clone()))?;
            if !self.images[idx].is_pushable() {
                tracing::debug!(image = %name, "Not pushing, local or registry tag missing");
                self.summary.push_skipped += 1;
                continue;
            }

            for registry in self.options.registries.clone() {
                let target = format!("{} -> {}", name, registry);
                log_action_start!(Action::Push, target);
                let outcome = self.runtime.push(&self.images[idx], &registry);
                self.settle(Action::Push, &name, outcome, self.options.fail_fast)?;
            }
        }

        self.stage = Stage::Pushed;
        Ok(())
    }

    /// Runs everything up to selection and reports what would be executed.
    pub fn plan(&mut self, indexer: &dyn ImageIndexer) -> Result<BuildPlan> {
        self.options.validate()?;
        self.index_images(indexer)?;
        self.build_dependency_graph()?;
        self.resolve_dependencies()?;

        let selected = self.options.images.clone();
        if !selected.is_empty() {
            let names: Vec<&str> = selected.iter().map(String::as_str).collect();
            if self.options.downstream {
                self.filter_dependencies_downstream(&names)?;
            } else {
                self.filter_dependencies(&names)?;
            }
        }

        let push = if self.options.push {
            self.local_dependencies
                .iter()
                .filter(|name| self.image(name).is_some_and(Image::is_pushable))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Ok(BuildPlan {
            pull: self.remote_dependencies.clone(),
            build: self.local_dependencies.clone(),
            push,
            registries: if self.options.push {
                self.options.registries.clone()
            } else {
                Vec::new()
            },
        })
    }

    /// Plans and executes a complete run.
    pub fn run(&mut self, indexer: &dyn ImageIndexer) -> Result<RunSummary> {
        let start = Instant::now();
        let plan = self.plan(indexer)?;
        tracing::info!(
            pull = plan.pull.len(),
            build = plan.build.len(),
            push = plan.push.len(),
            "Executing build plan"
        );

        self.pull_images()?;
        self.build_images()?;
        self.push_images()?;

        self.summary.total_duration_ms = start.elapsed().as_millis() as u64;
        log_run_complete!(self.summary);
        Ok(self.summary.clone())
    }

    fn ensure_local(&self, name: &str) -> Result<()> {
        if self.image_index.contains_key(name) && self.graph.is_local(name) {
            Ok(())
        } else {
            Err(BuildError::UnknownImage(name.to_string()))
        }
    }

    fn partition(&mut self, order: Vec<String>) {
        let mut seen = HashSet::new();
        self.local_dependencies.clear();
        self.remote_dependencies.clear();

        for name in order {
            if !seen.insert(name.clone()) {
                continue;
            }
            if self.graph.is_local(&name) {
                self.local_dependencies.push(name);
            } else {
                self.remote_dependencies.push(name);
            }
        }

        tracing::debug!(
            local = ?self.local_dependencies,
            remote = ?self.remote_dependencies,
            "Resolved dependency order"
        );
    }

    // Records the outcome of one runtime call; fails only when `abort` is set.
    fn settle(
        &mut self,
        action: Action,
        target: &str,
        outcome: Result<CommandOutput>,
        abort: bool,
    ) -> Result<()> {
        let (code, message) = match outcome {
            Ok(output) if output.is_success() => {
                self.summary.record_success(action);
                return Ok(());
            }
            Ok(output) => (output.exit_code, output.diagnostics()),
            Err(e) => (-1, e.to_string()),
        };

        log_action_failed!(action, target, code, message);
        self.summary.record_failure(action, target, code);

        if abort {
            return Err(BuildError::ExternalCommand {
                action,
                target: target.to_string(),
                code,
                message,
            });
        }
        Ok(())
    }
}

fn names_of(graph: &BuildGraph) -> HashSet<&str> {
    graph.iter().map(|n| n.name.as_str()).collect()
}
