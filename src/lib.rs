pub mod builder;
pub mod config;
pub mod constants;
pub mod docker;
pub mod error;
pub mod filter;
pub mod graph;
pub mod image;
pub mod index;
pub mod logging;
pub mod resolver;
pub mod runtime;

pub use builder::{BuildPlan, Builder, Stage};
pub use config::{CliOverrides, DuplicatePolicy, FileConfig, RunOptions};
pub use error::{Action, BuildError, Result};
pub use graph::{BuildGraph, Node, NodeOrigin};
pub use image::{Image, ImageManifest};
pub use index::{DockerfileIndexer, ExcludeRules, ImageIndexer, StaticIndexer};
pub use resolver::{Resolver, Strategy};
pub use runtime::{CommandOutput, ContainerRuntime, DockerCli};
