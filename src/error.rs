/// dockbuild error types and handling utilities
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The external action a runtime invocation performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Pull,
    Build,
    Push,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pull => write!(f, "pull"),
            Self::Build => write!(f, "build"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// Main error type for dockbuild operations
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid or contradictory run options, detected before any indexing
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The dependency graph contains a cycle; `nodes` is the implicated set
    #[error("cyclic dependencies detected in nodes {{{}}}", .nodes.join(", "))]
    CyclicDependency { nodes: Vec<String> },

    /// A pull, build or push invocation failed and the run was asked to abort on it
    #[error("{action} failed for {target} (exit code {code}): {message}")]
    ExternalCommand {
        action: Action,
        target: String,
        code: i32,
        message: String,
    },

    /// A requested or referenced image is not part of the graph
    #[error("unknown image: {0}")]
    UnknownImage(String),

    /// Two definitions share the same image name
    #[error("duplicate image name {name}: defined in {} and {}", .first.display(), .second.display())]
    DuplicateImage {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// An image definition could not be turned into a complete `Image`
    #[error("invalid image definition at {}: {reason}", .path.display())]
    InvalidDefinition { path: PathBuf, reason: String },

    /// An orchestration step was invoked out of order
    #[error("cannot {operation} before the {required} stage (builder is at {current})")]
    InvalidStage {
        operation: &'static str,
        required: String,
        current: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;

/// Process exit code the CLI reports for an error.
pub fn exit_code(err: &BuildError) -> i32 {
    match err {
        BuildError::Configuration(_) | BuildError::Toml(_) => 2,
        BuildError::CyclicDependency { .. } => 3,
        BuildError::ExternalCommand { .. } => 4,
        BuildError::UnknownImage(_)
        | BuildError::DuplicateImage { .. }
        | BuildError::InvalidDefinition { .. } => 5,
        BuildError::InvalidStage { .. } | BuildError::Io(_) | BuildError::Json(_) => 1,
    }
}
