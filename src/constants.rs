// Centralized constants for dockbuild

/// File name that marks a directory as an image definition
pub const DEFINITION_FILE_NAME: &str = "Dockerfile";

/// Optional per-image metadata file, next to the definition
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "dockbuild.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DOCKBUILD_CONFIG";

/// Log level used when neither the config nor the CLI sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Container CLI invoked by the default runtime client
pub const DEFAULT_DOCKER_BINARY: &str = "docker";

/// Base reference meaning "no parent image"
pub const SCRATCH_IMAGE: &str = "scratch";
