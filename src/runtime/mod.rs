use crate::error::Result;
use crate::image::Image;

pub mod docker;

pub use docker::DockerCli;

/// Outcome of one blocking runtime invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Diagnostic text for logs: stderr if there is any, stdout otherwise.
    pub fn diagnostics(&self) -> String {
        let bytes = if self.stderr.iter().any(|b| !b.is_ascii_whitespace()) {
            &self.stderr
        } else {
            &self.stdout
        };
        String::from_utf8_lossy(bytes).trim().to_string()
    }
}

/// Container runtime operations the builder drives. Every call blocks until
/// the underlying command has finished. `Err` means the command could not be
/// run at all; a command that ran and failed returns a non-zero exit code.
pub trait ContainerRuntime {
    fn pull(&self, reference: &str) -> Result<CommandOutput>;
    fn build(&self, image: &Image) -> Result<CommandOutput>;
    fn push(&self, image: &Image, registry: &str) -> Result<CommandOutput>;
}

impl<R: ContainerRuntime + ?Sized> ContainerRuntime for &R {
    fn pull(&self, reference: &str) -> Result<CommandOutput> {
        (**self).pull(reference)
    }

    fn build(&self, image: &Image) -> Result<CommandOutput> {
        (**self).build(image)
    }

    fn push(&self, image: &Image, registry: &str) -> Result<CommandOutput> {
        (**self).push(image, registry)
    }
}
