use crate::constants::DEFAULT_DOCKER_BINARY;
use crate::error::Result;
use crate::image::Image;
use crate::runtime::{CommandOutput, ContainerRuntime};
use std::path::Path;
use std::process::Command;

/// Runtime client backed by the `docker` command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_BINARY)
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for `docker build`, in invocation order.
    pub fn build_args(image: &Image) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        let local_tag = image.manifest.local_tag.as_ref();
        for (option, value) in &image.manifest.arguments {
            // `local_tag` replaces any tag given as an argument.
            if local_tag.is_some() && (option == "-t" || option == "--tag") {
                continue;
            }
            args.push(option.clone());
            if !value.is_empty() {
                args.push(value.clone());
            }
        }
        if let Some(tag) = local_tag {
            args.push("-t".to_string());
            args.push(tag.clone());
        }
        if let Some(file) = image.dockerfile.file_name() {
            args.push("-f".to_string());
            args.push(file.to_string_lossy().into_owned());
        }
        args.push(".".to_string());
        args
    }

    fn docker(&self, args: &[String], dir: Option<&Path>) -> Result<CommandOutput> {
        tracing::debug!(binary = %self.binary, args = ?args, "Running container command");
        let mut command = Command::new(&self.binary);
        command.args(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        let output = command.output()?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    // Hook scripts run through the shell, in the image directory; the first
    // failing script stops the rest.
    fn run_scripts(&self, image: &Image, phase: &str, scripts: &[String]) -> Result<CommandOutput> {
        for script in scripts {
            tracing::info!(image = %image.name, phase, script = %script, "Running build hook");
            let output = if cfg!(target_os = "windows") {
                Command::new("cmd")
                    .arg("/C")
                    .arg(script)
                    .current_dir(&image.context_dir)
                    .output()?
            } else {
                Command::new("sh")
                    .arg("-c")
                    .arg(script)
                    .current_dir(&image.context_dir)
                    .output()?
            };

            if !output.status.success() {
                return Ok(CommandOutput {
                    exit_code: output.status.code().unwrap_or(1),
                    stdout: output.stdout,
                    stderr: output.stderr,
                });
            }
        }
        Ok(CommandOutput::success())
    }
}

impl ContainerRuntime for DockerCli {
    fn pull(&self, reference: &str) -> Result<CommandOutput> {
        self.docker(&["pull".to_string(), reference.to_string()], None)
    }

    fn build(&self, image: &Image) -> Result<CommandOutput> {
        let pre = self.run_scripts(image, "pre_build", &image.manifest.pre_build)?;
        if !pre.is_success() {
            return Ok(pre);
        }

        let output = self.docker(&Self::build_args(image), Some(&image.context_dir))?;
        if !output.is_success() {
            return Ok(output);
        }

        let post = self.run_scripts(image, "post_build", &image.manifest.post_build)?;
        if !post.is_success() {
            return Ok(post);
        }
        Ok(output)
    }

    fn push(&self, image: &Image, registry: &str) -> Result<CommandOutput> {
        let (Some(local_tag), Some(target)) = (
            image.manifest.local_tag.clone(),
            image.registry_reference(registry),
        ) else {
            // Callers check `is_pushable` first; nothing to do otherwise.
            return Ok(CommandOutput::success());
        };

        let tagged = self.docker(&["tag".to_string(), local_tag, target.clone()], None)?;
        if !tagged.is_success() {
            return Ok(tagged);
        }
        self.docker(&["push".to_string(), target], None)
    }
}
