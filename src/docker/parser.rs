use crate::constants::SCRATCH_IMAGE;
use regex::Regex;
use std::sync::OnceLock;

/// The Dockerfile instructions that can reference another image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `FROM [--platform=..] <image> [AS <alias>]`
    From { image: String, alias: Option<String> },
    /// `COPY --from=<stage|image> ...`
    Copy { from: Option<String> },
    /// `RUN --mount=...,from=<stage|image> ...`
    Run { mount_from: Vec<String> },
    Other(String),
}

fn from_flag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--from=([^\s,]+)").expect("valid regex"))
}

fn mount_from() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--mount=\S*?\bfrom=([^\s,]+)").expect("valid regex"))
}

/// Splits a Dockerfile into logical lines, joining `\` continuations and
/// dropping comments and blank lines.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for raw in content.lines() {
        let line = raw.trim();
        if current.is_empty() && (line.is_empty() || line.starts_with('#')) {
            continue;
        }
        match line.strip_suffix('\\') {
            Some(head) => {
                current.push_str(head.trim_end());
                current.push(' ');
            }
            None => {
                current.push_str(line);
                lines.push(std::mem::take(&mut current));
            }
        }
    }
    if !current.trim().is_empty() {
        lines.push(current.trim().to_string());
    }
    lines
}

pub fn parse_dockerfile(content: &str) -> Vec<Instruction> {
    let mut instructions = Vec::new();

    for line in logical_lines(content) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0].to_uppercase().as_str() {
            "FROM" => {
                let args: Vec<&str> = parts[1..]
                    .iter()
                    .copied()
                    .filter(|p| !p.starts_with("--"))
                    .collect();
                if let Some(image) = args.first() {
                    let alias = match args.get(1) {
                        Some(kw) if kw.eq_ignore_ascii_case("as") => {
                            args.get(2).map(|a| a.to_string())
                        }
                        _ => None,
                    };
                    instructions.push(Instruction::From {
                        image: image.to_string(),
                        alias,
                    });
                }
            }
            "COPY" | "ADD" => {
                let from = from_flag()
                    .captures(&line)
                    .map(|caps| caps[1].to_string());
                instructions.push(Instruction::Copy { from });
            }
            "RUN" => {
                let mount_from = mount_from()
                    .captures_iter(&line)
                    .map(|caps| caps[1].to_string())
                    .collect();
                instructions.push(Instruction::Run { mount_from });
            }
            _ => instructions.push(Instruction::Other(line.to_string())),
        }
    }

    instructions
}

/// Returns the external images a Dockerfile needs, in first-seen order and
/// without duplicates.
///
/// Stage aliases declared earlier in the same file, numeric stage indices and
/// `scratch` are internal to the build and are not reported.
pub fn parse_dependencies(content: &str) -> Vec<String> {
    fn push(reference: &str, stages: &[String], deps: &mut Vec<String>) {
        let internal = reference.eq_ignore_ascii_case(SCRATCH_IMAGE)
            || reference.parse::<usize>().is_ok()
            || stages.iter().any(|s| s.eq_ignore_ascii_case(reference));
        if !internal && !deps.iter().any(|d| d == reference) {
            deps.push(reference.to_string());
        }
    }

    let mut stages: Vec<String> = Vec::new();
    let mut deps: Vec<String> = Vec::new();

    for instruction in parse_dockerfile(content) {
        match instruction {
            Instruction::From { image, alias } => {
                push(&image, &stages, &mut deps);
                if let Some(alias) = alias {
                    stages.push(alias);
                }
            }
            Instruction::Copy { from: Some(from) } => push(&from, &stages, &mut deps),
            Instruction::Run { mount_from } => {
                for from in mount_from {
                    push(&from, &stages, &mut deps);
                }
            }
            _ => {}
        }
    }

    deps
}
