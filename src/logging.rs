//! Structured logging and run accounting for dockbuild

use crate::error::Action;
use serde::Serialize;
use std::io;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Initialize structured logging with optional JSON output. `RUST_LOG`
/// overrides `level` when set.
pub fn init_logging(level: &str, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("dockbuild={}", level)))?;

    let registry = Registry::default().with(env_filter);

    if json_output {
        // JSON output for structured logging aggregation
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    }

    Ok(())
}

/// Counters for the external actions of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub pulled: u64,
    pub pull_failures: u64,
    pub built: u64,
    pub build_failures: u64,
    pub pushed: u64,
    pub push_failures: u64,
    /// Images left out of the push because they lack tag metadata
    pub push_skipped: u64,
    pub failed: Vec<FailedAction>,
    pub total_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAction {
    pub action: Action,
    pub target: String,
    pub exit_code: i32,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, action: Action) {
        match action {
            Action::Pull => self.pulled += 1,
            Action::Build => self.built += 1,
            Action::Push => self.pushed += 1,
        }
    }

    pub fn record_failure(&mut self, action: Action, target: &str, exit_code: i32) {
        match action {
            Action::Pull => self.pull_failures += 1,
            Action::Build => self.build_failures += 1,
            Action::Push => self.push_failures += 1,
        }
        self.failed.push(FailedAction {
            action,
            target: target.to_string(),
            exit_code,
        });
    }

    /// Forgets every success and failure recorded for `actions`.
    pub fn discard(&mut self, actions: &[Action]) {
        for action in actions {
            match action {
                Action::Pull => (self.pulled, self.pull_failures) = (0, 0),
                Action::Build => (self.built, self.build_failures) = (0, 0),
                Action::Push => {
                    (self.pushed, self.push_failures) = (0, 0);
                    self.push_skipped = 0;
                }
            }
        }
        self.failed.retain(|f| !actions.contains(&f.action));
    }

    pub fn failures(&self) -> u64 {
        self.pull_failures + self.build_failures + self.push_failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }

    pub fn success_rate(&self) -> f64 {
        let ok = self.pulled + self.built + self.pushed;
        let total = ok + self.failures();
        if total == 0 {
            0.0
        } else {
            (ok as f64) / (total as f64)
        }
    }
}

#[macro_export]
macro_rules! log_action_start {
    ($action:expr, $target:expr) => {
        tracing::info!(action = %$action, image = %$target, "Starting");
    };
}

#[macro_export]
macro_rules! log_action_failed {
    ($action:expr, $target:expr, $code:expr, $message:expr) => {
        tracing::error!(
            action = %$action,
            image = %$target,
            exit_code = $code,
            output = %$message,
            "Action failed"
        );
    };
}

#[macro_export]
macro_rules! log_run_complete {
    ($summary:expr) => {
        tracing::info!(
            duration_ms = $summary.total_duration_ms,
            pulled = $summary.pulled,
            built = $summary.built,
            pushed = $summary.pushed,
            failures = $summary.failures(),
            "Run completed"
        );
    };
}
