//! Test stages and the PASS/FAIL roll-up.
//!
//! A run executes the selected [`Stage`]s in order against one transport.
//! Each stage aggregates its scenarios into a single verdict; a failed
//! scenario never stops the stage, but an [`HarnessError`] aborts the run.

/// Accepted/rejected value tables.
pub mod data_driven;
/// Ordered device-state scenarios.
pub mod flow;
/// Malformed input and stress.
pub mod robustness;

use crate::config::HarnessConfig;
use crate::engine::Engine;
use crate::error::{AppResult, HarnessError};
use crate::transport::Transport;
use std::fmt;
use tracing::{error, info, info_span};

/// Process exit code when every selected stage passed.
pub const EXIT_PASSED: i32 = 0;
/// Process exit code when at least one stage failed.
pub const EXIT_FAILED: i32 = 1;
/// Process exit code for a transport or timeout error.
pub const EXIT_ABORTED: i32 = 2;

/// One selectable test stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Stage {
    /// Accepted/rejected value tables per parameter
    DataDriven,
    /// Ordered device-state scenarios
    Flow,
    /// Malformed input, busy writes and buffer saturation
    Robustness,
}

impl Stage {
    /// Every stage in the default run order.
    pub const ALL: [Stage; 3] = [Stage::DataDriven, Stage::Flow, Stage::Robustness];

    /// Banner title.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::DataDriven => "Data Driven Tests",
            Stage::Flow => "Flow States Testing",
            Stage::Robustness => "Robustness Testing",
        }
    }

    fn run<T: Transport + ?Sized>(&self, engine: &mut Engine<'_, T>, config: &HarnessConfig) -> AppResult<bool> {
        match self {
            Stage::DataDriven => data_driven::run(engine, config),
            Stage::Flow => flow::run(engine, config),
            Stage::Robustness => robustness::run(engine, config),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verdicts of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteReport {
    /// Verdict per stage, in run order.
    pub stages: Vec<(Stage, bool)>,
}

impl SuiteReport {
    /// True when every stage passed.
    pub fn passed(&self) -> bool {
        self.stages.iter().all(|(_, passed)| *passed)
    }

    /// Verdict of `stage`, `None` if it did not run.
    pub fn stage(&self, stage: Stage) -> Option<bool> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, passed)| *passed)
    }

    /// [`EXIT_PASSED`] or [`EXIT_FAILED`].
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            EXIT_PASSED
        } else {
            EXIT_FAILED
        }
    }
}

/// Exit code for an error that aborted the run.
pub fn exit_code_for(error: &HarnessError) -> i32 {
    if error.is_transport() || error.is_timeout() {
        EXIT_ABORTED
    } else {
        EXIT_FAILED
    }
}

/// Runs `stages` in order. An empty selection runs all of them.
pub fn run<T: Transport + ?Sized>(
    transport: &mut T,
    config: &HarnessConfig,
    stages: &[Stage],
) -> AppResult<SuiteReport> {
    let selected: &[Stage] = if stages.is_empty() { &Stage::ALL } else { stages };
    info!(endpoint = %transport.describe(), stages = selected.len(), "Starting functional tests");

    let mut engine = Engine::new(transport, config);
    let mut report = SuiteReport::default();
    for stage in selected {
        let span = info_span!("stage", name = stage.name());
        let _guard = span.enter();

        info!("{}", stage);
        let passed = stage.run(&mut engine, config)?;
        if passed {
            info!("TEST PASSED");
        } else {
            error!("TEST FAILED");
        }
        report.stages.push((*stage, passed));
    }
    Ok(report)
}

/// Runs one named scenario inside its own span and logs a failed verdict.
pub(crate) fn scenario<F>(name: &str, body: F) -> AppResult<bool>
where
    F: FnOnce() -> AppResult<bool>,
{
    let span = info_span!("scenario", name);
    let _guard = span.enter();
    info!("-------- {} --------", name);
    let passed = body()?;
    if !passed {
        error!("Scenario failed");
    }
    Ok(passed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_roll_up() {
        let mut report = SuiteReport::default();
        assert!(report.passed());
        report.stages.push((Stage::DataDriven, true));
        report.stages.push((Stage::Flow, false));
        assert!(!report.passed());
        assert_eq!(report.exit_code(), EXIT_FAILED);
        assert_eq!(report.stage(Stage::DataDriven), Some(true));
        assert_eq!(report.stage(Stage::Robustness), None);
    }

    #[test]
    fn aborts_map_to_their_own_exit_code() {
        assert_eq!(exit_code_for(&HarnessError::SerialUnexpectedEof), EXIT_ABORTED);
        let timeout = HarnessError::DeviceUnresponsive {
            waited_for: "STATUS IDLE".into(),
            attempts: 1,
            elapsed: std::time::Duration::ZERO,
        };
        assert_eq!(exit_code_for(&timeout), EXIT_ABORTED);
        assert_eq!(exit_code_for(&HarnessError::Configuration("x".into())), EXIT_FAILED);
    }
}
