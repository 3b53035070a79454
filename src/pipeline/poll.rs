//! Workflow polling: a bounded retry primitive plus the run state machine.
//!
//! ```text
//!            ┌── "completed" ──▶ Completed
//! Pending ───┼── "failed" ─────▶ Failed
//!   ▲  │     └── cap reached ───▶ TimedOut
//!   └──┘ anything else
//! ```
//!
//! [`poll_bounded`] knows nothing about workflows: it waits `interval`, runs
//! one tick, and stops on the first [`Step::Done`], the first error, or after
//! `max_attempts` ticks. The workflow-specific part is the pure predicate
//! [`terminal_step`] over a status snapshot.
//!
//! A failed status query is fatal. It is not retried, so one transient
//! transport error ends the whole flow.

use crate::client::{RunSnapshot, WorkflowClient};
use crate::config::ForgeConfig;
use crate::error::ForgeError;
use crate::progress::ProgressCallback;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// How often and how many times to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSchedule {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn from_config(config: &ForgeConfig) -> Self {
        Self::new(config.poll_interval, config.max_attempts)
    }

    /// Longest time the schedule can wait: `max_attempts × interval`.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// Not done yet; tick again after the interval.
    Continue,
    /// Terminal; stop polling.
    Done(T),
}

/// Outcome of a whole polling session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    Done { value: T, attempts: u32 },
    Exhausted { attempts: u32 },
}

/// Run `tick` up to `schedule.max_attempts` times, sleeping `schedule.interval`
/// before each call.
///
/// `tick` receives the 1-indexed attempt number. An `Err` from `tick` aborts
/// immediately and is returned as-is.
pub async fn poll_bounded<T, E, F, Fut>(schedule: PollSchedule, mut tick: F) -> Result<Polled<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Step<T>, E>>,
{
    for attempt in 1..=schedule.max_attempts {
        sleep(schedule.interval).await;
        if let Step::Done(value) = tick(attempt).await? {
            return Ok(Polled::Done {
                value,
                attempts: attempt,
            });
        }
    }
    Ok(Polled::Exhausted {
        attempts: schedule.max_attempts,
    })
}

/// Terminal-state predicate: `Completed` and `Failed` stop the loop.
pub fn terminal_step(snapshot: RunSnapshot) -> Step<RunSnapshot> {
    if snapshot.status.is_terminal() {
        Step::Done(snapshot)
    } else {
        Step::Continue
    }
}

/// Terminal state of a polled run.
#[derive(Debug, Clone)]
pub enum RunState {
    Completed {
        attempts: u32,
        output: Map<String, Value>,
    },
    Failed {
        attempts: u32,
        detail: String,
    },
    TimedOut {
        attempts: u32,
    },
}

impl RunState {
    pub fn attempts(&self) -> u32 {
        match self {
            RunState::Completed { attempts, .. }
            | RunState::Failed { attempts, .. }
            | RunState::TimedOut { attempts } => *attempts,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunState::Completed { .. } => "completed",
            RunState::Failed { .. } => "failed",
            RunState::TimedOut { .. } => "timed out",
        }
    }

    /// Turn the terminal state into the completed output mapping or the
    /// matching error.
    pub fn into_output(
        self,
        run_id: &str,
        schedule: &PollSchedule,
    ) -> Result<Map<String, Value>, ForgeError> {
        match self {
            RunState::Completed { output, .. } => Ok(output),
            RunState::Failed { detail, .. } => Err(ForgeError::ProcessingFailed {
                run_id: run_id.to_string(),
                detail,
            }),
            RunState::TimedOut { attempts } => Err(ForgeError::Timeout {
                run_id: run_id.to_string(),
                attempts,
                elapsed_secs: schedule.budget().as_secs(),
            }),
        }
    }
}

/// Poll `run_id` until it completes, fails, or the schedule runs out.
pub async fn poll_run(
    client: &WorkflowClient,
    run_id: &str,
    schedule: PollSchedule,
    progress: Option<&ProgressCallback>,
) -> Result<RunState, ForgeError> {
    let polled = poll_bounded(schedule, |attempt| async move {
        let snapshot = client.run_status(run_id, attempt).await?;
        info!(
            "Run {}: status '{}' (attempt {}/{})",
            run_id, snapshot.status, attempt, schedule.max_attempts
        );
        if let Some(cb) = progress {
            cb.on_poll(attempt, schedule.max_attempts, snapshot.status.as_str());
        }
        Ok::<_, ForgeError>(terminal_step(snapshot))
    })
    .await?;

    let state = match polled {
        Polled::Done { value, attempts } => {
            if value.status.is_failed() {
                let detail = value
                    .error
                    .unwrap_or_else(|| "Workflow execution failed".to_string());
                warn!("Run {} failed after {} attempts: {}", run_id, attempts, detail);
                RunState::Failed { attempts, detail }
            } else {
                info!("Run {} completed after {} attempts", run_id, attempts);
                RunState::Completed {
                    attempts,
                    output: value.output,
                }
            }
        }
        Polled::Exhausted { attempts } => {
            warn!(
                "Run {} still pending after {} attempts ({:?})",
                run_id,
                attempts,
                schedule.budget()
            );
            RunState::TimedOut { attempts }
        }
    };

    if let Some(cb) = progress {
        cb.on_run_finished(&state);
    }
    Ok(state)
}
