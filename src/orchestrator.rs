//! The generation task orchestrator.
//!
//! Two entry points share the same primitives:
//! - [`Orchestrator::start`] submits and returns at once; the caller polls
//!   [`Orchestrator::poll`] on its own schedule (see [`ClientPollPlan`]).
//! - [`Orchestrator::run_to_completion`] submits, then polls a bounded number of
//!   times and returns whatever it has, terminal or not.
//!
//! The orchestrator keeps no task table. Upstream owns task state; this code only
//! reads and normalizes it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::client::JobApi;
use crate::compose::{augment_negative, PromptComposer, PromptOverrides};
use crate::config::ModelSet;
use crate::error::VidgenError;
use crate::fallback::{FallbackDecision, FallbackPolicy};
use crate::normalize::{extract_task_id, normalize};
use crate::types::{GenerationRequest, Submission, TaskInput, TaskSnapshot, TaskState};

/// Where a generation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    NotStarted,
    /// `attempt` is 1 for the primary model and 2 for the fallback.
    Submitting { attempt: u8 },
    Waiting,
    Success,
    Fail,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("illegal task transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: TaskPhase,
    pub to: TaskPhase,
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }

    /// The phase an observed upstream state corresponds to.
    pub fn from_state(state: Option<&TaskState>) -> Self {
        match state {
            Some(TaskState::Success) => Self::Success,
            Some(TaskState::Fail(_)) => Self::Fail,
            _ => Self::Waiting,
        }
    }

    /// The submission attempt that follows this one. Only meaningful while
    /// submitting; `advance` rejects it once the single re-submit is used up.
    pub fn resubmit(self) -> TaskPhase {
        match self {
            Self::Submitting { attempt } => Self::Submitting {
                attempt: attempt.saturating_add(1),
            },
            other => other,
        }
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(self, next: TaskPhase) -> Result<TaskPhase, InvalidTransition> {
        use TaskPhase::*;
        let allowed = match (self, next) {
            (NotStarted, Submitting { attempt: 1 }) => true,
            (Submitting { attempt: 1 }, Submitting { attempt: 2 }) => true,
            (Submitting { .. }, Waiting) => true,
            (Waiting, Waiting | Success | Fail) => true,
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

/// Bounded-synchronous polling: `attempts` polls, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

/// The cadence a browser client uses in client-driven mode: every 3 s for the
/// first two minutes, every 5 s for three more, then give up and tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPollPlan {
    pub fast_interval: Duration,
    pub fast_window: Duration,
    pub slow_interval: Duration,
    pub slow_window: Duration,
}

impl Default for ClientPollPlan {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(3),
            fast_window: Duration::from_secs(120),
            slow_interval: Duration::from_secs(5),
            slow_window: Duration::from_secs(180),
        }
    }
}

impl ClientPollPlan {
    /// Delay before the next status check, or `None` once the client should stop
    /// and show a "taking too long" message.
    pub fn next_delay(&self, elapsed: Duration) -> Option<Duration> {
        if elapsed < self.fast_window {
            Some(self.fast_interval)
        } else if elapsed < self.fast_window + self.slow_window {
            Some(self.slow_interval)
        } else {
            None
        }
    }
}

pub struct Orchestrator {
    jobs: Arc<dyn JobApi>,
    composer: PromptComposer,
    models: ModelSet,
    fallback: FallbackPolicy,
    schedule: PollSchedule,
}

impl Orchestrator {
    pub fn new(jobs: Arc<dyn JobApi>, composer: PromptComposer, models: ModelSet) -> Self {
        let fallback = FallbackPolicy::new(models.fallback.clone());
        Self {
            jobs,
            composer,
            models,
            fallback,
            schedule: PollSchedule::default(),
        }
    }

    pub fn with_fallback_backoff(mut self, backoff: Duration) -> Self {
        self.fallback = self.fallback.with_backoff(backoff);
        self
    }

    pub fn with_poll_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Picks the model purely from whether a reference image is present.
    pub fn select_model(&self, has_image: bool) -> &str {
        if has_image {
            &self.models.image_to_video
        } else {
            &self.models.text_to_video
        }
    }

    async fn submit_once(
        &self,
        model: &str,
        input: &TaskInput,
        callback_url: Option<&str>,
    ) -> Result<String, VidgenError> {
        let raw = self.jobs.create_task(model, input, callback_url).await?;
        match extract_task_id(&raw) {
            Some((_, task_id)) => {
                info!(model, task_id = %task_id, "task submitted");
                Ok(task_id)
            }
            None => {
                let snapshot = raw.to_string();
                error!(model, raw = %snapshot, "create-task response has no task id");
                Err(VidgenError::UpstreamProtocol {
                    message: "create-task response has no task id".to_string(),
                    snapshot,
                })
            }
        }
    }

    /// Submits a job, retrying once on the fallback model after a transient
    /// failure. Not idempotent: each successful call is a billable upstream job.
    pub async fn submit(
        &self,
        model: &str,
        input: &TaskInput,
        callback_url: Option<&str>,
    ) -> Result<String, VidgenError> {
        let mut phase = TaskPhase::NotStarted.advance(TaskPhase::Submitting { attempt: 1 })?;
        let mut model = model.to_string();

        loop {
            let error = match self.submit_once(&model, input, callback_url).await {
                Ok(task_id) => {
                    phase.advance(TaskPhase::Waiting)?;
                    return Ok(task_id);
                }
                Err(e) => e,
            };

            let (fallback, after) = match self.fallback.classify(&error) {
                FallbackDecision::Fatal => return Err(error),
                FallbackDecision::RetryWith { model, after } => (model, after),
            };
            phase = match phase.advance(phase.resubmit()) {
                Ok(next) => next,
                // The single re-submit is spent; the last failure is final.
                Err(_) => return Err(error),
            };
            warn!(
                primary = %model,
                fallback = %fallback,
                error = %error,
                phase = ?phase,
                "primary model unavailable, retrying on fallback"
            );
            sleep(after).await;
            model = fallback;
        }
    }

    /// Fetches and normalizes one task record. No retry.
    pub async fn poll(&self, task_id: &str) -> Result<TaskSnapshot, VidgenError> {
        let raw = self.jobs.record_info(task_id).await?;
        let mut snapshot = normalize(&raw);
        if snapshot.task_id.is_none() {
            snapshot.task_id = Some(task_id.to_string());
        }
        if snapshot.is_terminal() {
            info!(
                task_id,
                state = ?snapshot.state,
                fail_reason = ?snapshot.fail_reason,
                "task reached terminal state"
            );
        }
        Ok(snapshot)
    }

    async fn prepare(
        &self,
        request: &GenerationRequest,
        overrides: &PromptOverrides,
    ) -> Result<(Submission, TaskInput), VidgenError> {
        request.validate()?;
        let bundle = self
            .composer
            .compose(&request.prompt, request.image_url.as_deref(), overrides)
            .await?;
        let input = TaskInput {
            prompt: bundle.final_prompt,
            image_url: request.image_url.clone(),
            duration: request.duration,
            negative_prompt: Some(augment_negative(request.negative_prompt.as_deref())),
            cfg_scale: request.cfg_scale,
        };
        let submission = Submission {
            task_id: String::new(),
            state: TaskState::Waiting,
            description: bundle.description,
            rewritten: bundle.rewritten,
        };
        Ok((submission, input))
    }

    /// Client-driven mode: composes, submits and returns the task id at once.
    pub async fn start(
        &self,
        request: &GenerationRequest,
        overrides: &PromptOverrides,
    ) -> Result<Submission, VidgenError> {
        let (mut submission, input) = self.prepare(request, overrides).await?;
        let model = self.select_model(request.image_url.is_some());
        submission.task_id = self
            .submit(model, &input, request.callback_url.as_deref())
            .await?;
        Ok(submission)
    }

    /// Bounded-synchronous mode: submits, then polls per the [`PollSchedule`].
    ///
    /// A non-terminal snapshot at the end is a normal return; the job keeps running
    /// upstream. Poll errors are logged and retried on the next tick.
    pub async fn run_to_completion(
        &self,
        request: &GenerationRequest,
        overrides: &PromptOverrides,
    ) -> Result<TaskSnapshot, VidgenError> {
        let submission = self.start(request, overrides).await?;
        let task_id = submission.task_id;
        let mut phase = TaskPhase::Waiting;
        let mut last = TaskSnapshot {
            task_id: Some(task_id.clone()),
            state: Some(TaskState::Waiting),
            ..Default::default()
        };

        for attempt in 1..=self.schedule.attempts {
            sleep(self.schedule.interval).await;
            match self.poll(&task_id).await {
                Ok(snapshot) => {
                    let next = TaskPhase::from_state(snapshot.state.as_ref());
                    last = snapshot;
                    match phase.advance(next) {
                        Ok(p) if p.is_terminal() => return Ok(last),
                        Ok(p) => phase = p,
                        Err(e) => {
                            error!(task_id = %task_id, error = %e, "unexpected task transition");
                            return Ok(last);
                        }
                    }
                }
                Err(e) => warn!(task_id = %task_id, attempt, error = %e, "poll failed, retrying next tick"),
            }
        }

        info!(
            task_id = %task_id,
            attempts = self.schedule.attempts,
            "task still running after bounded wait"
        );
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        let p = TaskPhase::NotStarted;
        let p = p.advance(TaskPhase::Submitting { attempt: 1 }).unwrap();
        let p = p.advance(TaskPhase::Submitting { attempt: 2 }).unwrap();
        assert!(p.advance(TaskPhase::Submitting { attempt: 3 }).is_err());
        let p = p.advance(TaskPhase::Waiting).unwrap();
        let p = p.advance(TaskPhase::Waiting).unwrap();
        let p = p.advance(TaskPhase::Success).unwrap();
        assert!(p.is_terminal());
        assert!(p.advance(TaskPhase::Waiting).is_err());
        assert!(TaskPhase::Fail.advance(TaskPhase::Success).is_err());
        assert!(TaskPhase::NotStarted.advance(TaskPhase::Waiting).is_err());
    }

    #[test]
    fn only_one_resubmit_is_allowed() {
        let first = TaskPhase::NotStarted.advance(TaskPhase::Submitting { attempt: 1 }).unwrap();
        let second = first.advance(first.resubmit()).unwrap();
        assert_eq!(second, TaskPhase::Submitting { attempt: 2 });
        assert!(second.advance(second.resubmit()).is_err());
        assert_eq!(TaskPhase::Waiting.resubmit(), TaskPhase::Waiting);
    }

    #[test]
    fn unknown_states_map_to_waiting() {
        let other = TaskState::Other("generating".into());
        assert_eq!(TaskPhase::from_state(Some(&other)), TaskPhase::Waiting);
        assert_eq!(TaskPhase::from_state(None), TaskPhase::Waiting);
        assert_eq!(TaskPhase::from_state(Some(&TaskState::from("failed"))), TaskPhase::Fail);
    }

    #[test]
    fn client_poll_plan_escalates_then_gives_up() {
        let plan = ClientPollPlan::default();
        assert_eq!(plan.next_delay(Duration::ZERO), Some(Duration::from_secs(3)));
        assert_eq!(plan.next_delay(Duration::from_secs(119)), Some(Duration::from_secs(3)));
        assert_eq!(plan.next_delay(Duration::from_secs(120)), Some(Duration::from_secs(5)));
        assert_eq!(plan.next_delay(Duration::from_secs(299)), Some(Duration::from_secs(5)));
        assert_eq!(plan.next_delay(Duration::from_secs(300)), None);
    }

    #[test]
    fn default_schedule_is_about_a_minute() {
        let s = PollSchedule::default();
        assert_eq!(s.interval * s.attempts, Duration::from_secs(60));
    }
}
