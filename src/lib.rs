//! Orchestration core for job-queue based AI video generation.
//!
//! A request is turned into a final prompt (optionally by describing the
//! reference image and rewriting the description), submitted to a slow upstream
//! job API with a one-shot fallback model on overload, and then tracked by
//! polling the upstream record and normalizing its shifting response shapes.
//!
//! ## Features
//! - Text-to-video and image-to-video submission with fixed model selection.
//! - Fallback to an alternate model after a transient (503/429/overload) failure.
//! - Client-driven polling (`start` + `poll`) and bounded-synchronous polling
//!   (`run_to_completion`) over the same primitives.
//! - Tolerant normalization of task records and credit balances.
//! - An axum HTTP surface for the browser client.

pub mod client;
pub mod collaborators;
pub mod compose;
pub mod config;
pub mod error;
pub mod fallback;
pub mod normalize;
pub mod orchestrator;
pub mod server;
pub mod types;

pub use client::{ImageClient, JobApi, ProviderClient};
pub use collaborators::{Describer, ImageStore, Rewriter, StreamingRewriter, VisionDescriber};
pub use compose::{PromptComposer, PromptOverrides};
pub use config::{Config, ConfigError, ModelSet};
pub use error::{UpstreamErrorKind, VidgenError};
pub use fallback::{FallbackDecision, FallbackPolicy};
pub use normalize::{normalize, normalize_credit};
pub use orchestrator::{ClientPollPlan, Orchestrator, PollSchedule, TaskPhase};
pub use types::{
    CreditBalance, GenerationRequest, PromptBundle, Submission, TaskInput, TaskSnapshot,
    TaskState, VideoDuration,
};
