use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::VidgenError;

/// Output length of a generated clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoDuration {
    #[default]
    Five,
    Ten,
}

impl VideoDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Five => "5",
            Self::Ten => "10",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, VidgenError> {
        match raw.trim() {
            "5" => Ok(Self::Five),
            "10" => Ok(Self::Ten),
            other => Err(VidgenError::validation(format!(
                "duration must be 5 or 10, got {other}"
            ))),
        }
    }
}

impl Serialize for VideoDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VideoDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        VideoDuration::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A single user generation request, after any embedded image has been uploaded.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Free-form user prompt. May be empty when `image_url` is present.
    pub prompt: String,
    /// HTTPS URL of the reference image.
    pub image_url: Option<String>,
    pub duration: VideoDuration,
    pub negative_prompt: Option<String>,
    pub cfg_scale: Option<f32>,
    /// Upstream webhook notified on completion.
    pub callback_url: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_duration(mut self, duration: VideoDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_cfg_scale(mut self, cfg_scale: f32) -> Self {
        self.cfg_scale = Some(cfg_scale);
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Checks the shape invariants that do not depend on prompt composition.
    pub fn validate(&self) -> Result<(), VidgenError> {
        if let Some(url) = &self.image_url {
            ensure_https(url)?;
        }
        if let Some(cfg) = self.cfg_scale {
            if !(0.0..=1.0).contains(&cfg) {
                return Err(VidgenError::validation("cfg_scale must be between 0 and 1"));
            }
        }
        Ok(())
    }
}

/// Rejects anything that is not an absolute `https` URL (raw data URLs included).
pub fn ensure_https(raw: &str) -> Result<(), VidgenError> {
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "https" && url.host_str().is_some() => Ok(()),
        _ => Err(VidgenError::validation("image_url must be an https URL")),
    }
}

/// Lifecycle state of an upstream task, as reported by `data.state`.
///
/// Only `success` and `fail`/`failed` are terminal. Failure keeps the upstream
/// spelling; unknown strings are kept verbatim and polled again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Waiting,
    Success,
    Fail(String),
    Other(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Fail(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Fail(s) | Self::Other(s) => s,
        }
    }
}

impl From<&str> for TaskState {
    fn from(raw: &str) -> Self {
        match raw {
            "waiting" => Self::Waiting,
            "success" => Self::Success,
            "fail" | "failed" => Self::Fail(raw.to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TaskState::from(raw.as_str()))
    }
}

/// The canonical view of an upstream task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: Option<String>,
    pub state: Option<TaskState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    /// The upstream payload this snapshot was extracted from.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.state.as_ref().is_some_and(TaskState::is_terminal)
    }
}

/// Output of prompt composition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PromptBundle {
    /// Text from the image-description step.
    pub description: Option<String>,
    /// Text from the rewrite step.
    pub rewritten: Option<String>,
    /// Safety-augmented prompt sent to the provider.
    pub final_prompt: String,
}

/// The immediate answer of client-driven mode.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub task_id: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "groqOutput", skip_serializing_if = "Option::is_none")]
    pub rewritten: Option<String>,
}

/// Generation parameters forwarded to the provider under `input`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TaskInput {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub duration: VideoDuration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f32>,
}

/// (Internal) Body of the create-job call.
#[derive(Serialize, Debug)]
pub(crate) struct CreateTaskRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) input: &'a TaskInput,
    #[serde(rename = "callBackUrl", skip_serializing_if = "Option::is_none")]
    pub(crate) callback_url: Option<&'a str>,
}

/// The credit balance, always in this shape whatever the upstream returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub code: i64,
    pub msg: String,
    pub data: f64,
}

/// (Internal) Body of the synchronous image-generation call.
#[derive(Serialize, Debug)]
pub(crate) struct ImageGenerationRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) prompt: &'a str,
    pub(crate) n: u8,
}

/// (Internal) Response of the synchronous image-generation call.
#[derive(Deserialize, Debug)]
pub(crate) struct ImageGenerationResponse {
    #[serde(default)]
    pub(crate) data: Vec<GeneratedImage>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct GeneratedImage {
    pub(crate) url: Option<String>,
}
