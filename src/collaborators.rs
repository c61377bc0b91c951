//! Prompt-composition collaborators: image description and prompt rewriting.
//!
//! Both talk to OpenAI-compatible chat-completion endpoints. The describer falls
//! over from its primary vision model to a secondary provider on overload. The
//! rewriter streams its answer and hands back one assembled string.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::read_body;
use crate::config::EndpointConfig;
use crate::error::{UpstreamErrorKind, VidgenError};

const DESCRIBE_INSTRUCTION: &str = "Describe this image in detail as a prompt for a short \
video: subject, appearance, setting, lighting, camera framing and a plausible motion. \
Answer with the prompt only.";

const REWRITE_INSTRUCTION: &str = "Rewrite the following description into one concise, \
vivid English video-generation prompt. Keep every visual detail, add natural motion, \
answer with the prompt only.";

const MAX_REWRITE_CHARS: usize = 4000;
const DEFAULT_REWRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns a reference image into a text description.
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, image_url: &str, api_key: Option<&str>) -> Result<String, VidgenError>;
}

/// Rewrites a description into a generation prompt.
#[async_trait]
pub trait Rewriter: Send + Sync {
    async fn rewrite(&self, text: &str, api_key: Option<&str>) -> Result<String, VidgenError>;
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<Message>,
    delta: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// One OpenAI-compatible chat endpoint.
#[derive(Clone)]
struct ChatEndpoint {
    client: reqwest::Client,
    base_url: Url,
    model: String,
    api_key: Option<String>,
}

impl ChatEndpoint {
    fn new(config: &EndpointConfig) -> Result<Self, VidgenError> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(
        &self,
        name: &'static str,
        api_key: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<reqwest::RequestBuilder, VidgenError> {
        let key = api_key
            .or(self.api_key.as_deref())
            .ok_or_else(|| VidgenError::Collaborator {
                name,
                message: "no API key configured".to_string(),
            })?;
        let url = self.base_url.join("chat/completions")?;
        Ok(self.client.post(url).bearer_auth(key).json(body))
    }
}

fn is_overload(error: &VidgenError) -> bool {
    matches!(
        error.upstream_kind(),
        Some(UpstreamErrorKind::Overloaded | UpstreamErrorKind::RateLimited | UpstreamErrorKind::Server)
    )
}

/// Vision-model describer with a secondary provider.
pub struct VisionDescriber {
    primary: ChatEndpoint,
    secondary: Option<ChatEndpoint>,
    backoff: Duration,
}

impl VisionDescriber {
    pub fn new(primary: &EndpointConfig, secondary: Option<&EndpointConfig>) -> Result<Self, VidgenError> {
        Ok(Self {
            primary: ChatEndpoint::new(primary)?,
            secondary: secondary.map(ChatEndpoint::new).transpose()?,
            backoff: crate::fallback::DEFAULT_FALLBACK_BACKOFF,
        })
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn describe_with(
        endpoint: &ChatEndpoint,
        image_url: &str,
        api_key: Option<&str>,
    ) -> Result<String, VidgenError> {
        let body = json!({
            "model": endpoint.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": DESCRIBE_INSTRUCTION},
                    {"type": "image_url", "image_url": {"url": image_url}}
                ]
            }],
            "max_tokens": 512
        });
        let response = endpoint.request("describer", api_key, &body)?.send().await?;
        let text = read_body(response).await?;
        let completion: ChatCompletion = serde_json::from_str(&text)?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VidgenError::Collaborator {
                name: "describer",
                message: "empty description".to_string(),
            })
    }
}

#[async_trait]
impl Describer for VisionDescriber {
    async fn describe(&self, image_url: &str, api_key: Option<&str>) -> Result<String, VidgenError> {
        match Self::describe_with(&self.primary, image_url, api_key).await {
            Ok(text) => Ok(text),
            Err(e) if is_overload(&e) && self.secondary.is_some() => {
                warn!(error = %e, "primary vision model unavailable, switching provider");
                tokio::time::sleep(self.backoff).await;
                let Some(secondary) = &self.secondary else {
                    return Err(e);
                };
                // The override key belongs to the primary provider.
                Self::describe_with(secondary, image_url, None).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Streaming chat-completion rewriter.
pub struct StreamingRewriter {
    endpoint: ChatEndpoint,
    timeout: Duration,
}

impl StreamingRewriter {
    pub fn new(config: &EndpointConfig) -> Result<Self, VidgenError> {
        Ok(Self {
            endpoint: ChatEndpoint::new(config)?,
            timeout: DEFAULT_REWRITE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn collect(&self, text: &str, api_key: Option<&str>) -> Result<String, VidgenError> {
        let body = json!({
            "model": self.endpoint.model,
            "stream": true,
            "messages": [
                {"role": "system", "content": REWRITE_INSTRUCTION},
                {"role": "user", "content": text}
            ]
        });
        let response = self.endpoint.request("rewriter", api_key, &body)?.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VidgenError::from_status(status.as_u16(), &body));
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let mut output = String::new();
        while let Some(event) = events.next().await {
            let event = event.map_err(|e| VidgenError::Collaborator {
                name: "rewriter",
                message: format!("stream error: {e}"),
            })?;
            if event.data.trim() == "[DONE]" {
                break;
            }
            let chunk: ChatCompletion = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(error = %e, "skipping unparseable stream chunk");
                    continue;
                }
            };
            for choice in chunk.choices {
                if let Some(content) = choice.delta.or(choice.message).and_then(|m| m.content) {
                    output.push_str(&content);
                }
            }
            if output.chars().count() >= MAX_REWRITE_CHARS {
                warn!("rewrite output truncated");
                output = output.chars().take(MAX_REWRITE_CHARS).collect();
                break;
            }
        }

        let output = output.trim().to_string();
        if output.is_empty() {
            return Err(VidgenError::Collaborator {
                name: "rewriter",
                message: "empty rewrite".to_string(),
            });
        }
        info!(chars = output.len(), "rewrite assembled");
        Ok(output)
    }
}

#[async_trait]
impl Rewriter for StreamingRewriter {
    async fn rewrite(&self, text: &str, api_key: Option<&str>) -> Result<String, VidgenError> {
        tokio::time::timeout(self.timeout, self.collect(text, api_key))
            .await
            .map_err(|_| VidgenError::Collaborator {
                name: "rewriter",
                message: format!("timed out after {:?}", self.timeout),
            })?
    }
}

/// Object storage for images the browser sends inline. Returns a public HTTPS
/// URL the provider can fetch.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, image_base64: &str) -> Result<String, VidgenError>;
}
