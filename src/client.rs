use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::{parse_base_url, ConfigError, EndpointConfig, ProviderConfig};
use crate::error::{UpstreamErrorKind, VidgenError};
use crate::normalize::normalize_credit;
use crate::types::{
    CreateTaskRequest, CreditBalance, ImageGenerationRequest, ImageGenerationResponse, TaskInput,
};

/// The two calls the orchestrator needs from a job-queue provider.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Creates a job and returns the raw response body.
    async fn create_task(
        &self,
        model: &str,
        input: &TaskInput,
        callback_url: Option<&str>,
    ) -> Result<Value, VidgenError>;

    /// Fetches the raw job record.
    async fn record_info(&self, task_id: &str) -> Result<Value, VidgenError>;
}

pub(crate) fn bearer_headers(api_key: &str) -> Result<HeaderMap, VidgenError> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
        ConfigError::InvalidValue("api key".to_string(), "not a valid header value".to_string())
    })?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// Reads the body of a response, turning non-2xx statuses into classified
/// upstream errors.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<String, VidgenError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(VidgenError::from_status(status.as_u16(), &body))
    }
}

/// Client for the job-queue video generation API.
///
/// Cloneable and safe to share across tasks; all clones reuse one connection pool.
#[derive(Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ProviderClient {
    /// Creates a client from validated configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self, VidgenError> {
        let client = reqwest::Client::builder()
            .default_headers(bearer_headers(&config.api_key)?)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Creates a client against a custom base URL, e.g. a mock server.
    pub fn new_with_url(api_key: String, base_url: &str) -> Result<Self, VidgenError> {
        Self::new(&ProviderConfig::new(api_key, base_url)?)
    }

    /// Queries the remaining account credit.
    ///
    /// The upstream body is run through [`normalize_credit`], so any 2xx answer
    /// yields a balance.
    pub async fn credits(&self) -> Result<CreditBalance, VidgenError> {
        let url = self.base_url.join("chat/credit")?;
        let response = self.client.get(url).send().await?;
        let body = read_body(response).await?;
        Ok(normalize_credit(&body))
    }
}

#[async_trait]
impl JobApi for ProviderClient {
    async fn create_task(
        &self,
        model: &str,
        input: &TaskInput,
        callback_url: Option<&str>,
    ) -> Result<Value, VidgenError> {
        let url = self.base_url.join("createTask")?;
        let request_body = CreateTaskRequest {
            model,
            input,
            callback_url,
        };
        info!(model, "submitting generation task");

        let response = self.client.post(url).json(&request_body).send().await?;
        let body = read_body(response).await?;
        let raw: Value = serde_json::from_str(&body)?;

        // The provider sometimes reports failures in-band with HTTP 200.
        if let Some(code) = raw.get("code").and_then(Value::as_u64) {
            if code >= 400 {
                let msg = raw.get("msg").and_then(Value::as_str).unwrap_or_default();
                return Err(match u16::try_from(code) {
                    Ok(status) => VidgenError::from_status(status, msg),
                    Err(_) => VidgenError::Upstream {
                        kind: UpstreamErrorKind::Server,
                        status: None,
                        message: format!("{code}: {msg}"),
                        retryable: false,
                    },
                });
            }
        }
        Ok(raw)
    }

    async fn record_info(&self, task_id: &str) -> Result<Value, VidgenError> {
        let mut url = self.base_url.join("recordInfo")?;
        url.query_pairs_mut().append_pair("taskId", task_id);
        debug!(task_id, "fetching task record");

        let response = self.client.get(url).send().await?;
        let body = read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Client for an OpenAI-compatible synchronous image-generation endpoint.
#[derive(Clone)]
pub struct ImageClient {
    client: reqwest::Client,
    base_url: Url,
    model: String,
}

impl ImageClient {
    pub fn new(config: &EndpointConfig) -> Result<Self, VidgenError> {
        let mut builder = reqwest::Client::builder();
        if let Some(key) = &config.api_key {
            builder = builder.default_headers(bearer_headers(key)?);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }

    pub fn new_with_url(api_key: String, base_url: &str, model: &str) -> Result<Self, VidgenError> {
        let base_url = parse_base_url("IMAGE_BASE_URL", base_url)?;
        Self::new(&EndpointConfig {
            api_key: Some(api_key),
            base_url,
            model: model.to_string(),
        })
    }

    /// Generates one image and returns its URLs.
    pub async fn generate(&self, prompt: &str) -> Result<Vec<String>, VidgenError> {
        if prompt.trim().is_empty() {
            return Err(VidgenError::validation("prompt is required"));
        }
        let url = self.base_url.join("images/generations")?;
        let request_body = ImageGenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
        };
        let response = self.client.post(url).json(&request_body).send().await?;
        let body = read_body(response).await?;
        let parsed: ImageGenerationResponse = serde_json::from_str(&body)?;
        let urls: Vec<String> = parsed.data.into_iter().filter_map(|img| img.url).collect();
        if urls.is_empty() {
            return Err(VidgenError::UpstreamProtocol {
                message: "image response contained no URLs".to_string(),
                snapshot: body,
            });
        }
        Ok(urls)
    }
}
