//! Extraction of canonical task and credit data from upstream JSON whose shape
//! is not contractually stable.
//!
//! Each field is read by an ordered list of named strategies. The first one that
//! matches wins and is logged by name. None of these functions fail: missing or
//! malformed fields come back as `None`.

use serde_json::Value;
use tracing::debug;

use crate::types::{CreditBalance, TaskSnapshot, TaskState};

/// Shown when a task failed without an upstream message.
pub const DEFAULT_FAIL_REASON: &str = "生成失败，请稍后重试";

/// Where a task id was found in a create-job or record response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskIdSource {
    DataTaskId,
    TaskId,
    DataId,
    Id,
}

impl TaskIdSource {
    pub const ORDER: [TaskIdSource; 4] = [Self::DataTaskId, Self::TaskId, Self::DataId, Self::Id];

    pub fn path(&self) -> &'static str {
        match self {
            Self::DataTaskId => "data.taskId",
            Self::TaskId => "taskId",
            Self::DataId => "data.id",
            Self::Id => "id",
        }
    }

    fn extract(&self, raw: &Value) -> Option<String> {
        let value = match self {
            Self::DataTaskId => raw.get("data")?.get("taskId")?,
            Self::TaskId => raw.get("taskId")?,
            Self::DataId => raw.get("data")?.get("id")?,
            Self::Id => raw.get("id")?,
        };
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Finds the task id using the first matching [`TaskIdSource`].
pub fn extract_task_id(raw: &Value) -> Option<(TaskIdSource, String)> {
    TaskIdSource::ORDER.iter().find_map(|source| {
        let id = source.extract(raw)?;
        debug!(source = source.path(), task_id = %id, "task id extracted");
        Some((*source, id))
    })
}

/// Where a list of result URLs was found in a record response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultUrlSource {
    /// `data.resultJson` holding a JSON document as a string.
    StringifiedResultJson,
    /// `data.resultJson` already parsed into an object.
    ResultJsonObject,
    TopLevel,
    Data,
}

impl ResultUrlSource {
    pub const ORDER: [ResultUrlSource; 4] = [
        Self::StringifiedResultJson,
        Self::ResultJsonObject,
        Self::TopLevel,
        Self::Data,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Self::StringifiedResultJson => "data.resultJson(string).resultUrls",
            Self::ResultJsonObject => "data.resultJson.resultUrls",
            Self::TopLevel => "resultUrls",
            Self::Data => "data.resultUrls",
        }
    }

    fn extract(&self, raw: &Value) -> Option<Vec<String>> {
        match self {
            Self::StringifiedResultJson => {
                let text = raw.get("data")?.get("resultJson")?.as_str()?;
                match serde_json::from_str::<Value>(text) {
                    Ok(parsed) => string_array(parsed.get("resultUrls")?),
                    Err(e) => {
                        debug!(error = %e, "resultJson is not valid JSON, trying next source");
                        None
                    }
                }
            }
            Self::ResultJsonObject => {
                let obj = raw.get("data")?.get("resultJson")?;
                if !obj.is_object() {
                    return None;
                }
                string_array(obj.get("resultUrls")?)
            }
            Self::TopLevel => string_array(raw.get("resultUrls")?),
            Self::Data => string_array(raw.get("data")?.get("resultUrls")?),
        }
    }
}

fn string_array(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

/// Finds result URLs using the first matching [`ResultUrlSource`].
pub fn extract_result_urls(raw: &Value) -> Option<(ResultUrlSource, Vec<String>)> {
    ResultUrlSource::ORDER.iter().find_map(|source| {
        let urls = source.extract(raw)?;
        debug!(source = source.path(), count = urls.len(), "result urls extracted");
        Some((*source, urls))
    })
}

fn extract_fail_message(raw: &Value) -> Option<String> {
    raw.get("data")
        .and_then(|d| d.get("failMsg"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            raw.get("failMsg")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
        .map(str::to_string)
}

/// Builds a [`TaskSnapshot`] from a raw record payload. Never fails.
pub fn normalize(raw: &Value) -> TaskSnapshot {
    let state = raw
        .get("data")
        .and_then(|d| d.get("state"))
        .and_then(Value::as_str)
        .map(TaskState::from);

    let fail_reason = match (&state, extract_fail_message(raw)) {
        (_, Some(msg)) => Some(msg),
        (Some(TaskState::Fail(_)), None) => Some(DEFAULT_FAIL_REASON.to_string()),
        _ => None,
    };

    TaskSnapshot {
        task_id: extract_task_id(raw).map(|(_, id)| id),
        state,
        result_urls: extract_result_urls(raw).map(|(_, urls)| urls),
        fail_reason,
        raw: raw.clone(),
    }
}

const CREDIT_FIELDS: [&str; 4] = ["data", "remaining", "credit", "credits"];

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turns the credit endpoint's body into a [`CreditBalance`], defaulting the
/// balance to `0` rather than failing.
pub fn normalize_credit(body: &str) -> CreditBalance {
    let mut balance = CreditBalance {
        code: 200,
        msg: "success".to_string(),
        data: 0.0,
    };

    let parsed: Value = match serde_json::from_str(body.trim()) {
        Ok(v) => v,
        Err(_) => {
            if let Ok(n) = body.trim().parse::<i64>() {
                balance.data = n as f64;
            } else {
                debug!(body, "credit body is neither JSON nor an integer");
            }
            return balance;
        }
    };

    match &parsed {
        Value::Number(n) => balance.data = n.as_f64().unwrap_or(0.0),
        Value::Object(map) => {
            if let Some(code) = map.get("code").and_then(Value::as_i64) {
                balance.code = code;
            }
            if let Some(msg) = map.get("msg").and_then(Value::as_str) {
                balance.msg = msg.to_string();
            }
            let named = CREDIT_FIELDS
                .iter()
                .find_map(|field| map.get(*field).and_then(as_number));
            // `code` is the response envelope's status, never a balance.
            let any = || {
                map.iter()
                    .filter(|(k, _)| k.as_str() != "code")
                    .find_map(|(_, v)| v.as_f64())
            };
            balance.data = named.or_else(any).unwrap_or(0.0);
        }
        Value::String(s) => balance.data = s.trim().parse().unwrap_or(0.0),
        _ => {}
    }
    balance
}
