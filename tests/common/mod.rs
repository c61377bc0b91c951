#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use vidgen::config::EndpointConfig;
use vidgen::{
    ModelSet, Orchestrator, PollSchedule, PromptComposer, ProviderClient, StreamingRewriter,
    VisionDescriber,
};
use wiremock::MockServer;

pub const API_KEY: &str = "test_api_key";

pub fn provider(server: &MockServer) -> ProviderClient {
    ProviderClient::new_with_url(API_KEY.to_string(), &server.uri()).unwrap()
}

fn endpoint(server: &MockServer, prefix: &str, model: &str) -> EndpointConfig {
    EndpointConfig::new(
        Some(format!("{prefix}-key")),
        &format!("{}/{prefix}", server.uri()),
        model,
    )
    .unwrap()
}

/// Describer on `/vision` with a secondary on `/backup`, rewriter on `/rewrite`.
pub fn composer(server: &MockServer) -> PromptComposer {
    let describer = VisionDescriber::new(
        &endpoint(server, "vision", "vision-model"),
        Some(&endpoint(server, "backup", "backup-model")),
    )
    .unwrap()
    .with_backoff(Duration::ZERO);
    let rewriter = StreamingRewriter::new(&endpoint(server, "rewrite", "rewrite-model")).unwrap();
    PromptComposer::new(Arc::new(describer), Arc::new(rewriter))
}

/// An orchestrator against the mock server with no waiting anywhere.
pub fn orchestrator(server: &MockServer) -> Orchestrator {
    Orchestrator::new(Arc::new(provider(server)), composer(server), ModelSet::default())
        .with_fallback_backoff(Duration::ZERO)
        .with_poll_schedule(PollSchedule {
            attempts: 5,
            interval: Duration::ZERO,
        })
}

/// A non-streaming chat completion answer.
pub fn chat_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
}

/// An SSE body streaming `chunks` as chat-completion deltas.
pub fn sse_body(chunks: &[&str]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        let event = json!({ "choices": [{ "delta": { "content": chunk } }] });
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
