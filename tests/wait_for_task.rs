mod common;

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use vidgen::{GenerationRequest, PromptOverrides, TaskState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Answers `waiting` for the first `pending` calls, then `success`.
struct CustomResponder {
    calls: AtomicUsize,
    pending: usize,
}

impl wiremock::Respond for CustomResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);

        let data = if count < self.pending {
            json!({ "taskId": "sync_task", "state": "waiting" })
        } else {
            json!({
                "taskId": "sync_task",
                "state": "success",
                "resultJson": { "resultUrls": ["https://cdn.example.com/video.mp4"] }
            })
        };

        ResponseTemplate::new(200).set_body_json(json!({ "code": 200, "data": data }))
    }
}

async fn mount_create_task(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "taskId": "sync_task" }
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_run_to_completion_polls_until_terminal() {
    let server = MockServer::start().await;
    mount_create_task(&server).await;

    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(CustomResponder {
            calls: AtomicUsize::new(0),
            pending: 2,
        })
        .expect(3)
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    let snapshot = orchestrator
        .run_to_completion(&GenerationRequest::new("a cat"), &PromptOverrides::default())
        .await
        .unwrap();

    assert_eq!(snapshot.state, Some(TaskState::Success));
    assert_eq!(
        snapshot.result_urls,
        Some(vec!["https://cdn.example.com/video.mp4".to_string()])
    );
}

#[tokio::test]
async fn test_run_to_completion_returns_non_terminal_after_bounded_attempts() {
    let server = MockServer::start().await;
    mount_create_task(&server).await;

    // The common orchestrator polls five times.
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(CustomResponder {
            calls: AtomicUsize::new(0),
            pending: usize::MAX,
        })
        .expect(5)
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    let snapshot = orchestrator
        .run_to_completion(&GenerationRequest::new("a cat"), &PromptOverrides::default())
        .await
        .unwrap();

    assert_eq!(snapshot.task_id.as_deref(), Some("sync_task"));
    assert_eq!(snapshot.state, Some(TaskState::Waiting));
    assert!(!snapshot.is_terminal());
}

#[tokio::test]
async fn test_run_to_completion_survives_poll_errors() {
    let server = MockServer::start().await;
    mount_create_task(&server).await;

    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "state": "fail", "failMsg": "quota exceeded" }
        })))
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    let snapshot = orchestrator
        .run_to_completion(&GenerationRequest::new("a cat"), &PromptOverrides::default())
        .await
        .unwrap();

    assert_eq!(snapshot.state, Some(TaskState::Fail("fail".to_string())));
    assert_eq!(snapshot.fail_reason.as_deref(), Some("quota exceeded"));
    assert_eq!(snapshot.task_id.as_deref(), Some("sync_task"));
}
