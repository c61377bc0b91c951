mod common;

use serde_json::json;
use vidgen::normalize::DEFAULT_FAIL_REASON;
use vidgen::{GenerationRequest, PromptOverrides, TaskState, VideoDuration};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_submit_then_poll_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "taskId": "T1" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .and(query_param("taskId", "T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "state": "success",
                "resultJson": "{\"resultUrls\":[\"https://cdn/v.mp4\"]}"
            }
        })))
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    let request = GenerationRequest::new("a cat").with_duration(VideoDuration::Five);
    let submission = orchestrator
        .start(&request, &PromptOverrides::default())
        .await
        .unwrap();

    assert_eq!(submission.task_id, "T1");
    assert_eq!(submission.state, TaskState::Waiting);

    let snapshot = orchestrator.poll("T1").await.unwrap();
    assert_eq!(snapshot.task_id.as_deref(), Some("T1"));
    assert_eq!(snapshot.state, Some(TaskState::Success));
    assert_eq!(snapshot.result_urls, Some(vec!["https://cdn/v.mp4".to_string()]));
    assert!(snapshot.is_terminal());
}

#[tokio::test]
async fn test_poll_failed_task_surfaces_provider_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .and(query_param("taskId", "T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "state": "fail", "failMsg": "nsfw content blocked" }
        })))
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    let snapshot = orchestrator.poll("T2").await.unwrap();

    assert_eq!(snapshot.state, Some(TaskState::Fail("fail".to_string())));
    assert_eq!(snapshot.fail_reason.as_deref(), Some("nsfw content blocked"));
}

#[tokio::test]
async fn test_poll_failed_task_without_message_uses_default() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "state": "failed" }
        })))
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    let snapshot = orchestrator.poll("T3").await.unwrap();

    assert_eq!(snapshot.state, Some(TaskState::Fail("failed".to_string())));
    assert_eq!(snapshot.fail_reason.as_deref(), Some(DEFAULT_FAIL_REASON));
}

#[tokio::test]
async fn test_poll_unknown_state_is_passed_through_as_non_terminal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "taskId": "T4", "state": "generating" }
        })))
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    let snapshot = orchestrator.poll("T4").await.unwrap();

    assert_eq!(snapshot.state, Some(TaskState::Other("generating".to_string())));
    assert!(!snapshot.is_terminal());
    assert_eq!(snapshot.raw["data"]["state"], "generating");
}

#[tokio::test]
async fn test_poll_does_not_retry_upstream_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = common::orchestrator(&server);
    assert!(orchestrator.poll("T5").await.is_err());
}
