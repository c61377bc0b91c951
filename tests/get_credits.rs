mod common;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_credits_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chat/credit"))
        .and(header("authorization", "Bearer test_api_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "msg": "success",
            "data": 950
        })))
        .mount(&server)
        .await;

    let client = common::provider(&server);
    let balance = client.credits().await.unwrap();

    assert_eq!(balance.code, 200);
    assert_eq!(balance.msg, "success");
    assert_eq!(balance.data, 950.0);
}

#[tokio::test]
async fn test_get_credits_plain_text_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chat/credit"))
        .respond_with(ResponseTemplate::new(200).set_body_string("1234"))
        .mount(&server)
        .await;

    let client = common::provider(&server);
    assert_eq!(client.credits().await.unwrap().data, 1234.0);
}

#[tokio::test]
async fn test_get_credits_unrecognized_body_defaults_to_zero() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/chat/credit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "note": "maintenance" })))
        .mount(&server)
        .await;

    let client = common::provider(&server);
    let balance = client.credits().await.unwrap();
    assert_eq!(balance.data, 0.0);
}
