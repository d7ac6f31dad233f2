//! End-to-end request handling through API Gateway payloads.

use std::time::{SystemTime, UNIX_EPOCH};

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use slack_lambda::{
    EventEnvelope, InboundEvent, Response, SigningContext, Slack, SlackConfig, SlackError,
    SlackResult, challenge_response,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

fn now() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        .to_string()
}

async fn events(event: InboundEvent) -> SlackResult<Response> {
    let envelope = EventEnvelope::from_event(&event)?;
    Ok(challenge_response(&envelope)?.unwrap_or_else(|| Response::empty(200)))
}

fn app(config: SlackConfig) -> Slack {
    let mut builder = Slack::builder(config).unwrap();
    builder.route("POST /events", events);
    builder.oauth_routes("GET /install", "GET /oauth");
    builder.build().unwrap()
}

fn signed_payload(body: &str, ts: &str) -> Value {
    json!({
        "routeKey": "POST /events",
        "headers": {
            "X-Slack-Request-Timestamp": ts,
            "X-Slack-Signature": SigningContext::new(SECRET).sign(ts, body),
        },
        "body": body,
        "isBase64Encoded": false,
    })
}

#[tokio::test]
async fn url_verification_round_trip() {
    let slack = app(SlackConfig::new(SECRET));
    let body = r#"{"type":"url_verification","challenge":"abc123"}"#;

    let reply = slack
        .handle_payload(signed_payload(body, &now()))
        .await
        .unwrap();

    assert_eq!(
        reply,
        json!({
            "statusCode": 200,
            "body": "{\"challenge\": \"abc123\"}",
            "headers": {
                "content-type": "application/json; charset=utf-8",
                "content-length": "23",
            }
        })
    );
}

#[tokio::test]
async fn stale_request_never_reaches_handler() {
    let slack = app(SlackConfig::new(SECRET));
    let body = r#"{"type":"url_verification","challenge":"abc123"}"#;
    let stale = (now().parse::<i64>().unwrap() - 3600).to_string();

    let err = slack
        .handle_payload(signed_payload(body, &stale))
        .await
        .unwrap_err();
    assert!(matches!(err, SlackError::SignatureVerification(_)));
}

#[tokio::test]
async fn unknown_route_is_not_a_verification_error() {
    let slack = app(SlackConfig::new(SECRET));
    let err = slack
        .handle_payload(json!({"routeKey": "DELETE /events"}))
        .await
        .unwrap_err();
    assert!(matches!(err, SlackError::RouteNotFound(_)));
}

#[tokio::test]
async fn oauth_install_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth.v2.access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "access_token": "xoxb-new",
            "team": {"id": "T0123456789"},
            "incoming_webhook": {"channel_id": "C0123456789"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = SlackConfig::new(SECRET)
        .with_install_uri("https://slack.com/oauth/v2/authorize?client_id=123")
        .with_oauth("client-id", "client-secret", None)
        .with_api_base_url(server.uri());
    let slack = app(config);

    // First leg: the install route redirects with a fresh state token.
    let reply = slack
        .handle_payload(json!({"routeKey": "GET /install"}))
        .await
        .unwrap();
    assert_eq!(reply["statusCode"], 302);
    let location = reply["headers"]["location"].as_str().unwrap();
    let state = location
        .strip_prefix("https://slack.com/oauth/v2/authorize?client_id=123&state=")
        .unwrap();

    // Second leg: Slack sends the browser back with the code.
    let reply = slack
        .handle_payload(json!({
            "routeKey": "GET /oauth",
            "queryStringParameters": {"state": state, "code": "<code>"},
        }))
        .await
        .unwrap();
    assert_eq!(
        reply,
        json!({
            "statusCode": 302,
            "body": null,
            "headers": {
                "content-type": "application/json; charset=utf-8",
                "content-length": "0",
                "location": "slack://channel?team=T0123456789&id=C0123456789",
            }
        })
    );
}

#[tokio::test]
async fn oauth_error_redirect() {
    let config = SlackConfig::new(SECRET).with_error_uri("https://redirect.com/");
    let slack = app(config);

    let reply = slack
        .handle_payload(json!({
            "routeKey": "GET /oauth",
            "queryStringParameters": {"state": "FIZZ", "error": "BUZZ"},
        }))
        .await
        .unwrap();
    assert_eq!(
        reply,
        json!({
            "statusCode": 302,
            "body": null,
            "headers": {
                "content-length": "0",
                "content-type": "application/json; charset=utf-8",
                "location": "https://redirect.com/",
            }
        })
    );
}
