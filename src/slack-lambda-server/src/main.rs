//! slack-lambda server - runs a Slack app behind a plain HTTP listener.
//!
//! Every request is turned into an [`InboundEvent`] and handed to the app,
//! so the same routes work here and behind API Gateway.

use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::response::IntoResponse;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use slack_lambda::{
    EventEnvelope, InboundEvent, Response, Slack, SlackConfig, SlackError, SlackResult,
    challenge_response,
};

/// Request bodies above this size are rejected.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// slack-lambda server
#[derive(Parser)]
#[command(name = "slack-lambda-server")]
#[command(about = "HTTP host for a Slack app")]
#[command(version)]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000", env = "SLACK_LISTEN_ADDR")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Route key of the Events API endpoint
    #[arg(long, default_value = "POST /events")]
    events_route: String,

    /// Route key of the install redirect
    #[arg(long, default_value = "GET /install")]
    install_route: String,

    /// Route key of the OAuth callback
    #[arg(long, default_value = "GET /oauth")]
    oauth_route: String,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Acknowledge Events API deliveries, answering URL verification.
async fn events(event: InboundEvent) -> SlackResult<Response> {
    let envelope = EventEnvelope::from_event(&event)?;
    if let Some(reply) = challenge_response(&envelope)? {
        info!("Answering URL verification");
        return Ok(reply);
    }

    match &envelope {
        EventEnvelope::EventCallback { team_id, .. } => info!(
            event_type = envelope.event_type().unwrap_or("unknown"),
            team = team_id.as_deref().unwrap_or("-"),
            "Received event"
        ),
        _ => warn!("Ignoring unsupported envelope"),
    }
    Ok(Response::empty(200))
}

fn build_app(config: SlackConfig, args: &Args) -> SlackResult<Slack> {
    let mut builder = Slack::builder(config)?;
    builder.route(args.events_route.as_str(), events);
    builder.oauth_routes(&args.install_route, &args.oauth_route);
    builder.build()
}

async fn dispatch(State(slack): State<Arc<Slack>>, request: Request) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = SlackError::InvalidPayload(format!("Failed to read body: {}", e));
            warn!("{}", err);
            return Response::from_error(&err).into_response();
        }
    };

    match InboundEvent::from_http(&parts, &bytes) {
        Ok(event) => slack.respond_to(event).await.into_response(),
        Err(err) => {
            warn!("{}", err);
            Response::from_error(&err).into_response()
        }
    }
}

fn router(slack: Arc<Slack>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(slack)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    let config = match SlackConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config from environment: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(config = ?config.metadata(), "Loaded Slack config");

    let slack = match build_app(config, &args) {
        Ok(slack) => Arc::new(slack),
        Err(e) => {
            error!("Failed to build Slack app: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = serve(&args.listen, slack).await {
        error!("Server error: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

async fn serve(listen: &str, slack: Arc<Slack>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(
        "Listening on {} with routes {:?}",
        listener.local_addr()?,
        slack.routes().keys()
    );
    info!(api = slack.client().base_url(), "Slack Web API endpoint");

    axum::serve(listener, router(slack))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn test_args() -> Args {
        Args::parse_from(["slack-lambda-server"])
    }

    fn test_router() -> Router {
        let config = SlackConfig::default().with_verification(false);
        let slack = build_app(config, &test_args()).unwrap();
        router(Arc::new(slack))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), MAX_BODY_BYTES)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_url_verification() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"type": "url_verification", "challenge": "abc123"}).to_string(),
            ))
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"challenge": "abc123"}));
    }

    #[tokio::test]
    async fn test_event_callback_acknowledged() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/events")
            .body(Body::from(
                json!({
                    "type": "event_callback",
                    "team_id": "T1",
                    "event": {"type": "app_mention"}
                })
                .to_string(),
            ))
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let request = HttpRequest::builder()
            .uri("/nowhere")
            .body(Body::empty())
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }

    #[tokio::test]
    async fn test_oauth_error_is_rejected() {
        let request = HttpRequest::builder()
            .uri("/oauth?error=access_denied&state=x")
            .body(Body::empty())
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
