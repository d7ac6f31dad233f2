//! Slack app adapter for serverless HTTP handlers.
//!
//! This crate lets a request handler (API Gateway/Lambda style, or any HTTP
//! host) act as a Slack app:
//! - Request verification with Slack's HMAC signing scheme
//! - Dispatch of requests to handlers keyed by `"<METHOD> <path>"`
//! - The OAuth "Add to Slack" install handshake
//! - Outbound Web API calls (JSON and form-encoded)
//!
//! # Architecture
//!
//! A [`Slack`] app owns an immutable route table, an optional
//! [`SigningContext`], an [`OAuthController`] and a [`WebApiClient`].
//! Every request flows through [`Slack::handle`]: route lookup, signature
//! check for signed routes, then the handler.
//!
//! # Example
//!
//! ```rust,ignore
//! use slack_lambda::{
//!     EventEnvelope, InboundEvent, Response, Slack, SlackConfig, SlackResult, challenge_response,
//! };
//!
//! async fn events(event: InboundEvent) -> SlackResult<Response> {
//!     let envelope = EventEnvelope::from_event(&event)?;
//!     Ok(challenge_response(&envelope)?.unwrap_or_else(|| Response::empty(200)))
//! }
//!
//! let mut builder = Slack::builder(SlackConfig::from_env()?)?;
//! builder.route("POST /events", events);
//! builder.oauth_routes("GET /install", "GET /oauth");
//! let slack = builder.build()?;
//! ```
//!
//! # Configuration
//!
//! Required environment variables:
//! - `SLACK_SIGNING_SECRET` - Signing secret for request verification
//!
//! Optional:
//! - `SLACK_TOKEN` - Bot or user token for Web API calls
//! - `SLACK_OAUTH_INSTALL_URI` / `SLACK_OAUTH_ERROR_URI` - Install flow
//! - `SLACK_CLIENT_ID` / `SLACK_CLIENT_SECRET` - For the code exchange

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod oauth;
pub mod payload;
pub mod response;
pub mod router;
pub mod signature;

// Re-export main types
pub use app::{Slack, SlackBuilder};
pub use client::{OutboundRequest, WebApiClient};
pub use config::SlackConfig;
pub use error::{SlackError, SlackResult};
pub use event::InboundEvent;
pub use oauth::{CodeExchange, OAuthController, install_url_with_state, randstate};
pub use payload::{EventEnvelope, challenge_response};
pub use response::{Response, ResponseBody, respond};
pub use router::{Handler, RouteTable, RouteTableBuilder};
pub use signature::SigningContext;
