//! The Slack app: verification, dispatch and the OAuth routes wired together.
//!
//! # Example
//!
//! ```rust,ignore
//! use slack_lambda::{InboundEvent, Response, Slack, SlackConfig, SlackResult};
//!
//! async fn ack(_event: InboundEvent) -> SlackResult<Response> {
//!     Ok(Response::empty(200))
//! }
//!
//! let mut builder = Slack::builder(SlackConfig::from_env()?)?;
//! builder.route("POST /events", ack);
//! builder.oauth_routes("GET /install", "GET /oauth");
//! let slack = builder.build()?;
//!
//! let response = slack.handle_payload(payload).await?;
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::WebApiClient;
use crate::config::SlackConfig;
use crate::error::{SlackError, SlackResult};
use crate::event::InboundEvent;
use crate::oauth::OAuthController;
use crate::response::Response;
use crate::router::{Handler, RouteTable, RouteTableBuilder};
use crate::signature::SigningContext;

/// A Slack app ready to handle requests.
pub struct Slack<O = Response> {
    routes: RouteTable<O>,
    verifier: Option<SigningContext>,
    oauth: Arc<OAuthController>,
    client: Arc<WebApiClient>,
}

impl<O: 'static> Slack<O> {
    /// Start building an app from configuration.
    pub fn builder(config: SlackConfig) -> SlackResult<SlackBuilder<O>> {
        SlackBuilder::new(config)
    }

    /// Dispatch `event` to its route.
    ///
    /// Signed routes are verified first when verification is enabled; a
    /// failed check never reaches the handler. The handler's output is
    /// returned unmodified.
    pub async fn handle(&self, event: InboundEvent) -> SlackResult<O> {
        let route = self.routes.get(event.route_key()).ok_or_else(|| {
            debug!(route = event.route_key(), "No route registered");
            SlackError::RouteNotFound(event.route_key().to_string())
        })?;

        if route.requires_verification()
            && let Some(verifier) = &self.verifier
        {
            verifier.verify(&event)?;
        }

        debug!(route = event.route_key(), "Dispatching request");
        route.handler().call(event).await
    }

    /// Route table.
    pub fn routes(&self) -> &RouteTable<O> {
        &self.routes
    }

    /// Whether signed routes are verified.
    pub fn verifies(&self) -> bool {
        self.verifier.is_some()
    }

    /// OAuth controller.
    pub fn oauth(&self) -> &Arc<OAuthController> {
        &self.oauth
    }

    /// Web API client.
    pub fn client(&self) -> &Arc<WebApiClient> {
        &self.client
    }
}

impl Slack<Response> {
    /// Handle an API Gateway payload and return the serialized response.
    pub async fn handle_payload(&self, payload: Value) -> SlackResult<Value> {
        let event = InboundEvent::from_payload(payload)?;
        let response = self.handle(event).await?;
        Ok(serde_json::to_value(response)?)
    }

    /// Like [`handle`](Self::handle), but errors become error responses.
    pub async fn respond_to(&self, event: InboundEvent) -> Response {
        match self.handle(event).await {
            Ok(response) => response,
            Err(err) => {
                warn!(code = err.error_code(), "Request failed: {}", err);
                Response::from_error(&err)
            }
        }
    }
}

/// Registers routes, then builds a [`Slack`].
pub struct SlackBuilder<O> {
    config: SlackConfig,
    routes: RouteTableBuilder<O>,
    oauth: Arc<OAuthController>,
    client: Arc<WebApiClient>,
}

impl<O: 'static> SlackBuilder<O> {
    /// Create a builder; the OAuth controller and Web API client are
    /// available right away so handlers can capture them.
    pub fn new(config: SlackConfig) -> SlackResult<Self> {
        let client = Arc::new(WebApiClient::from_config(&config)?);
        let oauth = Arc::new(OAuthController::from_config(&config));
        Ok(Self {
            config,
            routes: RouteTableBuilder::new(),
            oauth,
            client,
        })
    }

    /// Register a handler for signed requests; see [`RouteTableBuilder::route`].
    pub fn route<H>(&mut self, key: impl Into<String>, handler: H) -> Arc<H>
    where
        H: Handler<O> + 'static,
    {
        self.routes.route(key, handler)
    }

    /// Register a handler for unsigned requests.
    pub fn route_unverified<H>(&mut self, key: impl Into<String>, handler: H) -> Arc<H>
    where
        H: Handler<O> + 'static,
    {
        self.routes.route_unverified(key, handler)
    }

    /// OAuth controller shared with the built app.
    pub fn oauth(&self) -> Arc<OAuthController> {
        Arc::clone(&self.oauth)
    }

    /// Web API client shared with the built app.
    pub fn client(&self) -> Arc<WebApiClient> {
        Arc::clone(&self.client)
    }

    /// Validate the configuration and freeze the routes.
    pub fn build(self) -> SlackResult<Slack<O>> {
        self.config.validate()?;
        let verifier = if self.config.verify() {
            Some(SigningContext::from_config(&self.config)?)
        } else {
            warn!("Slack request verification is disabled");
            None
        };

        Ok(Slack {
            routes: self.routes.build(),
            verifier,
            oauth: self.oauth,
            client: self.client,
        })
    }
}

impl SlackBuilder<Response> {
    /// Register the install redirect and the OAuth callback.
    ///
    /// Both routes are unsigned: Slack sends the browser there, not a
    /// signed webhook. The callback exchanges codes with the Web API client.
    pub fn oauth_routes(&mut self, install_key: &str, callback_key: &str) -> &mut Self {
        let oauth = self.oauth();
        self.route_unverified(install_key, move |_event: InboundEvent| {
            let oauth = Arc::clone(&oauth);
            async move { oauth.install_redirect() }
        });

        let oauth = self.oauth();
        let client = self.client();
        self.route_unverified(callback_key, move |event: InboundEvent| {
            let oauth = Arc::clone(&oauth);
            let client = Arc::clone(&client);
            async move { oauth.handle_install_callback(&event, client.as_ref()).await }
        });
        self
    }
}
