//! OAuth "Add to Slack" installation handshake.
//!
//! The flow has two legs:
//! - the install route redirects the browser to the configured install URI
//!   with a fresh `state` token appended;
//! - Slack redirects back to the callback route with `code` and `state` (or
//!   `error`), the code is exchanged for credentials, and the browser is
//!   sent to `slack://channel?team=<team>&id=<channel>`.
//!
//! Issued tokens live in a [`StateStore`] keyed by token, so concurrent
//! installs each keep their own token. A token is accepted once and expires
//! after the configured TTL. The store is bounded: once it holds its
//! capacity of live tokens, new installs are refused until tokens are used
//! or expire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_STATE_CAPACITY, DEFAULT_STATE_TTL, SlackConfig};
use crate::error::{SlackError, SlackResult};
use crate::event::InboundEvent;
use crate::response::Response;

/// Number of random bytes behind a state token.
const STATE_BYTES: usize = 32;

/// Expired tokens are swept after this many insertions.
const PRUNE_INTERVAL: usize = 256;

/// Exchanges an authorization code for installation credentials.
#[async_trait]
pub trait CodeExchange: Send + Sync {
    /// Return the raw exchange result (the `oauth.v2.access` response).
    async fn exchange(&self, code: &str) -> SlackResult<Value>;
}

/// Generate an unguessable state token.
pub fn randstate() -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..STATE_BYTES).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Append `state=<token>` to `base`, after any query it already carries.
///
/// A `#fragment` on `base` stays at the end of the URL.
pub fn install_url_with_state(base: &str, state: &str) -> String {
    let (head, fragment) = match base.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (base, None),
    };

    let separator = match head.find('?') {
        None => "?",
        Some(_) if head.ends_with('?') || head.ends_with('&') => "",
        Some(_) => "&",
    };

    let mut url = format!("{}{}state={}", head, separator, urlencoding::encode(state));
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    url
}

/// Location Slack clients open after a successful install.
pub fn channel_location(team_id: &str, channel_id: &str) -> String {
    format!(
        "slack://channel?team={}&id={}",
        urlencoding::encode(team_id),
        urlencoding::encode(channel_id)
    )
}

/// Issued state tokens awaiting their callback.
#[derive(Debug)]
pub struct StateStore {
    tokens: DashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
    inserted_since_prune: AtomicUsize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

impl StateStore {
    /// Create an empty store whose tokens live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl,
            capacity: DEFAULT_STATE_CAPACITY,
            inserted_since_prune: AtomicUsize::new(0),
        }
    }

    /// Bound the number of outstanding tokens.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Maximum number of outstanding tokens.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Issue and remember a fresh token.
    pub fn issue(&self) -> SlackResult<String> {
        let token = randstate();
        self.insert(token.clone())?;
        Ok(token)
    }

    /// Remember a token generated elsewhere.
    ///
    /// Fails with [`SlackError::RateLimited`] when the store is full of
    /// live tokens. Concurrent inserts may overshoot the capacity by at most
    /// the number of callers racing.
    pub fn insert(&self, token: impl Into<String>) -> SlackResult<()> {
        let inserted = self.inserted_since_prune.fetch_add(1, Ordering::Relaxed) + 1;
        if inserted >= PRUNE_INTERVAL || self.tokens.len() >= self.capacity {
            self.prune();
        }
        if self.tokens.len() >= self.capacity {
            warn!(capacity = self.capacity, "OAuth state store is full");
            return Err(SlackError::RateLimited(
                "too many pending installs".to_string(),
            ));
        }

        self.tokens.insert(token.into(), Instant::now());
        Ok(())
    }

    /// Whether `token` is outstanding and unexpired, without using it up.
    pub fn is_live(&self, token: &str) -> bool {
        self.tokens
            .get(token)
            .is_some_and(|issued| issued.elapsed() <= self.ttl)
    }

    /// Accept `token` once. Unknown, expired and reused tokens are rejected.
    pub fn consume(&self, token: &str) -> bool {
        match self.tokens.remove(token) {
            Some((_, issued)) if issued.elapsed() <= self.ttl => true,
            Some(_) => {
                debug!("OAuth state token expired");
                false
            }
            None => false,
        }
    }

    /// Drop expired tokens.
    pub fn prune(&self) {
        self.inserted_since_prune.store(0, Ordering::Relaxed);
        let ttl = self.ttl;
        self.tokens.retain(|_, issued| issued.elapsed() <= ttl);
    }

    /// Number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no tokens are outstanding.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Drives the install handshake.
#[derive(Debug, Default)]
pub struct OAuthController {
    install_uri: Option<String>,
    error_uri: Option<String>,
    states: StateStore,
}

impl OAuthController {
    /// Create a controller.
    pub fn new(
        install_uri: Option<String>,
        error_uri: Option<String>,
        states: StateStore,
    ) -> Self {
        Self {
            install_uri,
            error_uri,
            states,
        }
    }

    /// Create a controller from configuration.
    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(
            config.oauth_install_uri().map(str::to_string),
            config.oauth_error_uri().map(str::to_string),
            StateStore::new(config.state_ttl()).with_capacity(config.state_capacity()),
        )
    }

    /// Issued state tokens.
    pub fn states(&self) -> &StateStore {
        &self.states
    }

    /// Configured error redirect.
    pub fn error_uri(&self) -> Option<&str> {
        self.error_uri.as_deref()
    }

    /// Issue a state token and build the install URL carrying it.
    pub fn install_url(&self) -> SlackResult<String> {
        let base = self
            .install_uri
            .as_deref()
            .ok_or_else(|| SlackError::Config("OAuth install URI not configured".to_string()))?;
        let state = self.states.issue()?;
        Ok(install_url_with_state(base, &state))
    }

    /// Redirect to the install URL.
    pub fn install_redirect(&self) -> SlackResult<Response> {
        let url = self.install_url()?;
        debug!("Redirecting to Slack install page");
        Ok(Response::redirect(url))
    }

    /// Validate the callback and exchange its code.
    ///
    /// Returns the raw exchange result together with the `slack://` location
    /// for the installed channel. An `error` parameter is reported before
    /// the state is looked at. A valid state is only used up once a code
    /// is present.
    pub async fn complete_install(
        &self,
        event: &InboundEvent,
        exchange: &dyn CodeExchange,
    ) -> SlackResult<(Value, String)> {
        if let Some(error) = event.query("error") {
            warn!(error, "Slack reported an OAuth error");
            return Err(SlackError::OAuthCallback(error.to_string()));
        }

        let state = event
            .query("state")
            .ok_or(SlackError::MissingParameter("state"))?;
        let code = event.query("code");
        let accepted = match code {
            Some(_) => self.states.consume(state),
            None => self.states.is_live(state),
        };
        if !accepted {
            warn!("OAuth callback with unknown state");
            return Err(SlackError::OAuthStateMismatch);
        }
        let code = code.ok_or(SlackError::MissingParameter("code"))?;

        let result = exchange.exchange(code).await.inspect_err(|e| {
            error!("OAuth code exchange failed: {}", e);
        })?;

        if result.get("ok").and_then(Value::as_bool) == Some(false) {
            let reason = result
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            error!(reason, "OAuth code exchange rejected");
            return Err(SlackError::Api(format!("oauth exchange failed: {}", reason)));
        }

        let team_id = result
            .pointer("/team/id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SlackError::InvalidPayload("exchange result lacks team.id".to_string())
            })?;
        let channel_id = result
            .pointer("/incoming_webhook/channel_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SlackError::InvalidPayload(
                    "exchange result lacks incoming_webhook.channel_id".to_string(),
                )
            })?;

        info!(team_id, channel_id, "Slack app installed");
        let location = channel_location(team_id, channel_id);
        Ok((result, location))
    }

    /// HTTP form of [`complete_install`](Self::complete_install).
    ///
    /// Success redirects to the channel. Callback errors, state mismatches
    /// and missing parameters redirect to the error URI when one is
    /// configured and are returned otherwise.
    pub async fn handle_install_callback(
        &self,
        event: &InboundEvent,
        exchange: &dyn CodeExchange,
    ) -> SlackResult<Response> {
        match self.complete_install(event, exchange).await {
            Ok((_, location)) => Ok(Response::redirect(location)),
            Err(err) if err.is_install_rejection() => match self.error_uri() {
                Some(uri) => {
                    debug!("Redirecting failed install: {}", err);
                    Ok(Response::redirect(uri))
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}
