//! Outbound Slack Web API calls.
//!
//! Requests are first described as an [`OutboundRequest`] so the exact wire
//! shape can be inspected without a network round trip, then sent with
//! `reqwest`. Failures are returned to the caller as-is; nothing is retried.

use std::collections::BTreeMap;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{DEFAULT_API_BASE_URL, DEFAULT_OAUTH_METHOD, SlackConfig, secret};
use crate::error::{SlackError, SlackResult};
use crate::oauth::CodeExchange;
use crate::response::{JSON_CONTENT_TYPE, to_json_string, to_json_vec};

/// `content-type` of form-encoded requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Methods that only accept form-encoded bodies.
const FORM_METHODS: &[&str] = &["files.upload", "oauth.access", "oauth.v2.access"];

/// Fully described outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Encoded body.
    pub data: Vec<u8>,
    /// Headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
}

/// Whether `method` (e.g. `api/files.upload`) takes a form body.
pub fn is_form_method(method: &str) -> bool {
    let name = method.rsplit('/').next().unwrap_or(method);
    FORM_METHODS.contains(&name)
}

/// OAuth client credentials used for the code exchange.
#[derive(Clone)]
struct ClientCredentials {
    client_id: String,
    client_secret: SecretString,
    redirect_uri: Option<String>,
}

/// Slack Web API client.
#[derive(Clone)]
pub struct WebApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
    oauth_method: String,
    credentials: Option<ClientCredentials>,
}

impl std::fmt::Debug for WebApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("oauth_method", &self.oauth_method)
            .finish()
    }
}

impl Default for WebApiClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_API_BASE_URL.to_string(),
            token: None,
            oauth_method: DEFAULT_OAUTH_METHOD.to_string(),
            credentials: None,
        }
    }
}

impl WebApiClient {
    /// Create a client from configuration.
    pub fn from_config(config: &SlackConfig) -> SlackResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.api_timeout())
            .build()
            .map_err(|e| SlackError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = match (config.client_id(), config.client_secret()) {
            (Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                client_id: client_id.to_string(),
                client_secret: secret(client_secret),
                redirect_uri: config.redirect_uri().map(str::to_string),
            }),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.api_base_url().to_string(),
            token: config.token().map(secret),
            oauth_method: config.oauth_method().to_string(),
            credentials,
        })
    }

    /// Replace the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(secret(token));
        self
    }

    /// Point at another base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Describe a POST of `body` to `method` (e.g. `api/chat.postMessage`).
    pub fn post_request<T: Serialize + ?Sized>(
        &self,
        body: &T,
        method: &str,
    ) -> SlackResult<OutboundRequest> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            method.trim_start_matches('/')
        );

        let mut headers = BTreeMap::new();
        if let Some(token) = &self.token {
            headers.insert(
                "authorization".to_string(),
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let data = if is_form_method(method) {
            headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
            form_encode(&serde_json::to_value(body)?)?.into_bytes()
        } else {
            headers.insert("content-type".to_string(), JSON_CONTENT_TYPE.to_string());
            to_json_vec(body)?
        };

        Ok(OutboundRequest {
            method: "POST".to_string(),
            url,
            data,
            headers,
        })
    }

    /// POST `body` to `method` and decode the JSON reply.
    pub async fn post<T: Serialize + ?Sized>(&self, body: &T, method: &str) -> SlackResult<Value> {
        let request = self.post_request(body, method)?;
        self.send(request).await
    }

    /// Send a described request and decode the JSON reply.
    pub async fn send(&self, request: OutboundRequest) -> SlackResult<Value> {
        debug!(url = %request.url, "Calling Slack Web API");

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| SlackError::Internal(format!("Invalid HTTP method: {}", e)))?;
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.data).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!(
                "{} returned {}: {}",
                request.url, status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl CodeExchange for WebApiClient {
    async fn exchange(&self, code: &str) -> SlackResult<Value> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| {
                SlackError::Config("OAuth client credentials not configured".to_string())
            })?;

        let mut form = serde_json::Map::new();
        form.insert("client_id".into(), credentials.client_id.clone().into());
        form.insert(
            "client_secret".into(),
            credentials.client_secret.expose_secret().into(),
        );
        form.insert("code".into(), code.into());
        if let Some(redirect_uri) = &credentials.redirect_uri {
            form.insert("redirect_uri".into(), redirect_uri.clone().into());
        }

        self.post(&Value::Object(form), &self.oauth_method).await
    }
}

/// Encode a JSON object as `key=value` pairs joined with `&`.
///
/// Strings are sent raw; other values (blocks, numbers, booleans) as JSON.
fn form_encode(value: &Value) -> SlackResult<String> {
    let Value::Object(map) = value else {
        return Err(SlackError::InvalidPayload(
            "Form body must be a JSON object".to_string(),
        ));
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in map {
        match value {
            Value::Null => {}
            Value::String(s) => {
                serializer.append_pair(key, s);
            }
            other => {
                serializer.append_pair(key, &to_json_string(other)?);
            }
        }
    }
    Ok(serializer.finish())
}
