//! Inbound request view.
//!
//! An [`InboundEvent`] is built once per request, either from an API Gateway
//! payload (HTTP API v2 or REST API v1) or from an `http::Request` received by
//! an HTTP host, and is read-only afterwards. Header and query parameter names
//! are stored lower-cased so lookups are case-insensitive.

use std::collections::BTreeMap;

use axum::http::request::Parts;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{SlackError, SlackResult};

/// Route key used by API Gateway when no explicit route matched.
const DEFAULT_ROUTE_KEY: &str = "$default";

/// An incoming request as seen by the router.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundEvent {
    route_key: String,
    body: Option<String>,
    headers: BTreeMap<String, String>,
    query: BTreeMap<String, String>,
    raw: Value,
}

impl InboundEvent {
    /// Start building an event for `route_key` (e.g. `"GET /resource"`).
    pub fn builder(route_key: impl Into<String>) -> InboundEventBuilder {
        InboundEventBuilder {
            event: InboundEvent {
                route_key: route_key.into(),
                ..Self::default()
            },
        }
    }

    /// Build an event from an API Gateway proxy payload.
    ///
    /// `routeKey` is used when present and not `$default`; otherwise the key
    /// is rebuilt from the HTTP method and path found in either payload
    /// version. Base64-encoded bodies are decoded.
    pub fn from_payload(payload: Value) -> SlackResult<Self> {
        let route_key = match payload.get("routeKey").and_then(Value::as_str) {
            Some(key) if key != DEFAULT_ROUTE_KEY => key.to_string(),
            _ => derive_route_key(&payload).unwrap_or_default(),
        };

        let headers = string_map(payload.get("headers"));
        let query = string_map(payload.get("queryStringParameters"));

        let body = match payload.get("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => {
                let encoded = payload
                    .get("isBase64Encoded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if encoded {
                    let bytes = STANDARD.decode(text)?;
                    Some(String::from_utf8(bytes).map_err(|e| {
                        SlackError::InvalidPayload(format!("Body is not UTF-8: {}", e))
                    })?)
                } else {
                    Some(text.clone())
                }
            }
            Some(other) => {
                return Err(SlackError::InvalidPayload(format!(
                    "Expected string body, got {}",
                    other
                )));
            }
        };

        Ok(Self {
            route_key,
            body,
            headers,
            query,
            raw: payload,
        })
    }

    /// Build an event from the parts of an HTTP request.
    pub fn from_http(parts: &Parts, body: &[u8]) -> SlackResult<Self> {
        let route_key = format!("{} {}", parts.method, parts.uri.path());

        let mut headers = BTreeMap::new();
        for (name, value) in &parts.headers {
            let value = value.to_str().map_err(|_| {
                SlackError::InvalidPayload(format!("Header {} is not valid text", name))
            })?;
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }

        let query = parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        let body = if body.is_empty() {
            None
        } else {
            Some(
                String::from_utf8(body.to_vec())
                    .map_err(|e| SlackError::InvalidPayload(format!("Body is not UTF-8: {}", e)))?,
            )
        };

        Ok(Self {
            route_key,
            body,
            headers,
            query,
            raw: Value::Null,
        })
    }

    /// Route key (`"<METHOD> <path>"`).
    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    /// Raw body exactly as received.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Query parameter by case-insensitive name.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// All headers, lower-cased names.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// All query parameters, lower-cased names.
    pub fn query_params(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Original host payload (`Null` when built from an HTTP request).
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Deserialize a JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> SlackResult<T> {
        let body = self
            .body
            .as_deref()
            .ok_or_else(|| SlackError::InvalidPayload("Missing body".to_string()))?;
        Ok(serde_json::from_str(body)?)
    }

    /// Decode an `application/x-www-form-urlencoded` body.
    ///
    /// Slash commands and interactivity payloads arrive this way.
    pub fn form(&self) -> BTreeMap<String, String> {
        self.body
            .as_deref()
            .map(|body| {
                url::form_urlencoded::parse(body.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Builder for [`InboundEvent`].
#[derive(Debug, Clone)]
pub struct InboundEventBuilder {
    event: InboundEvent,
}

impl InboundEventBuilder {
    /// Set the raw body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.event.body = Some(body.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.event
            .headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.event
            .query
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Finish building.
    pub fn build(self) -> InboundEvent {
        self.event
    }
}

fn derive_route_key(payload: &Value) -> Option<String> {
    let http = payload.pointer("/requestContext/http");
    let method = payload
        .get("httpMethod")
        .or_else(|| http.and_then(|h| h.get("method")))
        .and_then(Value::as_str)?;
    let path = payload
        .get("rawPath")
        .or_else(|| payload.get("path"))
        .or_else(|| http.and_then(|h| h.get("path")))
        .and_then(Value::as_str)?;
    Some(format!("{} {}", method.to_ascii_uppercase(), path))
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            Some((k.to_ascii_lowercase(), v))
        })
        .collect()
}
