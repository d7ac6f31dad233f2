//! Events API envelopes.
//!
//! Slack posts two kinds of envelopes to an events URL:
//! - `url_verification` when the URL is configured; the reply must echo the
//!   `challenge` value;
//! - `event_callback` for subscribed events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SlackResult;
use crate::event::InboundEvent;
use crate::response::Response;

/// Outer envelope of an Events API request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventEnvelope {
    /// Endpoint ownership check.
    UrlVerification {
        /// Value to echo back.
        challenge: String,
    },
    /// A subscribed event.
    EventCallback {
        /// Workspace the event belongs to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team_id: Option<String>,
        /// App the event was delivered to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_app_id: Option<String>,
        /// The inner event, left untyped.
        event: Value,
        /// Unique event ID.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_id: Option<String>,
        /// Event time (unix seconds).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event_time: Option<u64>,
    },
    /// Any other envelope type.
    #[serde(other)]
    Unknown,
}

impl EventEnvelope {
    /// Parse the envelope carried in `event`'s JSON body.
    pub fn from_event(event: &InboundEvent) -> SlackResult<Self> {
        event.json()
    }

    /// Inner event type (`"app_mention"`, `"message"`, ...).
    pub fn event_type(&self) -> Option<&str> {
        match self {
            EventEnvelope::EventCallback { event, .. } => event.get("type")?.as_str(),
            _ => None,
        }
    }
}

/// Reply to a `url_verification` envelope, `None` for anything else.
pub fn challenge_response(envelope: &EventEnvelope) -> SlackResult<Option<Response>> {
    match envelope {
        EventEnvelope::UrlVerification { challenge } => Ok(Some(Response::json(
            200,
            &serde_json::json!({ "challenge": challenge }),
        )?)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_url_verification() {
        let event = InboundEvent::builder("POST /events")
            .body(
                json!({
                    "token": "Jhj5dZrVaK7ZwHHjRyZWjbDl",
                    "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P",
                    "type": "url_verification"
                })
                .to_string(),
            )
            .build();

        let envelope = EventEnvelope::from_event(&event).unwrap();
        assert_eq!(
            envelope,
            EventEnvelope::UrlVerification {
                challenge: "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P".to_string()
            }
        );

        let response = challenge_response(&envelope).unwrap().unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(
            response.body.as_deref(),
            Some(r#"{"challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"}"#)
        );
    }

    #[test]
    fn test_parse_event_callback() {
        let event = InboundEvent::builder("POST /events")
            .body(
                json!({
                    "type": "event_callback",
                    "team_id": "T0123456789",
                    "api_app_id": "A0123456789",
                    "event": {"type": "app_mention", "text": "<@U1> hi", "channel": "C1"},
                    "event_id": "Ev0123",
                    "event_time": 1_700_000_000u64
                })
                .to_string(),
            )
            .build();

        let envelope = EventEnvelope::from_event(&event).unwrap();
        assert_eq!(envelope.event_type(), Some("app_mention"));
        assert!(matches!(
            envelope,
            EventEnvelope::EventCallback { ref team_id, .. }
                if team_id.as_deref() == Some("T0123456789")
        ));
        assert!(challenge_response(&envelope).unwrap().is_none());
    }

    #[test]
    fn test_parse_unknown_envelope() {
        let event = InboundEvent::builder("POST /events")
            .body(r#"{"type":"app_rate_limited","minute_rate_limited":1518467820}"#)
            .build();
        assert_eq!(
            EventEnvelope::from_event(&event).unwrap(),
            EventEnvelope::Unknown
        );
    }

    #[test]
    fn test_parse_invalid_json() {
        let event = InboundEvent::builder("POST /events").body("not json").build();
        assert!(EventEnvelope::from_event(&event).is_err());
    }
}
