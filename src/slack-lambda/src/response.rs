//! Responses handed back to the host.
//!
//! The wire shape is `{"statusCode": u16, "body": string|null, "headers": {..}}`,
//! which is what API Gateway expects from a proxy integration. Header names
//! are lower-cased. `content-length` is always present and always computed
//! from the encoded body, so a caller cannot set it to a wrong value.
//!
//! JSON is written with `", "` and `": "` separators and non-ASCII
//! characters escaped as `\uXXXX`, byte for byte what Slack's own SDKs
//! produce (`{"ok": true}`).

use std::collections::BTreeMap;
use std::io;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::Formatter;
use tracing::error;

use crate::error::{SlackError, SlackResult};

/// Default `content-type` of every response.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Writes `", "` between items, `": "` after keys, and escapes non-ASCII.
#[derive(Debug, Clone, Copy, Default)]
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize `value` to JSON bytes in the wire format.
pub fn to_json_vec<T: Serialize + ?Sized>(value: &T) -> SlackResult<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Serialize `value` to a JSON string in the wire format.
pub fn to_json_string<T: Serialize + ?Sized>(value: &T) -> SlackResult<String> {
    let bytes = to_json_vec(value)?;
    String::from_utf8(bytes)
        .map_err(|e| SlackError::Internal(format!("JSON output is not UTF-8: {}", e)))
}

/// Body passed to [`respond`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Serialized with [`to_json_string`].
    Json(Value),
    /// Sent as-is.
    Text(String),
}

impl ResponseBody {
    fn encode(self) -> String {
        match self {
            ResponseBody::Json(value) => to_json_string(&value).unwrap_or_else(|e| {
                error!("Failed to encode response body: {}", e);
                value.to_string()
            }),
            ResponseBody::Text(text) => text,
        }
    }
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        ResponseBody::Json(value)
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

/// A structured HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP status code.
    pub status_code: u16,
    /// Encoded body, `None` for empty responses.
    pub body: Option<String>,
    /// Headers with lower-cased names.
    pub headers: BTreeMap<String, String>,
}

/// Build a [`Response`].
///
/// `content-type` defaults to JSON and may be overridden through `headers`;
/// `content-length` is set last from the encoded body.
pub fn respond<I, K, V>(status_code: u16, body: Option<ResponseBody>, headers: I) -> Response
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let body = body.map(ResponseBody::encode);

    let mut map = BTreeMap::new();
    map.insert("content-type".to_string(), JSON_CONTENT_TYPE.to_string());
    for (name, value) in headers {
        map.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    let length = body.as_ref().map_or(0, String::len);
    map.insert("content-length".to_string(), length.to_string());

    Response {
        status_code,
        body,
        headers: map,
    }
}

impl Response {
    /// Response with no body.
    pub fn empty(status_code: u16) -> Self {
        respond(status_code, None, no_headers())
    }

    /// 302 redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        let location: String = location.into();
        respond(302, None, [("location", location)])
    }

    /// JSON response.
    pub fn json<T: Serialize>(status_code: u16, value: &T) -> Result<Self, SlackError> {
        let value = serde_json::to_value(value)?;
        Ok(respond(status_code, Some(ResponseBody::Json(value)), no_headers()))
    }

    /// Plain text response.
    pub fn text(status_code: u16, text: impl Into<String>) -> Self {
        respond(
            status_code,
            Some(ResponseBody::Text(text.into())),
            [("content-type", "text/plain; charset=utf-8")],
        )
    }

    /// Error response `{"error": code, "message": text}` with the error's status.
    pub fn from_error(err: &SlackError) -> Self {
        let body = serde_json::json!({
            "error": err.error_code(),
            "message": err.to_string(),
        });
        respond(
            err.status_code().as_u16(),
            Some(ResponseBody::Json(body)),
            no_headers(),
        )
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

fn no_headers() -> [(&'static str, String); 0] {
    []
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or_else(|_| {
            error!(status = self.status_code, "Handler returned an invalid status");
            StatusCode::INTERNAL_SERVER_ERROR
        });

        let mut response = axum::response::Response::new(Body::from(self.body.unwrap_or_default()));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => error!(header = %name, "Dropping invalid response header"),
            }
        }
        response
    }
}
