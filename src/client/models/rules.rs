//! Frontend rule matchers and actions.
//!
//! On the wire every matcher is an object with a `type` discriminator, an
//! `inverse` flag and a payload under `match_<type>`:
//!
//! ```json
//! {"type": "src_port", "inverse": false, "match_src_port": {"method": "equal", "value": 80}}
//! ```
//!
//! Actions follow the same shape with an `action_<type>` payload. Here they
//! are plain enums with one variant per kind, converted at the serde
//! boundary.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{value}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchValue {
    /// Value to compare against.
    pub value: String,
}

/// Integer comparison payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInteger {
    /// `equal`, `greater`, `greater_or_equal`, `less` or `less_or_equal`.
    pub method: String,
    /// Value to compare against.
    pub value: i64,
}

/// Inclusive integer range payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRange {
    /// Range start.
    pub range_start: i64,
    /// Range end.
    pub range_end: i64,
}

/// String comparison payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchString {
    /// `exact`, `substring`, `regexp`, `starts`, `ends`, `domain`, `ip` or `exists`.
    pub method: String,
    /// Value to compare against, unused by `exists`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Case insensitive comparison.
    #[serde(default)]
    pub ignore_case: bool,
}

/// String comparison against a named cookie, header or URL parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchNamedString {
    /// Cookie, header or parameter name.
    pub name: String,
    /// Comparison method.
    pub method: String,
    /// Value to compare against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Case insensitive comparison.
    #[serde(default)]
    pub ignore_case: bool,
}

/// Healthy member count payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchNumMembersUp {
    /// Comparison method.
    pub method: String,
    /// Member count to compare against.
    pub value: i64,
    /// Backend whose members are counted.
    pub backend: String,
}

/// One rule condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherKind {
    /// Client address.
    SrcIp(MatchValue),
    /// Client port.
    SrcPort(MatchInteger),
    /// Client port range.
    SrcPortRange(MatchRange),
    /// Request body size.
    BodySize(MatchInteger),
    /// Request body size range.
    BodySizeRange(MatchRange),
    /// Request path.
    Path(MatchString),
    /// Full URL.
    Url(MatchString),
    /// URL query string.
    UrlQuery(MatchString),
    /// Host header.
    Host(MatchValue),
    /// HTTP method.
    HttpMethod(MatchValue),
    /// Cookie value.
    Cookie(MatchNamedString),
    /// Header value.
    Header(MatchNamedString),
    /// URL parameter value.
    UrlParam(MatchNamedString),
    /// Number of healthy members in a backend.
    NumMembersUp(MatchNumMembersUp),
}

/// Every matcher type name, in schema order.
pub const MATCHER_TYPES: [&str; 14] = [
    "src_ip",
    "src_port",
    "src_port_range",
    "body_size",
    "body_size_range",
    "path",
    "url",
    "url_query",
    "host",
    "http_method",
    "cookie",
    "header",
    "url_param",
    "num_members_up",
];

impl MatcherKind {
    /// The wire `type` of this matcher.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SrcIp(_) => "src_ip",
            Self::SrcPort(_) => "src_port",
            Self::SrcPortRange(_) => "src_port_range",
            Self::BodySize(_) => "body_size",
            Self::BodySizeRange(_) => "body_size_range",
            Self::Path(_) => "path",
            Self::Url(_) => "url",
            Self::UrlQuery(_) => "url_query",
            Self::Host(_) => "host",
            Self::HttpMethod(_) => "http_method",
            Self::Cookie(_) => "cookie",
            Self::Header(_) => "header",
            Self::UrlParam(_) => "url_param",
            Self::NumMembersUp(_) => "num_members_up",
        }
    }

    /// The payload as JSON.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::SrcIp(p) | Self::Host(p) | Self::HttpMethod(p) => serde_json::to_value(p),
            Self::SrcPort(p) | Self::BodySize(p) => serde_json::to_value(p),
            Self::SrcPortRange(p) | Self::BodySizeRange(p) => serde_json::to_value(p),
            Self::Path(p) | Self::Url(p) | Self::UrlQuery(p) => serde_json::to_value(p),
            Self::Cookie(p) | Self::Header(p) | Self::UrlParam(p) => serde_json::to_value(p),
            Self::NumMembersUp(p) => serde_json::to_value(p),
        }
    }

    /// Build a matcher from its type name and JSON payload.
    pub fn from_payload(type_name: &str, payload: Value) -> Result<Self, serde_json::Error> {
        use serde::de::Error as _;

        let kind = match type_name {
            "src_ip" => Self::SrcIp(serde_json::from_value(payload)?),
            "src_port" => Self::SrcPort(serde_json::from_value(payload)?),
            "src_port_range" => Self::SrcPortRange(serde_json::from_value(payload)?),
            "body_size" => Self::BodySize(serde_json::from_value(payload)?),
            "body_size_range" => Self::BodySizeRange(serde_json::from_value(payload)?),
            "path" => Self::Path(serde_json::from_value(payload)?),
            "url" => Self::Url(serde_json::from_value(payload)?),
            "url_query" => Self::UrlQuery(serde_json::from_value(payload)?),
            "host" => Self::Host(serde_json::from_value(payload)?),
            "http_method" => Self::HttpMethod(serde_json::from_value(payload)?),
            "cookie" => Self::Cookie(serde_json::from_value(payload)?),
            "header" => Self::Header(serde_json::from_value(payload)?),
            "url_param" => Self::UrlParam(serde_json::from_value(payload)?),
            "num_members_up" => Self::NumMembersUp(serde_json::from_value(payload)?),
            other => {
                return Err(serde_json::Error::custom(format!(
                    "unknown matcher type '{}'",
                    other
                )))
            },
        };
        Ok(kind)
    }
}

/// A rule condition, optionally negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatcher {
    /// Negate the condition.
    pub inverse: bool,
    /// The condition.
    pub kind: MatcherKind,
}

impl RuleMatcher {
    /// A non-negated matcher.
    pub fn new(kind: MatcherKind) -> Self {
        Self {
            inverse: false,
            kind,
        }
    }
}

impl Serialize for RuleMatcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let type_name = self.kind.type_name();
        let payload = self.kind.payload().map_err(serde::ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("type", type_name)?;
        map.serialize_entry("inverse", &self.inverse)?;
        map.serialize_entry(&format!("match_{}", type_name), &payload)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut obj = Map::<String, Value>::deserialize(deserializer)?;
        let type_name = take_type(&obj).map_err(de::Error::custom)?;
        let inverse = obj.get("inverse").and_then(Value::as_bool).unwrap_or(false);
        let payload = obj
            .remove(&format!("match_{}", type_name))
            .unwrap_or_else(|| Value::Object(Map::new()));
        let kind = MatcherKind::from_payload(&type_name, payload).map_err(de::Error::custom)?;
        Ok(Self { inverse, kind })
    }
}

/// `{backend}` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseBackend {
    /// Backend name.
    pub backend: String,
}

/// Fixed HTTP response.
///
/// `payload` holds the response body as text. It is base64 encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpReturn {
    /// HTTP status.
    pub status: i64,
    /// Content-Type header.
    pub content_type: String,
    /// Response body.
    #[serde(with = "base64_text")]
    pub payload: String,
}

/// Redirect target. Exactly one field is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRedirect {
    /// Absolute or relative location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Redirect to the same URL with this scheme, `http` or `https`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// Header name and value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetHeader {
    /// Header name.
    pub header: String,
    /// Header value. Empty removes the header.
    #[serde(default)]
    pub value: String,
}

/// One rule action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Send the request to another backend.
    UseBackend(UseBackend),
    /// Answer with a fixed response.
    HttpReturn(HttpReturn),
    /// Answer with a redirect.
    HttpRedirect(HttpRedirect),
    /// Close the TCP connection.
    TcpReject,
    /// Answer with 403.
    HttpReject,
    /// Add `X-Forwarded-*` headers.
    SetForwardedHeaders,
    /// Set a request header.
    SetRequestHeader(SetHeader),
    /// Set a response header.
    SetResponseHeader(SetHeader),
}

/// Every action type name, in schema order.
pub const ACTION_TYPES: [&str; 8] = [
    "use_backend",
    "http_return",
    "http_redirect",
    "tcp_reject",
    "http_reject",
    "set_forwarded_headers",
    "set_request_header",
    "set_response_header",
];

impl RuleAction {
    /// The wire `type` of this action.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::UseBackend(_) => "use_backend",
            Self::HttpReturn(_) => "http_return",
            Self::HttpRedirect(_) => "http_redirect",
            Self::TcpReject => "tcp_reject",
            Self::HttpReject => "http_reject",
            Self::SetForwardedHeaders => "set_forwarded_headers",
            Self::SetRequestHeader(_) => "set_request_header",
            Self::SetResponseHeader(_) => "set_response_header",
        }
    }

    /// The wire payload. Actions without parameters have an empty object.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::UseBackend(p) => serde_json::to_value(p),
            Self::HttpReturn(p) => serde_json::to_value(p),
            Self::HttpRedirect(p) => serde_json::to_value(p),
            Self::TcpReject | Self::HttpReject | Self::SetForwardedHeaders => {
                Ok(Value::Object(Map::new()))
            },
            Self::SetRequestHeader(p) | Self::SetResponseHeader(p) => serde_json::to_value(p),
        }
    }

    /// Build an action from its type name and wire payload.
    pub fn from_payload(type_name: &str, payload: Value) -> Result<Self, serde_json::Error> {
        use serde::de::Error as _;

        let action = match type_name {
            "use_backend" => Self::UseBackend(serde_json::from_value(payload)?),
            "http_return" => Self::HttpReturn(serde_json::from_value(payload)?),
            "http_redirect" => Self::HttpRedirect(serde_json::from_value(payload)?),
            "tcp_reject" => Self::TcpReject,
            "http_reject" => Self::HttpReject,
            "set_forwarded_headers" => Self::SetForwardedHeaders,
            "set_request_header" => Self::SetRequestHeader(serde_json::from_value(payload)?),
            "set_response_header" => Self::SetResponseHeader(serde_json::from_value(payload)?),
            other => {
                return Err(serde_json::Error::custom(format!(
                    "unknown action type '{}'",
                    other
                )))
            },
        };
        Ok(action)
    }
}

impl Serialize for RuleAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let type_name = self.type_name();
        let payload = self.payload().map_err(serde::ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", type_name)?;
        map.serialize_entry(&format!("action_{}", type_name), &payload)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut obj = Map::<String, Value>::deserialize(deserializer)?;
        let type_name = take_type(&obj).map_err(de::Error::custom)?;
        let payload = obj
            .remove(&format!("action_{}", type_name))
            .unwrap_or_else(|| Value::Object(Map::new()));
        RuleAction::from_payload(&type_name, payload).map_err(de::Error::custom)
    }
}

fn take_type(obj: &Map<String, Value>) -> Result<String, &'static str> {
    obj.get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or("missing field `type`")
}

mod base64_text {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    pub fn serialize<S: Serializer>(text: &str, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(text.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)?;
        String::from_utf8(bytes).map_err(de::Error::custom)
    }
}
