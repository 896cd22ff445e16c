//! Provider block configuration.
//!
//! Credentials come from the provider block and fall back to the
//! environment. An API token wins over username and password.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::resources::decode_config;
use crate::schema::{Attribute, Schema};

/// Environment variable holding the API username.
pub const ENV_USERNAME: &str = "UPCLOUD_USERNAME";
/// Environment variable holding the API password.
pub const ENV_PASSWORD: &str = "UPCLOUD_PASSWORD";
/// Environment variable holding the API token.
pub const ENV_TOKEN: &str = "UPCLOUD_TOKEN";

const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 120;
const DEFAULT_LOGIN_RETRIES: u32 = 3;

fn default_request_timeout_sec() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SEC
}

fn default_login_retries() -> u32 {
    DEFAULT_LOGIN_RETRIES
}

/// Settings from the provider block.
#[derive(Clone, Deserialize)]
pub struct ProviderConfig {
    /// API username.
    #[serde(default)]
    pub username: Option<String>,
    /// API password.
    #[serde(default)]
    pub password: Option<String>,
    /// API token.
    #[serde(default)]
    pub token: Option<String>,
    /// Timeout for a single API request, in seconds.
    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
    /// How many times the login check is tried while it fails with an
    /// authentication error.
    #[serde(default = "default_login_retries")]
    pub login_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            token: None,
            request_timeout_sec: DEFAULT_REQUEST_TIMEOUT_SEC,
            login_retries: DEFAULT_LOGIN_RETRIES,
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_sec", &self.request_timeout_sec)
            .field("login_retries", &self.login_retries)
            .finish()
    }
}

/// How requests are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: Bearer <token>`.
    Token(String),
    /// HTTP basic auth.
    Basic {
        /// API username.
        username: String,
        /// API password.
        password: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Token(<redacted>)"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

impl ProviderConfig {
    /// Decode the configure payload. A null payload yields the defaults and
    /// null attributes count as unset.
    pub fn from_value(value: &Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        decode_config(value)
    }

    /// Fill unset credentials from the process environment.
    pub fn with_env_fallback(self) -> Self {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    /// Fill unset credentials using `lookup` as the environment.
    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fill(&mut self.username, || lookup(ENV_USERNAME));
        fill(&mut self.password, || lookup(ENV_PASSWORD));
        fill(&mut self.token, || lookup(ENV_TOKEN));
        self
    }

    /// Resolve the credentials to use.
    pub fn credentials(&self) -> Result<Credentials, ProviderError> {
        if let Some(token) = non_empty(&self.token) {
            return Ok(Credentials::Token(token.to_string()));
        }
        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => Ok(Credentials::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => Err(ProviderError::Configuration(format!(
                "either token or username and password must be set, in the provider block or via {}, {} and {}",
                ENV_TOKEN, ENV_USERNAME, ENV_PASSWORD
            ))),
        }
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("UpCloud provider configuration.")
            .with_attribute(
                "username",
                Attribute::optional_string().with_description(format!(
                    "UpCloud username with API access. Can also be set with {}.",
                    ENV_USERNAME
                )),
            )
            .with_attribute(
                "password",
                Attribute::optional_string().sensitive().with_description(format!(
                    "Password for the UpCloud user. Can also be set with {}.",
                    ENV_PASSWORD
                )),
            )
            .with_attribute(
                "token",
                Attribute::optional_string().sensitive().with_description(format!(
                    "API token. Takes precedence over username and password. Can also be set with {}.",
                    ENV_TOKEN
                )),
            )
            .with_attribute(
                "request_timeout_sec",
                Attribute::optional_int64()
                    .with_default(Value::from(DEFAULT_REQUEST_TIMEOUT_SEC))
                    .with_description("Timeout for a single API request, in seconds."),
            )
            .with_attribute(
                "login_retries",
                Attribute::optional_int64()
                    .with_default(Value::from(DEFAULT_LOGIN_RETRIES))
                    .with_description(
                        "How many times the initial login is tried while credentials are rejected.",
                    ),
            )
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn fill(slot: &mut Option<String>, lookup: impl FnOnce() -> Option<String>) {
    if non_empty(slot).is_none() {
        if let Some(value) = lookup().filter(|v| !v.is_empty()) {
            *slot = Some(value);
        }
    }
}
