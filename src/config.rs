//! Per-call configuration.
//!
//! A [`Client`](crate::Client) holds one immutable [`CallConfig`] of
//! defaults. [`CallOverrides`] are merged over it for a single call,
//! producing a fresh config; the defaults are never touched.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wirecall::config::{CallConfig, CallOverrides};
//!
//! let defaults = CallConfig::default();
//! let overrides = CallOverrides::new()
//!     .reply_timeout(Duration::from_millis(250))
//!     .extensions(true);
//!
//! let effective = defaults.merged(&overrides);
//! assert_eq!(effective.reply_timeout, Some(Duration::from_millis(250)));
//! assert!(!defaults.extensions);
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::value::CoercionOptions;

/// Default character encoding announced to the transport.
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Default user-agent string.
pub const DEFAULT_USER_AGENT: &str = concat!("wirecall/", env!("CARGO_PKG_VERSION"));

/// Basic-auth credentials, passed through to the transport untouched.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings for one call.
///
/// Most fields only matter to the transport; the core itself reads
/// `extensions` and `strict` (coercion mode) and `reply_timeout`.
///
/// Deserializes from JSON with timeouts given in milliseconds
/// (`connect_timeout_ms`, `reply_timeout_ms`); missing fields keep their
/// defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Basic-auth credentials.
    pub credentials: Option<Credentials>,
    /// Connection establishment timeout.
    #[serde(rename = "connect_timeout_ms", deserialize_with = "duration_ms")]
    pub connect_timeout: Option<Duration>,
    /// Time allowed for the reply once the request is sent.
    #[serde(rename = "reply_timeout_ms", deserialize_with = "duration_ms")]
    pub reply_timeout: Option<Duration>,
    /// Compress outgoing requests.
    pub compress_request: bool,
    /// Accept compressed responses.
    pub accept_compressed: bool,
    /// Character encoding of the request body.
    pub encoding: String,
    /// User-agent string.
    pub user_agent: String,
    /// Allow extension wire types (64-bit integers).
    pub extensions: bool,
    /// Reject opaque extension values instead of passing them through.
    pub strict: bool,
    /// Ask the transport to write extension types without their namespace
    /// prefix, for servers that do not understand namespaced extensions.
    pub non_namespaced_extensions: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            connect_timeout: None,
            reply_timeout: None,
            compress_request: false,
            accept_compressed: false,
            encoding: DEFAULT_ENCODING.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extensions: false,
            strict: false,
            non_namespaced_extensions: false,
        }
    }
}

impl CallConfig {
    /// Parse a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Json`](crate::RpcError::Json) if the text is not
    /// a valid config object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Coercion mode implied by this config.
    pub fn coercion_options(&self) -> CoercionOptions {
        CoercionOptions::new()
            .with_extensions(self.extensions)
            .with_strict(self.strict)
    }

    /// A new config with `overrides` applied over `self`.
    pub fn merged(&self, overrides: &CallOverrides) -> CallConfig {
        CallConfig {
            credentials: overrides
                .credentials
                .clone()
                .or_else(|| self.credentials.clone()),
            connect_timeout: overrides.connect_timeout.or(self.connect_timeout),
            reply_timeout: overrides.reply_timeout.or(self.reply_timeout),
            compress_request: overrides.compress_request.unwrap_or(self.compress_request),
            accept_compressed: overrides
                .accept_compressed
                .unwrap_or(self.accept_compressed),
            encoding: overrides
                .encoding
                .clone()
                .unwrap_or_else(|| self.encoding.clone()),
            user_agent: overrides
                .user_agent
                .clone()
                .unwrap_or_else(|| self.user_agent.clone()),
            extensions: overrides.extensions.unwrap_or(self.extensions),
            strict: overrides.strict.unwrap_or(self.strict),
            non_namespaced_extensions: overrides
                .non_namespaced_extensions
                .unwrap_or(self.non_namespaced_extensions),
        }
    }
}

fn duration_ms<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

/// Per-call overrides. Unset fields fall back to the client's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallOverrides {
    pub credentials: Option<Credentials>,
    pub connect_timeout: Option<Duration>,
    pub reply_timeout: Option<Duration>,
    pub compress_request: Option<bool>,
    pub accept_compressed: Option<bool>,
    pub encoding: Option<String>,
    pub user_agent: Option<String>,
    pub extensions: Option<bool>,
    pub strict: Option<bool>,
    pub non_namespaced_extensions: Option<bool>,
}

impl CallOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    pub fn compress_request(mut self, enabled: bool) -> Self {
        self.compress_request = Some(enabled);
        self
    }

    pub fn accept_compressed(mut self, enabled: bool) -> Self {
        self.accept_compressed = Some(enabled);
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn extensions(mut self, enabled: bool) -> Self {
        self.extensions = Some(enabled);
        self
    }

    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = Some(enabled);
        self
    }

    pub fn non_namespaced_extensions(mut self, enabled: bool) -> Self {
        self.non_namespaced_extensions = Some(enabled);
        self
    }
}
