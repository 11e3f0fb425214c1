//! Endpoint Configuration
//!
//! Where the classroom backend lives and how to authenticate against it.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default path prefix of the classroom socket endpoint
pub const DEFAULT_PATH: &str = "/ws/v1/classroom";

/// URL scheme
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain WebSocket
    #[default]
    Ws,
    /// WebSocket over TLS
    Wss,
}

impl Scheme {
    /// Parse `"ws"` / `"wss"` (case-insensitive)
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ws" => Some(Self::Ws),
            "wss" => Some(Self::Wss),
            _ => None,
        }
    }

    /// Scheme string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint identity for one connection attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// `ws` or `wss`
    pub scheme: Scheme,
    /// Backend host (without scheme)
    pub host: String,
    /// Backend port
    pub port: u16,
    /// Path prefix; the room id is appended as the last segment
    pub path: String,
    /// Classroom / room identifier
    pub room_id: String,
    /// Auth token, sent as the `token` query parameter
    pub auth_token: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Ws,
            host: "localhost".to_string(),
            port: 8000,
            path: DEFAULT_PATH.to_string(),
            room_id: "room_001".to_string(),
            auth_token: "dev-unity-token".to_string(),
        }
    }
}

impl EndpointConfig {
    /// Create an endpoint with default scheme and path
    pub fn new(
        host: impl Into<String>,
        port: u16,
        room_id: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            room_id: room_id.into(),
            auth_token: auth_token.into(),
            ..Default::default()
        }
    }

    /// Build `scheme://host:port/path/{room_id}?token={auth_token}`
    ///
    /// The room id is a single path segment and the token is
    /// percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns a parse error if host or port do not form a valid URL.
    pub fn url(&self) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}://{}:{}", self.scheme, self.host, self.port))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.clear();
            for part in self.path.split('/').filter(|p| !p.is_empty()) {
                segments.push(part);
            }
            segments.push(&self.room_id);
        }
        url.query_pairs_mut().append_pair("token", &self.auth_token);
        Ok(url)
    }

    /// URL with the token masked, for logs
    #[must_use]
    pub fn redacted_url(&self) -> String {
        format!(
            "{}://{}:{}/{}/{}?token=***",
            self.scheme,
            self.host,
            self.port,
            self.path.trim_matches('/'),
            self.room_id
        )
    }
}
