use std::time::Duration;

use url::Url;

use crate::config::ConfigError;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the websocket transport
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Endpoint, always `ws://` or `wss://`
    pub url: Url,
    /// Upper bound on the opening handshake
    pub handshake_timeout: Duration,
    /// How long `recv` waits for a frame before reporting a timeout.
    /// `None` blocks until a frame or close arrives.
    pub read_timeout: Option<Duration>,
}

impl WebSocketConfig {
    pub fn builder() -> WebSocketConfigBuilder {
        WebSocketConfigBuilder::new()
    }

    pub fn uses_tls(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

/// Builder for websocket configuration
#[derive(Debug, Default)]
pub struct WebSocketConfigBuilder {
    url: Option<String>,
    handshake_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl WebSocketConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<WebSocketConfig, ConfigError> {
        let raw = self.url.ok_or_else(|| ConfigError::InvalidUrl {
            url: String::new(),
            reason: "URL is required".into(),
        })?;
        let url = Url::parse(&raw).map_err(|err| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidUrl {
                url: raw,
                reason: format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
            });
        }

        Ok(WebSocketConfig {
            url,
            handshake_timeout: self
                .handshake_timeout
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT),
            read_timeout: self.read_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ws_and_wss() {
        let config = WebSocketConfig::builder()
            .url("wss://shell.example.com/ws")
            .build()
            .expect("valid url");
        assert!(config.uses_tls());
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert_eq!(config.read_timeout, None);

        let config = WebSocketConfig::builder()
            .url("ws://127.0.0.1:8080/ws")
            .read_timeout(Some(Duration::from_secs(2)))
            .build()
            .expect("valid url");
        assert!(!config.uses_tls());
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(matches!(
            WebSocketConfig::builder().url("http://example.com").build(),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            WebSocketConfig::builder().url("not a url").build(),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            WebSocketConfig::builder().build(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
