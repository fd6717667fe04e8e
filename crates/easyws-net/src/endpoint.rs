//! `ws://` / `wss://` endpoint parsing.

use std::fmt;

use url::Url;

use crate::error::{NetError, Result};

/// A parsed websocket endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    host: String,
    port: u16,
    tls: bool,
}

impl Endpoint {
    /// Parse a `ws://` or `wss://` URL.
    ///
    /// Default ports are 80 and 443. An empty path becomes `/`.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| NetError::InvalidUrl(format!("{raw}: {e}")))?;
        let tls = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(NetError::UnsupportedScheme(other.to_owned())),
        };
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']').to_owned(),
            _ => return Err(NetError::InvalidUrl(format!("{raw}: missing host"))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| NetError::InvalidUrl(format!("{raw}: missing port")))?;
        Ok(Self {
            url,
            host,
            port,
            tls,
        })
    }

    /// Host name or address, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port or the scheme default.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, suitable for binding and dialing.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Request path, `/` when empty.
    pub fn path(&self) -> &str {
        match self.url.path() {
            "" => "/",
            p => p,
        }
    }

    /// Whether the scheme is `wss`.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// The full URL.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn plain_with_port_and_path() {
        let ep = Endpoint::parse("ws://127.0.0.1:9000/chat").unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 9000);
        assert_eq!(ep.path(), "/chat");
        assert_eq!(ep.authority(), "127.0.0.1:9000");
        assert!(!ep.is_tls());
    }

    #[test]
    fn default_ports() {
        assert_eq!(Endpoint::parse("ws://example.com").unwrap().port(), 80);
        let wss = Endpoint::parse("wss://example.com").unwrap();
        assert_eq!(wss.port(), 443);
        assert!(wss.is_tls());
    }

    #[test]
    fn empty_path_is_root() {
        assert_eq!(Endpoint::parse("ws://localhost:1").unwrap().path(), "/");
    }

    #[test]
    fn ipv6_authority_is_bracketed() {
        let ep = Endpoint::parse("ws://[::1]:8080/").unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.authority(), "[::1]:8080");
    }

    #[test]
    fn rejects_other_schemes() {
        assert_matches!(
            Endpoint::parse("http://example.com"),
            Err(NetError::UnsupportedScheme(s)) if s == "http"
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(Endpoint::parse("not a url"), Err(NetError::InvalidUrl(_)));
        assert_matches!(Endpoint::parse("ws://"), Err(NetError::InvalidUrl(_)));
    }
}
