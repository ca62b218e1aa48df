//! Request metadata available before the body has been read.
//!
//! The transport only needs the method (to accept or decline the request)
//! and the declared character encoding (to pick a decoding strategy). Other
//! fields are carried through to the dispatch context for processors.

use std::net::SocketAddr;

use crate::charset::{Charset, DEFAULT_CHARSET, UnsupportedCharset};

/// Head of an HTTP request handed to the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestHead {
    method: String,
    path: String,
    content_type: Option<String>,
    peer_addr: Option<SocketAddr>,
}

impl RequestHead {
    /// Create a head for `method` on `path` with no content type.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            content_type: None,
            peer_addr: None,
        }
    }

    /// Convenience constructor for the `POST` requests the transport accepts.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self { Self::new("POST", path) }

    /// Set the `Content-Type` header value.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the remote peer address.
    #[must_use]
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str { &self.path }

    /// Raw `Content-Type` header value, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> { self.content_type.as_deref() }

    /// Remote peer address, if known.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }

    /// The `charset` parameter of the content type, if declared.
    #[must_use]
    pub fn character_encoding(&self) -> Option<&str> {
        self.content_type()?
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim())
    }

    /// Resolve the body encoding, defaulting to UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedCharset`] if the declared encoding is unknown.
    pub fn charset(&self) -> Result<Charset, UnsupportedCharset> {
        self.character_encoding()
            .map_or(Ok(DEFAULT_CHARSET), str::parse::<Charset>)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::absent(None, Charset::Utf8)]
    #[case::no_parameter(Some("application/json"), Charset::Utf8)]
    #[case::declared(Some("application/json;charset=ISO-8859-1"), Charset::Iso8859_1)]
    #[case::spaced(Some("text/json; Charset = \"utf-16le\""), Charset::Utf16Le)]
    #[case::other_params(Some("application/json; q=1; charset=us-ascii"), Charset::UsAscii)]
    fn resolves_charset(#[case] content_type: Option<&str>, #[case] expected: Charset) {
        let mut head = RequestHead::post("/cometd");
        if let Some(value) = content_type {
            head = head.with_content_type(value);
        }
        assert_eq!(head.charset(), Ok(expected));
    }

    #[test]
    fn unknown_charset_is_reported() {
        let head = RequestHead::post("/cometd").with_content_type("application/json;charset=koi8");
        assert_eq!(head.charset(), Err(UnsupportedCharset("koi8".into())));
    }
}
