//! HTTP/1.1 connection upgrade handshake.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha1::{Digest, Sha1};

use crate::ProtocolError;

/// Magic constant appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The parts of an upgrade request the server cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request target, e.g. `/` or `/ws`.
    pub path: String,
    /// Value of `Sec-WebSocket-Key`.
    pub key: String,
}

/// Compute the `Sec-WebSocket-Accept` token for a client key.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Position just past the `\r\n\r\n` that ends the request headers.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Parse an upgrade request head (request line plus headers).
pub fn parse_upgrade_request(raw: &[u8]) -> Result<UpgradeRequest, ProtocolError> {
    let head = std::str::from_utf8(raw).map_err(|_| ProtocolError::MalformedRequest)?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ProtocolError::MalformedRequest)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(ProtocolError::MalformedRequest)?;
    let path = parts.next().ok_or(ProtocolError::MalformedRequest)?;
    let version = parts.next().ok_or(ProtocolError::MalformedRequest)?;
    if method != "GET" || !version.starts_with("HTTP/") {
        return Err(ProtocolError::MalformedRequest);
    }

    let mut upgrade = false;
    let mut key = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(ProtocolError::MalformedRequest);
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("upgrade") {
            upgrade = value.eq_ignore_ascii_case("websocket");
        } else if name.trim().eq_ignore_ascii_case("sec-websocket-key") && !value.is_empty() {
            key = Some(value.to_string());
        }
    }

    if !upgrade {
        return Err(ProtocolError::MissingUpgradeHeader);
    }
    let key = key.ok_or(ProtocolError::MissingKey)?;

    Ok(UpgradeRequest {
        path: path.to_string(),
        key,
    })
}

/// Build the `101 Switching Protocols` response for an accept token.
pub fn switching_protocols_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "GET /chat HTTP/1.1\r\n\
        Host: server.example.com\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    #[test]
    fn test_rfc_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_parse_sample_request() {
        let request = parse_upgrade_request(SAMPLE.as_bytes()).unwrap();
        assert_eq!(request.path, "/chat");
        assert_eq!(request.key, "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let raw = "GET / HTTP/1.1\r\nupgrade: WebSocket\r\nsec-websocket-key: abc\r\n\r\n";
        let request = parse_upgrade_request(raw.as_bytes()).unwrap();
        assert_eq!(request.key, "abc");
    }

    #[test]
    fn test_missing_upgrade_header() {
        let raw = "GET / HTTP/1.1\r\nHost: x\r\nSec-WebSocket-Key: abc\r\n\r\n";
        assert!(matches!(
            parse_upgrade_request(raw.as_bytes()),
            Err(ProtocolError::MissingUpgradeHeader)
        ));
    }

    #[test]
    fn test_missing_key() {
        let raw = "GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n";
        assert!(matches!(
            parse_upgrade_request(raw.as_bytes()),
            Err(ProtocolError::MissingKey)
        ));
    }

    #[test]
    fn test_rejects_non_get() {
        let raw = "POST / HTTP/1.1\r\nUpgrade: websocket\r\nSec-WebSocket-Key: a\r\n\r\n";
        assert!(matches!(
            parse_upgrade_request(raw.as_bytes()),
            Err(ProtocolError::MalformedRequest)
        ));
    }

    #[test]
    fn test_find_header_end() {
        let mut raw = SAMPLE.as_bytes().to_vec();
        let end = find_header_end(&raw).unwrap();
        assert_eq!(end, raw.len());
        raw.extend_from_slice(&[0x81, 0x00]);
        assert_eq!(find_header_end(&raw), Some(end));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
    }

    #[test]
    fn test_response_format() {
        let response = switching_protocols_response("token");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("\r\nSec-WebSocket-Accept: token\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
