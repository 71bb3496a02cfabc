//! Server announcement parsing.
//!
//! The messaging protocol opens every connection with a single announcement
//! line from the server: the verb `INFO`, whitespace, and a JSON payload
//! describing the server's identity and capabilities, terminated by CRLF.
//! The transport has to locate that line inside the raw byte stream — it may
//! arrive split across several socket messages, or glued to the first bytes
//! of the next protocol frame — validate it, and then hand the untouched
//! bytes on to the client core's own parser. Everything here therefore works
//! on borrowed slices and never consumes from the buffer it inspects.

use serde::Deserialize;

use crate::{Result, TransportError};

/// Protocol line delimiter.
pub(crate) const CRLF: &[u8] = b"\r\n";

/// Announcement verb. Matched case-insensitively, as servers are free to vary
/// the casing of protocol verbs.
const INFO: &[u8] = b"INFO";

/// The server's connection-level announcement.
///
/// Every field is optional on the wire; a server may announce as little as
/// `INFO {}`. Absent fields take their type's default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    /// Unique identifier of the server instance.
    pub server_id: String,
    /// Configured human-readable server name.
    pub server_name: String,
    /// Server version string.
    pub version: String,
    /// Protocol revision the server speaks. Revision 1 added capability
    /// echo suppression and dynamic server updates.
    pub proto: i64,
    /// Hostname the server considers itself reachable at.
    pub host: String,
    /// Port the server listens on.
    pub port: u16,
    /// Largest payload the server accepts, in bytes.
    pub max_payload: usize,
    /// Whether the server supports message headers.
    pub headers: bool,
    /// Whether the server requires authentication.
    pub auth_required: bool,
    /// Whether the server requires a TLS connection.
    pub tls_required: bool,
    /// Whether the server can upgrade to TLS.
    pub tls_available: bool,
    /// Server-issued nonce for signed authentication, when present.
    pub nonce: Option<String>,
    /// Identifier the server assigned to this client.
    pub client_id: Option<u64>,
    /// The client's address as observed by the server.
    pub client_ip: Option<String>,
}

/// Locates the first complete protocol line in `buf`.
///
/// Returns the line without its CRLF terminator, or `None` when no complete
/// line has arrived yet — which is not an error, merely a reason to wait for
/// more bytes. The buffer is only read, never consumed.
pub(crate) fn first_line(buf: &[u8]) -> Option<&[u8]> {
    buf.windows(CRLF.len())
        .position(|window| window == CRLF)
        .map(|at| &buf[..at])
}

/// Parses an announcement line into a [`ServerInfo`].
///
/// `line` is a complete protocol line as returned by [`first_line`]. Anything
/// that is not `INFO` followed by whitespace and a payload rejects with
/// [`TransportError::UnexpectedResponse`]; a malformed payload rejects with
/// [`TransportError::InvalidAnnouncement`].
pub(crate) fn parse_announcement(line: &[u8]) -> Result<ServerInfo> {
    if line.len() <= INFO.len()
        || !line[..INFO.len()].eq_ignore_ascii_case(INFO)
        || !line[INFO.len()].is_ascii_whitespace()
    {
        return Err(TransportError::UnexpectedResponse);
    }
    let payload = &line[INFO.len()..];
    Ok(serde_json::from_slice(payload)?)
}

/// Validates the announced capabilities against what the connection options
/// require.
pub(crate) fn check_server_info(info: &ServerInfo, no_echo: bool, headers: bool) -> Result<()> {
    if no_echo && info.proto < 1 {
        return Err(TransportError::OptionUnavailable("no_echo"));
    }
    if headers && !info.headers {
        return Err(TransportError::OptionUnavailable("headers"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_waits_for_delimiter() {
        assert!(first_line(b"").is_none());
        assert!(first_line(b"INFO {").is_none());
        assert!(first_line(b"INFO {}\r").is_none());
    }

    #[test]
    fn test_first_line_stops_at_delimiter() {
        let buf = b"INFO {}\r\nPING\r\n";
        assert_eq!(first_line(buf).unwrap(), b"INFO {}");
    }

    #[test]
    fn test_parse_minimal_announcement() {
        let info = parse_announcement(b"INFO {\"max_payload\":1048576}").unwrap();
        assert_eq!(info.max_payload, 1048576);
        assert_eq!(info.proto, 0);
        assert!(!info.headers);
        assert!(info.nonce.is_none());
    }

    #[test]
    fn test_parse_full_announcement() {
        let line = br#"INFO {"server_id":"NABC","server_name":"hub","version":"2.10.4","proto":1,"host":"0.0.0.0","port":443,"max_payload":65536,"headers":true,"auth_required":true,"nonce":"abcd","client_id":7,"client_ip":"203.0.113.9"}"#;
        let info = parse_announcement(line).unwrap();
        assert_eq!(info.server_id, "NABC");
        assert_eq!(info.proto, 1);
        assert_eq!(info.port, 443);
        assert!(info.headers);
        assert!(info.auth_required);
        assert_eq!(info.nonce.as_deref(), Some("abcd"));
        assert_eq!(info.client_id, Some(7));
    }

    #[test]
    fn test_verb_is_case_insensitive() {
        assert!(parse_announcement(b"info {}").is_ok());
        assert!(parse_announcement(b"Info\t{}").is_ok());
    }

    #[test]
    fn test_rejects_other_verbs() {
        for line in [&b"+OK"[..], b"PING", b"-ERR 'oops'", b"INFORM {}", b"INFO"] {
            assert!(matches!(
                parse_announcement(line),
                Err(TransportError::UnexpectedResponse)
            ));
        }
    }

    #[test]
    fn test_rejects_malformed_payload() {
        assert!(matches!(
            parse_announcement(b"INFO not-json"),
            Err(TransportError::InvalidAnnouncement(_))
        ));
    }

    #[test]
    fn test_check_no_echo_needs_proto_one() {
        let old = ServerInfo::default();
        assert!(matches!(
            check_server_info(&old, true, false),
            Err(TransportError::OptionUnavailable("no_echo"))
        ));

        let current = ServerInfo {
            proto: 1,
            ..Default::default()
        };
        assert!(check_server_info(&current, true, false).is_ok());
    }

    #[test]
    fn test_check_headers_need_server_support() {
        let plain = ServerInfo::default();
        assert!(matches!(
            check_server_info(&plain, false, true),
            Err(TransportError::OptionUnavailable("headers"))
        ));

        let capable = ServerInfo {
            headers: true,
            ..Default::default()
        };
        assert!(check_server_info(&capable, false, true).is_ok());
    }
}
