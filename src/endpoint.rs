//! Endpoint normalization.
//!
//! Server pools hand out endpoints in whatever shape operators wrote them:
//! bare hostnames, `nats://host:4222` style addresses, or already-correct
//! `wss://` URLs. [`normalize`] rewrites any of those into the canonical
//! `ws://`/`wss://` form the dialer needs, with the port always explicit.

use url::Url;

use crate::Result;

/// Rewrites a raw endpoint into a canonical `scheme://host:port/path[?query]`
/// WebSocket URL.
///
/// `encrypted` is a hint used when the endpoint itself does not decide:
/// an endpoint without a scheme, or with a scheme outside the known set. A
/// `ws:` or `wss:` scheme always wins over the hint. With neither a scheme
/// nor a hint, the endpoint is assumed encrypted.
///
/// Scheme mapping: `http:`, `ws:` and `nats:` become `ws:` with default port
/// 80; `https:`, `wss:` and `tls:` become `wss:` with default port 443; an
/// unrecognized scheme keeps its explicit port, defaulting by hint otherwise.
///
/// # Examples
/// ```
/// use yawt::endpoint::normalize;
///
/// assert_eq!(
///     normalize("demo.example.org", None).unwrap(),
///     "wss://demo.example.org:443/"
/// );
/// assert_eq!(
///     normalize("nats://10.0.0.5:4222", None).unwrap(),
///     "ws://10.0.0.5:4222/"
/// );
/// ```
pub fn normalize(raw: &str, encrypted: Option<bool>) -> Result<String> {
    let mut raw = raw.to_string();
    if !raw.contains("://") {
        // no scheme to go by; the hint decides, defaulting to encrypted
        raw = match encrypted {
            Some(false) => format!("http://{raw}"),
            _ => format!("https://{raw}"),
        };
    }

    let mut url = Url::parse(&raw)?;
    let scheme = url.scheme().to_ascii_lowercase();

    let encrypted = match scheme.as_str() {
        "ws" => Some(false),
        "wss" => Some(true),
        _ => encrypted,
    };

    if scheme != "http" && scheme != "https" {
        // re-parse under http so host, port and path come out uniformly even
        // for schemes the URL parser does not treat as authority-based
        let rest = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(&raw);
        url = Url::parse(&format!("http://{rest}"))?;
    }

    let (protocol, port) = match scheme.as_str() {
        "http" | "ws" | "nats" => ("ws", url.port().unwrap_or(80)),
        "https" | "wss" | "tls" => ("wss", url.port().unwrap_or(443)),
        _ => {
            if encrypted == Some(true) {
                ("wss", url.port().unwrap_or(443))
            } else {
                ("ws", url.port().unwrap_or(80))
            }
        }
    };

    let host = url.host_str().unwrap_or_default();
    let path = url.path();
    let query = url
        .query()
        .map(|query| format!("?{query}"))
        .unwrap_or_default();

    Ok(format!("{protocol}://{host}:{port}{path}{query}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_assumes_encrypted() {
        assert_eq!(
            normalize("demo.example.org", None).unwrap(),
            "wss://demo.example.org:443/"
        );
    }

    #[test]
    fn test_bare_host_follows_hint() {
        assert_eq!(
            normalize("demo.example.org", Some(false)).unwrap(),
            "ws://demo.example.org:80/"
        );
        assert_eq!(
            normalize("demo.example.org", Some(true)).unwrap(),
            "wss://demo.example.org:443/"
        );
    }

    #[test]
    fn test_ws_scheme_overrides_hint() {
        assert_eq!(
            normalize("ws://demo.example.org", Some(true)).unwrap(),
            "ws://demo.example.org:80/"
        );
        assert_eq!(
            normalize("wss://demo.example.org", Some(false)).unwrap(),
            "wss://demo.example.org:443/"
        );
    }

    #[test]
    fn test_explicit_port_is_kept() {
        assert_eq!(
            normalize("wss://demo.example.org:9222", None).unwrap(),
            "wss://demo.example.org:9222/"
        );
        assert_eq!(
            normalize("ws://127.0.0.1:8080", None).unwrap(),
            "ws://127.0.0.1:8080/"
        );
    }

    #[test]
    fn test_messaging_schemes_are_rewritten() {
        assert_eq!(
            normalize("nats://10.0.0.5:4222", None).unwrap(),
            "ws://10.0.0.5:4222/"
        );
        assert_eq!(
            normalize("tls://10.0.0.5", None).unwrap(),
            "wss://10.0.0.5:443/"
        );
    }

    #[test]
    fn test_http_schemes_map_to_websocket() {
        assert_eq!(
            normalize("http://demo.example.org", None).unwrap(),
            "ws://demo.example.org:80/"
        );
        assert_eq!(
            normalize("https://demo.example.org", None).unwrap(),
            "wss://demo.example.org:443/"
        );
    }

    #[test]
    fn test_unknown_scheme_is_hint_driven() {
        assert_eq!(
            normalize("tcp://demo.example.org:1234", Some(true)).unwrap(),
            "wss://demo.example.org:1234/"
        );
        assert_eq!(
            normalize("tcp://demo.example.org", None).unwrap(),
            "ws://demo.example.org:80/"
        );
    }

    #[test]
    fn test_path_and_query_survive() {
        assert_eq!(
            normalize("wss://demo.example.org/sub/path?auth=token", None).unwrap(),
            "wss://demo.example.org:443/sub/path?auth=token"
        );
    }
}
