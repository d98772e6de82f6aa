//! Request identity: which host name, port and local address a request arrived on.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::{extract::connect_info::Connected, serve::IncomingStream};
use hyper::{HeaderMap, Uri, header::HOST};
use tokio::net::TcpListener;

/// Addresses of the connection a request came in on.
///
/// Virtual-host matching is done against the *local* side (the IP and port the request was
/// accepted on); the peer address is kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAddrs {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

impl ConnectionAddrs {
    pub fn new(local: SocketAddr, remote: SocketAddr) -> Self {
        Self { local, remote }
    }

    /// Placeholder used when no connection information is available (for example in tests
    /// driving the router directly).
    pub fn unspecified() -> Self {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        Self::new(addr, addr)
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnectionAddrs {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        let remote = *stream.remote_addr();
        let local = stream
            .io()
            .local_addr()
            .unwrap_or_else(|_| ConnectionAddrs::unspecified().local);
        Self { local, remote }
    }
}

/// Resolved identity of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    /// Host name from the request target, punycode-decoded, lower-cased, without brackets.
    pub host: String,
    /// Port from the request target, or the local port when the target carries none.
    pub host_port: Option<u16>,
    /// Local IP the connection was accepted on.
    pub ip: String,
    /// Local port the connection was accepted on.
    pub ip_port: Option<u16>,
}

impl HostContext {
    /// Resolve the identity from the request target and the connection's local address.
    ///
    /// The authority comes from the absolute URI when present, else from the `Host` header.
    /// When neither names a host the connection IP stands in; when neither names a port the
    /// connection port does.
    pub fn resolve(uri: &Uri, headers: &HeaderMap, conn: &ConnectionAddrs) -> Self {
        let ip = conn.local.ip().to_string();
        let ip_port = match conn.local.port() {
            0 => None,
            port => Some(port),
        };

        let authority = uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            });

        let (host, port) = match authority.as_deref().map(split_authority) {
            Some((host, port)) if !host.is_empty() => (normalize_host(host), port),
            Some((_, port)) => (ip.clone(), port),
            None => (ip.clone(), None),
        };

        Self {
            host,
            host_port: port.or(ip_port),
            ip,
            ip_port,
        }
    }
}

/// Split `host[:port]` (with optional `[v6]` brackets and `user@` prefix) into its parts.
///
/// An unparsable port is treated as absent.
pub fn split_authority(authority: &str) -> (&str, Option<u16>) {
    let authority = authority.rsplit_once('@').map_or(authority, |(_, rest)| rest);
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((host, tail)) => (host, tail.strip_prefix(':').and_then(|p| p.parse().ok())),
            None => (rest, None),
        };
    }
    match authority.rsplit_once(':') {
        // A second colon means a bare IPv6 literal without brackets.
        Some((host, _)) if host.contains(':') => (authority, None),
        Some((host, port)) => (host, port.parse().ok()),
        None => (authority, None),
    }
}

/// Canonical comparison form of a host name: brackets stripped, trailing dot dropped,
/// IDNA punycode decoded to Unicode and lower-cased. IP literals are printed in their
/// shortest form, with IPv4-mapped IPv6 addresses reduced to IPv4.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host = host.strip_suffix('.').unwrap_or(host);
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.to_canonical().to_string();
    }
    match url::quirks::domain_to_unicode(host) {
        decoded if decoded.is_empty() => host.to_lowercase(),
        decoded => decoded.to_lowercase(),
    }
}

/// Compare two host names after [`normalize_host`].
pub fn same_host(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && normalize_host(a) == normalize_host(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(local: &str) -> ConnectionAddrs {
        ConnectionAddrs::new(local.parse().unwrap(), "203.0.113.9:50000".parse().unwrap())
    }

    fn headers_with_host(host: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, host.parse().unwrap());
        headers
    }

    #[test]
    fn test_split_authority() {
        assert_eq!(split_authority("example.com"), ("example.com", None));
        assert_eq!(split_authority("example.com:8080"), ("example.com", Some(8080)));
        assert_eq!(split_authority("[::1]:443"), ("::1", Some(443)));
        assert_eq!(split_authority("[::1]"), ("::1", None));
        assert_eq!(split_authority("::1"), ("::1", None));
        assert_eq!(split_authority("user@host:81"), ("host", Some(81)));
        assert_eq!(split_authority("host:notaport"), ("host", None));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM"), "example.com");
        assert_eq!(normalize_host("[::1]"), "::1");
        assert_eq!(normalize_host("[FE80::1]"), "fe80::1");
        assert_eq!(normalize_host("xn--fiqs8s.cn"), "中国.cn");
        assert_eq!(normalize_host("example.com."), "example.com");
    }

    #[test]
    fn test_normalize_ip_literals() {
        assert_eq!(normalize_host("[0:0:0:0:0:0:0:1]"), "::1");
        assert_eq!(normalize_host("2001:DB8:0:0::01"), "2001:db8::1");
        assert_eq!(normalize_host("[::ffff:192.0.2.7]"), "192.0.2.7");
        assert!(same_host("::1", "[0:0:0:0:0:0:0:1]"));
    }

    #[test]
    fn test_same_host_punycode_and_case() {
        assert!(same_host("XN--FIQS8S.cn", "中国.CN"));
        assert!(same_host("A.com", "a.COM"));
        assert!(!same_host("", ""));
        assert!(!same_host("a.com", "b.com"));
    }

    #[test]
    fn test_resolve_from_host_header() {
        let uri: Uri = "/index.html".parse().unwrap();
        let ctx = HostContext::resolve(&uri, &headers_with_host("WWW.Example.com:8443"), &conn("10.0.0.1:443"));
        assert_eq!(ctx.host, "www.example.com");
        assert_eq!(ctx.host_port, Some(8443));
        assert_eq!(ctx.ip, "10.0.0.1");
        assert_eq!(ctx.ip_port, Some(443));
    }

    #[test]
    fn test_resolve_port_defaults_to_connection_port() {
        let uri: Uri = "/".parse().unwrap();
        let ctx = HostContext::resolve(&uri, &headers_with_host("example.com"), &conn("10.0.0.1:80"));
        assert_eq!(ctx.host_port, Some(80));
    }

    #[test]
    fn test_resolve_without_host_uses_connection() {
        let uri: Uri = "/".parse().unwrap();
        let ctx = HostContext::resolve(&uri, &HeaderMap::new(), &conn("[2001:db8::1]:8080"));
        assert_eq!(ctx.host, "2001:db8::1");
        assert_eq!(ctx.host_port, Some(8080));
        assert_eq!(ctx.ip, "2001:db8::1");
    }

    #[test]
    fn test_resolve_prefers_absolute_uri() {
        let uri: Uri = "http://[::1]:9000/x".parse().unwrap();
        let ctx = HostContext::resolve(&uri, &headers_with_host("other.com"), &conn("127.0.0.1:80"));
        assert_eq!(ctx.host, "::1");
        assert_eq!(ctx.host_port, Some(9000));
    }
}
