//! Origin matching and CORS response headers.
use hyper::{
    HeaderMap, Method,
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
        ACCESS_CONTROL_REQUEST_METHOD, HeaderValue, ORIGIN, VARY,
    },
};
use url::Url;

use crate::core::{host::normalize_host, method};

/// `(scheme, host, port)` of a URL-like origin.
///
/// Scheme and host are compared case-insensitively (the host after punycode decoding). The port
/// is kept as written except that URL parsing drops a port equal to the scheme default, so
/// `https://x.com:443` and `https://x.com` are the same origin while `https://x.com:8443` is not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginTuple {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl OriginTuple {
    pub fn parse(origin: &str) -> Option<Self> {
        let url = Url::parse(origin.trim()).ok()?;
        let host = url.host_str()?;
        Some(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: normalize_host(host),
            port: url.port(),
        })
    }
}

/// Whether `origin` equals one of `allowed` by origin tuple.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    let Some(origin) = OriginTuple::parse(origin) else {
        return false;
    };
    allowed
        .iter()
        .filter_map(|candidate| OriginTuple::parse(candidate))
        .any(|candidate| candidate == origin)
}

/// Add CORS headers to a captured reply.
///
/// `request` holds the request headers; `allow` is the method list advertised when the request
/// is a preflight (carries `Access-Control-Request-Method`). Returns whether the origin matched.
pub fn apply(
    request: &HeaderMap,
    allowed_origins: &[String],
    allow: &[Method],
    response: &mut HeaderMap,
) -> bool {
    let Some(origin_value) = request.get(ORIGIN) else {
        return false;
    };
    let Ok(origin) = origin_value.to_str() else {
        return false;
    };
    if !origin_allowed(origin, allowed_origins) {
        tracing::debug!("Origin {} not in allow list", origin);
        return false;
    }

    response.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin_value.clone());
    response.insert(ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
    response.append(VARY, HeaderValue::from_static("Origin"));

    if request.contains_key(ACCESS_CONTROL_REQUEST_METHOD) {
        if let Ok(methods) = HeaderValue::from_str(&method::join(allow)) {
            response.insert(ACCESS_CONTROL_ALLOW_METHODS, methods);
        }
        if let Some(headers) = request.get(ACCESS_CONTROL_REQUEST_HEADERS) {
            response.insert(ACCESS_CONTROL_ALLOW_HEADERS, headers.clone());
        }
        response.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("0"));
    }
    true
}
