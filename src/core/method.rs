//! HTTP method helpers.
use hyper::{HeaderMap, Method, header::HeaderValue};

/// The standard verb set accepted by resource nodes.
pub const STANDARD_METHODS: [Method; 9] = [
    Method::OPTIONS,
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::TRACE,
    Method::PATCH,
];

/// Normalise a method name to its upper-case form.
///
/// Returns `None` for anything outside [`STANDARD_METHODS`].
pub fn parse(name: &str) -> Option<Method> {
    let upper = name.trim().to_ascii_uppercase();
    STANDARD_METHODS
        .iter()
        .find(|m| m.as_str() == upper)
        .cloned()
}

/// Upper-case an incoming request method. Non-standard methods are returned unchanged.
pub fn normalize(method: &Method) -> Method {
    parse(method.as_str()).unwrap_or_else(|| method.clone())
}

/// Render methods as a comma separated list, e.g. `OPTIONS,GET,HEAD`.
pub fn join(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Set the `Allow` header to the given method list.
pub fn set_allow(headers: &mut HeaderMap, methods: &[Method]) {
    if let Ok(value) = HeaderValue::from_str(&join(methods)) {
        headers.insert(hyper::header::ALLOW, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(parse("get"), Some(Method::GET));
        assert_eq!(parse("Options"), Some(Method::OPTIONS));
        assert_eq!(parse("PATCH"), Some(Method::PATCH));
        assert_eq!(parse("PROPFIND"), None);
    }

    #[test]
    fn test_normalize_lowercase_method() {
        let lower = Method::from_bytes(b"get").unwrap();
        assert_eq!(normalize(&lower), Method::GET);
    }

    #[test]
    fn test_set_allow() {
        let mut headers = HeaderMap::new();
        set_allow(&mut headers, &[Method::OPTIONS, Method::GET, Method::HEAD]);
        assert_eq!(headers.get(hyper::header::ALLOW).unwrap(), "OPTIONS,GET,HEAD");
    }
}
