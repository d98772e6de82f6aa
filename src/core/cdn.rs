//! Offloading cacheable static replies to a CDN host.
use std::sync::Arc;

use axum::body::Body as AxumBody;
use hyper::{
    Response, StatusCode,
    header::{CACHE_CONTROL, HeaderValue, LOCATION},
};

use crate::core::{host::same_host, request::RequestHead};

/// `Cache-Control` for files that may be cached by the browser only.
pub const CACHE_PRIVATE: &str = "private";
/// `Cache-Control` for files that may be cached but must be revalidated on every use.
pub const CACHE_REVALIDATE: &str = "no-cache";
/// `Cache-Control` for files served to (or through) the CDN.
pub const CACHE_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// The canonical CDN host and the host whose cacheable traffic should move to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnRule {
    /// Host name of the CDN, e.g. `cdn.example.com`.
    pub host: String,
    /// Host name the site is normally reached on, e.g. `example.com`.
    pub origin_host: String,
}

/// What to do with a cacheable reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnDecision {
    /// Send the client to the same path on the CDN host.
    Redirect(String),
    /// Serve it with a long-lived cache lifetime.
    Immutable,
    /// Serve it, revalidating on every use.
    Revalidate,
}

impl CdnRule {
    pub fn new(host: impl Into<String>, origin_host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            origin_host: origin_host.into(),
        }
    }

    /// Decide how a cacheable reply to `head` is delivered.
    ///
    /// Requests for the origin host are redirected (307) to `//<cdn host><path>`. Requests that
    /// arrive under the CDN host are the CDN pulling the file and get a long-lived lifetime. Any
    /// other virtual host is served normally.
    pub fn decide(&self, head: &RequestHead) -> CdnDecision {
        if self.host.is_empty() || self.origin_host.is_empty() {
            return CdnDecision::Revalidate;
        }
        if same_host(&head.host.host, &self.origin_host) {
            CdnDecision::Redirect(format!("//{}{}", self.host, head.path_and_query()))
        } else if same_host(&head.host.host, &self.host) {
            CdnDecision::Immutable
        } else {
            CdnDecision::Revalidate
        }
    }
}

/// CDN check handed to replies so handlers can apply the same policy to their own payloads.
#[derive(Debug, Clone)]
pub struct CdnCheck {
    rule: Option<Arc<CdnRule>>,
    head: Arc<RequestHead>,
}

impl CdnCheck {
    pub(crate) fn new(rule: Option<Arc<CdnRule>>, head: Arc<RequestHead>) -> Self {
        Self { rule, head }
    }

    pub fn decision(&self) -> CdnDecision {
        match &self.rule {
            Some(rule) => rule.decide(&self.head),
            None => CdnDecision::Revalidate,
        }
    }

    /// The redirect response to send instead of the payload, if the request should go to the CDN.
    pub fn redirect(&self) -> Option<Response<AxumBody>> {
        match self.decision() {
            CdnDecision::Redirect(location) => Some(redirect_response(&location)),
            _ => None,
        }
    }

    /// `Cache-Control` value for a cacheable payload served directly.
    pub fn cache_control(&self) -> HeaderValue {
        match self.decision() {
            CdnDecision::Immutable => HeaderValue::from_static(CACHE_IMMUTABLE),
            _ => HeaderValue::from_static(CACHE_REVALIDATE),
        }
    }
}

pub(crate) fn redirect_response(location: &str) -> Response<AxumBody> {
    let mut response = Response::new(AxumBody::empty());
    *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(LOCATION, value);
    }
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_REVALIDATE));
    response
}

#[cfg(test)]
mod tests {
    use hyper::{HeaderMap, Method, Uri, Version};

    use super::*;
    use crate::core::host::HostContext;

    fn head(host: &str, uri: &str) -> RequestHead {
        RequestHead {
            method: Method::GET,
            uri: uri.parse::<Uri>().unwrap(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            host: HostContext {
                host: host.to_string(),
                host_port: Some(443),
                ip: "10.0.0.1".to_string(),
                ip_port: Some(443),
            },
        }
    }

    #[test]
    fn test_origin_host_is_redirected() {
        let rule = CdnRule::new("cdn.x.com", "x.com");
        assert_eq!(
            rule.decide(&head("x.com", "/img/a.png?v=2")),
            CdnDecision::Redirect("//cdn.x.com/img/a.png?v=2".to_string())
        );
        assert_eq!(
            rule.decide(&head("X.COM", "/a")),
            CdnDecision::Redirect("//cdn.x.com/a".to_string())
        );
    }

    #[test]
    fn test_cdn_host_is_served_immutable() {
        let rule = CdnRule::new("cdn.x.com", "x.com");
        assert_eq!(rule.decide(&head("cdn.x.com", "/a")), CdnDecision::Immutable);
    }

    #[test]
    fn test_other_hosts_revalidate() {
        let rule = CdnRule::new("cdn.x.com", "x.com");
        assert_eq!(rule.decide(&head("intranet", "/a")), CdnDecision::Revalidate);
        let incomplete = CdnRule::new("cdn.x.com", "");
        assert_eq!(incomplete.decide(&head("x.com", "/a")), CdnDecision::Revalidate);
    }

    #[test]
    fn test_check_builds_redirect_response() {
        let check = CdnCheck::new(
            Some(Arc::new(CdnRule::new("cdn.x.com", "x.com"))),
            Arc::new(head("x.com", "/app.js")),
        );
        let response = check.redirect().unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "//cdn.x.com/app.js");

        let none = CdnCheck::new(None, Arc::new(head("x.com", "/app.js")));
        assert!(none.redirect().is_none());
        assert_eq!(none.cache_control(), CACHE_REVALIDATE);
    }
}
