//! Immutable request views handed to node callbacks.
use std::sync::Arc;

use http::request::Parts;
use hyper::{HeaderMap, Method, Uri, Version};

use crate::core::{host::HostContext, method, path::PathContext};

/// Everything about the request except its body, shared read-only for the whole walk.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub host: HostContext,
}

impl RequestHead {
    pub fn from_parts(parts: &Parts, host: HostContext) -> Self {
        Self {
            method: method::normalize(&parts.method),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            host,
        }
    }

    /// First value of a header as text, if present and valid.
    pub fn header(&self, name: impl hyper::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Path plus query, as sent.
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }
}

/// One evaluation of a node for one method.
///
/// The real request is evaluated once with its own method; an OPTIONS request additionally
/// evaluates the node once per other registered method. Every evaluation sees the same head and
/// path, only [`Evaluation::method`] differs, and none of them can change what the others see.
#[derive(Debug, Clone)]
pub struct Evaluation {
    head: Arc<RequestHead>,
    path: PathContext,
    method: Method,
    trial: bool,
}

impl Evaluation {
    pub(crate) fn real(head: Arc<RequestHead>, path: PathContext) -> Self {
        let method = head.method.clone();
        Self {
            head,
            path,
            method,
            trial: false,
        }
    }

    /// The same request, evaluated as if it had been sent with `method`.
    pub(crate) fn trial(&self, method: Method) -> Self {
        Self {
            head: Arc::clone(&self.head),
            path: self.path.clone(),
            method,
            trial: true,
        }
    }

    /// The method under evaluation. Differs from `head().method` during OPTIONS trials.
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn path(&self) -> &PathContext {
        &self.path
    }

    pub fn host(&self) -> &HostContext {
        &self.head.host
    }

    /// Whether this is an OPTIONS discovery trial rather than the real request.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}
