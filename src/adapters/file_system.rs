use std::path::Path;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use http_body_util::BodyExt;
use hyper::{
    Method, Request, Response, StatusCode,
    header::{CACHE_CONTROL, HeaderValue},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::{
    core::{
        cdn::{CACHE_IMMUTABLE, CACHE_PRIVATE, CACHE_REVALIDATE, CdnDecision, CdnRule, redirect_response},
        method,
        request::RequestHead,
    },
    ports::static_files::{CachePolicy, StaticFileError, StaticFiles},
};

/// Methods a plain file answers to.
const FILE_METHODS: [Method; 3] = [Method::OPTIONS, Method::GET, Method::HEAD];

/// File system adapter using tower-http ServeFile for static file serving
///
/// This adapter only decides *whether* and *how* a file is served (existence, method, directory,
/// cache policy, CDN redirect). Byte ranges, conditional requests and content types are left to
/// `ServeFile`.
#[derive(Debug, Default, Clone)]
pub struct FileSystemAdapter;

impl FileSystemAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn send_file(
        &self,
        head: &RequestHead,
        file: &Path,
        cache_control: &'static str,
    ) -> Result<Response<AxumBody>, StaticFileError> {
        let mut req = Request::builder()
            .method(head.method.clone())
            .uri(head.uri.clone())
            .version(head.version)
            .body(AxumBody::empty())
            .map_err(|e| StaticFileError::InvalidPath(format!("{}: {e}", file.display())))?;
        *req.headers_mut() = head.headers.clone();

        // ServeFile answers every failure with a status, its error type is `Infallible`.
        let response = ServeFile::new(file)
            .oneshot(req)
            .await
            .unwrap_or_else(|never| match never {});

        let (mut parts, tower_body) = response.into_parts();
        if parts.status.is_success() || parts.status == StatusCode::NOT_MODIFIED {
            parts
                .headers
                .insert(CACHE_CONTROL, HeaderValue::from_static(cache_control));
        }
        let axum_body = AxumBody::new(tower_body.map_err(|e| {
            tracing::error!("Error reading static file body: {}", e);
            axum::Error::new(e)
        }));

        Ok(Response::from_parts(parts, axum_body))
    }
}

fn status_only(status: StatusCode) -> Response<AxumBody> {
    let mut response = Response::new(AxumBody::empty());
    *response.status_mut() = status;
    response
}

#[async_trait]
impl StaticFiles for FileSystemAdapter {
    async fn serve(
        &self,
        head: &RequestHead,
        file: &Path,
        policy: CachePolicy,
        cdn: Option<&CdnRule>,
    ) -> Result<Response<AxumBody>, StaticFileError> {
        let metadata = match tokio::fs::metadata(file).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::error!("Static file error ({}) on {}", e, file.display());
                return Ok(status_only(StatusCode::NOT_FOUND));
            }
        };

        match head.method {
            Method::OPTIONS => {
                let mut response = status_only(StatusCode::OK);
                method::set_allow(response.headers_mut(), &FILE_METHODS);
                Ok(response)
            }
            Method::GET | Method::HEAD => {
                if metadata.is_dir() {
                    tracing::warn!("Static file {} is a directory", file.display());
                    return Ok(status_only(StatusCode::BAD_REQUEST));
                }
                let cache_control = match policy {
                    CachePolicy::Private => CACHE_PRIVATE,
                    CachePolicy::Revalidate => CACHE_REVALIDATE,
                    CachePolicy::Cdn => match cdn.map(|rule| rule.decide(head)) {
                        Some(CdnDecision::Redirect(location)) => {
                            tracing::debug!("Redirecting {} to CDN {}", file.display(), location);
                            return Ok(redirect_response(&location));
                        }
                        Some(CdnDecision::Immutable) => CACHE_IMMUTABLE,
                        Some(CdnDecision::Revalidate) | None => CACHE_REVALIDATE,
                    },
                };
                self.send_file(head, file, cache_control).await
            }
            _ => {
                let mut response = status_only(StatusCode::METHOD_NOT_ALLOWED);
                method::set_allow(response.headers_mut(), &FILE_METHODS);
                Ok(response)
            }
        }
    }
}
