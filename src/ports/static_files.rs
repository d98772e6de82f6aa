use std::path::Path;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::Response;
use thiserror::Error;

use crate::core::{cdn::CdnRule, request::RequestHead};

/// Error type for static file operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StaticFileError {
    /// Error when encountering an IO issue
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error when path is invalid
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for static file operations
pub type StaticFileResult<T> = Result<T, StaticFileError>;

/// How a served file may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Per-user content: `Cache-Control: private`.
    Private,
    /// Content that may differ per host or change at any time: `Cache-Control: no-cache`.
    Revalidate,
    /// Shared content eligible for the CDN rule: redirected to the CDN, served long-lived to the
    /// CDN, or revalidated everywhere else.
    Cdn,
}

/// StaticFiles defines the port (interface) for answering with a file from disk
#[async_trait]
pub trait StaticFiles: Send + Sync + 'static {
    /// Answer `head` with the file at `file`
    ///
    /// # Arguments
    /// * `head` - The request being answered
    /// * `file` - Fully resolved path of the file
    /// * `policy` - Caching policy for the reply
    /// * `cdn` - CDN rule of the serving site, consulted for [`CachePolicy::Cdn`]
    ///
    /// # Returns
    /// A response for every outcome (404, 400 for directories, 405 for other methods), or an
    /// error if the response could not be produced at all
    async fn serve(
        &self,
        head: &RequestHead,
        file: &Path,
        policy: CachePolicy,
        cdn: Option<&CdnRule>,
    ) -> StaticFileResult<Response<AxumBody>>;
}
