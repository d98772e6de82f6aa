//! Arbor - a resource-tree HTTP dispatch engine.
//!
//! Arbor answers requests by walking a tree of named resources. Each node matches one path
//! segment under several spellings (`api-v2`, `API.v2`, `api_v2`), can redirect, peek, reply or
//! record per HTTP method, and falls back to files on disk when nothing claims the rest of the
//! path. Roots sit on top of the trees and filter requests by virtual host, local IP and port.
//!
//! # Features
//! - Multi-spelling, case-insensitive segment matching
//! - Virtual host, IP and port filters per root, first accepting root wins
//! - OPTIONS negotiation by trial evaluation of the registered methods
//! - CORS with per-node origin allow lists
//! - Static fallback with home files and CDN redirects for cacheable assets
//! - A failure boundary turning raised exceptions and panics into HTTP responses
//! - Structured tracing via `tracing`, TOML / YAML / JSON configuration, graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use arbor::{
//!     DispatchRoot, Dispatcher, FileSystemAdapter, Handler, HttpHandler, ResourceNode,
//!     SegmentMatcher,
//! };
//! use axum::body::Body;
//! use hyper::{Method, Response};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let api = ResourceNode::<()>::new(SegmentMatcher::new([["api", "v2"]])).handle(
//!     Method::GET,
//!     Handler::new().reply(|_ctx, _| async { Ok(Response::new(Body::from("hello"))) }),
//! );
//! let root = DispatchRoot::new(Arc::new(FileSystemAdapter::new()))
//!     .hosts(["example.com"])
//!     .root_dir("./public")
//!     .node(api);
//!
//! let router = HttpHandler::new(Arc::new(Dispatcher::new(vec![root]))).router(true);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(
//!     listener,
//!     router.into_make_service_with_connect_info::<arbor::ConnectionAddrs>(),
//! )
//! .await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! dispatch logic inside `core`. File serving is reached only through the
//! [`StaticFiles`](ports::StaticFiles) port so trees can be tested without a disk.
//!
//! # Error Handling
//! Handlers return [`Failure`]; code deep inside a handler may also [`raise`] an
//! [`Exception`]. Both end at the dispatcher's boundary, which answers with the exception's
//! status or a 500 carrying an `Error-Id` header that matches the logged incident.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{FileSystemAdapter, HttpHandler},
    core::{
        ConnectionAddrs, DispatchRoot, Dispatcher, Exception, Failure, Handler, HttpException,
        ResourceNode, SegmentMatcher, raise,
    },
    ports::StaticFiles,
    utils::GracefulShutdown,
};
