use std::{sync::Arc, time::Instant};

use axum::{Router, body::Body as AxumBody, extract::ConnectInfo};
use hyper::{Request, Response};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    core::{dispatcher::Dispatcher, host::ConnectionAddrs},
    tracing_setup,
};

/// HTTP handler bridging axum to the dispatcher
#[derive(Clone)]
pub struct HttpHandler {
    dispatcher: Arc<Dispatcher>,
}

impl HttpHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Main request handler
    ///
    /// Connection addresses come from `ConnectInfo<ConnectionAddrs>`; when the router is driven
    /// without it (e.g. `oneshot` in tests) the request is treated as arriving on `0.0.0.0:0`.
    pub async fn handle_request(&self, req: Request<AxumBody>) -> Response<AxumBody> {
        let conn = req
            .extensions()
            .get::<ConnectInfo<ConnectionAddrs>>()
            .map(|info| info.0)
            .unwrap_or_else(ConnectionAddrs::unspecified);

        let request_id = Uuid::new_v4().to_string();
        let span = tracing_setup::create_request_span(
            req.method().as_str(),
            req.uri().path(),
            &request_id,
        );
        let start = Instant::now();

        let response = self
            .dispatcher
            .dispatch(req, &conn)
            .instrument(span.clone())
            .await;

        span.record("http.status_code", response.status().as_u16());
        span.record("duration_ms", start.elapsed().as_millis() as u64);
        tracing::debug!(parent: &span, remote = %conn.remote, "Request completed");
        response
    }

    /// An axum router sending every request to this handler
    pub fn router(self, compression: bool) -> Router {
        let handler = Arc::new(self);
        let router = Router::new()
            .fallback(move |req: Request<AxumBody>| {
                let handler = handler.clone();
                async move { handler.handle_request(req).await }
            })
            .layer(TraceLayer::new_for_http());

        if compression {
            router.layer(CompressionLayer::new())
        } else {
            router
        }
    }
}
