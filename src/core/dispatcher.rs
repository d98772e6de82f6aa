//! The outermost dispatch layer: root selection and the failure boundary.
use std::{panic::AssertUnwindSafe, sync::Arc};

use axum::body::Body as AxumBody;
use futures_util::FutureExt;
use hyper::{Request, Response, StatusCode};

use crate::core::{
    exception::Caught,
    host::{ConnectionAddrs, HostContext},
    request::RequestHead,
    root::DispatchRoot,
};

/// An ordered set of roots. The first root accepting a request handles it.
pub struct Dispatcher {
    roots: Vec<DispatchRoot>,
}

impl Dispatcher {
    pub fn new(roots: Vec<DispatchRoot>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[DispatchRoot] {
        &self.roots
    }

    /// Answer `req`. Never fails: failures and panics become error responses, and a request no
    /// root accepts gets a 404.
    pub async fn dispatch(&self, req: Request<AxumBody>, conn: &ConnectionAddrs) -> Response<AxumBody> {
        let (parts, body) = req.into_parts();
        let host = HostContext::resolve(&parts.uri, &parts.headers, conn);

        let Some(root) = self.roots.iter().find(|root| root.accepts(&host)) else {
            tracing::warn!(
                host = %host.host,
                host_port = ?host.host_port,
                ip = %host.ip,
                ip_port = ?host.ip_port,
                "No site accepts {} {}",
                parts.method,
                parts.uri.path()
            );
            let mut response = Response::new(AxumBody::empty());
            *response.status_mut() = StatusCode::NOT_FOUND;
            return response;
        };

        tracing::debug!("Site '{}' accepted {}", root.label(), parts.uri.path());
        let head = Arc::new(RequestHead::from_parts(&parts, host));
        guarded(root, head, body).await
    }
}

/// Run `root` on an accepted request, turning returned failures and panics into responses.
pub(crate) async fn guarded(
    root: &DispatchRoot,
    head: Arc<RequestHead>,
    body: AxumBody,
) -> Response<AxumBody> {
    let method = head.method.to_string();
    let path = head.uri.path().to_string();

    match AssertUnwindSafe(root.serve(head, body)).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(failure)) => Caught::from_failure(failure).into_response(&method, &path),
        Err(payload) => Caught::from_panic(payload).into_response(&method, &path),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use http_body_util::BodyExt;
    use hyper::{Method, header::HOST};

    use super::*;
    use crate::core::{
        exception::{ERROR_CODE, ERROR_ID, Failure, HttpException, install_panic_hook, raise},
        node::{Handler, ResourceNode, tests::RecordingFiles},
        segment::SegmentMatcher,
    };

    fn conn() -> ConnectionAddrs {
        ConnectionAddrs::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 80)),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 40000)),
        )
    }

    fn request(uri: &str, host: &str) -> Request<AxumBody> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(HOST, host)
            .body(AxumBody::empty())
            .unwrap()
    }

    fn site(name: &str) -> DispatchRoot {
        DispatchRoot::new(Arc::new(RecordingFiles))
            .name(name)
            .root_dir(format!("/srv/{name}"))
    }

    fn explode() -> ((), bool) {
        panic!("peek exploded")
    }

    fn explode_guard() -> Option<Response<AxumBody>> {
        panic!("guard exploded")
    }

    fn insufficient_funds() -> crate::core::node::ReplyResult {
        raise(HttpException::new(StatusCode::PAYMENT_REQUIRED).with_code("余额不足"))
    }

    async fn body_string(response: Response<AxumBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_first_accepting_root_wins() {
        let dispatcher = Dispatcher::new(vec![
            site("a").hosts(["a.com"]),
            site("any"),
            site("never").hosts(["b.com"]),
        ]);

        let response = dispatcher.dispatch(request("/f", "A.COM"), &conn()).await;
        assert!(body_string(response).await.starts_with("/srv/a/"));

        let response = dispatcher.dispatch(request("/f", "b.com"), &conn()).await;
        assert!(body_string(response).await.starts_with("/srv/any/"));
    }

    #[tokio::test]
    async fn test_no_root_is_not_found() {
        let dispatcher = Dispatcher::new(vec![site("a").hosts(["a.com"])]);
        let response = dispatcher.dispatch(request("/", "b.com"), &conn()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        install_panic_hook();
        let root = site("a").node(ResourceNode::<()>::new(SegmentMatcher::word("boom")).handle(
            Method::GET,
            Handler::new().peek(|_| async { explode() }),
        ));
        let dispatcher = Dispatcher::new(vec![root]);
        let response = dispatcher.dispatch(request("/boom", "a.com"), &conn()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(ERROR_ID));
    }

    #[tokio::test]
    async fn test_raised_exception_keeps_status_and_code() {
        let root = site("a").node(ResourceNode::<()>::new(SegmentMatcher::word("pay")).handle(
            Method::GET,
            Handler::new().reply(|_ctx, _| async { insufficient_funds() }),
        ));
        let dispatcher = Dispatcher::new(vec![root]);
        let response = dispatcher.dispatch(request("/pay", "a.com"), &conn()).await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let code = response.headers()[ERROR_CODE].to_str().unwrap();
        assert_eq!(urlencoding::decode(code).unwrap(), "余额不足");
    }

    #[tokio::test]
    async fn test_returned_failure_is_translated() {
        let root = site("a").node(ResourceNode::<()>::new(SegmentMatcher::word("db")).handle(
            Method::GET,
            Handler::new().reply(|_ctx, _| async { Err(Failure::from(eyre::eyre!("db down"))) }),
        ));
        let response = Dispatcher::new(vec![root])
            .dispatch(request("/db", "a.com"), &conn())
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(ERROR_ID));
    }

    #[tokio::test]
    async fn test_root_handle_is_guarded_too() {
        let root = site("a").guard(|_| async { explode_guard() });
        let response = root.handle(request("/", "a.com"), &conn()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
