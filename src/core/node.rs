//! Resource tree nodes.
//!
//! A [`ResourceNode`] owns one path segment (matched by its [`SegmentMatcher`]), a set of method
//! handlers and an ordered list of children. For each request reaching it the node decides, in
//! order: record, redirect, capture by a handler (with OPTIONS discovery), child dispatch, and
//! finally the static file fallback.
use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use futures_util::future::BoxFuture;
use hyper::{
    Method, Response, StatusCode,
    header::{HeaderValue, LOCATION},
};

use crate::{
    core::{
        cdn::{CdnCheck, CdnRule},
        cors,
        exception::Failure,
        host::HostContext,
        method,
        path::PathContext,
        request::{Evaluation, RequestHead},
        segment::SegmentMatcher,
    },
    ports::static_files::{CachePolicy, StaticFiles},
};

/// Result of a reply.
pub type ReplyResult = Result<Response<AxumBody>, Failure>;

type PeekFn<P> = Box<dyn Fn(Evaluation) -> BoxFuture<'static, (P, bool)> + Send + Sync>;
type ReplyFn<P> = Box<dyn Fn(ReplyContext, P) -> BoxFuture<'static, ReplyResult> + Send + Sync>;
type MonitorFn<P> = Box<dyn Fn(&P, bool) + Send + Sync>;
type RedirectFn = Box<dyn Fn(&Evaluation) -> Option<Redirect> + Send + Sync>;
type RecordFn = Box<dyn Fn(&Evaluation) + Send + Sync>;
type OriginsFn = Box<dyn Fn(&HostContext) -> Vec<String> + Send + Sync>;

/// File served when a node is the last segment of the path.
pub const DEFAULT_HOME_FILE: &str = "index.html";

/// The callbacks registered for one method on one node.
///
/// * `peek` inspects the request and returns a payload plus whether the node wants to answer.
///   Without it the node always answers, with `P::default()` as payload.
/// * `reply` produces the response from the payload. Without it the node never answers.
/// * `monitor` observes the payload and the final verdict of the real request.
pub struct Handler<P> {
    peek: Option<PeekFn<P>>,
    reply: Option<ReplyFn<P>>,
    monitor: Option<MonitorFn<P>>,
}

impl<P> Default for Handler<P> {
    fn default() -> Self {
        Self {
            peek: None,
            reply: None,
            monitor: None,
        }
    }
}

impl<P: Send + 'static> Handler<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peek<F, Fut>(mut self, peek: F) -> Self
    where
        F: Fn(Evaluation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (P, bool)> + Send + 'static,
    {
        self.peek = Some(Box::new(move |evaluation| Box::pin(peek(evaluation))));
        self
    }

    pub fn reply<F, Fut>(mut self, reply: F) -> Self
    where
        F: Fn(ReplyContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ReplyResult> + Send + 'static,
    {
        self.reply = Some(Box::new(move |ctx, payload| Box::pin(reply(ctx, payload))));
        self
    }

    pub fn monitor<F>(mut self, monitor: F) -> Self
    where
        F: Fn(&P, bool) + Send + Sync + 'static,
    {
        self.monitor = Some(Box::new(monitor));
        self
    }
}

/// What a reply gets to work with.
pub struct ReplyContext {
    head: Arc<RequestHead>,
    path: PathContext,
    body: AxumBody,
    cdn: CdnCheck,
}

impl ReplyContext {
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn path(&self) -> &PathContext {
        &self.path
    }

    pub fn host(&self) -> &HostContext {
        &self.head.host
    }

    /// CDN decision for this request, for replies serving cacheable payloads.
    pub fn cdn(&self) -> &CdnCheck {
        &self.cdn
    }

    /// Take the request body, leaving an empty one behind.
    pub fn take_body(&mut self) -> AxumBody {
        std::mem::take(&mut self.body)
    }

    pub fn into_body(self) -> AxumBody {
        self.body
    }
}

/// An automatic redirect chosen by a node's redirect predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
}

impl Redirect {
    pub fn new(status: StatusCode, location: impl Into<String>) -> Self {
        Self {
            status,
            location: location.into(),
        }
    }

    /// 307 Temporary Redirect.
    pub fn temporary(location: impl Into<String>) -> Self {
        Self::new(StatusCode::TEMPORARY_REDIRECT, location)
    }

    /// 308 Permanent Redirect.
    pub fn permanent(location: impl Into<String>) -> Self {
        Self::new(StatusCode::PERMANENT_REDIRECT, location)
    }

    fn into_response(self) -> Response<AxumBody> {
        let mut response = Response::new(AxumBody::empty());
        *response.status_mut() = self.status;
        match HeaderValue::from_str(&self.location) {
            Ok(location) => {
                response.headers_mut().insert(LOCATION, location);
            }
            Err(e) => tracing::warn!("Dropping invalid redirect location {:?}: {}", self.location, e),
        }
        response
    }
}

/// Where a request currently is in the tree.
pub struct Walk {
    head: Arc<RequestHead>,
    path: PathContext,
    dir: PathBuf,
    files: Arc<dyn StaticFiles>,
    cdn: Option<Arc<CdnRule>>,
}

impl Walk {
    /// `dir` is the directory the node's own relative dir is resolved against.
    pub(crate) fn new(
        head: Arc<RequestHead>,
        path: PathContext,
        dir: PathBuf,
        files: Arc<dyn StaticFiles>,
        cdn: Option<Arc<CdnRule>>,
    ) -> Self {
        Self {
            head,
            path,
            dir,
            files,
            cdn,
        }
    }

    /// The request being dispatched.
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    pub fn path(&self) -> &PathContext {
        &self.path
    }
}

/// A node of the resource tree, with the payload type hidden.
///
/// [`ResourceNode`] covers the usual cases. A custom implementation receives the request
/// through [`Walk::head`] with [`Walk::path`] positioned on the segment its matcher accepted,
/// and answers for the whole subtree below it.
#[async_trait]
pub trait Resource: Send + Sync {
    fn matcher(&self) -> &SegmentMatcher;

    /// Handle a request whose current segment was accepted by [`Resource::matcher`].
    async fn handle(&self, walk: Walk, body: AxumBody) -> ReplyResult;
}

/// A node of the resource tree whose handlers share the payload type `P`.
pub struct ResourceNode<P> {
    matcher: SegmentMatcher,
    relative_dir: String,
    home_file: String,
    handlers: Vec<(Method, Handler<P>)>,
    redirect: Option<RedirectFn>,
    record: Option<RecordFn>,
    allow_origins: Option<OriginsFn>,
    children: Vec<Box<dyn Resource>>,
}

enum Outcome<'a, P> {
    Redirect(Redirect),
    Evaluated {
        handler: &'a Handler<P>,
        payload: P,
        captured: bool,
    },
    Unhandled,
}

impl<P: Default + Send + 'static> ResourceNode<P> {
    /// A node matching `matcher`. Its directory defaults to the matcher's canonical spelling.
    pub fn new(matcher: SegmentMatcher) -> Self {
        let relative_dir = matcher.canonical_join();
        Self {
            matcher,
            relative_dir,
            home_file: DEFAULT_HOME_FILE.to_string(),
            handlers: Vec::new(),
            redirect: None,
            record: None,
            allow_origins: None,
            children: Vec::new(),
        }
    }

    /// Directory this node adds below its parent's, `""` for none.
    pub fn relative_dir(mut self, dir: impl Into<String>) -> Self {
        self.relative_dir = dir.into();
        self
    }

    pub fn home_file(mut self, name: impl Into<String>) -> Self {
        self.home_file = name.into();
        self
    }

    /// Register `handler` for `method`, replacing an earlier registration for the same method.
    pub fn handle(mut self, method: Method, handler: Handler<P>) -> Self {
        let method = method::normalize(&method);
        match self.handlers.iter_mut().find(|(m, _)| *m == method) {
            Some(slot) => slot.1 = handler,
            None => self.handlers.push((method, handler)),
        }
        self
    }

    pub fn redirect<F>(mut self, redirect: F) -> Self
    where
        F: Fn(&Evaluation) -> Option<Redirect> + Send + Sync + 'static,
    {
        self.redirect = Some(Box::new(redirect));
        self
    }

    /// Hook called once for every request reaching this node, redirected or not.
    pub fn record<F>(mut self, record: F) -> Self
    where
        F: Fn(&Evaluation) + Send + Sync + 'static,
    {
        self.record = Some(Box::new(record));
        self
    }

    /// Origins allowed to read this node's replies cross-origin.
    pub fn allow_origins<F>(mut self, origins: F) -> Self
    where
        F: Fn(&HostContext) -> Vec<String> + Send + Sync + 'static,
    {
        self.allow_origins = Some(Box::new(origins));
        self
    }

    pub fn child(mut self, child: impl Resource + 'static) -> Self {
        self.children.push(Box::new(child));
        self
    }

    fn handler(&self, method: &Method) -> Option<&Handler<P>> {
        self.handlers
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, handler)| handler)
    }

    async fn evaluate(&self, evaluation: &Evaluation) -> Outcome<'_, P> {
        if let Some(redirect) = self.redirect.as_ref().and_then(|f| f(evaluation)) {
            return Outcome::Redirect(redirect);
        }
        let Some(handler) = self.handler(evaluation.method()) else {
            return Outcome::Unhandled;
        };
        let (payload, captured) = match &handler.peek {
            Some(peek) => peek(evaluation.clone()).await,
            None => (P::default(), true),
        };
        Outcome::Evaluated {
            handler,
            payload,
            captured: captured && handler.reply.is_some(),
        }
    }

    /// Whether the node would answer `evaluation`. Only peeks run.
    async fn captures(&self, evaluation: &Evaluation) -> bool {
        matches!(
            self.evaluate(evaluation).await,
            Outcome::Evaluated { captured: true, .. }
        )
    }

    /// OPTIONS plus every other registered method the node would answer, in registration order.
    async fn discover(&self, evaluation: &Evaluation) -> Vec<Method> {
        let mut allow = vec![Method::OPTIONS];
        for (method, _) in &self.handlers {
            if *method == Method::OPTIONS {
                continue;
            }
            if self.captures(&evaluation.trial(method.clone())).await {
                allow.push(method.clone());
            }
        }
        allow
    }

    fn with_cors(&self, head: &RequestHead, allow: &[Method], mut response: Response<AxumBody>) -> Response<AxumBody> {
        if let Some(origins) = &self.allow_origins {
            let allowed = origins(&head.host);
            cors::apply(&head.headers, &allowed, allow, response.headers_mut());
        }
        response
    }
}

/// Join slash separated relative pieces onto `base`, skipping empty and `.` pieces.
pub(crate) fn join_relative<'a>(base: &Path, pieces: impl IntoIterator<Item = &'a str>) -> PathBuf {
    let mut path = base.to_path_buf();
    for piece in pieces {
        for part in piece.split('/') {
            if !part.is_empty() && part != "." {
                path.push(part);
            }
        }
    }
    path
}

#[async_trait]
impl<P: Default + Send + 'static> Resource for ResourceNode<P> {
    fn matcher(&self) -> &SegmentMatcher {
        &self.matcher
    }

    async fn handle(&self, walk: Walk, body: AxumBody) -> ReplyResult {
        let Walk {
            head,
            path,
            dir,
            files,
            cdn,
        } = walk;

        let evaluation = Evaluation::real(Arc::clone(&head), path.clone());
        if let Some(record) = &self.record {
            record(&evaluation);
        }

        let outcome = self.evaluate(&evaluation).await;
        if let Outcome::Redirect(redirect) = outcome {
            tracing::debug!("Redirecting {} to {}", head.uri.path(), redirect.location);
            return Ok(redirect.into_response());
        }

        if head.method == Method::OPTIONS {
            let allow = self.discover(&evaluation).await;
            let captured = allow.len() > 1;
            if let Outcome::Evaluated {
                handler, payload, ..
            } = &outcome
            {
                if let Some(monitor) = &handler.monitor {
                    monitor(payload, captured);
                }
            }
            if captured {
                let mut response = Response::new(AxumBody::empty());
                *response.status_mut() = StatusCode::NO_CONTENT;
                method::set_allow(response.headers_mut(), &allow);
                return Ok(self.with_cors(&head, &allow, response));
            }
        } else if let Outcome::Evaluated {
            handler,
            payload,
            captured,
        } = outcome
        {
            if let Some(monitor) = &handler.monitor {
                monitor(&payload, captured);
            }
            if let (true, Some(reply)) = (captured, &handler.reply) {
                let ctx = ReplyContext {
                    head: Arc::clone(&head),
                    path: path.clone(),
                    body,
                    cdn: CdnCheck::new(cdn.clone(), Arc::clone(&head)),
                };
                let response = reply(ctx, payload).await?;
                return Ok(self.with_cors(&head, &[head.method.clone()], response));
            }
        }

        let own_dir = join_relative(&dir, [self.relative_dir.as_str()]);
        let Some(next) = path.advance() else {
            let file = join_relative(&own_dir, [self.home_file.as_str()]);
            tracing::debug!("Serving home file {}", file.display());
            return Ok(files
                .serve(&head, &file, CachePolicy::Revalidate, cdn.as_deref())
                .await?);
        };

        if let Some(child) = self
            .children
            .iter()
            .find(|child| child.matcher().is_match(next.current()))
        {
            return child
                .handle(Walk::new(head, next, own_dir, files, cdn), body)
                .await;
        }

        let file = join_relative(&own_dir, next.suffix().iter().map(String::as_str));
        tracing::debug!("No child matched '{}', serving {}", next.current(), file.display());
        Ok(files
            .serve(&head, &file, CachePolicy::Cdn, cdn.as_deref())
            .await?)
    }
}
