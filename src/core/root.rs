//! Dispatch roots: the top of a resource tree plus the virtual host it answers for.
use std::{
    future::Future,
    net::IpAddr,
    path::PathBuf,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::body::Body as AxumBody;
use eyre::{Result, WrapErr};
use futures_util::future::BoxFuture;
use hyper::{Method, Request, Response, StatusCode};

use crate::{
    config::models::{NodeConfig, SiteConfig},
    core::{
        cdn::CdnRule,
        dispatcher::guarded,
        host::{ConnectionAddrs, HostContext, normalize_host, same_host},
        node::{DEFAULT_HOME_FILE, Redirect, ReplyResult, Resource, ResourceNode, Walk, join_relative},
        path::PathContext,
        request::{Evaluation, RequestHead},
    },
    ports::static_files::{CachePolicy, StaticFiles},
};

type DirFn = Box<dyn Fn(&HostContext) -> PathBuf + Send + Sync>;
type GuardFn = Box<dyn Fn(Evaluation) -> BoxFuture<'static, Option<Response<AxumBody>>> + Send + Sync>;

/// A resource tree bound to the hosts, addresses and ports it serves.
pub struct DispatchRoot {
    name: String,
    root_dir: DirFn,
    root_relative: String,
    hosts: Option<Vec<String>>,
    host_ports: Option<Vec<u16>>,
    ips: Option<Vec<IpAddr>>,
    ip_ports: Option<Vec<u16>>,
    guard: Option<GuardFn>,
    static_fallback: bool,
    home_file: String,
    cdn: Option<Arc<CdnRule>>,
    nodes: Vec<Box<dyn Resource>>,
    files: Arc<dyn StaticFiles>,
}

fn random_suffix() -> String {
    rand::random::<u32>().to_string()
}

/// A directory name that almost certainly does not exist, so nothing is served by accident.
fn unconfigured_root() -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    PathBuf::from(format!("data-{millis}{}", random_suffix()))
}

fn status_only(status: StatusCode) -> Response<AxumBody> {
    let mut response = Response::new(AxumBody::empty());
    *response.status_mut() = status;
    response
}

impl DispatchRoot {
    /// A root that accepts every request and serves no files until `root_dir` is set.
    pub fn new(files: Arc<dyn StaticFiles>) -> Self {
        let root = unconfigured_root();
        Self {
            name: "default".to_string(),
            root_dir: Box::new(move |_| root.clone()),
            root_relative: format!("root-{}", random_suffix()),
            hosts: None,
            host_ports: None,
            ips: None,
            ip_ports: None,
            guard: None,
            static_fallback: true,
            home_file: DEFAULT_HOME_FILE.to_string(),
            cdn: None,
            nodes: Vec::new(),
            files,
        }
    }

    /// Build a static-serving root from a configured site.
    pub fn from_site(site: &SiteConfig, files: Arc<dyn StaticFiles>) -> Result<Self> {
        let mut root = Self::new(files)
            .name(&site.name)
            .static_fallback(site.static_fallback);
        if let Some(dir) = &site.root_dir {
            root = root.root_dir(dir);
        }
        if let Some(relative) = &site.root_relative {
            root = root.root_relative(relative);
        }
        if let Some(hosts) = &site.hosts {
            root = root.hosts(hosts.iter().cloned());
        }
        if let Some(ports) = &site.host_ports {
            root = root.host_ports(ports.iter().copied());
        }
        if let Some(ips) = &site.ips {
            let ips = ips
                .iter()
                .map(|ip| {
                    ip.parse::<IpAddr>()
                        .wrap_err_with(|| format!("Invalid IP '{}' in site '{}'", ip, site.name))
                })
                .collect::<Result<Vec<_>>>()?;
            root = root.ips(ips);
        }
        if let Some(ports) = &site.ip_ports {
            root = root.ip_ports(ports.iter().copied());
        }
        if let Some(home) = &site.home_file {
            root = root.home_file(home);
        }
        if let Some(cdn) = &site.cdn {
            root = root.cdn(&cdn.host, &cdn.origin_host);
        }
        for node in &site.nodes {
            root = root.node(configured_node(node)?);
        }
        Ok(root)
    }

    /// Name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Serve files from `dir` for every host.
    pub fn root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.root_dir = Box::new(move |_| dir.clone());
        self
    }

    /// Choose the file root per request.
    pub fn root_dir_with<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&HostContext) -> PathBuf + Send + Sync + 'static,
    {
        self.root_dir = Box::new(resolve);
        self
    }

    /// Directory below the file root for paths no top-level node claims.
    pub fn root_relative(mut self, dir: impl Into<String>) -> Self {
        self.root_relative = dir.into();
        self
    }

    pub fn hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.hosts = Some(hosts.into_iter().map(|h| normalize_host(h.as_ref())).collect());
        self
    }

    pub fn host_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.host_ports = Some(ports.into_iter().collect());
        self
    }

    pub fn ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.ips = Some(ips.into_iter().map(|ip| ip.to_canonical()).collect());
        self
    }

    pub fn ip_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ip_ports = Some(ports.into_iter().collect());
        self
    }

    /// Inspect every accepted request before the tree does; a returned response is final.
    pub fn guard<F, Fut>(mut self, guard: F) -> Self
    where
        F: Fn(Evaluation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Response<AxumBody>>> + Send + 'static,
    {
        self.guard = Some(Box::new(move |evaluation| Box::pin(guard(evaluation))));
        self
    }

    /// Whether paths no top-level node claims are served from disk (otherwise 404).
    pub fn static_fallback(mut self, enabled: bool) -> Self {
        self.static_fallback = enabled;
        self
    }

    /// File served for `/` when no node claims it.
    pub fn home_file(mut self, name: impl Into<String>) -> Self {
        self.home_file = name.into();
        self
    }

    pub fn cdn(mut self, host: impl Into<String>, origin_host: impl Into<String>) -> Self {
        self.cdn = Some(Arc::new(CdnRule::new(host, origin_host)));
        self
    }

    /// Add a top-level node. Nodes are tried in the order they are added.
    pub fn node(mut self, node: impl Resource + 'static) -> Self {
        self.nodes.push(Box::new(node));
        self
    }

    pub fn label(&self) -> &str {
        &self.name
    }

    /// Whether this root serves requests with identity `host`.
    pub fn accepts(&self, host: &HostContext) -> bool {
        if let Some(hosts) = &self.hosts
            && (host.host.is_empty() || !hosts.iter().any(|h| same_host(h, &host.host)))
        {
            return false;
        }
        if let Some(ports) = &self.host_ports
            && !host.host_port.is_some_and(|p| ports.contains(&p))
        {
            return false;
        }
        if let Some(ips) = &self.ips {
            let Ok(ip) = host.ip.parse::<IpAddr>() else {
                return false;
            };
            if !ips.contains(&ip.to_canonical()) {
                return false;
            }
        }
        if let Some(ports) = &self.ip_ports
            && !host.ip_port.is_some_and(|p| ports.contains(&p))
        {
            return false;
        }
        true
    }

    /// Handle a request if this root accepts it, recovering from any failure on the way.
    ///
    /// Returns `None` when the request is for another virtual host.
    pub async fn handle(
        &self,
        req: Request<AxumBody>,
        conn: &ConnectionAddrs,
    ) -> Option<Response<AxumBody>> {
        let (parts, body) = req.into_parts();
        let host = HostContext::resolve(&parts.uri, &parts.headers, conn);
        if !self.accepts(&host) {
            return None;
        }
        let head = Arc::new(RequestHead::from_parts(&parts, host));
        Some(guarded(self, head, body).await)
    }

    /// Walk the tree for an accepted request.
    pub(crate) async fn serve(&self, head: Arc<RequestHead>, body: AxumBody) -> ReplyResult {
        let path = match PathContext::parse(head.uri.path()) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("Rejecting {}: {}", head.uri.path(), e);
                return Ok(status_only(StatusCode::BAD_REQUEST));
            }
        };

        if let Some(guard) = &self.guard
            && let Some(response) = guard(Evaluation::real(Arc::clone(&head), path.clone())).await
        {
            tracing::debug!("Guard of site '{}' answered {}", self.name, head.uri.path());
            return Ok(response);
        }

        let root = (self.root_dir)(&head.host);
        if let Some(node) = self
            .nodes
            .iter()
            .find(|node| node.matcher().is_match(path.current()))
        {
            let walk = Walk::new(head, path, root, Arc::clone(&self.files), self.cdn.clone());
            return node.handle(walk, body).await;
        }

        if !self.static_fallback {
            tracing::debug!("No node of site '{}' claims {}", self.name, head.uri.path());
            return Ok(status_only(StatusCode::NOT_FOUND));
        }

        let base = join_relative(&root, [self.root_relative.as_str()]);
        let (file, policy) = if path.is_last() && path.current().is_empty() {
            (join_relative(&base, [self.home_file.as_str()]), CachePolicy::Revalidate)
        } else {
            (
                join_relative(&base, path.suffix().iter().map(String::as_str)),
                CachePolicy::Cdn,
            )
        };
        Ok(self
            .files
            .serve(&head, &file, policy, self.cdn.as_deref())
            .await?)
    }
}

/// Turn a configured node into a handler-less resource node.
fn configured_node(config: &NodeConfig) -> Result<ResourceNode<()>> {
    let mut node = ResourceNode::<()>::new(config.names.clone());
    if let Some(dir) = &config.relative_dir {
        node = node.relative_dir(dir);
    }
    if let Some(home) = &config.home_file {
        node = node.home_file(home);
    }
    if let Some(redirect) = &config.redirect {
        let status = StatusCode::from_u16(redirect.status)
            .wrap_err_with(|| format!("Invalid redirect status {}", redirect.status))?;
        let redirect = Redirect::new(status, &redirect.location);
        // Preflights cannot follow redirects.
        node = node.redirect(move |evaluation| {
            (*evaluation.method() != Method::OPTIONS).then(|| redirect.clone())
        });
    }
    for child in &config.children {
        node = node.child(configured_node(child)?);
    }
    Ok(node)
}
