// Integration tests for config-built sites served from disk
#[cfg(test)]
mod tests {
    use std::{
        net::{Ipv4Addr, SocketAddr},
        path::Path,
        sync::Arc,
    };

    use arbor::{
        ConnectionAddrs, DispatchRoot, Dispatcher, FileSystemAdapter, HttpHandler,
        config::{AppConfig, AppConfigValidator, loader::load_config},
        ports::StaticFiles,
    };
    use axum::body::Body;
    use http_body_util::BodyExt;
    use hyper::{
        Method, Request, Response, StatusCode,
        header::{CACHE_CONTROL, HOST, LOCATION},
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, content).await.unwrap();
    }

    async fn load(dir: &TempDir, a_root: &Path, b_root: &Path) -> AppConfig {
        let toml = format!(
            r#"
compression = false

[[listen]]
address = "127.0.0.1:0"

[[sites]]
name = "a"
root_dir = '{}'
root_relative = "www"
hosts = ["a.example.com"]

[[sites.nodes]]
names = [["docs"], ["documentation"]]
relative_dir = "docs"

[[sites.nodes]]
names = [["old", "blog"]]
redirect = {{ location = "/blog", status = 308 }}

[[sites]]
name = "api-only"
root_dir = '{}'
hosts = ["api.example.com"]
static_fallback = false

[[sites]]
name = "fallback"
root_dir = '{}'
root_relative = ""
"#,
            a_root.display(),
            b_root.display(),
            b_root.display()
        );
        let path = dir.path().join("arbor.toml");
        tokio::fs::write(&path, toml).await.unwrap();
        load_config(path.to_str().unwrap()).await.unwrap()
    }

    fn dispatcher(config: &AppConfig) -> Dispatcher {
        let files: Arc<dyn StaticFiles> = Arc::new(FileSystemAdapter::new());
        let roots = config
            .sites
            .iter()
            .map(|site| DispatchRoot::from_site(site, files.clone()).unwrap())
            .collect();
        Dispatcher::new(roots)
    }

    fn request(method: Method, uri: &str, host: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    fn conn() -> ConnectionAddrs {
        ConnectionAddrs::new(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 50000)),
        )
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    struct Fixture {
        _config_dir: TempDir,
        _a: TempDir,
        _b: TempDir,
        dispatcher: Dispatcher,
    }

    async fn fixture() -> Fixture {
        let config_dir = TempDir::new().unwrap();
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();

        write(a.path(), "www/index.html", "a home").await;
        write(a.path(), "www/page.html", "a page").await;
        write(a.path(), "docs/index.html", "docs home").await;
        write(a.path(), "docs/guide.html", "guide").await;
        write(b.path(), "index.html", "fallback home").await;
        write(b.path(), "page.html", "fallback page").await;

        let config = load(&config_dir, a.path(), b.path()).await;
        AppConfigValidator::validate(&config).unwrap();
        Fixture {
            dispatcher: dispatcher(&config),
            _config_dir: config_dir,
            _a: a,
            _b: b,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_host_selects_site() {
        let f = fixture().await;

        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/page.html", "A.Example.com:8080"), &conn())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "a page");

        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/page.html", "other.example.com"), &conn())
            .await;
        assert_eq!(body_string(response).await, "fallback page");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_root_home_file_revalidates() {
        let f = fixture().await;
        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/", "a.example.com"), &conn())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
        assert_eq!(body_string(response).await, "a home");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_node_aliases_share_a_directory() {
        let f = fixture().await;
        for uri in ["/docs/guide.html", "/Documentation/guide.html", "/DOCS/guide.html"] {
            let response = f
                .dispatcher
                .dispatch(request(Method::GET, uri, "a.example.com"), &conn())
                .await;
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(body_string(response).await, "guide");
        }

        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/documentation", "a.example.com"), &conn())
            .await;
        assert_eq!(body_string(response).await, "docs home");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_configured_redirect() {
        let f = fixture().await;
        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/Old_Blog/post-1", "a.example.com"), &conn())
            .await;
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(response.headers()[LOCATION], "/blog");

        let response = f
            .dispatcher
            .dispatch(request(Method::OPTIONS, "/old-blog", "a.example.com"), &conn())
            .await;
        assert_ne!(response.status(), StatusCode::PERMANENT_REDIRECT);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_disabled_fallback_is_not_found() {
        let f = fixture().await;
        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/page.html", "api.example.com"), &conn())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_file_and_bad_path() {
        let f = fixture().await;
        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/nope.html", "a.example.com"), &conn())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = f
            .dispatcher
            .dispatch(request(Method::GET, "/www/../../etc/passwd", "a.example.com"), &conn())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_router_end_to_end() {
        let f = fixture().await;
        let router = HttpHandler::new(Arc::new(f.dispatcher)).router(false);

        let response = router
            .clone()
            .oneshot(request(Method::GET, "/docs/guide.html", "a.example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "guide");

        let response = router
            .oneshot(request(Method::DELETE, "/page.html", "a.example.com"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
