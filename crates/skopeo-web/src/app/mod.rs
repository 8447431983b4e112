use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use crate::api::health;
use crate::api::proxy::api_proxy;
use crate::api::script::api_agent_asset;
use crate::config::ServerConfig;
use crate::proxy::PageFetcher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub fetcher: PageFetcher,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let fetcher = PageFetcher::new(&config);
        Self {
            config: Arc::new(config),
            fetcher,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/proxy", get(api_proxy));
    for asset in state.config.agent_assets() {
        let url = asset.url.clone();
        router = router.route(&url, get(move || api_agent_asset(asset.clone())));
    }
    router.layer(CorsLayer::permissive()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::{StatusCode, header};
    use axum::response::{IntoResponse, Redirect};
    use tokio::net::TcpListener;

    const PAGE: &str = "<!doctype html><html><head><title>Example</title></head>\
                        <body><img src=\"/logo.png\"><p>Hello</p></body></html>";

    struct Reply {
        status: u16,
        content_type: Option<String>,
        body: String,
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("serve");
        });
        addr
    }

    async fn upstream() -> SocketAddr {
        let router = Router::new()
            .route(
                "/page",
                get(|| async { ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], PAGE) }),
            )
            .route(
                "/data.json",
                get(|| async { ([(header::CONTENT_TYPE, "application/json")], "{}") }),
            )
            .route(
                "/missing",
                get(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        [(header::CONTENT_TYPE, "text/html")],
                        "<html><head></head><body>gone</body></html>",
                    )
                }),
            )
            .route(
                "/down",
                get(|| async {
                    (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response()
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    ([(header::CONTENT_TYPE, "text/html")], "<p>late</p>")
                }),
            )
            .route("/huge", get(|| async { ([(header::CONTENT_TYPE, "text/html")], "x".repeat(4096)) }))
            .route(
                "/",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], PAGE) }),
            )
            .route("/moved", get(|| async { Redirect::temporary("/page") }));
        serve(router).await
    }

    fn scratch_dir() -> PathBuf {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "skopeo-web-test-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    async fn proxy_with(config: ServerConfig) -> SocketAddr {
        serve(build_router(AppState::new(config))).await
    }

    async fn get_reply(url: String) -> Reply {
        tokio::task::spawn_blocking(move || {
            let response = match ureq::get(&url).call() {
                Ok(response) => response,
                Err(ureq::Error::Status(_, response)) => response,
                Err(error) => panic!("request to {url} failed: {error}"),
            };
            Reply {
                status: response.status(),
                content_type: response.header("content-type").map(str::to_string),
                body: response.into_string().expect("read body"),
            }
        })
        .await
        .expect("join")
    }

    fn proxy_url(proxy: SocketAddr, target: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
        format!("http://{proxy}/proxy?url={encoded}")
    }

    fn error_message(reply: &Reply) -> String {
        let parsed: serde_json::Value = serde_json::from_str(&reply.body).expect("json envelope");
        parsed["error"].as_str().expect("error field").to_string()
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let proxy = proxy_with(ServerConfig::default()).await;
        let reply = get_reply(format!("http://{proxy}/health")).await;
        assert_eq!((reply.status, reply.body.as_str()), (200, "ok"));
    }

    #[tokio::test]
    async fn missing_url_is_a_bad_request() {
        let proxy = proxy_with(ServerConfig::default()).await;
        for path in ["/proxy", "/proxy?url=", "/proxy?other=1"] {
            let reply = get_reply(format!("http://{proxy}{path}")).await;
            assert_eq!(reply.status, 400, "{path}");
            assert_eq!(error_message(&reply), "Missing URL parameter");
        }
    }

    #[tokio::test]
    async fn page_is_rewritten_with_one_base_and_one_agent() {
        let upstream = upstream().await;
        let proxy = proxy_with(ServerConfig::default()).await;
        let target = format!("http://{upstream}/page");

        let reply = get_reply(proxy_url(proxy, &target)).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type.as_deref(), Some("text/html; charset=utf-8"));

        let base = format!("<head><base href=\"{target}\">");
        assert!(reply.body.contains(&base), "{}", reply.body);
        assert_eq!(reply.body.matches("<base ").count(), 1);
        let agent = format!(
            "<p>Hello</p><script src=\"http://{proxy}/js/inspect-script.js\"></script></body>"
        );
        assert!(reply.body.contains(&agent), "{}", reply.body);
        assert_eq!(reply.body.matches("inspect-script.js").count(), 1);
    }

    #[tokio::test]
    async fn base_is_the_url_as_supplied() {
        let upstream = upstream().await;
        let proxy = proxy_with(ServerConfig::default()).await;

        let bare = format!("http://{upstream}");
        let reply = get_reply(proxy_url(proxy, &format!("  {bare} "))).await;
        assert_eq!(reply.status, 200);
        assert!(
            reply.body.contains(&format!("<base href=\"{bare}\">")),
            "{}",
            reply.body
        );

        let moved = format!("http://{upstream}/moved");
        let reply = get_reply(proxy_url(proxy, &moved)).await;
        assert_eq!(reply.status, 200);
        assert!(reply.body.contains("<p>Hello</p>"));
        assert!(reply.body.contains(&format!("<base href=\"{moved}\">")), "{}", reply.body);
    }

    #[tokio::test]
    async fn client_errors_are_rewritten_and_mirrored() {
        let upstream = upstream().await;
        let proxy = proxy_with(ServerConfig::default()).await;
        let reply = get_reply(proxy_url(proxy, &format!("http://{upstream}/missing"))).await;
        assert_eq!(reply.status, 404);
        assert!(reply.body.contains("gone<script src="));
    }

    #[tokio::test]
    async fn server_errors_carry_upstream_status() {
        let upstream = upstream().await;
        let proxy = proxy_with(ServerConfig::default()).await;
        let reply = get_reply(proxy_url(proxy, &format!("http://{upstream}/down"))).await;
        assert_eq!(reply.status, 503);
        assert_eq!(
            error_message(&reply),
            "Target site returned error: 503 Service Unavailable"
        );
    }

    #[tokio::test]
    async fn non_html_is_unsupported() {
        let upstream = upstream().await;
        let proxy = proxy_with(ServerConfig::default()).await;
        let reply = get_reply(proxy_url(proxy, &format!("http://{upstream}/data.json"))).await;
        assert_eq!(reply.status, 415);
        assert!(error_message(&reply).starts_with("Unsupported content type: application/json"));
    }

    #[tokio::test]
    async fn slow_targets_time_out() {
        let upstream = upstream().await;
        let proxy = proxy_with(ServerConfig {
            timeout: Duration::from_millis(300),
            ..ServerConfig::default()
        })
        .await;
        let reply = get_reply(proxy_url(proxy, &format!("http://{upstream}/slow"))).await;
        assert_eq!(reply.status, 504);
        assert_eq!(
            error_message(&reply),
            "Request timed out. The target site is too slow."
        );
    }

    #[tokio::test]
    async fn unreachable_targets_are_bad_gateway() {
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("local addr")
        };
        let proxy = proxy_with(ServerConfig::default()).await;
        let reply = get_reply(proxy_url(proxy, &format!("http://{closed}/"))).await;
        assert_eq!(reply.status, 502);
        assert_eq!(
            error_message(&reply),
            "Bad Gateway: No response from target site."
        );
    }

    #[tokio::test]
    async fn oversized_pages_are_rejected() {
        let upstream = upstream().await;
        let proxy = proxy_with(ServerConfig {
            max_body_bytes: 1024,
            ..ServerConfig::default()
        })
        .await;
        let reply = get_reply(proxy_url(proxy, &format!("http://{upstream}/huge"))).await;
        assert_eq!(reply.status, 502);
        assert!(error_message(&reply).contains("1024 byte limit"));
    }

    #[tokio::test]
    async fn invalid_urls_are_bad_requests() {
        let proxy = proxy_with(ServerConfig::default()).await;
        let reply = get_reply(proxy_url(proxy, "ftp://files.test/readme")).await;
        assert_eq!(reply.status, 400);
        assert!(error_message(&reply).starts_with("Invalid URL"));
    }

    #[tokio::test]
    async fn agent_script_is_served_from_assets() {
        let assets = scratch_dir();
        let proxy = proxy_with(ServerConfig {
            assets_dir: assets.clone(),
            ..ServerConfig::default()
        })
        .await;

        let reply = get_reply(format!("http://{proxy}/js/inspect-script.js")).await;
        assert_eq!(reply.status, 404);
        assert_eq!(error_message(&reply), "Script not found");

        std::fs::create_dir_all(assets.join("js")).expect("create js dir");
        std::fs::write(assets.join("js/inspect-script.js"), "console.log('agent');")
            .expect("write script");
        let reply = get_reply(format!("http://{proxy}/js/inspect-script.js")).await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.content_type.as_deref(),
            Some("application/javascript; charset=utf-8")
        );
        assert_eq!(reply.body, "console.log('agent');");

        std::fs::remove_dir_all(&assets).expect("cleanup");
    }

    #[tokio::test]
    async fn agent_bundle_is_served_beside_the_loader() {
        let assets = scratch_dir();
        std::fs::create_dir_all(assets.join("js")).expect("create js dir");
        std::fs::write(assets.join("js/skopeo_agent_wasm.js"), "var wasm_bindgen;")
            .expect("write glue");
        let proxy = proxy_with(ServerConfig {
            assets_dir: assets.clone(),
            ..ServerConfig::default()
        })
        .await;

        let reply = get_reply(format!("http://{proxy}/js/skopeo_agent_wasm.js")).await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.content_type.as_deref(),
            Some("application/javascript; charset=utf-8")
        );
        assert_eq!(reply.body, "var wasm_bindgen;");

        let reply = get_reply(format!("http://{proxy}/js/skopeo_agent_wasm_bg.wasm")).await;
        assert_eq!(reply.status, 404);
        assert_eq!(error_message(&reply), "Script not found");

        std::fs::write(assets.join("js/skopeo_agent_wasm_bg.wasm"), b"\0asm\x01\0\0\0")
            .expect("write module");
        let reply = get_reply(format!("http://{proxy}/js/skopeo_agent_wasm_bg.wasm")).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type.as_deref(), Some("application/wasm"));

        let reply = get_reply(format!("http://{proxy}/js/other.js")).await;
        assert_eq!(reply.status, 404);

        std::fs::remove_dir_all(&assets).expect("cleanup");
    }

    #[test]
    fn shipped_loader_starts_the_bundle() {
        let loader = std::fs::read_to_string(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../public/js/inspect-script.js"),
        )
        .expect("loader script is checked in");
        for file in crate::config::AGENT_BUNDLE_FILES {
            assert!(loader.contains(file), "{file}");
        }
        assert!(loader.contains("wasm_bindgen("));
    }

    #[tokio::test]
    async fn responses_allow_cross_origin_reads() {
        let proxy = proxy_with(ServerConfig::default()).await;
        let url = format!("http://{proxy}/health");
        let allow_origin = tokio::task::spawn_blocking(move || {
            ureq::get(&url)
                .set("Origin", "http://viewer.test")
                .call()
                .expect("health")
                .header("access-control-allow-origin")
                .map(str::to_string)
        })
        .await
        .expect("join");
        assert_eq!(allow_origin.as_deref(), Some("*"));
    }
}
