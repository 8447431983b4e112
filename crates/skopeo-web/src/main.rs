use facet::Facet;
use figue as args;
use skopeo_web::app::{AppState, build_router};
use skopeo_web::config::{self, ConfigOverrides};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Facet, Debug)]
struct ServerCli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Address to bind, e.g. 127.0.0.1:3000.
    #[facet(args::named, default)]
    listen: Option<String>,
    /// Directory holding the agent loader and bundle.
    #[facet(args::named, default)]
    assets: Option<String>,
    /// Upstream fetch timeout in milliseconds.
    #[facet(args::named, default)]
    timeout_ms: Option<u64>,
    /// Path the agent script is served at and injected as.
    #[facet(args::named, default)]
    script_url: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_server().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run_server() -> Result<(), String> {
    let cli = parse_server_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::from_env(ConfigOverrides {
        listen: cli.listen,
        assets: cli.assets,
        timeout_ms: cli.timeout_ms,
        script_url: cli.script_url,
    })?;

    let http_addr = config.listen.clone();
    let listener = TcpListener::bind(&http_addr)
        .await
        .map_err(|e| format!("failed to bind HTTP on {http_addr}: {e}"))?;
    info!(
        %http_addr,
        assets = %config.assets_dir.display(),
        script_url = %config.script_url,
        timeout_ms = config.timeout.as_millis() as u64,
        "skopeo proxy ready"
    );
    for asset in config.agent_assets() {
        if !asset.path.is_file() {
            warn!(
                path = %asset.path.display(),
                "agent file not found; proxied pages will load without the agent"
            );
        }
    }

    let app = build_router(AppState::new(config));
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("HTTP server error: {e}"))
}

fn parse_server_cli() -> Result<ServerCli, String> {
    let figue_config = args::builder::<ServerCli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("skopeo")
                .description("Rewriting page proxy for remote inspection")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;
    Ok(cli.value)
}
