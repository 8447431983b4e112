//! Server configuration: CLI overrides layered over environment variables
//! layered over defaults.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
pub const DEFAULT_ASSETS_DIR: &str = "public";
pub const DEFAULT_SCRIPT_URL: &str = "/js/inspect-script.js";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
/// Files of the compiled agent, served from the loader script's directory.
pub const AGENT_BUNDLE_FILES: [&str; 2] = ["skopeo_agent_wasm.js", "skopeo_agent_wasm_bg.wasm"];
pub const DESKTOP_CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: String,
    /// Directory the agent script is served from.
    pub assets_dir: PathBuf,
    /// Public path of the agent script; also the `src` injected into pages.
    pub script_url: String,
    pub timeout: Duration,
    pub max_body_bytes: u64,
    pub user_agent: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.into(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            script_url: DEFAULT_SCRIPT_URL.into(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            user_agent: DESKTOP_CHROME_USER_AGENT.into(),
        }
    }
}

/// One agent file: where it is served and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentAsset {
    pub url: String,
    pub path: PathBuf,
}

impl ServerConfig {
    /// Location of the agent script on disk.
    pub fn script_path(&self) -> PathBuf {
        self.assets_dir.join(self.script_url.trim_start_matches('/'))
    }

    /// The loader script followed by the bundle files next to it.
    pub fn agent_assets(&self) -> Vec<AgentAsset> {
        let dir = &self.script_url[..self.script_url.rfind('/').map_or(0, |slash| slash + 1)];
        let mut assets = vec![AgentAsset {
            url: self.script_url.clone(),
            path: self.script_path(),
        }];
        for file in AGENT_BUNDLE_FILES {
            let url = format!("{dir}{file}");
            if url != self.script_url {
                assets.push(AgentAsset {
                    path: self.assets_dir.join(url.trim_start_matches('/')),
                    url,
                });
            }
        }
        assets
    }
}

/// Values given on the command line. `None` falls through to the
/// environment, then the default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub assets: Option<String>,
    pub timeout_ms: Option<u64>,
    pub script_url: Option<String>,
}

/// Assembles a [`ServerConfig`].
///
/// Listen address: `--listen`, then `SKOPEO_HTTP`, then `PORT` (bound on all
/// interfaces), then [`DEFAULT_LISTEN`].
pub fn resolve(
    overrides: ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, String> {
    let mut config = ServerConfig::default();

    if let Some(listen) = overrides.listen.or_else(|| env("SKOPEO_HTTP")) {
        config.listen = listen;
    } else if let Some(port) = env("PORT") {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|e| format!("invalid PORT '{port}': {e}"))?;
        config.listen = format!("0.0.0.0:{port}");
    }

    if let Some(assets) = overrides.assets.or_else(|| env("SKOPEO_ASSETS")) {
        config.assets_dir = PathBuf::from(assets);
    }

    let timeout_ms = match overrides.timeout_ms {
        Some(ms) => Some(ms),
        None => env("SKOPEO_TIMEOUT_MS")
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| format!("invalid SKOPEO_TIMEOUT_MS '{raw}': {e}"))
            })
            .transpose()?,
    };
    if let Some(ms) = timeout_ms {
        if ms == 0 {
            return Err("timeout must be greater than zero".into());
        }
        config.timeout = Duration::from_millis(ms);
    }

    if let Some(script_url) = overrides.script_url {
        if !script_url.starts_with('/') || script_url.contains("..") {
            return Err(format!(
                "script url '{script_url}' must be an absolute path without '..'"
            ));
        }
        config.script_url = script_url;
    }

    Ok(config)
}

/// [`resolve`] against the process environment.
pub fn from_env(overrides: ConfigOverrides) -> Result<ServerConfig, String> {
    resolve(overrides, |key| std::env::var(key).ok())
}
