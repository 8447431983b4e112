use std::path::Path;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::config::AgentAsset;
use crate::util::http::{JAVASCRIPT_CONTENT_TYPE, WASM_CONTENT_TYPE, json_error};

/// Serves one agent file (loader script or compiled bundle) from the asset
/// directory.
pub async fn api_agent_asset(asset: AgentAsset) -> Response {
    match tokio::fs::read(&asset.path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type_of(&asset.path))],
            bytes,
        )
            .into_response(),
        Err(error) => {
            warn!(url = %asset.url, path = %asset.path.display(), %error, "agent asset unavailable");
            json_error(StatusCode::NOT_FOUND, "Script not found")
        }
    }
}

fn content_type_of(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("wasm") => WASM_CONTENT_TYPE,
        _ => JAVASCRIPT_CONTENT_TYPE,
    }
}
