use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::app::AppState;
use crate::proxy::{ProxyError, rewrite_document};
use crate::util::http::{html_with_status, query_param, request_origin};

/// `GET /proxy?url=…`: fetches the target page and returns it rewritten,
/// mirroring the upstream status.
///
/// The agent script is referenced by absolute URL on this server's origin.
pub async fn api_proxy(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let Some(url) = query_param(query.as_deref(), "url").filter(|url| !url.trim().is_empty())
    else {
        return ProxyError::MissingUrl.into_response();
    };

    let page = match state.fetcher.fetch(&url).await {
        Ok(page) => page,
        Err(error) => {
            warn!(%url, %error, "proxy request failed");
            return error.into_response();
        }
    };

    info!(url = %page.url, status = page.status, bytes = page.body.len(), "proxied page");
    let script_src = match request_origin(&headers) {
        Some(origin) => format!("{origin}{}", state.config.script_url),
        None => state.config.script_url.clone(),
    };
    let body = rewrite_document(&page.body, &page.url, &script_src);
    let status = StatusCode::from_u16(page.status).unwrap_or(StatusCode::OK);
    html_with_status(status, body)
}
