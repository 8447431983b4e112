use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use facet::Facet;
use skopeo_types::ApiError;

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript; charset=utf-8";
pub const WASM_CONTENT_TYPE: &str = "application/wasm";

pub fn html_with_status(status: StatusCode, body: String) -> axum::response::Response {
    (status, [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], body).into_response()
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    json_with_status(
        status,
        &ApiError {
            error: message.into(),
        },
    )
}

pub fn json_with_status<T>(status: StatusCode, value: &T) -> axum::response::Response
where
    T: for<'facet> Facet<'facet>,
{
    match facet_json::to_string(value) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("json encode error: {error}"),
        )
            .into_response(),
    }
}

/// Reads a single query parameter from a raw query string, percent-decoded.
pub fn query_param(raw_query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(raw_query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Origin the client used to reach this server, from `Host` and an optional
/// `X-Forwarded-Proto`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(header::HOST)?.to_str().ok()?.trim();
    if host.is_empty() || host.contains(|c: char| c == '/' || c.is_whitespace()) {
        return None;
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|scheme| matches!(*scheme, "http" | "https"))
        .unwrap_or("http");
    Some(format!("{scheme}://{host}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn request_origin_uses_host_and_forwarded_proto() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_origin(&headers), None);

        headers.insert(header::HOST, HeaderValue::from_static("inspect.test:3000"));
        assert_eq!(request_origin(&headers).as_deref(), Some("http://inspect.test:3000"));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(request_origin(&headers).as_deref(), Some("https://inspect.test:3000"));

        headers.insert("x-forwarded-proto", HeaderValue::from_static("gopher"));
        assert_eq!(request_origin(&headers).as_deref(), Some("http://inspect.test:3000"));

        headers.insert(header::HOST, HeaderValue::from_static("evil.test/x"));
        assert_eq!(request_origin(&headers), None);
    }

    #[test]
    fn query_param_decodes_values() {
        let raw = "url=https%3A%2F%2Fexample.com%2Fa%3Fb%3D1&x=2";
        assert_eq!(
            query_param(Some(raw), "url").as_deref(),
            Some("https://example.com/a?b=1")
        );
        assert_eq!(query_param(Some(raw), "y"), None);
        assert_eq!(query_param(None, "url"), None);
        assert_eq!(query_param(Some("url="), "url").as_deref(), Some(""));
    }
}
