//! Conversions from raw page values to agent types.

use skopeo_agent::{HttpResponse, RequestBody, TransportError};
use skopeo_types::{ConsoleLevel, Headers};

/// Console methods that are mirrored to the host.
pub const CONSOLE_METHODS: [(&str, ConsoleLevel); 4] = [
    ("log", ConsoleLevel::Log),
    ("info", ConsoleLevel::Info),
    ("warn", ConsoleLevel::Warn),
    ("error", ConsoleLevel::Error),
];

/// Period of the agent timer (transient highlights, deferred media scan).
pub const TICK_INTERVAL_MS: u32 = 250;

/// Reported for an XHR that ended without a response (network error, abort,
/// timeout).
pub const XHR_FAILURE: &str = "XHR Error";

/// Property names stashed on intercepted `XMLHttpRequest` objects between
/// `open`, `setRequestHeader` and `send`.
pub const XHR_METHOD_KEY: &str = "__skopeoMethod";
pub const XHR_URL_KEY: &str = "__skopeoUrl";
pub const XHR_HEADERS_KEY: &str = "__skopeoHeaders";

/// Upper-cased request method, `GET` when absent or blank.
pub fn normalize_method(method: Option<String>) -> String {
    match method.map(|m| m.trim().to_ascii_uppercase()) {
        Some(method) if !method.is_empty() => method,
        _ => "GET".to_string(),
    }
}

/// Parses `XMLHttpRequest.getAllResponseHeaders()`: one `name: value` per
/// line, CRLF separated.
pub fn parse_header_block(raw: &str) -> Headers {
    raw.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Body of a `URLSearchParams` payload, given its serialized form.
pub fn url_encoded_body(serialized: &str) -> RequestBody {
    RequestBody::UrlEncoded(
        url::form_urlencoded::parse(serialized.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect(),
    )
}

/// Body of any other object payload, given its `JSON.stringify` output, if
/// it had one.
pub fn json_body(serialized: Option<&str>) -> RequestBody {
    serialized
        .and_then(|json| serde_json::from_str(json).ok())
        .map_or(RequestBody::Opaque, RequestBody::Json)
}

/// Builds the reported response of a finished XHR. Status 0 means the
/// request never got a response.
pub fn xhr_response(
    status: u16,
    raw_headers: &str,
    text: Option<String>,
) -> Result<HttpResponse, TransportError> {
    if status == 0 {
        return Err(TransportError::new(XHR_FAILURE));
    }
    let mut response = HttpResponse::new(status);
    response.headers = parse_header_block(raw_headers);
    if let Some(text) = text {
        response = response.with_body(text);
    }
    Ok(response)
}
