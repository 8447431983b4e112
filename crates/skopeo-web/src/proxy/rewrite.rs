//! Markup rewriting: base URL, safety shim, agent script.

/// Installed right after the base tag. Keeps page navigation APIs from
/// escaping the viewing surface and silences uncaught errors.
pub const SAFETY_SHIM: &str = concat!(
    "<script>(function(){",
    "try{history.pushState=function(){};history.replaceState=function(){};}catch(e){}",
    "window.onerror=function(){return true;};",
    "window.addEventListener('unhandledrejection',function(e){e.preventDefault();});",
    "})();</script>"
);

/// Rewrites a fetched page so relative URLs resolve against `page_url` and
/// the agent at `script_url` loads last.
///
/// The base tag and shim go immediately after the first `<head>` opening tag,
/// or at the very start when there is none. The agent script goes before the
/// last `</body>`, or at the very end.
pub fn rewrite_document(html: &str, page_url: &str, script_url: &str) -> String {
    // ASCII lowercasing keeps byte offsets, so positions found here index `html`.
    let lower = html.to_ascii_lowercase();

    let preamble = format!("<base href=\"{}\">{SAFETY_SHIM}", escape_attr(page_url));
    let agent = format!("<script src=\"{}\"></script>", escape_attr(script_url));

    let head_end = find_head_open_end(&lower).unwrap_or(0);
    let body_close = lower
        .rfind("</body>")
        .filter(|&pos| pos >= head_end)
        .unwrap_or(html.len());

    let mut out = String::with_capacity(html.len() + preamble.len() + agent.len());
    out.push_str(&html[..head_end]);
    out.push_str(&preamble);
    out.push_str(&html[head_end..body_close]);
    out.push_str(&agent);
    out.push_str(&html[body_close..]);
    out
}

/// Byte offset just past the `>` of the first `<head>` or `<head ...>` tag.
fn find_head_open_end(lower: &str) -> Option<usize> {
    let bytes = lower.as_bytes();
    for (start, _) in lower.match_indices("<head") {
        let after = start + "<head".len();
        match bytes.get(after) {
            Some(b'>') => return Some(after + 1),
            Some(b) if b.is_ascii_whitespace() || *b == b'/' => {
                return lower[after..].find('>').map(|offset| after + offset + 1);
            }
            _ => continue,
        }
    }
    None
}

pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}
