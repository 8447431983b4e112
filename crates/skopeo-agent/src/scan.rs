//! Bulk scanners: media assets and storage.

use std::collections::HashSet;

use skopeo_types::{MediaAsset, MediaKind, StorageEntry, StorageSnapshot};
use tracing::warn;

use crate::platform::{Document, StorageSource};

/// Collects media referenced by the document, first occurrence wins.
///
/// Order: images, videos (own `src` then `<source>` children), audio (same),
/// then computed background images of every element.
pub fn scan_media<D: Document>(doc: &D) -> Vec<MediaAsset> {
    let mut assets = Vec::new();

    for img in doc.elements_by_tag("img") {
        if let Some(url) = doc.resource_url(&img) {
            assets.push(MediaAsset {
                url,
                kind: MediaKind::Image,
                dimensions: doc.natural_size(&img),
            });
        }
    }

    for (tag, kind) in [("video", MediaKind::Video), ("audio", MediaKind::Audio)] {
        for element in doc.elements_by_tag(tag) {
            let sources = doc
                .children(&element)
                .into_iter()
                .filter(|child| doc.tag_name(child) == "source");
            for node in std::iter::once(element.clone()).chain(sources) {
                if let Some(url) = doc.resource_url(&node) {
                    assets.push(MediaAsset {
                        url,
                        kind,
                        dimensions: None,
                    });
                }
            }
        }
    }

    for element in doc.elements() {
        let Some(background) = doc.background_image(&element) else {
            continue;
        };
        for url in background_urls(&background) {
            assets.push(MediaAsset {
                url,
                kind: MediaKind::Image,
                dimensions: None,
            });
        }
    }

    dedup_first(assets)
}

/// Keeps the first asset for each (kind, url) pair, whatever its dimensions.
fn dedup_first(assets: Vec<MediaAsset>) -> Vec<MediaAsset> {
    let mut seen = HashSet::new();
    assets
        .into_iter()
        .filter(|asset| seen.insert((asset.kind, asset.url.clone())))
        .collect()
}

/// Extracts the URLs of every `url(...)` in a computed `background-image`
/// value. `none`, gradients and empty URLs yield nothing.
pub fn background_urls(value: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find("url(") {
        let after = &rest[start + 4..];
        let Some(end) = after.find(')') else {
            break;
        };
        let inner = after[..end].trim();
        let unquoted = inner
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
            .unwrap_or(inner);
        if !unquoted.is_empty() {
            urls.push(unquoted.to_string());
        }
        rest = &after[end + 1..];
    }
    urls
}

/// Parses `document.cookie`: `;`-separated, trimmed, split on the first
/// `=`. Entries with an empty key are dropped.
pub fn parse_cookies(cookie: &str) -> Vec<StorageEntry> {
    cookie
        .split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (!key.is_empty()).then(|| StorageEntry::new(key, value))
        })
        .collect()
}

/// Snapshots cookies and local entries. Denied local access is logged and
/// reported as an empty list.
pub fn scan_storage<S: StorageSource>(storage: &S) -> StorageSnapshot {
    let cookies = parse_cookies(&storage.cookie_string());
    let local_storage = match storage.local_entries() {
        Ok(entries) => entries
            .into_iter()
            .map(|(key, value)| StorageEntry::new(key, value))
            .collect(),
        Err(error) => {
            warn!(%error, "local storage unavailable");
            Vec::new()
        }
    };
    StorageSnapshot {
        cookies,
        local_storage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;
    use crate::platform::MemoryStorage;
    use skopeo_types::Dimensions;

    #[test]
    fn media_scan_collects_each_kind_once() {
        let mut doc = MemoryDocument::new().with_base_url("https://shop.test/p/");
        let body = doc.body();
        let hero = doc.append_element(body, "img", &[("src", "hero.jpg")]);
        doc.set_natural_size(hero, 1200, 600);
        let dup = doc.append_element(body, "img", &[("src", "hero.jpg")]);
        doc.set_natural_size(dup, 1200, 600);
        doc.append_element(body, "img", &[]);
        let video = doc.append_element(body, "video", &[("src", "/v/intro.mp4")]);
        doc.append_element(video, "source", &[("src", "/v/intro.webm")]);
        let audio = doc.append_element(body, "audio", &[]);
        doc.append_element(audio, "source", &[("src", "/a/theme.ogg")]);
        let banner = doc.append_element(body, "div", &[]);
        doc.set_background_image(banner, r#"url("https://cdn.test/bg.png"), linear-gradient(red, blue)"#);
        let other = doc.append_element(body, "div", &[]);
        doc.set_background_image(other, "none");

        let assets = scan_media(&doc);
        let summary: Vec<(MediaKind, &str)> =
            assets.iter().map(|a| (a.kind, a.url.as_str())).collect();
        assert_eq!(
            summary,
            [
                (MediaKind::Image, "https://shop.test/p/hero.jpg"),
                (MediaKind::Video, "https://shop.test/v/intro.mp4"),
                (MediaKind::Video, "https://shop.test/v/intro.webm"),
                (MediaKind::Audio, "https://shop.test/a/theme.ogg"),
                (MediaKind::Image, "https://cdn.test/bg.png"),
            ]
        );
        assert_eq!(
            assets[0].dimensions,
            Some(Dimensions {
                width: 1200,
                height: 600
            })
        );
    }

    #[test]
    fn media_scan_never_repeats_kind_and_url() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        for _ in 0..3 {
            let img = doc.append_element(body, "img", &[("src", "https://a.test/x.png")]);
            doc.set_background_image(img, "url(https://a.test/x.png)");
        }
        let assets = scan_media(&doc);
        let keys: HashSet<(MediaKind, &str)> =
            assets.iter().map(|a| (a.kind, a.url.as_str())).collect();
        assert_eq!(keys.len(), assets.len());
    }

    #[test]
    fn sized_image_and_matching_background_report_once() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let img = doc.append_element(body, "img", &[("src", "https://a.test/hero.png")]);
        doc.set_natural_size(img, 640, 480);
        let banner = doc.append_element(body, "section", &[]);
        doc.set_background_image(banner, "url(https://a.test/hero.png)");

        let assets = scan_media(&doc);
        assert_eq!(assets.len(), 1, "{assets:?}");
        assert_eq!(assets[0].url, "https://a.test/hero.png");
        assert_eq!(
            assets[0].dimensions,
            Some(Dimensions {
                width: 640,
                height: 480
            })
        );
    }

    #[test]
    fn background_urls_handle_quoting() {
        assert_eq!(background_urls("none"), Vec::<String>::new());
        assert_eq!(background_urls("url(a.png)"), ["a.png"]);
        assert_eq!(background_urls("url('b.png')"), ["b.png"]);
        assert_eq!(
            background_urls(r#"url("c.png"), url(d.png)"#),
            ["c.png", "d.png"]
        );
        assert_eq!(background_urls(r#"url("")"#), Vec::<String>::new());
    }

    #[test]
    fn cookies_split_on_first_equals() {
        let entries = parse_cookies(" session=abc=def ; theme=dark;;flag; =orphan");
        assert_eq!(
            entries,
            [
                StorageEntry::new("session", "abc=def"),
                StorageEntry::new("theme", "dark"),
                StorageEntry::new("flag", ""),
            ]
        );
        assert!(parse_cookies("").is_empty());
    }

    #[test]
    fn storage_scan_is_stable_and_tolerates_denial() {
        let storage = MemoryStorage {
            cookies: "a=1; b=2".into(),
            local: vec![("cart".into(), "[1,2]".into())],
            denied: false,
        };
        let first = scan_storage(&storage);
        assert_eq!(first, scan_storage(&storage));
        assert_eq!(first.local_storage, [StorageEntry::new("cart", "[1,2]")]);

        let denied = MemoryStorage {
            denied: true,
            ..storage
        };
        let snapshot = scan_storage(&denied);
        assert_eq!(snapshot.cookies.len(), 2);
        assert!(snapshot.local_storage.is_empty());
    }
}
