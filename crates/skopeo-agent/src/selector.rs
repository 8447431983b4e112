//! Selector and path generation for selected elements.

use crate::agent::AGENT_CLASSES;
use crate::platform::Document;

/// The element's class attribute without the agent's own marker classes.
pub fn page_class_name<D: Document>(doc: &D, node: &D::Node) -> String {
    doc.class_name(node)
        .split_ascii_whitespace()
        .filter(|token| !AGENT_CLASSES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compact selector: `#id`, else `.class.tokens`, else
/// `tag:nth-child(n)` among the parent's element children, else `tag`.
///
/// Not guaranteed unique; [`full_selector`] is the one that round-trips.
pub fn short_selector<D: Document>(doc: &D, node: &D::Node) -> String {
    let id = doc.id(node);
    if !id.is_empty() {
        return format!("#{}", escape_ident(&id));
    }
    let class_name = page_class_name(doc, node);
    let classes: Vec<String> = class_name
        .split_ascii_whitespace()
        .map(escape_ident)
        .collect();
    if !classes.is_empty() {
        return format!(".{}", classes.join("."));
    }
    let tag = doc.tag_name(node);
    match doc.parent_element(node) {
        Some(parent) => {
            let index = doc
                .children(&parent)
                .iter()
                .position(|child| child == node)
                .map_or(1, |index| index + 1);
            format!("{tag}:nth-child({index})")
        }
        None => tag,
    }
}

/// Ancestor-chain selector joined with ` > `.
///
/// Walks towards the root; an element with an id contributes `tag#id` and
/// ends the walk. Other elements contribute their tag plus
/// `:nth-of-type(n)` when they are not the first of their tag among their
/// siblings.
pub fn full_selector<D: Document>(doc: &D, node: &D::Node) -> String {
    let mut segments = Vec::new();
    let mut cursor = Some(node.clone());
    while let Some(current) = cursor {
        let tag = doc.tag_name(&current);
        let id = doc.id(&current);
        if !id.is_empty() {
            segments.push(format!("{tag}#{}", escape_ident(&id)));
            break;
        }
        let nth = same_tag_position(doc, &current, &tag);
        if nth == 1 {
            segments.push(tag);
        } else {
            segments.push(format!("{tag}:nth-of-type({nth})"));
        }
        cursor = doc.parent_element(&current);
    }
    segments.reverse();
    segments.join(" > ")
}

/// Absolute location path such as `/html/body/div[2]/p`. The index is only
/// written when the element has same-tag siblings.
pub fn absolute_xpath<D: Document>(doc: &D, node: &D::Node) -> String {
    let mut segments = Vec::new();
    let mut cursor = Some(node.clone());
    while let Some(current) = cursor {
        let tag = doc.tag_name(&current);
        let parent = doc.parent_element(&current);
        let same_tag = match &parent {
            Some(parent) => doc
                .children(parent)
                .iter()
                .filter(|sibling| doc.tag_name(sibling) == tag)
                .count(),
            None => 1,
        };
        if same_tag > 1 {
            let nth = same_tag_position(doc, &current, &tag);
            segments.push(format!("{tag}[{nth}]"));
        } else {
            segments.push(tag);
        }
        cursor = parent;
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

/// 1-based position of `node` among preceding siblings sharing its tag.
fn same_tag_position<D: Document>(doc: &D, node: &D::Node, tag: &str) -> usize {
    let Some(parent) = doc.parent_element(node) else {
        return 1;
    };
    let mut nth = 1;
    for sibling in doc.children(&parent) {
        if &sibling == node {
            break;
        }
        if doc.tag_name(&sibling) == tag {
            nth += 1;
        }
    }
    nth
}

/// Escapes a string for use as a CSS identifier (`CSS.escape`).
pub fn escape_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (index, ch) in value.chars().enumerate() {
        let leading_digit = ch.is_ascii_digit()
            && (index == 0 || (index == 1 && value.starts_with('-')));
        if leading_digit || ch.is_control() {
            out.push_str(&format!("\\{:x} ", ch as u32));
        } else if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            out.push(ch);
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    if out == "-" {
        return "\\-".to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, NodeId};

    fn siblings() -> (MemoryDocument, Vec<NodeId>) {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let list = doc.append_element(body, "div", &[]);
        doc.append_element(list, "span", &[]);
        let items = (0..3)
            .map(|_| doc.append_element(list, "p", &[]))
            .collect();
        (doc, items)
    }

    #[test]
    fn id_short_circuits_both_selectors() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let wrapper = doc.append_element(body, "section", &[("class", "outer")]);
        let target = doc.append_element(wrapper, "button", &[("id", "buy"), ("class", "cta")]);
        assert_eq!(short_selector(&doc, &target), "#buy");
        assert_eq!(full_selector(&doc, &target), "button#buy");

        let child = doc.append_element(target, "i", &[]);
        assert_eq!(full_selector(&doc, &child), "button#buy > i");
    }

    #[test]
    fn short_selector_falls_back_to_classes_then_position() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        doc.append_element(body, "div", &[]);
        let classy = doc.append_element(body, "div", &[("class", "  card  wide ")]);
        let plain = doc.append_element(body, "div", &[]);
        assert_eq!(short_selector(&doc, &classy), ".card.wide");
        assert_eq!(short_selector(&doc, &plain), "div:nth-child(3)");
        assert_eq!(short_selector(&doc, &doc.html()), "html");
    }

    #[test]
    fn same_tag_siblings_differ_only_in_nth_of_type() {
        let (doc, items) = siblings();
        let selectors: Vec<String> = items.iter().map(|p| full_selector(&doc, p)).collect();
        assert_eq!(
            selectors,
            [
                "html > body > div > p",
                "html > body > div > p:nth-of-type(2)",
                "html > body > div > p:nth-of-type(3)",
            ]
        );
        for (selector, item) in selectors.iter().zip(&items) {
            assert_eq!(doc.select_first(selector).expect("valid"), Some(*item));
        }
        assert_eq!(
            doc.select_first("html > body > div > p:nth-of-type(1)").expect("valid"),
            Some(items[0])
        );
    }

    #[test]
    fn selectors_with_awkward_ids_round_trip() {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let odd = doc.append_element(body, "div", &[("id", "2col:main.x")]);
        let selector = full_selector(&doc, &odd);
        assert_eq!(doc.select_first(&selector).expect("escaped selector parses"), Some(odd));
        let short = short_selector(&doc, &odd);
        assert_eq!(doc.select_first(&short).expect("escaped selector parses"), Some(odd));
    }

    #[test]
    fn absolute_xpath_indexes_only_ambiguous_steps() {
        let (doc, items) = siblings();
        assert_eq!(absolute_xpath(&doc, &items[1]), "/html/body/div/p[2]");
        assert_eq!(absolute_xpath(&doc, &doc.body()), "/html/body");
        for item in &items {
            let xpath = absolute_xpath(&doc, item);
            assert_eq!(doc.evaluate_xpath(&xpath).expect("valid"), Some(*item));
        }
    }

    #[test]
    fn escape_ident_matches_css_escape() {
        assert_eq!(escape_ident("plain-id_1"), "plain-id_1");
        assert_eq!(escape_ident("1st"), "\\31 st");
        assert_eq!(escape_ident("-2x"), "-\\32 x");
        assert_eq!(escape_ident("a:b"), "a\\:b");
        assert_eq!(escape_ident("-"), "\\-");
    }
}
