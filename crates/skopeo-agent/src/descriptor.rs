use skopeo_types::{ChildSummary, ElementDescriptor, MAX_INNER_HTML_CHARS, truncate_chars};

use crate::platform::Document;
use crate::selector::{absolute_xpath, full_selector, page_class_name};
use crate::tree::build_tree;

/// Builds the message-safe snapshot sent with `element-selected`.
pub fn describe<D: Document>(doc: &D, node: &D::Node) -> ElementDescriptor {
    let children = doc
        .children(node)
        .iter()
        .map(|child| ChildSummary {
            tag_name: doc.tag_name(child),
            id: doc.id(child),
            class_name: page_class_name(doc, child),
        })
        .collect();

    ElementDescriptor {
        tag_name: doc.tag_name(node),
        id: doc.id(node),
        class_name: page_class_name(doc, node),
        inner_text: doc.inner_text(node),
        inner_html: truncate_chars(&doc.inner_html(node), MAX_INNER_HTML_CHARS),
        attributes: doc
            .attributes(node)
            .into_iter()
            .map(|(name, value)| match name.as_str() {
                "class" => (name, page_class_name(doc, node)),
                _ => (name, value),
            })
            .collect(),
        selector: full_selector(doc, node),
        xpath: Some(absolute_xpath(doc, node)),
        rect: doc.bounding_rect(node),
        has_parent: doc.parent_element(node).is_some(),
        children,
        tree: Some(build_tree(doc, node)),
    }
}
