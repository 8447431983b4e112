use skopeo_types::{DomTreeNode, MAX_TREE_DEPTH};

use crate::platform::Document;
use crate::selector::page_class_name;

/// Captures the element subtree under `root`. Nodes deeper than
/// [`MAX_TREE_DEPTH`] levels below the root are omitted.
pub fn build_tree<D: Document>(doc: &D, root: &D::Node) -> DomTreeNode {
    capture(doc, root, Vec::new())
}

fn capture<D: Document>(doc: &D, node: &D::Node, path: Vec<usize>) -> DomTreeNode {
    let children = if path.len() < MAX_TREE_DEPTH {
        doc.children(node)
            .iter()
            .enumerate()
            .map(|(index, child)| {
                let mut child_path = path.clone();
                child_path.push(index);
                capture(doc, child, child_path)
            })
            .collect()
    } else {
        Vec::new()
    };
    DomTreeNode {
        tag_name: doc.tag_name(node),
        id: doc.id(node),
        class_name: page_class_name(doc, node),
        path,
        children,
    }
}

/// Re-walks `children[index]` from `root`. Any out-of-range index yields `None`.
pub fn resolve_path<D: Document>(doc: &D, root: &D::Node, path: &[usize]) -> Option<D::Node> {
    path.iter().try_fold(root.clone(), |node, &index| {
        doc.children(&node).into_iter().nth(index)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDocument, NodeId};

    /// A chain of nested divs `depth` levels below `body`.
    fn chain(depth: usize) -> (MemoryDocument, Vec<NodeId>) {
        let mut doc = MemoryDocument::new();
        let mut nodes = vec![doc.body()];
        for level in 0..depth {
            let parent = nodes[nodes.len() - 1];
            doc.append_element(parent, "span", &[]);
            let next = doc.append_element(parent, "div", &[("id", &format!("d{level}"))]);
            nodes.push(next);
        }
        (doc, nodes)
    }

    #[test]
    fn capture_stops_below_the_depth_bound() {
        let (doc, _) = chain(14);
        let tree = build_tree(&doc, &doc.body());
        assert_eq!(tree.depth(), MAX_TREE_DEPTH);
        assert_eq!(tree.path, Vec::<usize>::new());

        let deepest_path = vec![1; MAX_TREE_DEPTH];
        let deepest = tree.descendant(&deepest_path).expect("level 10 is captured");
        assert_eq!(deepest.id, "d9");
        assert!(deepest.children.is_empty());
    }

    #[test]
    fn paths_resolve_back_to_their_nodes() {
        let (doc, nodes) = chain(MAX_TREE_DEPTH);
        let root = nodes[0];
        for (level, node) in nodes.iter().enumerate() {
            let path = vec![1; level];
            assert_eq!(resolve_path(&doc, &root, &path), Some(*node), "level {level}");
            let snapshot = build_tree(&doc, &root);
            let captured = snapshot.descendant(&path).expect("captured");
            assert_eq!(captured.path, path);
        }
    }

    #[test]
    fn out_of_range_segments_resolve_to_none() {
        let (doc, nodes) = chain(2);
        assert_eq!(resolve_path(&doc, &nodes[0], &[2]), None);
        assert_eq!(resolve_path(&doc, &nodes[0], &[1, 1, 0]), None);
        assert_eq!(resolve_path(&doc, &nodes[0], &[0, 0]), None);
    }
}
