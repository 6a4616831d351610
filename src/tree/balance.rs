//! Balancing
//!
//! Pads an arbitrary tree into a complete binary tree whose leaves all sit at
//! the same depth. A leaf found above the target depth is replaced by a split
//! whose two children are copies of that leaf, so whichever way the padding
//! split routes, the outcome is unchanged.
use crate::errors::ScorerError;
use crate::node::Node;

/// A complete binary tree of uniform depth.
///
/// Holds `2^(depth+1) - 1` nodes, `2^depth` of them leaves.
#[derive(Clone, Debug, PartialEq)]
pub struct BalancedTree {
    root: Node,
    depth: usize,
}

impl BalancedTree {
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Node count of a complete tree of this depth.
    pub fn count(&self) -> usize {
        complete_count(self.depth)
    }

    pub fn into_root(self) -> Node {
        self.root
    }
}

/// Number of nodes in a complete binary tree of `depth`.
pub fn complete_count(depth: usize) -> usize {
    (1 << (depth + 1)) - 1
}

/// Longest root-to-leaf path of `node`.
pub fn depth_of(node: &Node) -> usize {
    node.depth()
}

/// Balance `node` so every leaf sits at `target_depth`.
///
/// Split features and thresholds are preserved; padding splits use feature 0
/// and threshold 0. Fails when `target_depth` is shallower than the tree.
pub fn balance(node: &Node, target_depth: usize) -> Result<BalancedTree, ScorerError> {
    let depth = depth_of(node);
    if target_depth < depth {
        return Err(ScorerError::DepthTooSmall(depth, target_depth));
    }
    Ok(BalancedTree {
        root: pad(node, target_depth),
        depth: target_depth,
    })
}

/// Balance `node` to its own depth.
pub fn balance_to_depth(node: &Node) -> BalancedTree {
    let depth = depth_of(node);
    BalancedTree {
        root: pad(node, depth),
        depth,
    }
}

// Caller guarantees depth_of(node) <= depth.
fn pad(node: &Node, depth: usize) -> Node {
    match node {
        Node::Leaf { .. } if depth == 0 => node.clone(),
        Node::Leaf { .. } => {
            let child = pad(node, depth - 1);
            Node::split(child.clone(), child, 0, 0.0)
        }
        Node::Split {
            left,
            right,
            feature,
            threshold,
        } => {
            debug_assert!(depth > 0, "split found at depth 0");
            Node::split(pad(left, depth - 1), pad(right, depth - 1), *feature, *threshold)
        }
    }
}
