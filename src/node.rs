//! Tree Model
//!
//! The plain recursive decision-tree representation handed to this crate by
//! the model parser. It is the input to balancing and flattening, and the
//! reference every back-end is checked against.
use std::fmt;

/// A node of an additive decision tree.
///
/// Every split owns exactly two children, so a `Node` is always a proper
/// binary tree with no sharing and no cycles.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Terminal node contributing `output` to the ensemble score.
    Leaf { output: f32 },
    /// Internal node routing on `features[feature]` against `threshold`.
    Split {
        left: Box<Node>,
        right: Box<Node>,
        feature: u32,
        threshold: f32,
    },
}

/// Routing rule shared by every scorer in the crate.
///
/// Returns `1` (go right) when `threshold <= value`, otherwise `0` (go left).
/// A NaN value always goes left.
#[inline(always)]
pub fn branch_bit(threshold: f32, value: f32) -> usize {
    (threshold <= value) as usize
}

impl Node {
    pub fn leaf(output: f32) -> Self {
        Node::Leaf { output }
    }

    pub fn split(left: Node, right: Node, feature: u32, threshold: f32) -> Self {
        Node::Split {
            left: Box::new(left),
            right: Box::new(right),
            feature,
            threshold,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }

    /// Leaf output, `None` for splits.
    pub fn output(&self) -> Option<f32> {
        match self {
            Node::Leaf { output } => Some(*output),
            Node::Split { .. } => None,
        }
    }

    /// Split feature id, `None` for leaves.
    pub fn feature(&self) -> Option<u32> {
        match self {
            Node::Split { feature, .. } => Some(*feature),
            Node::Leaf { .. } => None,
        }
    }

    /// Split threshold, `None` for leaves.
    pub fn threshold(&self) -> Option<f32> {
        match self {
            Node::Split { threshold, .. } => Some(*threshold),
            Node::Leaf { .. } => None,
        }
    }

    pub fn left(&self) -> Option<&Node> {
        match self {
            Node::Split { left, .. } => Some(left),
            Node::Leaf { .. } => None,
        }
    }

    pub fn right(&self) -> Option<&Node> {
        match self {
            Node::Split { right, .. } => Some(right),
            Node::Leaf { .. } => None,
        }
    }

    /// Pre-order iterator over every node of the tree.
    pub fn iter(&self) -> NodeIter<'_> {
        NodeIter { stack: vec![self] }
    }

    /// Total number of nodes, splits and leaves.
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    pub fn count_leaves(&self) -> usize {
        self.iter().filter(|n| n.is_leaf()).count()
    }

    /// Longest path from this node to any leaf. A bare leaf has depth 0.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(&Node, usize)> = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            match node {
                Node::Leaf { .. } => deepest = deepest.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((&**left, depth + 1));
                    stack.push((&**right, depth + 1));
                }
            }
        }
        deepest
    }

    /// Largest feature id referenced by a split, `None` for a bare leaf.
    pub fn max_feature(&self) -> Option<u32> {
        self.iter().filter_map(|n| n.feature()).max()
    }

    /// Score `features` by walking the tree node by node.
    ///
    /// Panics if a split references a feature id beyond `features`.
    pub fn predict(&self, features: &[f32]) -> f32 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { output } => return *output,
                Node::Split {
                    left,
                    right,
                    feature,
                    threshold,
                } => {
                    node = if branch_bit(*threshold, features[*feature as usize]) == 1 {
                        right
                    } else {
                        left
                    };
                }
            }
        }
    }
}

// Children are detached onto a heap stack, so dropping a degenerate chain
// does not recurse once per level.
impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        detach_children(self, &mut stack);
        while let Some(mut node) = stack.pop() {
            detach_children(&mut node, &mut stack);
        }
    }
}

fn detach_children(node: &mut Node, stack: &mut Vec<Node>) {
    if let Node::Split { left, right, .. } = node {
        for child in [left, right] {
            if !child.is_leaf() {
                stack.push(std::mem::replace(&mut **child, Node::leaf(0.0)));
            }
        }
    }
}

pub struct NodeIter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for NodeIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Node::Split { left, right, .. } = node {
            self.stack.push(right);
            self.stack.push(left);
        }
        Some(node)
    }
}

impl fmt::Display for Node {
    // This trait requires `fmt` with this exact signature.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut print_buffer: Vec<(usize, &Node)> = vec![(0, self)];
        let mut r = String::new();
        while let Some((depth, node)) = print_buffer.pop() {
            let indent = "      ".repeat(depth);
            match node {
                Node::Leaf { output } => {
                    r += format!("{}leaf={}\n", indent, output).as_str();
                }
                Node::Split {
                    left,
                    right,
                    feature,
                    threshold,
                } => {
                    r += format!("{}[{} < {}]\n", indent, feature, threshold).as_str();
                    print_buffer.push((depth + 1, right));
                    print_buffer.push((depth + 1, left));
                }
            }
        }
        write!(f, "{}", r)
    }
}
