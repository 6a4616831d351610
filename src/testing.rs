//! Random trees and feature vectors for unit tests.
//!
//! Thresholds and feature values are drawn half of the time from the same
//! coarse grid, so ties between a value and a threshold happen often.
use crate::node::Node;
use rand::rngs::StdRng;
use rand::Rng;

fn grid_or_uniform(rng: &mut StdRng) -> f32 {
    if rng.gen_bool(0.5) {
        rng.gen_range(-8..=8) as f32 / 8.0
    } else {
        rng.gen_range(-1.0f32..1.0)
    }
}

/// Random tree of depth at most `max_depth` over `n_features` features.
pub(crate) fn random_tree(rng: &mut StdRng, n_features: usize, max_depth: usize) -> Node {
    grow(rng, n_features, max_depth, 0)
}

fn grow(rng: &mut StdRng, n_features: usize, max_depth: usize, depth: usize) -> Node {
    let split = depth < max_depth && n_features > 0 && (depth == 0 || rng.gen_bool(0.7));
    if !split {
        return Node::leaf(rng.gen_range(-10.0f32..10.0));
    }
    let left = grow(rng, n_features, max_depth, depth + 1);
    let right = grow(rng, n_features, max_depth, depth + 1);
    let feature = rng.gen_range(0..n_features) as u32;
    Node::split(left, right, feature, grid_or_uniform(rng))
}

/// Random ensemble of `n_trees` trees.
pub(crate) fn random_trees(rng: &mut StdRng, n_trees: usize, n_features: usize, max_depth: usize) -> Vec<Node> {
    (0..n_trees).map(|_| random_tree(rng, n_features, max_depth)).collect()
}

pub(crate) fn random_features(rng: &mut StdRng, n_features: usize) -> Vec<f32> {
    (0..n_features).map(|_| grid_or_uniform(rng)).collect()
}

/// Complete depth-4 tree whose leaves, left to right, output `0.0..16.0`.
///
/// Level `l` splits on feature `l` at threshold `0.5`.
pub(crate) fn indexed_depth4_tree() -> Node {
    fn build(level: u32, first_leaf: u32) -> Node {
        if level == 4 {
            return Node::leaf(first_leaf as f32);
        }
        let half = 1 << (3 - level);
        Node::split(
            build(level + 1, first_leaf),
            build(level + 1, first_leaf + half),
            level,
            0.5,
        )
    }
    build(0, 0)
}

/// Left spine of `depth` splits on feature 0 at `0.5`, ending in leaf `1.0`.
pub(crate) fn chain_tree(depth: usize) -> Node {
    let mut node = Node::leaf(1.0);
    for _ in 0..depth {
        node = Node::split(node, Node::leaf(0.0), 0, 0.5);
    }
    node
}
