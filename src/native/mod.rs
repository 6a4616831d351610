//! Native bulk evaluator
//!
//! The whole ensemble lives in one arena reserved up front: a node array
//! holding every tree back to back in heap order, and a root table of
//! `(offset, depth)` pairs. Trees are addressed by integer offsets, never by
//! pointers. Batches are scored a block of vectors at a time so that one tree
//! is walked for the whole block before moving to the next.
//!
//! The layout follows "Runtime Optimizations for Prediction with Tree-Based
//! Models" (Asadi, Lin, de Vries).
pub mod ffi;

use crate::constants::{MAX_NATIVE_DEPTH, NATIVE_BLOCK_NARROW, NATIVE_BLOCK_WIDE};
use crate::errors::{NativeStatus, ScorerError};
use crate::node::branch_bit;
use crate::tree::balance::complete_count;
use log::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct NativeNode {
    fid: u32,
    value: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Root {
    offset: usize,
    depth: usize,
}

type BlockFn<V> = fn(&[NativeNode], &[V], &mut [f32]);

/// Ensemble storage for the bulk evaluator.
#[derive(Debug)]
pub struct NativeEnsemble {
    total_trees: usize,
    roots: Vec<Root>,
    total_nodes: usize,
    nodes: Vec<NativeNode>,
    // Largest feature id read by a split slot.
    max_fid: Option<u32>,
}

impl NativeEnsemble {
    /// Reserve room for `num_trees` trees holding `num_nodes` nodes in total.
    pub fn create(num_trees: usize, num_nodes: usize) -> Result<Self, ScorerError> {
        let mut roots = Vec::new();
        roots
            .try_reserve_exact(num_trees)
            .map_err(|_| ScorerError::Allocation(num_trees, num_nodes))?;
        let mut nodes = Vec::new();
        nodes
            .try_reserve_exact(num_nodes)
            .map_err(|_| ScorerError::Allocation(num_trees, num_nodes))?;
        Ok(NativeEnsemble {
            total_trees: num_trees,
            roots,
            total_nodes: num_nodes,
            nodes,
            max_fid: None,
        })
    }

    /// Append one balanced tree given as heap-order parallel arrays.
    ///
    /// `values` holds thresholds for split slots and outputs for leaf slots.
    pub fn add_tree(&mut self, depth: usize, feature_ids: &[u32], values: &[f32]) -> Result<(), NativeStatus> {
        if self.roots.len() >= self.total_trees {
            return Err(NativeStatus::EnsembleFull);
        }
        if feature_ids.len() != values.len() {
            return Err(NativeStatus::LengthMismatch);
        }
        let offset = self.nodes.len();
        if offset + values.len() > self.total_nodes {
            return Err(NativeStatus::NodesFull);
        }
        if depth > MAX_NATIVE_DEPTH {
            return Err(NativeStatus::UnsupportedDepth);
        }
        if values.len() != complete_count(depth) {
            return Err(NativeStatus::Unbalanced);
        }

        // Leaf slots never index the feature vector.
        let n_splits = values.len() >> 1;
        if let Some(fid) = feature_ids[..n_splits].iter().max() {
            self.max_fid = Some(self.max_fid.map_or(*fid, |m| m.max(*fid)));
        }
        self.nodes.extend(
            feature_ids
                .iter()
                .zip(values)
                .map(|(fid, value)| NativeNode { fid: *fid, value: *value }),
        );
        self.roots.push(Root { offset, depth });
        Ok(())
    }

    pub fn num_trees(&self) -> usize {
        self.roots.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// True once every reserved tree slot has been filled.
    pub fn is_full(&self) -> bool {
        self.roots.len() == self.total_trees
    }

    // Vectors this short would read past their end.
    fn too_short(&self, n_features: usize) -> bool {
        self.max_fid.map_or(false, |m| n_features <= m as usize)
    }

    /// Score a single feature vector.
    ///
    /// Returns `NaN` if the vector is too short for the ensemble.
    pub fn eval_one(&self, features: &[f32]) -> f32 {
        let mut res = [0.0f32];
        if self.too_short(features.len()) {
            return f32::NAN;
        }
        self.eval_block::<1, _>(&[features], &mut res);
        res[0]
    }

    /// Score a batch of feature vectors into `out`.
    ///
    /// All vectors must have the same length. If they are too short for the
    /// ensemble every score is `NaN`.
    pub fn eval_many<V: AsRef<[f32]>>(&self, vectors: &[V], out: &mut [f32]) -> Result<(), NativeStatus> {
        if out.len() < vectors.len() {
            return Err(NativeStatus::OutputTooShort);
        }
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let n_features = first.as_ref().len();
        if vectors.iter().any(|v| v.as_ref().len() != n_features) {
            return Err(NativeStatus::InconsistentLengths);
        }
        if self.too_short(n_features) {
            out[..vectors.len()].fill(f32::NAN);
            return Ok(());
        }

        let mut start = 0;
        while start < vectors.len() {
            let remaining = vectors.len() - start;
            let width = if remaining >= NATIVE_BLOCK_WIDE {
                NATIVE_BLOCK_WIDE
            } else if remaining >= NATIVE_BLOCK_NARROW {
                NATIVE_BLOCK_NARROW
            } else {
                1
            };
            let end = start + width;
            let (f, res) = (&vectors[start..end], &mut out[start..end]);
            match width {
                NATIVE_BLOCK_WIDE => self.eval_block::<NATIVE_BLOCK_WIDE, V>(f, res),
                NATIVE_BLOCK_NARROW => self.eval_block::<NATIVE_BLOCK_NARROW, V>(f, res),
                _ => self.eval_block::<1, V>(f, res),
            }
            start = end;
        }
        Ok(())
    }

    fn eval_block<const M: usize, V: AsRef<[f32]>>(&self, f: &[V], res: &mut [f32]) {
        debug_assert_eq!(f.len(), M);
        res[..M].fill(0.0);
        for root in &self.roots {
            let len = complete_count(root.depth);
            let tree = &self.nodes[root.offset..root.offset + len];
            block_walker::<M, V>(root.depth)(tree, f, res);
        }
    }

    /// Bytes held by the arena.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.roots.capacity() * std::mem::size_of::<Root>()
            + self.nodes.capacity() * std::mem::size_of::<NativeNode>()
    }

    /// Release the arena.
    pub fn destroy(self) {
        debug!(
            "Releasing native ensemble of {} trees and {} nodes.",
            self.roots.len(),
            self.nodes.len()
        );
    }
}

fn block_walker<const M: usize, V: AsRef<[f32]>>(depth: usize) -> BlockFn<V> {
    debug_assert!(depth <= MAX_NATIVE_DEPTH);
    match depth {
        0 => walk_block::<0, M, V>,
        1 => walk_block::<1, M, V>,
        2 => walk_block::<2, M, V>,
        3 => walk_block::<3, M, V>,
        4 => walk_block::<4, M, V>,
        5 => walk_block::<5, M, V>,
        6 => walk_block::<6, M, V>,
        7 => walk_block::<7, M, V>,
        8 => walk_block::<8, M, V>,
        9 => walk_block::<9, M, V>,
        _ => walk_block::<10, M, V>,
    }
}

fn walk_block<const D: usize, const M: usize, V: AsRef<[f32]>>(tree: &[NativeNode], f: &[V], res: &mut [f32]) {
    let mut j = [0usize; M];
    for _ in 0..D {
        for i in 0..M {
            let node = tree[j[i]];
            j[i] = 2 * j[i] + 1 + branch_bit(node.value, f[i].as_ref()[node.fid as usize]);
        }
    }
    for i in 0..M {
        res[i] += tree[j[i]].value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::testing::{indexed_depth4_tree, random_features, random_trees};
    use crate::tree::balance::{balance, balance_to_depth};
    use crate::tree::flat::{flatten, flatten_arrays};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn build(trees: &[Node]) -> NativeEnsemble {
        let balanced: Vec<_> = trees.iter().map(balance_to_depth).collect();
        let total = balanced.iter().map(|b| b.count()).sum();
        let mut native = NativeEnsemble::create(balanced.len(), total).unwrap();
        for tree in &balanced {
            let (fids, values) = flatten_arrays(tree);
            native.add_tree(tree.depth(), &fids, &values).unwrap();
        }
        native
    }

    #[test]
    fn test_add_tree_statuses() {
        let mut native = NativeEnsemble::create(1, 3).unwrap();
        assert_eq!(native.add_tree(1, &[0, 0], &[0.5, 1.0, 2.0]), Err(NativeStatus::LengthMismatch));
        assert_eq!(native.add_tree(1, &[0, 0], &[0.5, 1.0]), Err(NativeStatus::Unbalanced));
        assert_eq!(native.add_tree(2, &[0; 7], &[0.0; 7]), Err(NativeStatus::NodesFull));
        assert_eq!(native.add_tree(1, &[0, 0, 0], &[0.5, 1.0, 2.0]), Ok(()));
        assert!(native.is_full());
        assert_eq!(native.add_tree(0, &[0], &[1.0]), Err(NativeStatus::EnsembleFull));

        let mut deep = NativeEnsemble::create(1, 1 << 13).unwrap();
        let len = complete_count(11);
        assert_eq!(
            deep.add_tree(11, &vec![0; len], &vec![0.0; len]),
            Err(NativeStatus::UnsupportedDepth)
        );
    }

    #[test]
    fn test_equal_split_goes_right() {
        let native = build(&[Node::split(Node::leaf(1.0), Node::leaf(0.0), 0, 0.1234)]);
        assert_eq!(native.eval_one(&[0.1234]), 0.0);
    }

    #[test]
    fn test_single_leaf_tree() {
        let native = build(&[Node::leaf(3.0), Node::leaf(0.5)]);
        assert_eq!(native.eval_one(&[]), 3.5);
        assert_eq!(native.eval_one(&[42.0]), 3.5);
    }

    #[test]
    fn test_short_vector_is_nan() {
        let native = build(&[Node::split(Node::leaf(1.0), Node::leaf(0.0), 3, 0.5)]);
        assert!(native.eval_one(&[0.0, 0.0, 0.0]).is_nan());
        let mut out = [0.0; 2];
        native.eval_many(&[vec![0.0; 2], vec![0.0; 2]], &mut out).unwrap();
        assert!(out.iter().all(|s| s.is_nan()));
    }

    #[test]
    fn test_eval_many_errors() {
        let native = build(&[indexed_depth4_tree()]);
        let mut out = [0.0; 1];
        assert_eq!(
            native.eval_many(&[vec![0.0; 4], vec![0.0; 4]], &mut out),
            Err(NativeStatus::OutputTooShort)
        );
        let mut out = [0.0; 2];
        assert_eq!(
            native.eval_many(&[vec![0.0; 4], vec![0.0; 5]], &mut out),
            Err(NativeStatus::InconsistentLengths)
        );
        let empty: [Vec<f32>; 0] = [];
        assert_eq!(native.eval_many(&empty, &mut out), Ok(()));
    }

    #[test]
    fn test_eval_many_matches_eval_one() {
        let mut rng = StdRng::seed_from_u64(3);
        let trees = random_trees(&mut rng, 40, 16, 9);
        let native = build(&trees);
        for n in [1, 7, 8, 9, 31, 32, 33, 77] {
            let vectors: Vec<Vec<f32>> = (0..n).map(|_| random_features(&mut rng, 16)).collect();
            let mut out = vec![0.0; n];
            native.eval_many(&vectors, &mut out).unwrap();
            for (v, s) in vectors.iter().zip(&out) {
                assert_eq!(s.to_bits(), native.eval_one(v).to_bits());
                let expected = trees.iter().fold(0.0f32, |acc, t| acc + t.predict(v));
                assert_eq!(s.to_bits(), expected.to_bits());
            }
        }
    }

    #[test]
    fn test_padded_tree_scores_like_unpadded() {
        let tree = Node::split(Node::leaf(1.0), Node::leaf(0.0), 0, 0.1234);
        let flat = flatten(&balance(&tree, 3).unwrap()).unwrap();
        let mut native = NativeEnsemble::create(1, flat.len()).unwrap();
        native.add_tree(3, &flat.feature_ids(), &flat.values()).unwrap();
        assert_eq!(native.eval_one(&[0.1234]), 0.0);
        assert_eq!(native.eval_one(&[0.0]), 1.0);
    }
}
