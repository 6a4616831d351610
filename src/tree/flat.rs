//! Flattening
//!
//! Serializes a balanced tree into a contiguous buffer in breadth-first
//! (binary heap) order. Slot `i` has its children at `2i + 1` and `2i + 2`.
//!
//! Each slot is a fixed 6-byte record: a little-endian `f32` (the threshold of
//! a split, or the output of a leaf) followed by a little-endian `i16` feature
//! id (zero for leaves). Whether a slot is a leaf is not stored, it follows
//! from the depth: slot `i` is a leaf iff `i >= 2^depth - 1`.
use super::balance::{complete_count, BalancedTree};
use super::walk::Walker;
use crate::constants::RECORD_SIZE;
use crate::errors::ScorerError;
use crate::node::Node;
use std::collections::VecDeque;

/// A balanced tree packed into a flat buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatTree {
    buf: Box<[u8]>,
    depth: usize,
    walker: Walker,
}

/// Nodes of `tree` in heap order.
pub fn heap_order(tree: &BalancedTree) -> Vec<&Node> {
    let mut order = Vec::with_capacity(tree.count());
    // Siblings are enqueued together, so FIFO arrival order is heap order.
    let mut queue: VecDeque<&Node> = VecDeque::with_capacity(tree.count());
    queue.push_back(tree.root());
    while let Some(node) = queue.pop_front() {
        if let Node::Split { left, right, .. } = node {
            queue.push_back(left);
            queue.push_back(right);
        }
        order.push(node);
    }
    order
}

/// Flatten `tree` into heap order.
///
/// Fails when a split feature id does not fit the record's 2-byte field.
pub fn flatten(tree: &BalancedTree) -> Result<FlatTree, ScorerError> {
    let mut buf = Vec::with_capacity(tree.count() * RECORD_SIZE);
    for node in heap_order(tree) {
        match node {
            Node::Leaf { output } => push_record(&mut buf, *output, 0),
            Node::Split { feature, threshold, .. } => {
                let fid = i16::try_from(*feature).map_err(|_| ScorerError::FeatureIdOverflow(*feature, i16::MAX))?;
                push_record(&mut buf, *threshold, fid);
            }
        }
    }
    debug_assert_eq!(buf.len(), tree.count() * RECORD_SIZE);

    Ok(FlatTree {
        buf: buf.into_boxed_slice(),
        depth: tree.depth(),
        walker: Walker::for_depth(tree.depth()),
    })
}

/// Flatten `tree` into heap-order parallel arrays of feature ids and
/// thresholds-or-outputs, the form taken by the native arena.
pub fn flatten_arrays(tree: &BalancedTree) -> (Vec<u32>, Vec<f32>) {
    heap_order(tree)
        .into_iter()
        .map(|node| match node {
            Node::Leaf { output } => (0, *output),
            Node::Split { feature, threshold, .. } => (*feature, *threshold),
        })
        .unzip()
}

fn push_record(buf: &mut Vec<u8>, value: f32, fid: i16) {
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&fid.to_le_bytes());
}

impl FlatTree {
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.buf.len() / RECORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Index of the first leaf slot.
    pub fn first_leaf(&self) -> usize {
        complete_count(self.depth) >> 1
    }

    pub fn walker(&self) -> Walker {
        self.walker
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Threshold of split slot `i`, or output of leaf slot `i`.
    #[inline(always)]
    pub fn value(&self, i: usize) -> f32 {
        let o = i * RECORD_SIZE;
        let b = &self.buf[o..o + 4];
        f32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Feature id of slot `i`, zero for leaf slots.
    #[inline(always)]
    pub fn feature(&self, i: usize) -> usize {
        let o = i * RECORD_SIZE + 4;
        i16::from_le_bytes([self.buf[o], self.buf[o + 1]]) as usize
    }

    /// Heap-order feature ids, the first of the two parallel arrays fed to
    /// the native arena.
    pub fn feature_ids(&self) -> Vec<u32> {
        (0..self.len()).map(|i| self.feature(i) as u32).collect()
    }

    /// Heap-order thresholds and leaf outputs.
    pub fn values(&self) -> Vec<f32> {
        (0..self.len()).map(|i| self.value(i)).collect()
    }

    /// Bytes held by this tree.
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.buf.len()
    }
}
