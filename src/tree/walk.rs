//! Branch-free walks over a [`FlatTree`].
//!
//! Each level reads one record and computes the next slot as
//! `j = 2j + 1 + branch_bit`, so the only data-dependent operation is a
//! comparison turned into an integer. After `depth` steps `j` is a leaf slot.
use super::flat::FlatTree;
use crate::node::branch_bit;

/// Walk strategy selected once per tree when the ensemble is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Walker {
    /// Loop over `depth` levels.
    Generic,
    /// Straight-line walk for depth 4.
    Depth4,
    /// Straight-line walk for depth 6.
    Depth6,
    /// Straight-line walk for depth 8.
    Depth8,
}

impl Walker {
    /// Unrolled walker for `depth` if one exists, otherwise `Generic`.
    pub fn for_depth(depth: usize) -> Self {
        match depth {
            4 => Walker::Depth4,
            6 => Walker::Depth6,
            8 => Walker::Depth8,
            _ => Walker::Generic,
        }
    }

    pub fn is_unrolled(self) -> bool {
        self != Walker::Generic
    }
}

/// Walk `tree` level by level, any depth.
#[inline]
pub fn score_generic(tree: &FlatTree, features: &[f32]) -> f32 {
    let mut j = 0;
    for _ in 0..tree.depth() {
        j = 2 * j + 1 + branch_bit(tree.value(j), features[tree.feature(j)]);
    }
    tree.value(j)
}

// One level of the walk. The level token only sets how many times it repeats.
macro_rules! step {
    ($tree:ident, $features:ident, $j:ident, $level:literal) => {
        $j = 2 * $j + 1 + branch_bit($tree.value($j), $features[$tree.feature($j)])
    };
}

macro_rules! unrolled_walk {
    ($name:ident, $depth:literal, $($level:literal)*) => {
        #[inline]
        pub fn $name(tree: &FlatTree, features: &[f32]) -> f32 {
            debug_assert_eq!(tree.depth(), $depth);
            let mut j = 0;
            $(step!(tree, features, j, $level);)*
            tree.value(j)
        }
    };
}

unrolled_walk!(score_depth4, 4, 0 1 2 3);
unrolled_walk!(score_depth6, 6, 0 1 2 3 4 5);
unrolled_walk!(score_depth8, 8, 0 1 2 3 4 5 6 7);

impl FlatTree {
    /// Score with the walker chosen for this tree's depth.
    #[inline]
    pub fn score(&self, features: &[f32]) -> f32 {
        match self.walker() {
            Walker::Generic => score_generic(self, features),
            Walker::Depth4 => score_depth4(self, features),
            Walker::Depth6 => score_depth6(self, features),
            Walker::Depth8 => score_depth8(self, features),
        }
    }
}
