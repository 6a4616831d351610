//! Errors
//!
//! Custom error types used throughout the `branchfree` crate.
use thiserror::Error;

/// Errors that can occur while building a scoring ensemble.
///
/// Every variant is a construction fault: it is raised before the model is
/// made available for scoring, and the ensemble is never partially built.
#[derive(Debug, Error)]
pub enum ScorerError {
    /// A split references a feature id outside of `[0, n_features)`.
    #[error("Feature id {0} is out of range, the model declares {1} features.")]
    FeatureOutOfRange(u32, usize),
    /// A feature id does not fit the 2-byte feature field of a flat record.
    #[error("Feature id {0} does not fit in a flat tree record (max {1}).")]
    FeatureIdOverflow(u32, i16),
    /// Balancing was asked for a depth shallower than the tree itself.
    #[error("Cannot balance a tree of depth {0} to depth {1}.")]
    DepthTooSmall(usize, usize),
    /// A tree is deeper than the selected back-end supports.
    #[error("Tree {0} has depth {1}, the limit is {2}.")]
    DepthLimitExceeded(usize, usize, usize),
    /// Off-heap storage could not be reserved.
    #[error("Unable to allocate ensemble storage for {0} trees and {1} nodes.")]
    Allocation(usize, usize),
    /// The native arena rejected a tree.
    #[error("Error adding tree {0}: {1}")]
    NativeAddTree(usize, NativeStatus),
    /// The specializing compiler would exceed its code-size limits.
    #[error("Compiled ensemble exceeds the {0} limit: {1} > {2}.")]
    CodeSizeLimitExceeded(String, usize, usize),
    /// Unable to write configuration to file.
    #[error("Unable to write configuration: {0}")]
    UnableToWrite(String),
    /// Unable to read configuration from file.
    #[error("Unable to read configuration: {0}")]
    UnableToRead(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
}

/// Status codes reported by the native arena.
///
/// The discriminants are the integer codes exposed over the C ABI.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum NativeStatus {
    /// No more room for trees.
    #[error("ensemble is full")]
    EnsembleFull = -1,
    /// Not enough room left in the node arena.
    #[error("node arena is full")]
    NodesFull = -2,
    /// Feature vectors of a batch differ in length.
    #[error("feature vectors have inconsistent lengths")]
    InconsistentLengths = -3,
    /// Depth above the supported maximum.
    #[error("depth is not supported")]
    UnsupportedDepth = -4,
    /// Node count does not match `2^(depth+1) - 1`.
    #[error("tree is not fully balanced")]
    Unbalanced = -5,
    /// Feature id and value arrays have different lengths.
    #[error("feature id and value arrays differ in length")]
    LengthMismatch = -6,
    /// The output slice is shorter than the batch.
    #[error("output is shorter than the batch")]
    OutputTooShort = -7,
    /// A null handle or pointer crossed the C boundary.
    #[error("null pointer")]
    NullPointer = -8,
    /// Ensemble storage could not be reserved.
    #[error("allocation failed")]
    Allocation = -9,
    /// A panic was caught at the C boundary.
    #[error("internal panic")]
    Panic = -99,
}

impl NativeStatus {
    /// Integer code used over the C ABI.
    pub fn code(self) -> i32 {
        self as i32
    }
}
