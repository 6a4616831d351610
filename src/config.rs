//! Scorer Configuration
//!
//! Defines the configuration of an [`Ensemble`](crate::ensemble::Ensemble):
//! which back-end scores it, how batches are parallelized, and the limits
//! enforced while the model is built.
use crate::codegen::CodegenLimits;
use crate::constants::{
    DEFAULT_CODEGEN_MAX_NODES_PER_TREE, DEFAULT_CODEGEN_MAX_TREES, DEFAULT_MAX_DEPTH, DEFAULT_PARALLEL_MIN_BATCH,
};
use crate::errors::ScorerError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Strategies for scoring an ensemble.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BackendKind {
    /// Generic loop over the flattened buffers.
    ArrayWalk,
    /// Flattened buffers, with fully unrolled walks for the depths that have one.
    #[default]
    UnrolledWalk,
    /// The off-heap arena, scored in blocks of vectors.
    Native,
    /// Closures with every constant baked in.
    Compiled,
}

fn default_backend() -> BackendKind {
    BackendKind::UnrolledWalk
}
fn default_parallel_batch() -> bool {
    false
}
fn default_parallel_min_batch() -> usize {
    DEFAULT_PARALLEL_MIN_BATCH
}
fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}
fn default_codegen_max_trees() -> usize {
    DEFAULT_CODEGEN_MAX_TREES
}
fn default_codegen_max_nodes_per_tree() -> usize {
    DEFAULT_CODEGEN_MAX_NODES_PER_TREE
}

/// Configuration for building an `Ensemble`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScorerConfig {
    /// Back-end used to score the ensemble.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Whether large batches are split across the rayon pool.
    #[serde(default = "default_parallel_batch")]
    pub parallel_batch: bool,
    /// Smallest batch split across the pool when `parallel_batch` is set.
    #[serde(default = "default_parallel_min_batch")]
    pub parallel_min_batch: usize,
    /// Deepest tree accepted by the buffer back-ends.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Largest ensemble the compiled back-end accepts.
    #[serde(default = "default_codegen_max_trees")]
    pub codegen_max_trees: usize,
    /// Largest tree, in nodes, the compiled back-end accepts.
    #[serde(default = "default_codegen_max_nodes_per_tree")]
    pub codegen_max_nodes_per_tree: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            backend: BackendKind::UnrolledWalk,
            parallel_batch: false,
            parallel_min_batch: DEFAULT_PARALLEL_MIN_BATCH,
            max_depth: DEFAULT_MAX_DEPTH,
            codegen_max_trees: DEFAULT_CODEGEN_MAX_TREES,
            codegen_max_nodes_per_tree: DEFAULT_CODEGEN_MAX_NODES_PER_TREE,
        }
    }
}

impl ScorerConfig {
    /// Check the limits are usable.
    pub fn validate(&self) -> Result<(), ScorerError> {
        // Padded trees hold 2^(depth+1) - 1 nodes, which has to fit a usize.
        if self.max_depth >= usize::BITS as usize - 1 {
            return Err(ScorerError::InvalidParameter(
                "max_depth".to_string(),
                format!("a value below {}", usize::BITS - 1),
                self.max_depth.to_string(),
            ));
        }
        if self.parallel_min_batch == 0 {
            return Err(ScorerError::InvalidParameter(
                "parallel_min_batch".to_string(),
                "a positive value".to_string(),
                "0".to_string(),
            ));
        }
        if self.codegen_max_trees == 0 || self.codegen_max_nodes_per_tree == 0 {
            return Err(ScorerError::InvalidParameter(
                "codegen limits".to_string(),
                "positive values".to_string(),
                format!("{} trees, {} nodes", self.codegen_max_trees, self.codegen_max_nodes_per_tree),
            ));
        }
        Ok(())
    }

    pub fn codegen_limits(&self) -> CodegenLimits {
        CodegenLimits {
            max_trees: self.codegen_max_trees,
            max_nodes_per_tree: self.codegen_max_nodes_per_tree,
        }
    }

    /// Set the back-end.
    /// * `backend` - Strategy used to score the ensemble.
    pub fn set_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set whether batches are scored in parallel.
    /// * `parallel_batch` - Split batches of at least `parallel_min_batch` vectors across the rayon pool.
    pub fn set_parallel_batch(mut self, parallel_batch: bool) -> Self {
        self.parallel_batch = parallel_batch;
        self
    }

    pub fn set_parallel_min_batch(mut self, parallel_min_batch: usize) -> Self {
        self.parallel_min_batch = parallel_min_batch;
        self
    }

    /// Set the depth limit of the buffer back-ends.
    /// * `max_depth` - Trees deeper than this fail the build.
    pub fn set_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the code size limits of the compiled back-end.
    pub fn set_codegen_limits(mut self, max_trees: usize, max_nodes_per_tree: usize) -> Self {
        self.codegen_max_trees = max_trees;
        self.codegen_max_nodes_per_tree = max_nodes_per_tree;
        self
    }
}

/// IO
pub trait ScorerIO: Serialize + DeserializeOwned + Sized {
    /// Save a configuration as a json object to a file.
    ///
    /// * `path` - Path to save the configuration.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), ScorerError> {
        fs::write(path, self.json_dump()?).map_err(|e| ScorerError::UnableToWrite(e.to_string()))
    }

    /// Dump a configuration as a json object
    fn json_dump(&self) -> Result<String, ScorerError> {
        serde_json::to_string(self).map_err(|e| ScorerError::UnableToWrite(e.to_string()))
    }

    /// Load a configuration from Json string
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, ScorerError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| ScorerError::UnableToRead(e.to_string()))
    }

    /// Load a configuration from a path to a json object.
    ///
    /// * `path` - Path to load the configuration from.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, ScorerError> {
        let json_str = fs::read_to_string(path).map_err(|e| ScorerError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ScorerIO for ScorerConfig {}
