//! Ensemble Scorer
//!
//! Builds a runnable ranker from parsed trees and scores feature vectors with
//! the back-end chosen in [`ScorerConfig`].
//!
//! An [`EnsembleBuilder`] collects and validates trees. [`EnsembleBuilder::build`]
//! balances, flattens or compiles them once and returns an immutable
//! [`Ensemble`] that can be shared across scoring threads. Every back-end
//! starts each score at `0.0` and adds tree outputs in tree order, so a batch
//! scores bit-for-bit like the same vectors scored one at a time.
use crate::codegen::{emit_rust_source, CompiledEnsemble};
use crate::config::{BackendKind, ScorerConfig};
use crate::constants::{BATCH_BLOCK, MAX_NATIVE_DEPTH, PARALLEL_CHUNK};
use crate::data::{FeatureVector, Ranker};
use crate::errors::ScorerError;
use crate::native::NativeEnsemble;
use crate::node::Node;
use crate::tree::{balance_to_depth, flatten, flatten_arrays, score_generic, FlatTree};
use hashbrown::HashMap;
use log::{debug, info, warn};
use rayon::prelude::*;

/// Scoring strategy of a built ensemble, fixed at build time.
#[derive(Debug)]
pub enum Backend {
    ArrayWalk(Vec<FlatTree>),
    UnrolledWalk(Vec<FlatTree>),
    Native(NativeEnsemble),
    Compiled(CompiledEnsemble),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::ArrayWalk(_) => BackendKind::ArrayWalk,
            Backend::UnrolledWalk(_) => BackendKind::UnrolledWalk,
            Backend::Native(_) => BackendKind::Native,
            Backend::Compiled(_) => BackendKind::Compiled,
        }
    }
}

/// Check every split of `tree` reads a feature below `n_features`.
pub(crate) fn validate_features(tree: &Node, n_features: usize) -> Result<(), ScorerError> {
    match tree.max_feature() {
        Some(feature) if feature as usize >= n_features => Err(ScorerError::FeatureOutOfRange(feature, n_features)),
        _ => Ok(()),
    }
}

/// Collects the trees of an ensemble until it is built.
#[derive(Clone, Debug)]
pub struct EnsembleBuilder {
    n_features: usize,
    config: ScorerConfig,
    trees: Vec<Node>,
}

impl EnsembleBuilder {
    /// Builder for a model reading `n_features` features, with the default configuration.
    pub fn new(n_features: usize) -> Self {
        EnsembleBuilder {
            n_features,
            config: ScorerConfig::default(),
            trees: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ScorerConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a tree.
    ///
    /// Fails if a split reads a feature id outside the declared feature count.
    pub fn add_tree(&mut self, tree: Node) -> Result<(), ScorerError> {
        validate_features(&tree, self.n_features)?;
        self.trees.push(tree);
        Ok(())
    }

    /// Append trees in order, stopping at the first invalid one.
    pub fn add_trees<I: IntoIterator<Item = Node>>(&mut self, trees: I) -> Result<(), ScorerError> {
        for tree in trees {
            self.add_tree(tree)?;
        }
        Ok(())
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Generated Rust source scoring the trees added so far.
    ///
    /// See [`emit_rust_source`].
    pub fn emit_rust_source(&self) -> Result<String, ScorerError> {
        emit_rust_source(&self.trees, self.n_features, &self.config.codegen_limits())
    }

    /// Finalize the ensemble with the configured back-end.
    pub fn build(self) -> Result<Ensemble, ScorerError> {
        self.config.validate()?;
        let backend = match self.config.backend {
            BackendKind::ArrayWalk => Backend::ArrayWalk(self.flatten_trees()?),
            BackendKind::UnrolledWalk => {
                let trees = self.flatten_trees()?;
                if !trees.is_empty() && !trees.iter().any(|t| t.walker().is_unrolled()) {
                    warn!("No tree has an unrolled depth, every tree will use the generic walk.");
                }
                Backend::UnrolledWalk(trees)
            }
            BackendKind::Native => Backend::Native(self.native_trees()?),
            BackendKind::Compiled => {
                Backend::Compiled(CompiledEnsemble::compile(&self.trees, &self.config.codegen_limits())?)
            }
        };

        let mut feature_usage = HashMap::new();
        for node in self.trees.iter().flat_map(|t| t.iter()) {
            if let Some(feature) = node.feature() {
                *feature_usage.entry(feature).or_insert(0) += 1;
            }
        }

        let ensemble = Ensemble {
            backend,
            n_features: self.n_features,
            num_trees: self.trees.len(),
            feature_usage,
            config: self.config,
        };
        info!(
            "Built {:?} ensemble of {} trees over {} features using {} bytes.",
            ensemble.backend_kind(),
            ensemble.num_trees,
            ensemble.n_features,
            ensemble.memory_usage()
        );
        Ok(ensemble)
    }

    fn check_depth(&self, limit: usize) -> Result<(), ScorerError> {
        for (i, tree) in self.trees.iter().enumerate() {
            let depth = tree.depth();
            if depth > limit {
                return Err(ScorerError::DepthLimitExceeded(i, depth, limit));
            }
        }
        Ok(())
    }

    fn flatten_trees(&self) -> Result<Vec<FlatTree>, ScorerError> {
        self.check_depth(self.config.max_depth)?;
        let mut flat = Vec::with_capacity(self.trees.len());
        for (i, tree) in self.trees.iter().enumerate() {
            let tree = flatten(&balance_to_depth(tree))?;
            debug!(
                "Tree {} flattened to {} slots of depth {}, {:?} walk.",
                i,
                tree.len(),
                tree.depth(),
                tree.walker()
            );
            flat.push(tree);
        }
        Ok(flat)
    }

    fn native_trees(&self) -> Result<NativeEnsemble, ScorerError> {
        self.check_depth(self.config.max_depth.min(MAX_NATIVE_DEPTH))?;
        let balanced: Vec<_> = self.trees.iter().map(balance_to_depth).collect();
        let num_nodes = balanced.iter().map(|t| t.count()).sum();
        let mut native = NativeEnsemble::create(balanced.len(), num_nodes)?;
        for (i, tree) in balanced.iter().enumerate() {
            let (feature_ids, values) = flatten_arrays(tree);
            native
                .add_tree(tree.depth(), &feature_ids, &values)
                .map_err(|status| ScorerError::NativeAddTree(i, status))?;
            debug!("Tree {} added to the native arena at depth {}.", i, tree.depth());
        }
        Ok(native)
    }
}

/// An immutable, scorable ensemble.
///
/// Shared read-only across threads; the caller owns the feature vectors.
#[derive(Debug)]
pub struct Ensemble {
    backend: Backend,
    n_features: usize,
    num_trees: usize,
    feature_usage: HashMap<u32, usize>,
    config: ScorerConfig,
}

impl Ensemble {
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn num_trees(&self) -> usize {
        self.num_trees
    }

    /// Number of splits per feature id, padding splits excluded.
    pub fn feature_usage(&self) -> &HashMap<u32, usize> {
        &self.feature_usage
    }

    /// Score one vector of feature values.
    ///
    /// `features` must hold at least `size()` values. The buffer and compiled
    /// back-ends panic on a shorter slice, the native back-end returns `NaN`.
    pub fn score_features(&self, features: &[f32]) -> f32 {
        match &self.backend {
            Backend::ArrayWalk(trees) => sum_trees(trees, features, score_generic),
            Backend::UnrolledWalk(trees) => sum_trees(trees, features, FlatTree::score),
            Backend::Native(native) => native.eval_one(features),
            Backend::Compiled(compiled) => compiled.score(features),
        }
    }

    /// Score every vector of `vectors` into the matching slot of `scores`.
    ///
    /// Panics if `scores` is shorter than `vectors`.
    pub fn score_many<V: AsRef<[f32]> + Sync>(&self, vectors: &[V], scores: &mut [f32]) {
        assert!(vectors.len() <= scores.len(), "scores shorter than the batch");
        let scores = &mut scores[..vectors.len()];
        if self.config.parallel_batch && vectors.len() >= self.config.parallel_min_batch {
            vectors
                .par_chunks(PARALLEL_CHUNK)
                .zip(scores.par_chunks_mut(PARALLEL_CHUNK))
                .for_each(|(v, s)| self.score_sequential(v, s));
        } else {
            self.score_sequential(vectors, scores);
        }
    }

    fn score_sequential<V: AsRef<[f32]>>(&self, vectors: &[V], scores: &mut [f32]) {
        match &self.backend {
            Backend::ArrayWalk(trees) => score_blocks(trees, vectors, scores, score_generic),
            Backend::UnrolledWalk(trees) => score_blocks(trees, vectors, scores, FlatTree::score),
            Backend::Native(native) => {
                // Mixed vector lengths fall back to one call per vector.
                if native.eval_many(vectors, scores).is_err() {
                    for (s, v) in scores.iter_mut().zip(vectors) {
                        *s = native.eval_one(v.as_ref());
                    }
                }
            }
            Backend::Compiled(compiled) => {
                for (s, v) in scores.iter_mut().zip(vectors) {
                    *s = compiled.score(v.as_ref());
                }
            }
        }
    }

    /// Bytes held by the built model.
    pub fn memory_usage(&self) -> usize {
        let backend = match &self.backend {
            Backend::ArrayWalk(trees) | Backend::UnrolledWalk(trees) => {
                trees.iter().map(|t| t.memory_usage()).sum::<usize>()
            }
            Backend::Native(native) => native.memory_usage(),
            Backend::Compiled(compiled) => compiled.memory_usage(),
        };
        std::mem::size_of::<Self>() + backend + self.feature_usage.capacity() * std::mem::size_of::<(u32, usize)>()
    }

    /// Release the model. Nothing can be scored afterwards.
    pub fn destroy(self) {
        let kind = self.backend_kind();
        if let Backend::Native(native) = self.backend {
            native.destroy();
        }
        debug!("Destroyed {:?} ensemble of {} trees.", kind, self.num_trees);
    }
}

fn sum_trees<F>(trees: &[FlatTree], features: &[f32], walk: F) -> f32
where
    F: Fn(&FlatTree, &[f32]) -> f32,
{
    let mut score = 0.0f32;
    for tree in trees {
        score += walk(tree, features);
    }
    score
}

// Walks each tree for a block of vectors before moving to the next tree.
fn score_blocks<V, F>(trees: &[FlatTree], vectors: &[V], scores: &mut [f32], walk: F)
where
    V: AsRef<[f32]>,
    F: Fn(&FlatTree, &[f32]) -> f32,
{
    let mut v_blocks = vectors.chunks_exact(BATCH_BLOCK);
    let mut s_blocks = scores.chunks_exact_mut(BATCH_BLOCK);
    for (v, s) in (&mut v_blocks).zip(&mut s_blocks) {
        let mut acc = [0.0f32; BATCH_BLOCK];
        for tree in trees {
            for (a, x) in acc.iter_mut().zip(v) {
                *a += walk(tree, x.as_ref());
            }
        }
        s.copy_from_slice(&acc);
    }
    for (s, v) in s_blocks.into_remainder().iter_mut().zip(v_blocks.remainder()) {
        *s = sum_trees(trees, v.as_ref(), &walk);
    }
}

impl Ranker for Ensemble {
    fn name(&self) -> &'static str {
        match self.backend {
            Backend::Compiled(_) => "codegen_additive_decision_tree",
            _ => "nobrch_additive_decision_tree",
        }
    }

    fn size(&self) -> usize {
        self.n_features
    }

    fn score(&self, vector: &FeatureVector) -> f32 {
        self.score_features(vector.as_slice())
    }

    fn score_batch(&self, vectors: &[FeatureVector], scores: &mut [f32]) {
        self.score_many(vectors, scores);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_MAX_DEPTH;
    use crate::testing::{chain_tree, indexed_depth4_tree, random_features, random_trees};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use std::thread;

    const BACKENDS: [BackendKind; 4] = [
        BackendKind::ArrayWalk,
        BackendKind::UnrolledWalk,
        BackendKind::Native,
        BackendKind::Compiled,
    ];

    fn build(trees: &[Node], n_features: usize, config: ScorerConfig) -> Ensemble {
        let mut builder = EnsembleBuilder::new(n_features).with_config(config);
        builder.add_trees(trees.iter().cloned()).unwrap();
        builder.build().unwrap()
    }

    fn reference(trees: &[Node], features: &[f32]) -> f32 {
        trees.iter().fold(0.0f32, |acc, t| acc + t.predict(features))
    }

    #[test]
    fn test_equal_split_goes_right_on_every_backend() {
        let trees = [Node::split(Node::leaf(1.0), Node::leaf(0.0), 0, 0.1234)];
        for kind in BACKENDS {
            let ensemble = build(&trees, 1, ScorerConfig::default().set_backend(kind));
            assert_eq!(ensemble.score_features(&[0.1234]), 0.0, "{:?}", kind);
            assert_eq!(ensemble.score_features(&[0.1]), 1.0, "{:?}", kind);
        }
    }

    #[test]
    fn test_backends_agree() {
        let mut rng = StdRng::seed_from_u64(11);
        // Mix of depths, several of them with unrolled walks.
        let trees = random_trees(&mut rng, 60, 12, 10);
        let ensembles: Vec<Ensemble> = BACKENDS
            .iter()
            .map(|kind| build(&trees, 12, ScorerConfig::default().set_backend(*kind)))
            .collect();
        for _ in 0..300 {
            let v = random_features(&mut rng, 12);
            let expected = reference(&trees, &v);
            for ensemble in &ensembles {
                assert_eq!(ensemble.score_features(&v).to_bits(), expected.to_bits());
            }
        }
    }

    #[test]
    fn test_batch_matches_single() {
        let mut rng = StdRng::seed_from_u64(17);
        let trees = random_trees(&mut rng, 25, 6, 8);
        for kind in BACKENDS {
            let ensemble = build(&trees, 6, ScorerConfig::default().set_backend(kind));
            for n in [1, 5, 8, 13, 16, 40] {
                let vectors: Vec<FeatureVector> =
                    (0..n).map(|_| FeatureVector::from(random_features(&mut rng, 6))).collect();
                let mut scores = vec![0.0; n];
                ensemble.score_batch(&vectors, &mut scores);
                for (v, s) in vectors.iter().zip(&scores) {
                    assert_eq!(s.to_bits(), ensemble.score(v).to_bits(), "{:?} batch {}", kind, n);
                }
            }
        }
    }

    #[test]
    fn test_parallel_batch_matches_single() {
        let mut rng = StdRng::seed_from_u64(19);
        let trees = random_trees(&mut rng, 20, 5, 6);
        for kind in BACKENDS {
            let config = ScorerConfig::default()
                .set_backend(kind)
                .set_parallel_batch(true)
                .set_parallel_min_batch(16);
            let ensemble = build(&trees, 5, config);
            let vectors: Vec<Vec<f32>> = (0..301).map(|_| random_features(&mut rng, 5)).collect();
            let mut scores = vec![0.0; 301];
            ensemble.score_many(&vectors, &mut scores);
            for (v, s) in vectors.iter().zip(&scores) {
                assert_eq!(s.to_bits(), ensemble.score_features(v).to_bits());
            }
        }
    }

    #[test]
    fn test_single_leaf_is_constant() {
        for kind in BACKENDS {
            let ensemble = build(&[Node::leaf(2.5)], 3, ScorerConfig::default().set_backend(kind));
            assert_eq!(ensemble.score_features(&[0.0, 0.0, 0.0]), 2.5);
            assert_eq!(ensemble.score_features(&[-7.0, f32::NAN, 1e9]), 2.5);
        }
    }

    #[test]
    fn test_depth4_paths() {
        let tree = indexed_depth4_tree();
        let ensemble = build(&[tree], 4, ScorerConfig::default());
        for leaf in 0..16u32 {
            let v: Vec<f32> = (0..4).map(|l| ((leaf >> (3 - l)) & 1) as f32).collect();
            assert_eq!(ensemble.score_features(&v), leaf as f32);
        }
    }

    #[test]
    fn test_reset_and_reuse() {
        let mut rng = StdRng::seed_from_u64(23);
        let trees = random_trees(&mut rng, 10, 4, 5);
        let ensemble = build(&trees, 4, ScorerConfig::default());
        let values = random_features(&mut rng, 4);

        let mut fresh = ensemble.new_feature_vector(None);
        fresh.as_mut_slice().copy_from_slice(&values);

        let mut reused = ensemble.new_feature_vector(None);
        reused.as_mut_slice().copy_from_slice(&random_features(&mut rng, 4));
        let mut reused = ensemble.new_feature_vector(Some(reused));
        for (i, x) in values.iter().enumerate() {
            reused.set(i, *x);
        }
        assert_eq!(ensemble.score(&fresh).to_bits(), ensemble.score(&reused).to_bits());
    }

    #[test]
    fn test_shared_across_threads() {
        let mut rng = StdRng::seed_from_u64(29);
        let trees = random_trees(&mut rng, 30, 8, 8);
        let vectors: Vec<Vec<f32>> = (0..64).map(|_| random_features(&mut rng, 8)).collect();
        let ensemble = Arc::new(build(&trees, 8, ScorerConfig::default().set_backend(BackendKind::Native)));
        let expected: Vec<f32> = vectors.iter().map(|v| ensemble.score_features(v)).collect();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ensemble = Arc::clone(&ensemble);
                let vectors = vectors.clone();
                thread::spawn(move || vectors.iter().map(|v| ensemble.score_features(v)).collect::<Vec<f32>>())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_feature_out_of_range_fails_build() {
        let mut builder = EnsembleBuilder::new(3);
        let tree = Node::split(Node::leaf(1.0), Node::leaf(0.0), 3, 0.5);
        assert!(matches!(builder.add_tree(tree), Err(ScorerError::FeatureOutOfRange(3, 3))));
        assert_eq!(builder.num_trees(), 0);
    }

    #[test]
    fn test_depth_limits_fail_build() {
        let mut rng = StdRng::seed_from_u64(31);
        let deep = random_trees(&mut rng, 1, 2, 11).remove(0);
        let depth = deep.depth();
        let mut builder = EnsembleBuilder::new(2).with_config(ScorerConfig::default().set_max_depth(depth - 1));
        builder.add_tree(deep.clone()).unwrap();
        assert!(matches!(builder.build(), Err(ScorerError::DepthLimitExceeded(0, d, _)) if d == depth));

        if depth > MAX_NATIVE_DEPTH {
            let mut builder =
                EnsembleBuilder::new(2).with_config(ScorerConfig::default().set_backend(BackendKind::Native));
            builder.add_tree(deep).unwrap();
            assert!(matches!(
                builder.build(),
                Err(ScorerError::DepthLimitExceeded(0, _, MAX_NATIVE_DEPTH))
            ));
        }
    }

    #[test]
    fn test_degenerate_chain_fails_build() {
        let mut builder = EnsembleBuilder::new(1);
        builder.add_tree(chain_tree(200_000)).unwrap();
        assert!(matches!(
            builder.build(),
            Err(ScorerError::DepthLimitExceeded(0, 200_000, DEFAULT_MAX_DEPTH))
        ));

        let mut builder =
            EnsembleBuilder::new(1).with_config(ScorerConfig::default().set_backend(BackendKind::Native));
        builder.add_tree(chain_tree(200_000)).unwrap();
        assert!(matches!(
            builder.build(),
            Err(ScorerError::DepthLimitExceeded(0, 200_000, MAX_NATIVE_DEPTH))
        ));
    }

    #[test]
    fn test_codegen_limit_fails_build() {
        let config = ScorerConfig::default()
            .set_backend(BackendKind::Compiled)
            .set_codegen_limits(2, 100);
        let mut builder = EnsembleBuilder::new(4).with_config(config);
        builder.add_trees(vec![indexed_depth4_tree(); 3]).unwrap();
        assert!(builder.emit_rust_source().is_err());
        assert!(matches!(builder.build(), Err(ScorerError::CodeSizeLimitExceeded(_, 3, 2))));
    }

    #[test]
    fn test_names_usage_and_destroy() {
        let trees = vec![
            Node::split(Node::leaf(1.0), Node::split(Node::leaf(2.0), Node::leaf(3.0), 1, 0.0), 0, 0.5),
            Node::split(Node::leaf(1.0), Node::leaf(0.0), 1, 0.1),
        ];
        for kind in BACKENDS {
            let ensemble = build(&trees, 2, ScorerConfig::default().set_backend(kind));
            let name = if kind == BackendKind::Compiled {
                "codegen_additive_decision_tree"
            } else {
                "nobrch_additive_decision_tree"
            };
            assert_eq!(ensemble.name(), name);
            assert_eq!(ensemble.size(), 2);
            assert_eq!(ensemble.num_trees(), 2);
            assert_eq!(ensemble.backend_kind(), kind);
            assert_eq!(ensemble.feature_usage().get(&0), Some(&1));
            assert_eq!(ensemble.feature_usage().get(&1), Some(&2));
            assert!(ensemble.memory_usage() > std::mem::size_of::<Ensemble>());
            ensemble.destroy();
        }
    }

    #[test]
    fn test_empty_ensemble_scores_zero() {
        for kind in BACKENDS {
            let ensemble = EnsembleBuilder::new(2)
                .with_config(ScorerConfig::default().set_backend(kind))
                .build()
                .unwrap();
            assert_eq!(ensemble.score_features(&[1.0, 2.0]), 0.0);
        }
    }
}
