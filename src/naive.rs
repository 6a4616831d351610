//! Naive Additive Decision Tree
//!
//! The model as handed over by the parser: plain recursive trees scored by
//! walking nodes. Kept as the inbound representation and as the reference
//! scorer the faster back-ends are checked against.
use crate::config::ScorerConfig;
use crate::data::{FeatureVector, Ranker};
use crate::ensemble::{validate_features, Ensemble, EnsembleBuilder};
use crate::errors::ScorerError;
use crate::node::Node;

/// A validated list of trees over a declared number of features.
#[derive(Clone, Debug, PartialEq)]
pub struct NaiveEnsemble {
    trees: Vec<Node>,
    n_features: usize,
}

impl NaiveEnsemble {
    /// Fails if any split reads a feature id outside `[0, n_features)`.
    pub fn new(trees: Vec<Node>, n_features: usize) -> Result<Self, ScorerError> {
        for tree in &trees {
            validate_features(tree, n_features)?;
        }
        Ok(NaiveEnsemble { trees, n_features })
    }

    pub fn trees(&self) -> &[Node] {
        &self.trees
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Compile into a scoring ensemble with the back-end of `config`.
    pub fn into_ensemble(self, config: &ScorerConfig) -> Result<Ensemble, ScorerError> {
        let mut builder = EnsembleBuilder::new(self.n_features).with_config(config.clone());
        builder.add_trees(self.trees)?;
        builder.build()
    }
}

impl Ranker for NaiveEnsemble {
    fn name(&self) -> &'static str {
        "naive_additive_decision_tree"
    }

    fn size(&self) -> usize {
        self.n_features
    }

    fn score(&self, vector: &FeatureVector) -> f32 {
        let mut score = 0.0f32;
        for tree in &self.trees {
            score += tree.predict(vector.as_slice());
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use crate::testing::{random_features, random_trees};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_new_validates_features() {
        let trees = vec![
            Node::leaf(1.0),
            Node::split(Node::leaf(1.0), Node::leaf(0.0), 5, 0.5),
        ];
        assert!(matches!(
            NaiveEnsemble::new(trees.clone(), 5),
            Err(ScorerError::FeatureOutOfRange(5, 5))
        ));
        let naive = NaiveEnsemble::new(trees, 6).unwrap();
        assert_eq!(naive.num_trees(), 2);
        assert_eq!(naive.size(), 6);
        assert_eq!(naive.name(), "naive_additive_decision_tree");
    }

    #[test]
    fn test_into_ensemble_matches_naive() {
        let mut rng = StdRng::seed_from_u64(41);
        let naive = NaiveEnsemble::new(random_trees(&mut rng, 15, 10, 7), 10).unwrap();
        for kind in [BackendKind::UnrolledWalk, BackendKind::Compiled] {
            let ensemble = naive.clone().into_ensemble(&ScorerConfig::default().set_backend(kind)).unwrap();
            assert_eq!(ensemble.size(), naive.size());
            for _ in 0..100 {
                let v = FeatureVector::from(random_features(&mut rng, 10));
                assert_eq!(ensemble.score(&v).to_bits(), naive.score(&v).to_bits());
            }
        }
    }

    #[test]
    fn test_equal_split_goes_right() {
        let naive = NaiveEnsemble::new(vec![Node::split(Node::leaf(1.0), Node::leaf(0.0), 0, 0.1234)], 1).unwrap();
        assert_eq!(naive.score(&FeatureVector::from(vec![0.1234])), 0.0);
    }
}
