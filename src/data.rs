//! Feature vectors
//!
//! The fixed-size, reusable array of feature values a model is scored
//! against, and the [`Ranker`] contract shared by every scorer.
use std::ops::{Index, IndexMut};

/// Dense feature values addressed by feature id.
///
/// Vectors are owned by the caller and reused across queries through
/// [`FeatureVector::reset`] rather than reallocated.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
}

impl FeatureVector {
    /// A zero-filled vector of `size` features.
    pub fn new(size: usize) -> Self {
        FeatureVector { values: vec![0.0; size] }
    }

    /// Zero every feature, keeping the allocation.
    pub fn reset(&mut self) {
        self.values.fill(0.0);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, feature: usize, value: f32) {
        self.values[feature] = value;
    }

    pub fn get(&self, feature: usize) -> Option<f32> {
        self.values.get(feature).copied()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        FeatureVector { values }
    }
}

impl AsRef<[f32]> for FeatureVector {
    fn as_ref(&self) -> &[f32] {
        &self.values
    }
}

impl Index<usize> for FeatureVector {
    type Output = f32;

    fn index(&self, feature: usize) -> &f32 {
        &self.values[feature]
    }
}

impl IndexMut<usize> for FeatureVector {
    fn index_mut(&mut self, feature: usize) -> &mut f32 {
        &mut self.values[feature]
    }
}

/// Uniform contract of a ranking model over dense feature vectors.
pub trait Ranker: Send + Sync {
    /// Model family name.
    fn name(&self) -> &'static str;

    /// Number of features the model reads.
    fn size(&self) -> usize;

    /// Score a single feature vector.
    fn score(&self, vector: &FeatureVector) -> f32;

    /// Score every vector of `vectors` into the matching slot of `scores`.
    ///
    /// Panics if `scores` is shorter than `vectors`.
    fn score_batch(&self, vectors: &[FeatureVector], scores: &mut [f32]) {
        assert!(vectors.len() <= scores.len(), "scores shorter than the batch");
        for (s, v) in scores.iter_mut().zip(vectors) {
            *s = self.score(v);
        }
    }

    /// A vector sized for this model, recycling `reuse` when given.
    fn new_feature_vector(&self, reuse: Option<FeatureVector>) -> FeatureVector {
        match reuse {
            Some(mut vector) => {
                vector.reset();
                vector.values.resize(self.size(), 0.0);
                vector
            }
            None => FeatureVector::new(self.size()),
        }
    }

    /// `n` vectors sized for this model.
    ///
    /// The pooled set is recycled only when it holds at least `n` vectors,
    /// in which case every pooled vector is reset and all are returned.
    fn new_feature_vectors(&self, reuse: Option<Vec<FeatureVector>>, n: usize) -> Vec<FeatureVector> {
        match reuse {
            Some(mut vectors) if vectors.len() >= n => {
                for vector in vectors.iter_mut() {
                    vector.reset();
                    vector.values.resize(self.size(), 0.0);
                }
                vectors
            }
            _ => (0..n).map(|_| FeatureVector::new(self.size())).collect(),
        }
    }
}
