#[cfg(test)]
mod testing;

// Modules
pub mod codegen;
pub mod config;
pub mod constants;
pub mod data;
pub mod ensemble;
pub mod errors;
pub mod naive;
pub mod native;
pub mod node;
pub mod tree;

// Individual classes, and functions
pub use config::{BackendKind, ScorerConfig, ScorerIO};
pub use data::{FeatureVector, Ranker};
pub use ensemble::{Ensemble, EnsembleBuilder};
pub use naive::NaiveEnsemble;
pub use node::Node;
