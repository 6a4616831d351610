//! Specializing compiler
//!
//! Turns a fixed ensemble into code with every threshold, feature id and
//! leaf output baked in as a constant, so scoring reads no tree tables.
//!
//! Two forms are produced from the same trees:
//! * [`CompiledEnsemble`], nested closures built in-process at model load.
//! * [`emit_rust_source`], a standalone Rust source unit for ahead-of-time
//!   compilation into a host crate.
//!
//! Both follow the crate-wide routing rule: right iff `threshold <= value`.
use crate::errors::ScorerError;
use crate::node::Node;
use std::fmt::{self, Write};

type TreeFn = Box<dyn Fn(&[f32]) -> f32 + Send + Sync>;

/// Code size ceiling for the compiled forms.
///
/// Generated code grows with the ensemble; past these limits the build fails
/// instead of truncating the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodegenLimits {
    pub max_trees: usize,
    pub max_nodes_per_tree: usize,
}

fn check_limits(trees: &[Node], limits: &CodegenLimits) -> Result<(), ScorerError> {
    if trees.len() > limits.max_trees {
        return Err(ScorerError::CodeSizeLimitExceeded(
            "tree count".to_string(),
            trees.len(),
            limits.max_trees,
        ));
    }
    for tree in trees {
        let count = tree.count();
        if count > limits.max_nodes_per_tree {
            return Err(ScorerError::CodeSizeLimitExceeded(
                "nodes per tree".to_string(),
                count,
                limits.max_nodes_per_tree,
            ));
        }
    }
    Ok(())
}

/// An ensemble compiled into one closure tree per decision tree.
pub struct CompiledEnsemble {
    trees: Vec<TreeFn>,
    n_leaves: usize,
    n_splits: usize,
}

impl CompiledEnsemble {
    pub fn compile(trees: &[Node], limits: &CodegenLimits) -> Result<Self, ScorerError> {
        check_limits(trees, limits)?;
        let n_leaves = trees.iter().map(|t| t.count_leaves()).sum::<usize>();
        let n_splits = trees.iter().map(|t| t.count()).sum::<usize>() - n_leaves;
        Ok(CompiledEnsemble {
            trees: trees.iter().map(compile_node).collect(),
            n_leaves,
            n_splits,
        })
    }

    /// Sum of the compiled trees, in tree order.
    pub fn score(&self, features: &[f32]) -> f32 {
        let mut score = 0.0f32;
        for tree in &self.trees {
            score += tree(features);
        }
        score
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Approximate bytes held by the captured constants and closure boxes.
    pub fn memory_usage(&self) -> usize {
        let split = 2 * std::mem::size_of::<TreeFn>() + std::mem::size_of::<usize>() + std::mem::size_of::<f32>();
        std::mem::size_of::<Self>()
            + self.trees.len() * std::mem::size_of::<TreeFn>()
            + self.n_leaves * std::mem::size_of::<f32>()
            + self.n_splits * split
    }
}

impl fmt::Debug for CompiledEnsemble {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompiledEnsemble")
            .field("trees", &self.trees.len())
            .field("n_leaves", &self.n_leaves)
            .field("n_splits", &self.n_splits)
            .finish()
    }
}

fn compile_node(node: &Node) -> TreeFn {
    match node {
        Node::Leaf { output } => {
            let output = *output;
            Box::new(move |_| output)
        }
        Node::Split {
            left,
            right,
            feature,
            threshold,
        } => {
            let (left, right) = (compile_node(left), compile_node(right));
            let (feature, threshold) = (*feature as usize, *threshold);
            Box::new(move |f| {
                if threshold <= f[feature] {
                    right(f)
                } else {
                    left(f)
                }
            })
        }
    }
}

/// Rust literal for `v`, exact under round trip.
fn float_literal(v: f32) -> String {
    if v.is_nan() {
        "f32::NAN".to_string()
    } else if v == f32::INFINITY {
        "f32::INFINITY".to_string()
    } else if v == f32::NEG_INFINITY {
        "f32::NEG_INFINITY".to_string()
    } else {
        format!("{:?}_f32", v)
    }
}

fn emit_node(out: &mut String, node: &Node, indent: usize) -> fmt::Result {
    let pad = "    ".repeat(indent);
    match node {
        Node::Leaf { output } => writeln!(out, "{}{}", pad, float_literal(*output)),
        // Nothing compares true against NaN.
        Node::Split { left, threshold, .. } if threshold.is_nan() => emit_node(out, left, indent),
        Node::Split {
            left,
            right,
            feature,
            threshold,
        } => {
            writeln!(out, "{}if {} <= f[{}] {{", pad, float_literal(*threshold), feature)?;
            emit_node(out, right, indent + 1)?;
            writeln!(out, "{}}} else {{", pad)?;
            emit_node(out, left, indent + 1)?;
            writeln!(out, "{}}}", pad)
        }
    }
}

// Whether the emitted body of `node` indexes the feature slice.
fn reads_features(node: &Node) -> bool {
    match node {
        Node::Leaf { .. } => false,
        Node::Split { left, threshold, .. } if threshold.is_nan() => reads_features(left),
        Node::Split { .. } => true,
    }
}

fn emit_unit(out: &mut String, trees: &[Node], n_features: usize) -> fmt::Result {
    writeln!(out, "// Generated by branchfree. Do not edit.")?;
    writeln!(out)?;
    writeln!(out, "pub const N_FEATURES: usize = {};", n_features)?;
    writeln!(out, "pub const N_TREES: usize = {};", trees.len())?;
    for (i, tree) in trees.iter().enumerate() {
        let arg = if reads_features(tree) { "f" } else { "_" };
        writeln!(out)?;
        writeln!(out, "#[inline(always)]")?;
        writeln!(out, "fn eval_tree_{}({}: &[f32]) -> f32 {{", i, arg)?;
        emit_node(out, tree, 1)?;
        writeln!(out, "}}")?;
    }
    writeln!(out)?;
    writeln!(out, "/// Score a feature vector of at least `N_FEATURES` values.")?;
    writeln!(out, "pub fn score(f: &[f32]) -> f32 {{")?;
    writeln!(out, "    let mut score = 0.0_f32;")?;
    for i in 0..trees.len() {
        writeln!(out, "    score += eval_tree_{}(f);", i)?;
    }
    writeln!(out, "    score")?;
    writeln!(out, "}}")
}

/// Emit a Rust source unit scoring `trees`.
///
/// The unit exposes `N_FEATURES`, `N_TREES` and `pub fn score(f: &[f32]) -> f32`
/// and is meant to be pulled into a crate with `include!`. A split on a NaN
/// threshold never routes right, so only its left subtree is emitted.
pub fn emit_rust_source(trees: &[Node], n_features: usize, limits: &CodegenLimits) -> Result<String, ScorerError> {
    check_limits(trees, limits)?;
    let mut out = String::new();
    emit_unit(&mut out, trees, n_features).map_err(|e| ScorerError::UnableToWrite(e.to_string()))?;
    Ok(out)
}
