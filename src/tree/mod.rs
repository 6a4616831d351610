//! Balanced, flattened trees and the array walks that score them.
pub mod balance;
pub mod flat;
pub mod walk;

pub use balance::{balance, balance_to_depth, depth_of, BalancedTree};
pub use flat::{flatten, flatten_arrays, heap_order, FlatTree};
pub use walk::{score_depth4, score_depth6, score_depth8, score_generic, Walker};
