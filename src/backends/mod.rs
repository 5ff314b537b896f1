//! Classifier implementations
//!
//! Only the deterministic heuristic ships today.

pub mod heuristic;

pub use self::heuristic::HeuristicClassifier;
