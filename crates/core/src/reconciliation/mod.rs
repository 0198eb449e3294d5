//! Dataset reconciliation: normalization, classification and the run engine

pub mod classifier;
pub mod engine;
pub mod normalizer;

pub use classifier::{Divergence, MismatchClassifier};
pub use engine::{ReconciliationDependencies, ReconciliationEngine, ReconciliationSettings};
pub use normalizer::Normalizer;
