//! Featurizers turn a single SMILES string into an embedding vector.

use crate::error::FeaturizeError;

pub mod index;
pub mod molbert;

pub use index::{SmilesIndexFeaturizer, Vocabulary};
pub use molbert::MolBertFeaturizer;

/// A model that embeds one molecule at a time. Implementations must be
/// shareable across the featurization threads.
pub trait Featurizer: Sync {
    /// the length of every vector returned by [Featurizer::transform]
    fn dim(&self) -> usize;

    /// embed `smiles`, or explain why it can't be embedded
    fn transform(&self, smiles: &str) -> Result<Vec<f32>, FeaturizeError>;
}
