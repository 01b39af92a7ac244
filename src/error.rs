use std::path::PathBuf;

use thiserror::Error;

use crate::smiles::SmilesError;

/// Failures reading the input table. These abort the run before anything is
/// written.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read input table {path:?}: {source}")]
    Read { path: PathBuf, source: csv::Error },

    #[error("column `{column}` not found in {path:?}, available: {available:?}")]
    MissingColumn {
        column: String,
        path: PathBuf,
        available: Vec<String>,
    },
}

/// Failures persisting the output table.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write output table {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("embeddings do not all have {dim} entries")]
    Shape { dim: usize },

    #[error("failed to flush output table {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unrecognized device `{0}`, expected cpu, cuda[:N] or metal[:N]")]
    Device(String),

    #[error("unrecognized embedding type `{0}`")]
    EmbeddingType(String),
}

/// Failures constructing the featurizer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to load checkpoint {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        source: candle_core::Error,
    },

    #[error("failed to read vocabulary {path:?}: {source}")]
    Vocab {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("vocabulary is missing the special token {0}")]
    SpecialToken(&'static str),

    #[error(
        "the checkpoint embeds {checkpoint} tokens but the vocabulary has \
         {vocab}; set vocab_path to the checkpoint's vocabulary"
    )]
    VocabSize { checkpoint: usize, vocab: usize },

    #[error("invalid model configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

/// Per-row failures. These never escape the featurization loop: the row is
/// marked invalid and gets a zero vector instead.
#[derive(Debug, Error)]
pub enum FeaturizeError {
    #[error("invalid SMILES: {0}")]
    Smiles(#[from] SmilesError),

    #[error("token `{0}` is not in the vocabulary")]
    UnknownToken(String),

    #[error("sequence of {len} tokens exceeds the maximum length {max}")]
    TooLong { len: usize, max: usize },

    #[error("embedding has {got} entries, expected {want}")]
    Dimension { got: usize, want: usize },

    #[error("featurizer panicked: {0}")]
    Panic(String),

    #[error("model failure: {0}")]
    Model(#[from] candle_core::Error),
}

/// The fatal errors of a featurization run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Write(#[from] WriteError),
}
