use std::fmt::Display;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// Which hidden states make up a molecule's embedding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum EmbeddingType {
    /// The BERT pooler output over the `[CLS]` token.
    #[default]
    #[serde(rename = "pooled")]
    Pooled,

    /// The mean of every token's final hidden state.
    #[serde(rename = "average")]
    Average,

    /// [EmbeddingType::Average] followed by [EmbeddingType::Pooled].
    #[serde(rename = "average-1-cat-pooled")]
    AverageCatPooled,
}

impl EmbeddingType {
    /// the length of the embedding for a model with `hidden_size` features
    pub fn dim(self, hidden_size: usize) -> usize {
        match self {
            Self::Pooled | Self::Average => hidden_size,
            Self::AverageCatPooled => 2 * hidden_size,
        }
    }
}

impl FromStr for EmbeddingType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pooled" => Ok(Self::Pooled),
            "average" => Ok(Self::Average),
            "average-1-cat-pooled" => Ok(Self::AverageCatPooled),
            _ => Err(ConfigError::EmbeddingType(s.to_owned())),
        }
    }
}

impl Display for EmbeddingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pooled => "pooled",
            Self::Average => "average",
            Self::AverageCatPooled => "average-1-cat-pooled",
        };
        f.write_str(s)
    }
}

/// The compute device to run the model on, written `cpu`, `cuda`, `cuda:N`,
/// `metal` or `metal:N`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl FromStr for DeviceSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ConfigError::Device(s.to_owned());
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, n)) => (kind, n.parse().map_err(|_| err())?),
            None => (s, 0),
        };
        match kind.to_ascii_lowercase().as_str() {
            "cpu" if ordinal == 0 && !s.contains(':') => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(ordinal)),
            "metal" => Ok(Self::Metal(ordinal)),
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// BERT hyperparameters. These have to match the checkpoint. The defaults
/// are the BERT-base shape used by MolBERT; the vocabulary size comes from
/// the vocabulary, not from here.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub max_position_embeddings: usize,
    pub type_vocab_size: usize,
    pub layer_norm_eps: f64,

    /// The key prefix of the BERT weights in the checkpoint. Lightning
    /// checkpoints of MolBERT nest them under `model.bert`.
    pub weights_prefix: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
            weights_prefix: "model.bert".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The pretrained model weights, either a Lightning `.ckpt` or a
    /// `.safetensors` file.
    pub checkpoint_path: PathBuf,

    pub embedding_type: EmbeddingType,

    /// The maximum number of tokens per molecule, including `[CLS]` and
    /// `[SEP]`. Longer SMILES are marked invalid.
    pub max_seq_len: usize,

    pub device: DeviceSpec,

    /// The number of threads to use for featurization. 1 runs strictly
    /// sequentially, 0 uses the number of logical CPUs as detected by rayon.
    pub threads: usize,

    /// A vocabulary file with one token per line, replacing the built-in
    /// SMILES vocabulary. Required for any checkpoint not trained on the
    /// built-in vocabulary; a size mismatch fails at load time.
    pub vocab_path: Option<PathBuf>,

    pub model: ModelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from("checkpoints/last.ckpt"),
            embedding_type: EmbeddingType::Pooled,
            max_seq_len: 200,
            device: DeviceSpec::Cpu,
            threads: 1,
            vocab_path: None,
            model: ModelConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// the length of the vectors this configuration produces
    pub fn dim(&self) -> usize {
        self.embedding_type.dim(self.model.hidden_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.checkpoint_path, Path::new("checkpoints/last.ckpt"));
        assert_eq!(c.embedding_type, EmbeddingType::Pooled);
        assert_eq!(c.max_seq_len, 200);
        assert_eq!(c.device, DeviceSpec::Cpu);
        assert_eq!(c.dim(), 768);
    }

    #[test]
    fn load_toml() {
        let c = Config::load("testfiles/config.toml").unwrap();
        assert_eq!(c.checkpoint_path, Path::new("weights/molbert.safetensors"));
        assert_eq!(c.embedding_type, EmbeddingType::AverageCatPooled);
        assert_eq!(c.max_seq_len, 128);
        assert_eq!(c.device, DeviceSpec::Cuda(1));
        assert_eq!(c.threads, 4);
        assert_eq!(c.model.num_hidden_layers, 6);
        // unspecified keys keep their defaults
        assert_eq!(c.model.hidden_size, 768);
        assert_eq!(c.model.weights_prefix, "model.bert");
        assert_eq!(c.dim(), 1536);
    }

    #[test]
    fn reject_unknown_keys() {
        let err = toml::from_str::<Config>("checkpoint = \"x.ckpt\"\n");
        assert!(err.is_err());
        let err = toml::from_str::<Config>("device = \"tpu\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn parse_devices() {
        assert_eq!("cpu".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cpu);
        assert_eq!("cuda".parse::<DeviceSpec>().unwrap(), DeviceSpec::Cuda(0));
        assert_eq!(
            "cuda:2".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Cuda(2)
        );
        assert_eq!(
            "metal".parse::<DeviceSpec>().unwrap(),
            DeviceSpec::Metal(0)
        );
        assert!("cpu:1".parse::<DeviceSpec>().is_err());
        assert!("cuda:x".parse::<DeviceSpec>().is_err());
        assert!("gpu".parse::<DeviceSpec>().is_err());
    }

    #[test]
    fn parse_embedding_types() {
        for t in [
            EmbeddingType::Pooled,
            EmbeddingType::Average,
            EmbeddingType::AverageCatPooled,
        ] {
            assert_eq!(t.to_string().parse::<EmbeddingType>().unwrap(), t);
        }
        assert!("mean".parse::<EmbeddingType>().is_err());
    }
}
