//! MolBERT: a BERT encoder pretrained on SMILES, loaded with candle.

use std::path::Path;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use log::{info, trace, warn};
use serde_json::json;

use crate::config::{Config, DeviceSpec, EmbeddingType, ModelConfig};
use crate::error::{FeaturizeError, ModelError};

use super::index::{SmilesIndexFeaturizer, Vocabulary};
use super::Featurizer;

pub struct MolBertFeaturizer {
    bert: BertModel,
    /// `dense` layer of the BERT pooler, applied to the `[CLS]` state
    pooler: Linear,
    index: SmilesIndexFeaturizer,
    embedding_type: EmbeddingType,
    hidden_size: usize,
    device: Device,
}

impl MolBertFeaturizer {
    /// load the vocabulary and checkpoint described by `config` onto its
    /// device
    pub fn load(config: &Config) -> Result<Self, ModelError> {
        let vocab = match &config.vocab_path {
            Some(path) => Vocabulary::load(path)?,
            None => Vocabulary::default(),
        };
        let device = select_device(config.device)?;
        info!(
            "loading MolBERT checkpoint {:?} on {:?}",
            config.checkpoint_path, config.device
        );
        let vb = load_weights(&config.checkpoint_path, &device).map_err(
            |source| ModelError::Checkpoint {
                path: config.checkpoint_path.clone(),
                source,
            },
        )?;
        Self::from_var_builder(vb, config, vocab)
    }

    /// build the model from already loaded weights. the weights are looked up
    /// under `config.model.weights_prefix`
    pub fn from_var_builder(
        vb: VarBuilder,
        config: &Config,
        vocab: Vocabulary,
    ) -> Result<Self, ModelError> {
        let model = &config.model;
        let mut max_seq_len = config.max_seq_len;
        if max_seq_len > model.max_position_embeddings {
            warn!(
                "max_seq_len {max_seq_len} exceeds the model's {} positions",
                model.max_position_embeddings
            );
            max_seq_len = model.max_position_embeddings;
        }

        let index = SmilesIndexFeaturizer::new(vocab, max_seq_len)?;
        let bert_config =
            bert_config(model, index.vocab().len(), index.pad_id())?;
        trace!("{bert_config:?}");

        let device = vb.device().clone();
        let vb = if model.weights_prefix.is_empty() {
            vb
        } else {
            vb.pp(&model.weights_prefix)
        };
        check_vocab_size(&vb, index.vocab().len())?;
        let bert = BertModel::load(vb.clone(), &bert_config)?;
        let pooler = candle_nn::linear(
            model.hidden_size,
            model.hidden_size,
            vb.pp("pooler").pp("dense"),
        )?;

        Ok(Self {
            bert,
            pooler,
            index,
            embedding_type: config.embedding_type,
            hidden_size: model.hidden_size,
            device,
        })
    }

    fn forward(&self, ids: &[u32]) -> candle_core::Result<Vec<f32>> {
        let input_ids = Tensor::new(ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;
        // (1, seq_len, hidden_size)
        let hidden = self.bert.forward(&input_ids, &token_type_ids, None)?;
        let pooled = || -> candle_core::Result<Tensor> {
            self.pooler.forward(&hidden.i((.., 0))?)?.tanh()
        };
        let embedding = match self.embedding_type {
            EmbeddingType::Pooled => pooled()?,
            EmbeddingType::Average => hidden.mean(1)?,
            EmbeddingType::AverageCatPooled => {
                Tensor::cat(&[hidden.mean(1)?, pooled()?], 1)?
            }
        };
        embedding.squeeze(0)?.to_dtype(DType::F32)?.to_vec1()
    }
}

impl Featurizer for MolBertFeaturizer {
    fn dim(&self) -> usize {
        self.embedding_type.dim(self.hidden_size)
    }

    fn transform(&self, smiles: &str) -> Result<Vec<f32>, FeaturizeError> {
        let ids = self.index.encode(smiles)?;
        Ok(self.forward(&ids)?)
    }
}

/// the word embedding table fixes the vocabulary the checkpoint was trained
/// with. weights that are created on demand have nothing to check against
fn check_vocab_size(vb: &VarBuilder, vocab: usize) -> Result<(), ModelError> {
    const WORD_EMBEDDINGS: &str = "embeddings.word_embeddings.weight";
    if !vb.contains_tensor(WORD_EMBEDDINGS) {
        return Ok(());
    }
    let checkpoint = vb.get_unchecked(WORD_EMBEDDINGS)?.dim(0)?;
    if checkpoint != vocab {
        return Err(ModelError::VocabSize { checkpoint, vocab });
    }
    Ok(())
}

fn select_device(spec: DeviceSpec) -> candle_core::Result<Device> {
    match spec {
        DeviceSpec::Cpu => Ok(Device::Cpu),
        DeviceSpec::Cuda(n) => Device::new_cuda(n),
        DeviceSpec::Metal(n) => Device::new_metal(n),
    }
}

/// `.safetensors` files are memory mapped, anything else is read as a
/// PyTorch Lightning checkpoint with the weights in its `state_dict`
fn load_weights(
    path: &Path,
    device: &Device,
) -> candle_core::Result<VarBuilder<'static>> {
    if path.extension().is_some_and(|e| e == "safetensors") {
        // SAFETY: the file is not modified while it is mapped
        return unsafe {
            VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)
        };
    }
    let tensors =
        candle_core::pickle::read_all_with_key(path, Some("state_dict"))?;
    trace!("read {} tensors from {path:?}", tensors.len());
    Ok(VarBuilder::from_tensors(
        tensors.into_iter().collect(),
        DType::F32,
        device,
    ))
}

fn bert_config(
    model: &ModelConfig,
    vocab_size: usize,
    pad_token_id: u32,
) -> Result<BertConfig, serde_json::Error> {
    serde_json::from_value(json!({
        "vocab_size": vocab_size,
        "hidden_size": model.hidden_size,
        "num_hidden_layers": model.num_hidden_layers,
        "num_attention_heads": model.num_attention_heads,
        "intermediate_size": model.intermediate_size,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.1,
        "max_position_embeddings": model.max_position_embeddings,
        "type_vocab_size": model.type_vocab_size,
        "initializer_range": 0.02,
        "layer_norm_eps": model.layer_norm_eps,
        "pad_token_id": pad_token_id,
        "position_embedding_type": "absolute",
        "use_cache": false,
        "classifier_dropout": null,
        "model_type": "bert",
    }))
}

#[cfg(test)]
mod tests {
    use candle_nn::VarMap;

    use super::*;

    fn tiny(embedding_type: EmbeddingType) -> MolBertFeaturizer {
        let config = Config {
            embedding_type,
            max_seq_len: 16,
            model: ModelConfig {
                hidden_size: 8,
                num_hidden_layers: 1,
                num_attention_heads: 2,
                intermediate_size: 16,
                max_position_embeddings: 32,
                ..Default::default()
            },
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        MolBertFeaturizer::from_var_builder(vb, &config, Vocabulary::default())
            .unwrap()
    }

    #[test]
    fn pooled() {
        let f = tiny(EmbeddingType::Pooled);
        assert_eq!(f.dim(), 8);
        let got = f.transform("CC(=O)O").unwrap();
        assert_eq!(got.len(), 8);
        assert!(got.iter().all(|x| (-1.0..=1.0).contains(x)));

        let again = f.transform("CC(=O)O").unwrap();
        approx::assert_abs_diff_eq!(got.as_slice(), again.as_slice());
    }

    #[test]
    fn average_cat_pooled() {
        let f = tiny(EmbeddingType::AverageCatPooled);
        assert_eq!(f.dim(), 16);
        let got = f.transform("c1ccccc1O").unwrap();
        assert_eq!(got.len(), 16);
        assert!(got[8..].iter().all(|x| (-1.0..=1.0).contains(x)));

        let average = tiny(EmbeddingType::Average);
        assert_eq!(average.transform("CCO").unwrap().len(), 8);
    }

    #[test]
    fn rejected_inputs() {
        let f = tiny(EmbeddingType::Pooled);
        assert!(matches!(
            f.transform("not_a_molecule"),
            Err(FeaturizeError::Smiles(_))
        ));
        assert!(matches!(
            f.transform(&"C".repeat(15)),
            Err(FeaturizeError::TooLong { len: 17, max: 16 })
        ));
        assert!(matches!(
            f.transform("[Na+]"),
            Err(FeaturizeError::UnknownToken(_))
        ));
    }

    #[test]
    fn max_seq_len_capped_by_positions() {
        let config = Config {
            max_seq_len: 200,
            model: ModelConfig {
                hidden_size: 4,
                num_hidden_layers: 1,
                num_attention_heads: 1,
                intermediate_size: 4,
                max_position_embeddings: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let f = MolBertFeaturizer::from_var_builder(
            vb,
            &config,
            Vocabulary::default(),
        )
        .unwrap();
        assert_eq!(f.index.max_len(), 10);
        assert!(matches!(
            f.transform(&"C".repeat(9)),
            Err(FeaturizeError::TooLong { len: 11, max: 10 })
        ));
    }

    #[test]
    fn vocab_size_mismatch() {
        let config = Config {
            model: ModelConfig {
                hidden_size: 4,
                num_hidden_layers: 1,
                num_attention_heads: 1,
                intermediate_size: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        let embeddings = Tensor::zeros((60, 4), DType::F32, &Device::Cpu)
            .unwrap();
        let tensors = [(
            "model.bert.embeddings.word_embeddings.weight".to_owned(),
            embeddings,
        )]
        .into_iter()
        .collect();
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &Device::Cpu);
        let err = MolBertFeaturizer::from_var_builder(
            vb,
            &config,
            Vocabulary::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            ModelError::VocabSize {
                checkpoint: 60,
                vocab: 47
            }
        ));
    }

    #[test]
    fn missing_checkpoint() {
        let config = Config {
            checkpoint_path: "testfiles/missing.ckpt".into(),
            ..Default::default()
        };
        assert!(matches!(
            MolBertFeaturizer::load(&config),
            Err(ModelError::Checkpoint { .. })
        ));
    }
}
