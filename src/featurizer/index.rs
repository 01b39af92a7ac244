//! Turning SMILES into token ids for the model.

use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;

use crate::error::{FeaturizeError, ModelError};
use crate::smiles;

pub const PAD: &str = "[PAD]";
pub const UNK: &str = "[UNK]";
pub const CLS: &str = "[CLS]";
pub const SEP: &str = "[SEP]";
pub const MASK: &str = "[MASK]";

/// The built-in vocabulary: special tokens first, then every token the SMILES
/// tokenizer produces for organic-subset molecules. This is not the token
/// dictionary of any published checkpoint; real weights need their own
/// vocabulary file.
const DEFAULT_TOKENS: [&str; 47] = [
    PAD, UNK, CLS, SEP, MASK, "C", "c", "N", "n", "O", "o", "S", "s", "P",
    "p", "F", "Cl", "Br", "I", "B", "b", "H", "(", ")", "[", "]", "=", "#",
    "-", "+", "\\", "/", ":", "@", ".", "%", "*", "0", "1", "2", "3", "4",
    "5", "6", "7", "8", "9",
];

#[derive(Clone, Debug)]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids: HashMap<String, u32>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_TOKENS.iter().map(|s| s.to_string()))
    }
}

impl Vocabulary {
    /// token ids are assigned in iteration order. later duplicates are
    /// ignored
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut ret = Self {
            tokens: Vec::new(),
            ids: HashMap::new(),
        };
        for token in tokens {
            if !ret.ids.contains_key(&token) {
                ret.ids.insert(token.clone(), ret.tokens.len() as u32);
                ret.tokens.push(token);
            }
        }
        ret
    }

    /// load a BERT-style vocabulary file with one token per line
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let s = read_to_string(path).map_err(|source| ModelError::Vocab {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(
            s.lines()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(String::from),
        ))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    fn special(&self, token: &'static str) -> Result<u32, ModelError> {
        self.id(token).ok_or(ModelError::SpecialToken(token))
    }
}

/// Maps a SMILES to `[CLS] tokens... [SEP]` ids, rejecting anything the model
/// could not have seen in training.
#[derive(Clone, Debug)]
pub struct SmilesIndexFeaturizer {
    vocab: Vocabulary,
    max_len: usize,
    cls: u32,
    sep: u32,
    pad: u32,
}

impl SmilesIndexFeaturizer {
    pub fn new(vocab: Vocabulary, max_len: usize) -> Result<Self, ModelError> {
        Ok(Self {
            cls: vocab.special(CLS)?,
            sep: vocab.special(SEP)?,
            pad: vocab.special(PAD)?,
            vocab,
            max_len,
        })
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn pad_id(&self) -> u32 {
        self.pad
    }

    pub fn encode(&self, smiles: &str) -> Result<Vec<u32>, FeaturizeError> {
        smiles::validate(smiles)?;
        let tokens = smiles::tokenize(smiles)?;
        let len = tokens.len() + 2;
        if len > self.max_len {
            return Err(FeaturizeError::TooLong {
                len,
                max: self.max_len,
            });
        }
        let mut ids = Vec::with_capacity(len);
        ids.push(self.cls);
        for token in tokens {
            let id = self
                .vocab
                .id(token)
                .ok_or_else(|| FeaturizeError::UnknownToken(token.to_owned()))?;
            ids.push(id);
        }
        ids.push(self.sep);
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use crate::smiles::SmilesError;

    use super::*;

    fn featurizer(max_len: usize) -> SmilesIndexFeaturizer {
        SmilesIndexFeaturizer::new(Vocabulary::default(), max_len).unwrap()
    }

    #[test]
    fn encode_ethanol() {
        let f = featurizer(200);
        let ids = f.encode("CCO").unwrap();
        let tokens: Vec<_> =
            ids.iter().map(|&id| f.vocab().token(id).unwrap()).collect();
        assert_eq!(tokens, vec![CLS, "C", "C", "O", SEP]);
        assert_eq!(f.pad_id(), 0);
    }

    #[test]
    fn encode_limits() {
        let f = featurizer(7);
        assert!(f.encode("CCCCC").is_ok());
        assert!(matches!(
            f.encode("CCCCCC"),
            Err(FeaturizeError::TooLong { len: 8, max: 7 })
        ));
        assert!(matches!(
            featurizer(200).encode("[Na+].[Cl-]"),
            Err(FeaturizeError::UnknownToken(ref t)) if t == "a"
        ));
        assert!(matches!(
            f.encode("not_a_molecule"),
            Err(FeaturizeError::Smiles(SmilesError::UnexpectedChar { .. }))
        ));
    }

    #[test]
    fn load_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        std::fs::write(&path, "[PAD]\n[CLS]\n[SEP]\nC\n\nC\nO\n").unwrap();
        let vocab = Vocabulary::load(&path).unwrap();
        assert_eq!(vocab.len(), 5);
        assert_eq!(vocab.id("O"), Some(4));

        let f = SmilesIndexFeaturizer::new(vocab, 10).unwrap();
        assert_eq!(f.encode("CO").unwrap(), vec![1, 3, 4, 2]);
    }

    #[test]
    fn missing_special_token() {
        let vocab = Vocabulary::new(["[PAD]", "C"].map(String::from));
        assert!(matches!(
            SmilesIndexFeaturizer::new(vocab, 10),
            Err(ModelError::SpecialToken(CLS))
        ));
    }
}
