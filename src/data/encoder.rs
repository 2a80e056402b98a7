use std::path::Path;

use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::error::{Result, TrainError};

const PAD_ID: u32 = 0;
const CLS_ID: u32 = 1;
const SEP_ID: u32 = 2;
const FIRST_WORD_ID: u32 = 4;

/// The output of encoding - ready to be converted to tensors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedText {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
}

enum Backing {
    /// A HuggingFace `tokenizer.json`
    Pretrained(Box<Tokenizer>),
    /// Lowercased whitespace words hashed into a fixed vocabulary
    Hashed { vocab_size: usize },
}

/// Turns a text (or text pair) into fixed-length model inputs.
pub struct TextEncoder {
    backing: Backing,
    pub max_length: usize,
    pad_token_id: u32,
}

impl TextEncoder {
    /// Loads `tokenizer.json`; when no path is given, falls back to
    /// hashing words into `fallback_vocab` buckets.
    pub fn new(tokenizer_path: Option<&Path>, max_length: usize, fallback_vocab: usize) -> Result<Self> {
        match tokenizer_path {
            Some(path) => Self::from_file(path, max_length),
            None => {
                warn!("No tokenizer given, using hashed word encoder ({} buckets)", fallback_vocab);
                Ok(Self::hashed(max_length, fallback_vocab))
            }
        }
    }

    pub fn from_file(path: &Path, max_length: usize) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| TrainError::Tokenizer(format!("{}: {e}", path.display())))?;
        let pad_token_id = tokenizer.token_to_id("[PAD]").unwrap_or(PAD_ID);
        info!(
            "Loaded tokenizer from {} (vocab {})",
            path.display(),
            tokenizer.get_vocab_size(true)
        );
        Ok(Self {
            backing: Backing::Pretrained(Box::new(tokenizer)),
            max_length,
            pad_token_id,
        })
    }

    pub fn hashed(max_length: usize, vocab_size: usize) -> Self {
        Self {
            backing: Backing::Hashed {
                vocab_size: vocab_size.max(FIRST_WORD_ID as usize + 1),
            },
            max_length,
            pad_token_id: PAD_ID,
        }
    }

    pub fn vocab_size(&self) -> usize {
        match &self.backing {
            Backing::Pretrained(tokenizer) => tokenizer.get_vocab_size(true),
            Backing::Hashed { vocab_size } => *vocab_size,
        }
    }

    /// Encodes `text`, or the pair `text [SEP] pair` with segment ids 0/1.
    pub fn encode(&self, text: &str, pair: Option<&str>) -> Result<EncodedText> {
        let mut encoded = match &self.backing {
            Backing::Pretrained(tokenizer) => {
                let encoding = match pair {
                    Some(pair) => tokenizer.encode((text, pair), true),
                    None => tokenizer.encode(text, true),
                }
                .map_err(|e| TrainError::Tokenizer(e.to_string()))?;
                EncodedText {
                    input_ids: encoding.get_ids().to_vec(),
                    attention_mask: encoding.get_attention_mask().to_vec(),
                    token_type_ids: encoding.get_type_ids().to_vec(),
                }
            }
            Backing::Hashed { vocab_size } => Self::hash_encode(text, pair, *vocab_size),
        };

        Self::pad_or_truncate(&mut encoded.input_ids, self.max_length, self.pad_token_id);
        Self::pad_or_truncate(&mut encoded.attention_mask, self.max_length, 0);
        Self::pad_or_truncate(&mut encoded.token_type_ids, self.max_length, 0);
        Ok(encoded)
    }

    /// `[CLS] text [SEP] (pair [SEP])`
    fn hash_encode(text: &str, pair: Option<&str>, vocab_size: usize) -> EncodedText {
        let mut input_ids = vec![CLS_ID];
        let mut token_type_ids = vec![0];

        for (segment, part) in std::iter::once(text).chain(pair).enumerate() {
            for word in part.split_whitespace() {
                input_ids.push(Self::word_id(word, vocab_size));
                token_type_ids.push(segment as u32);
            }
            input_ids.push(SEP_ID);
            token_type_ids.push(segment as u32);
        }

        EncodedText {
            attention_mask: vec![1; input_ids.len()],
            input_ids,
            token_type_ids,
        }
    }

    /// FNV-1a over the lowercased word, folded into the word id range.
    fn word_id(word: &str, vocab_size: usize) -> u32 {
        let hash = word
            .chars()
            .flat_map(char::to_lowercase)
            .fold(0xcbf29ce484222325u64, |h, c| {
                (h ^ c as u64).wrapping_mul(0x100000001b3)
            });
        let buckets = (vocab_size as u64).saturating_sub(FIRST_WORD_ID as u64).max(1);
        FIRST_WORD_ID + (hash % buckets) as u32
    }

    fn pad_or_truncate(vec: &mut Vec<u32>, target: usize, pad_value: u32) {
        vec.resize(target, pad_value);
    }
}
