//! Sentence encoders.
//!
//! The [`SentenceEncoder`] trait is the seam between retrieval and the model.
//! [`HashingEncoder`] is a deterministic character n-gram encoder that needs no
//! model download; the Candle BERT encoder is available with the `bert` feature.

use std::sync::Arc;

use ahash::RandomState;
use async_trait::async_trait;
use odontolink_config::VectorConfig;
use odontolink_lexicon::normalize::normalize_surface;

use crate::similarity::l2_normalize_in_place;
use crate::{EmbedError, Result};

#[async_trait]
pub trait SentenceEncoder: Send + Sync {
    /// Identity recorded in index metadata at build time.
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Encode a batch into L2-normalized vectors, one per input, in order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Fixed seeds: an index is only searchable by an encoder hashing alike.
const HASH_SEEDS: [u64; 4] = [
    0x6f64_6f6e_746f_6c69,
    0x6e6b_2d6e_6772_616d,
    0x9e37_79b9_7f4a_7c15,
    0xc2b2_ae3d_27d4_eb4f,
];

/// Feature-hashing encoder over character n-grams of each word.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    model_id: String,
    dim: usize,
    min_n: usize,
    max_n: usize,
    hasher: RandomState,
}

impl HashingEncoder {
    pub fn new(dim: usize) -> Self {
        Self {
            model_id: "odontolink/char-ngram-hash".to_string(),
            dim: dim.max(1),
            min_n: 2,
            max_n: 4,
            hasher: RandomState::with_seeds(HASH_SEEDS[0], HASH_SEEDS[1], HASH_SEEDS[2], HASH_SEEDS[3]),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let normalized = normalize_surface(text);
        for word in normalized.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add_feature(&mut v, word, 2.0);
            let padded: Vec<char> = std::iter::once('<')
                .chain(word.chars())
                .chain(std::iter::once('>'))
                .collect();
            for n in self.min_n..=self.max_n {
                for gram in padded.windows(n) {
                    let s: String = gram.iter().collect();
                    self.add_feature(&mut v, &s, 1.0);
                }
            }
        }
        l2_normalize_in_place(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let h = self.hasher.hash_one(feature);
        let bucket = (h % self.dim as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl SentenceEncoder for HashingEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}

/// Build the encoder named by `config.encoder`.
pub async fn build_encoder(config: &VectorConfig) -> Result<Arc<dyn SentenceEncoder>> {
    match config.encoder.as_str() {
        "hashing" => Ok(Arc::new(
            HashingEncoder::new(config.hashing_dim).with_model_id(&config.model_id),
        )),
        #[cfg(feature = "bert")]
        "bert" => {
            let bert = crate::bert::BertEncoder::new(crate::bert::BertEncoderConfig::with_model(&config.model_id)).await?;
            Ok(Arc::new(bert))
        }
        #[cfg(not(feature = "bert"))]
        "bert" => Err(EmbedError::UnknownEncoder(
            "bert (this build does not include the `bert` feature)".to_string(),
        )),
        other => Err(EmbedError::UnknownEncoder(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::{cosine, norm};

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let enc = HashingEncoder::new(128);
        let a = enc.encode_one("dental implant");
        let b = enc.encode_one("Dental  Implant");
        assert_eq!(a, b);
        assert!((norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_separate_encoders_agree() {
        let a = HashingEncoder::new(64).encode_one("healing abutment");
        let b = HashingEncoder::new(64).with_model_id("other").encode_one("healing abutment");
        assert_eq!(a, b);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let enc = HashingEncoder::new(256);
        let q = enc.encode_one("multi-unit abutment");
        let near = enc.encode_one("multi unit abutment screw");
        let far = enc.encode_one("caries");
        assert!(cosine(&q, &near) > cosine(&q, &far));
        assert!(cosine(&q, &near) > 0.5);
    }

    #[tokio::test]
    async fn test_build_encoder_rejects_unknown() {
        let cfg = VectorConfig { encoder: "word2vec".into(), ..VectorConfig::default() };
        assert!(matches!(build_encoder(&cfg).await, Err(EmbedError::UnknownEncoder(_))));

        let enc = build_encoder(&VectorConfig::default()).await.unwrap();
        assert_eq!(enc.dimension(), 256);
        let out = enc.encode_batch(&["שתל".to_string(), "implant".to_string()]).await.unwrap();
        assert_eq!(out.len(), 2);
    }
}
