//! Pooling of token embeddings into sentence embeddings (BERT encoder only).

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PoolingStrategy {
    /// Mean over non-padding tokens
    #[default]
    Mean,
    /// First ([CLS]) token
    Cls,
}

impl PoolingStrategy {
    /// `embeddings`: (batch, seq_len, hidden); `attention_mask`: (batch, seq_len) as F32.
    pub fn apply(&self, embeddings: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            PoolingStrategy::Mean => {
                let mask = attention_mask.unsqueeze(2)?.expand(embeddings.shape())?;
                let summed = (embeddings * &mask)?.sum(1)?;
                let counts = attention_mask.unsqueeze(2)?.sum(1)?.clamp(1e-9f32, f32::MAX)?;
                summed.broadcast_div(&counts)
            }
            PoolingStrategy::Cls => embeddings.narrow(1, 0, 1)?.squeeze(1),
        }
    }
}

/// Row-wise L2 normalization of a (batch, hidden) tensor.
pub fn l2_normalize(embeddings: &Tensor) -> candle_core::Result<Tensor> {
    let norms = embeddings.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-9f32, f32::MAX)?;
    embeddings.broadcast_div(&norms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_mean_pool_ignores_padding() {
        let device = Device::Cpu;
        let embeddings = Tensor::from_vec(
            vec![
                1.0f32, 1.0, 3.0, 3.0, // seq 0
                2.0, 2.0, 9.0, 9.0, // seq 1, second token is padding
            ],
            (2, 2, 2),
            &device,
        )
        .unwrap();
        let mask = Tensor::from_vec(vec![1.0f32, 1.0, 1.0, 0.0], (2, 2), &device).unwrap();
        let pooled = PoolingStrategy::Mean.apply(&embeddings, &mask).unwrap().to_vec2::<f32>().unwrap();
        assert!((pooled[0][0] - 2.0).abs() < 1e-5);
        assert!((pooled[1][0] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_cls_and_normalize() {
        let device = Device::Cpu;
        let embeddings = Tensor::from_vec(vec![3.0f32, 4.0, 0.0, 1.0], (1, 2, 2), &device).unwrap();
        let mask = Tensor::from_vec(vec![1.0f32, 1.0], (1, 2), &device).unwrap();
        let cls = PoolingStrategy::Cls.apply(&embeddings, &mask).unwrap();
        let unit = l2_normalize(&cls).unwrap().to_vec2::<f32>().unwrap();
        assert!((unit[0][0] - 0.6).abs() < 1e-5);
        assert!((unit[0][1] - 0.8).abs() < 1e-5);
    }
}
