//! BERT-family sentence encoder using Candle.
//!
//! Model files come from the Hugging Face Hub (sync API inside
//! `spawn_blocking`). Used when the index was built with a transformer model
//! such as a multilingual MiniLM.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, HiddenAct, PositionEmbeddingType};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::encoder::SentenceEncoder;
use crate::pooling::{l2_normalize, PoolingStrategy};
use crate::{EmbedError, Result};

#[derive(Debug, Clone)]
pub struct BertEncoderConfig {
    pub model_id: String,
    pub max_length: usize,
    pub batch_size: usize,
    pub pooling: PoolingStrategy,
    pub use_gpu: bool,
}

impl Default for BertEncoderConfig {
    fn default() -> Self {
        Self {
            model_id: "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".to_string(),
            max_length: 128,
            batch_size: 32,
            pooling: PoolingStrategy::Mean,
            use_gpu: false,
        }
    }
}

impl BertEncoderConfig {
    pub fn with_model(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            ..Self::default()
        }
    }
}

pub struct BertEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    config: BertEncoderConfig,
    dim: usize,
}

impl BertEncoder {
    pub async fn new(config: BertEncoderConfig) -> Result<Self> {
        let start = Instant::now();
        info!("Loading sentence encoder: {}", config.model_id);

        let device = Self::select_device(&config);
        let model_id = config.model_id.clone();
        let (bert_config, tokenizer, weights_path) = tokio::task::spawn_blocking(move || {
            let api = Api::new().map_err(|e| EmbedError::Download(format!("API init: {e}")))?;
            let repo = api.repo(Repo::new(model_id, RepoType::Model));

            let config_path = repo.get("config.json")?;
            let bert_config = Self::load_config(&config_path)?;
            let tokenizer = Tokenizer::from_file(repo.get("tokenizer.json")?)?;
            let weights_path = repo
                .get("model.safetensors")
                .or_else(|_| repo.get("pytorch_model.bin"))?;
            Ok::<_, EmbedError>((bert_config, tokenizer, weights_path))
        })
        .await
        .map_err(|e| EmbedError::Download(e.to_string()))??;

        let vb = if weights_path.extension().map(|e| e == "safetensors").unwrap_or(false) {
            // SAFETY: the weights file is a read-only download owned by the hub cache.
            unsafe { VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)? }
        } else {
            VarBuilder::from_pth(&weights_path, DType::F32, &device)?
        };
        let dim = bert_config.hidden_size;
        let model = BertModel::load(vb, &bert_config)
            .map_err(|e| EmbedError::ModelLoad(e.to_string()))?;
        info!("Encoder loaded in {:.2}s (dim {})", start.elapsed().as_secs_f32(), dim);

        Ok(Self {
            model,
            tokenizer,
            device,
            config,
            dim,
        })
    }

    fn select_device(config: &BertEncoderConfig) -> Device {
        if !config.use_gpu {
            return Device::Cpu;
        }
        #[cfg(feature = "cuda")]
        {
            match Device::new_cuda(0) {
                Ok(device) => return device,
                Err(e) => debug!("CUDA not available: {}, falling back to CPU", e),
            }
        }
        #[cfg(feature = "metal")]
        {
            match Device::new_metal(0) {
                Ok(device) => return device,
                Err(e) => debug!("Metal not available: {}, falling back to CPU", e),
            }
        }
        Device::Cpu
    }

    fn load_config(path: &Path) -> Result<Config> {
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let get_usize = |key: &str, default: usize| {
            json.get(key).and_then(|v| v.as_u64()).map(|v| v as usize).unwrap_or(default)
        };
        let get_f64 = |key: &str, default: f64| json.get(key).and_then(|v| v.as_f64()).unwrap_or(default);
        let hidden_act = match json.get("hidden_act").and_then(|v| v.as_str()) {
            Some("relu") => HiddenAct::Relu,
            Some("gelu_new") | Some("gelu_approximate") => HiddenAct::GeluApproximate,
            _ => HiddenAct::Gelu,
        };

        Ok(Config {
            vocab_size: get_usize("vocab_size", 30522),
            hidden_size: get_usize("hidden_size", 384),
            num_hidden_layers: get_usize("num_hidden_layers", 12),
            num_attention_heads: get_usize("num_attention_heads", 12),
            intermediate_size: get_usize("intermediate_size", 1536),
            hidden_act,
            hidden_dropout_prob: get_f64("hidden_dropout_prob", 0.1),
            max_position_embeddings: get_usize("max_position_embeddings", 512),
            type_vocab_size: get_usize("type_vocab_size", 2),
            initializer_range: get_f64("initializer_range", 0.02),
            layer_norm_eps: get_f64("layer_norm_eps", 1e-12),
            pad_token_id: get_usize("pad_token_id", 0),
            position_embedding_type: PositionEmbeddingType::Absolute,
            use_cache: true,
            classifier_dropout: None,
            model_type: None,
        })
    }

    fn encode_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self.tokenizer.encode_batch(refs, true)?;

        let max_len = self.config.max_length.min(512);
        let mut ids = Vec::with_capacity(texts.len());
        let mut mask = Vec::with_capacity(texts.len());
        for encoding in &encodings {
            let len = encoding.get_ids().len().min(max_len);
            ids.push(encoding.get_ids()[..len].to_vec());
            mask.push(encoding.get_attention_mask()[..len].to_vec());
        }
        let seq_len = ids.iter().map(Vec::len).max().unwrap_or(0);
        for (row_ids, row_mask) in ids.iter_mut().zip(mask.iter_mut()) {
            row_ids.resize(seq_len, 0);
            row_mask.resize(seq_len, 0);
        }

        let batch = texts.len();
        let input_ids = Tensor::new(ids, &self.device)?.reshape((batch, seq_len))?;
        let token_type_ids = input_ids.zeros_like()?;
        let attention_mask = Tensor::new(mask, &self.device)?
            .reshape((batch, seq_len))?
            .to_dtype(DType::F32)?;

        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = self.config.pooling.apply(&hidden, &attention_mask)?;
        Ok(l2_normalize(&pooled)?.to_vec2::<f32>()?)
    }
}

#[async_trait]
impl SentenceEncoder for BertEncoder {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size.max(1)) {
            out.extend(self.encode_chunk(chunk)?);
        }
        debug!("Encoded {} texts with {}", texts.len(), self.config.model_id);
        Ok(out)
    }
}
