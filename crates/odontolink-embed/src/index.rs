//! Read-only vector index over ontology label/synonym embeddings.
//!
//! On disk the index is two files:
//! - `*.meta.json`: `{model_name, dim, count, rows: [{iri, label, text?}]}`
//! - `*.f32`: `count * dim` little-endian f32 values, row-major.
//!
//! Search is approximate: scores come from int8-quantized vectors. Callers
//! re-rank the returned top-k with [`VectorIndex::vector`] and exact cosine.

use std::path::Path;

use odontolink_lexicon::LexiconEntry;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::encoder::SentenceEncoder;
use crate::similarity::{dot_i8, l2_normalize_in_place, quantize_i8};
use crate::{EmbedError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub iri: String,
    pub label: String,
    /// Embedded text when it differs from the label (a synonym).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl IndexRow {
    /// One row per label and per synonym.
    pub fn for_entries(entries: &[LexiconEntry]) -> Vec<IndexRow> {
        let mut rows = Vec::new();
        for e in entries {
            rows.push(IndexRow { iri: e.iri.clone(), label: e.label.clone(), text: None });
            for syn in &e.synonyms {
                rows.push(IndexRow {
                    iri: e.iri.clone(),
                    label: e.label.clone(),
                    text: Some(syn.clone()),
                });
            }
        }
        rows
    }

    pub fn is_synonym(&self) -> bool {
        self.text.as_ref().map(|t| t != &self.label).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub model_name: String,
    pub dim: usize,
    pub count: usize,
    #[serde(alias = "entries")]
    pub rows: Vec<IndexRow>,
}

pub trait VectorIndex: Send + Sync {
    fn meta(&self) -> &IndexMeta;

    fn len(&self) -> usize {
        self.meta().rows.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row(&self, idx: usize) -> Option<&IndexRow> {
        self.meta().rows.get(idx)
    }

    fn vector(&self, idx: usize) -> Option<&[f32]>;

    /// Approximate top-`k` rows for a unit-length query, best first.
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// Brute-force index with an int8 scan.
pub struct FlatVectorIndex {
    meta: IndexMeta,
    vectors: Vec<f32>,
    codes: Vec<i8>,
    scales: Vec<f32>,
}

impl FlatVectorIndex {
    pub fn new(model_name: impl Into<String>, dim: usize, rows: Vec<(IndexRow, Vec<f32>)>) -> Result<Self> {
        let mut meta_rows = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len() * dim);
        for (row, mut v) in rows {
            if v.len() != dim {
                return Err(EmbedError::IndexFormat(format!(
                    "row {} has {} values, expected {}",
                    row.iri,
                    v.len(),
                    dim
                )));
            }
            l2_normalize_in_place(&mut v);
            vectors.extend(v);
            meta_rows.push(row);
        }
        let meta = IndexMeta {
            model_name: model_name.into(),
            dim,
            count: meta_rows.len(),
            rows: meta_rows,
        };
        Ok(Self::from_parts(meta, vectors))
    }

    fn from_parts(meta: IndexMeta, vectors: Vec<f32>) -> Self {
        let mut codes = Vec::with_capacity(vectors.len());
        let mut scales = Vec::with_capacity(meta.count);
        if meta.dim > 0 {
            for chunk in vectors.chunks(meta.dim) {
                let (c, s) = quantize_i8(chunk);
                codes.extend(c);
                scales.push(s);
            }
        }
        Self {
            meta,
            vectors,
            codes,
            scales,
        }
    }

    pub fn load(meta_path: &Path, data_path: &Path) -> Result<Self> {
        if !meta_path.exists() || !data_path.exists() {
            return Err(EmbedError::IndexUnavailable(format!(
                "missing {} or {}",
                meta_path.display(),
                data_path.display()
            )));
        }
        let meta: IndexMeta = serde_json::from_str(&std::fs::read_to_string(meta_path)?)?;
        let bytes = std::fs::read(data_path)?;
        if meta.rows.len() != meta.count {
            return Err(EmbedError::IndexFormat(format!(
                "meta lists {} rows but count is {}",
                meta.rows.len(),
                meta.count
            )));
        }
        let expected = meta.count * meta.dim * 4;
        if bytes.len() != expected {
            return Err(EmbedError::IndexFormat(format!(
                "{} holds {} bytes, expected {}",
                data_path.display(),
                bytes.len(),
                expected
            )));
        }
        let vectors: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        info!(
            "Vector index loaded: {} rows, dim {}, model {}",
            meta.count, meta.dim, meta.model_name
        );
        Ok(Self::from_parts(meta, vectors))
    }

    pub fn save(&self, meta_path: &Path, data_path: &Path) -> Result<()> {
        std::fs::write(meta_path, serde_json::to_vec_pretty(&self.meta)?)?;
        let bytes: Vec<u8> = self.vectors.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(data_path, bytes)?;
        Ok(())
    }

    /// Embed labels and synonyms with `encoder`.
    pub async fn from_texts(
        encoder: &dyn SentenceEncoder,
        rows: Vec<IndexRow>,
    ) -> Result<Self> {
        let texts: Vec<String> = rows
            .iter()
            .map(|r| r.text.clone().unwrap_or_else(|| r.label.clone()))
            .collect();
        let vectors = encoder.encode_batch(&texts).await?;
        Self::new(
            encoder.model_id(),
            encoder.dimension(),
            rows.into_iter().zip(vectors).collect(),
        )
    }
}

impl VectorIndex for FlatVectorIndex {
    fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    fn vector(&self, idx: usize) -> Option<&[f32]> {
        let dim = self.meta.dim;
        self.vectors.get(idx * dim..(idx + 1) * dim)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let dim = self.meta.dim;
        if dim == 0 || query.len() != dim || k == 0 {
            return Vec::new();
        }
        let (q_codes, q_scale) = quantize_i8(query);
        let mut scored: Vec<(usize, f32)> = self
            .codes
            .chunks(dim)
            .zip(&self.scales)
            .enumerate()
            .map(|(i, (codes, scale))| (i, dot_i8(&q_codes, codes) as f32 * q_scale * scale))
            .collect();

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k, |a, b| b.1.total_cmp(&a.1));
            scored.truncate(k);
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
    }
}
