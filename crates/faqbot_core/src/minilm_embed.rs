use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;

use crate::embed::EmbeddingProvider;

/// Longest input kept per text; sentence-transformers truncates
/// all-MiniLM-L6-v2 at this length too.
const MAX_TOKENS: usize = 256;

/// The subset of a BERT `config.json` the encoder needs. Missing fields
/// fall back to all-MiniLM-L6-v2.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct BertConfig {
    hidden_size: usize,
    intermediate_size: usize,
    num_attention_heads: usize,
    num_hidden_layers: usize,
    vocab_size: usize,
    max_position_embeddings: usize,
    type_vocab_size: usize,
    layer_norm_eps: f64,
}

impl Default for BertConfig {
    fn default() -> Self {
        Self {
            hidden_size: 384,
            intermediate_size: 1536,
            num_attention_heads: 12,
            num_hidden_layers: 6,
            vocab_size: 30522,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }
}

impl BertConfig {
    /// Read `config.json` from the weights' directory if there is one.
    fn beside(model_path: &Path) -> Result<Self> {
        let path = model_path.with_file_name("config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

struct EncoderLayer {
    query: Linear,
    key: Linear,
    value: Linear,
    attn_out: Linear,
    attn_norm: LayerNorm,
    intermediate: Linear,
    output: Linear,
    output_norm: LayerNorm,
    heads: usize,
    head_dim: usize,
}

impl EncoderLayer {
    fn load(vb: VarBuilder, cfg: &BertConfig) -> Result<Self> {
        let h = cfg.hidden_size;
        let attn = vb.pp("attention");
        let this = attn.pp("self");

        Ok(Self {
            query: candle_nn::linear(h, h, this.pp("query"))?,
            key: candle_nn::linear(h, h, this.pp("key"))?,
            value: candle_nn::linear(h, h, this.pp("value"))?,
            attn_out: candle_nn::linear(h, h, attn.pp("output").pp("dense"))?,
            attn_norm: candle_nn::layer_norm(
                h,
                cfg.layer_norm_eps,
                attn.pp("output").pp("LayerNorm"),
            )?,
            intermediate: candle_nn::linear(
                h,
                cfg.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            output: candle_nn::linear(cfg.intermediate_size, h, vb.pp("output").pp("dense"))?,
            output_norm: candle_nn::layer_norm(
                h,
                cfg.layer_norm_eps,
                vb.pp("output").pp("LayerNorm"),
            )?,
            heads: cfg.num_attention_heads,
            head_dim: cfg.head_dim(),
        })
    }

    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, s, _) = x.dims3()?;
        Ok(x
            .reshape((b, s, self.heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// `mask_bias` is `(batch, 1, 1, seq)`: 0 for real tokens, a large
    /// negative value for padding.
    fn forward(&self, x: &Tensor, mask_bias: &Tensor) -> Result<Tensor> {
        let (b, s, h) = x.dims3()?;

        let q = self.split_heads(&self.query.forward(x)?)?;
        let k = self.split_heads(&self.key.forward(x)?)?;
        let v = self.split_heads(&self.value.forward(x)?)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = q
            .matmul(&k.t()?.contiguous()?)?
            .affine(scale, 0.0)?
            .broadcast_add(mask_bias)?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, s, h))?;

        let x = self.attn_norm.forward(&(x + self.attn_out.forward(&context)?)?)?;
        let ff = self
            .output
            .forward(&self.intermediate.forward(&x)?.gelu_erf()?)?;
        Ok(self.output_norm.forward(&(x + ff)?)?)
    }
}

struct BertEncoder {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    embed_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    max_positions: usize,
    device: Device,
}

impl BertEncoder {
    fn load(model_path: &Path, cfg: &BertConfig, device: &Device) -> Result<Self> {
        // SAFETY: the weights file is memory-mapped read-only and not
        // modified while the encoder is alive.
        let root = unsafe { VarBuilder::from_mmaped_safetensors(&[model_path], DType::F32, device)? };
        // Some exports keep the `bert.` prefix of the full pretraining model.
        let vb = if root.contains_tensor("bert.embeddings.word_embeddings.weight") {
            root.pp("bert")
        } else {
            root
        };

        let emb = vb.pp("embeddings");
        let h = cfg.hidden_size;
        let layers = (0..cfg.num_hidden_layers)
            .map(|i| EncoderLayer::load(vb.pp("encoder").pp("layer").pp(i.to_string()), cfg))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            word: candle_nn::embedding(cfg.vocab_size, h, emb.pp("word_embeddings"))?,
            position: candle_nn::embedding(
                cfg.max_position_embeddings,
                h,
                emb.pp("position_embeddings"),
            )?,
            token_type: candle_nn::embedding(cfg.type_vocab_size, h, emb.pp("token_type_embeddings"))?,
            embed_norm: candle_nn::layer_norm(h, cfg.layer_norm_eps, emb.pp("LayerNorm"))?,
            layers,
            max_positions: cfg.max_position_embeddings,
            device: device.clone(),
        })
    }

    /// Padded batch in, one unit-length vector per row out.
    fn encode(&self, ids: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let batch = ids.len();
        let seq = ids.iter().map(Vec::len).max().unwrap_or(0);
        if batch == 0 || seq == 0 {
            return Ok(vec![Vec::new(); batch]);
        }
        anyhow::ensure!(
            seq <= self.max_positions,
            "input length {seq} exceeds max {}",
            self.max_positions
        );

        let mut flat_ids = Vec::with_capacity(batch * seq);
        let mut flat_mask = Vec::with_capacity(batch * seq);
        for row in ids {
            flat_ids.extend(row.iter().copied());
            flat_ids.extend(std::iter::repeat(0u32).take(seq - row.len()));
            flat_mask.extend(std::iter::repeat(1f32).take(row.len()));
            flat_mask.extend(std::iter::repeat(0f32).take(seq - row.len()));
        }
        let input_ids = Tensor::from_vec(flat_ids, (batch, seq), &self.device)?;
        let mask = Tensor::from_vec(flat_mask, (batch, seq), &self.device)?;

        let positions = Tensor::arange(0u32, seq as u32, &self.device)?.unsqueeze(0)?;
        let token_types = input_ids.zeros_like()?;
        let embedded = self
            .word
            .forward(&input_ids)?
            .broadcast_add(&self.position.forward(&positions)?)?
            .add(&self.token_type.forward(&token_types)?)?;
        let mut hidden = self.embed_norm.forward(&embedded)?;

        let mask_bias = mask.affine(10_000.0, -10_000.0)?.unsqueeze(1)?.unsqueeze(1)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &mask_bias)?;
        }

        // Mean over real tokens only, then L2-normalize.
        let mask3 = mask.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask3)?.sum(1)?;
        let counts = mask.sum_keepdim(1)?;
        let pooled = summed.broadcast_div(&counts)?;
        let norms = (pooled.sqr()?.sum_keepdim(D::Minus1)?.sqrt()? + 1e-12)?;
        Ok(pooled.broadcast_div(&norms)?.to_vec2::<f32>()?)
    }
}

/// all-MiniLM-L6-v2 sentence embeddings computed locally with candle.
pub struct MiniLmEmbeddingProvider {
    encoder: BertEncoder,
    tokenizer: tokenizers::Tokenizer,
    model_id: String,
}

impl MiniLmEmbeddingProvider {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let cfg = BertConfig::beside(model_path)?;
        let encoder = BertEncoder::load(model_path, &cfg, &device)
            .with_context(|| format!("load weights {}", model_path.display()))?;

        let mut tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        // Batches are padded and truncated by the encoder, which builds its
        // own attention mask.
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(None)
            .map_err(|e| anyhow::anyhow!("disable tokenizer truncation: {e}"))?;

        let file = model_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_path.display().to_string());

        Ok(Self {
            encoder,
            tokenizer,
            model_id: format!("minilm:{file}"),
        })
    }

    fn token_ids(&self, texts: &[&str]) -> Result<Vec<Vec<u32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

        Ok(encodings
            .iter()
            .map(|enc| real_token_ids(enc.get_ids(), enc.get_attention_mask()))
            .collect())
    }
}

/// Ids the tokenizer marked as real (attention 1), cut to `MAX_TOKENS`
/// with the trailing [SEP] kept.
fn real_token_ids(ids: &[u32], attention: &[u32]) -> Vec<u32> {
    let ids: Vec<u32> = ids
        .iter()
        .zip(attention)
        .filter(|(_, mask)| **mask != 0)
        .map(|(id, _)| *id)
        .collect();

    if ids.len() <= MAX_TOKENS {
        return ids;
    }
    let mut cut = ids[..MAX_TOKENS - 1].to_vec();
    cut.push(ids[ids.len() - 1]);
    cut
}

impl EmbeddingProvider for MiniLmEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .context("encoder returned no vector")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.token_ids(texts)?;
        self.encoder.encode(&ids)
    }
}
