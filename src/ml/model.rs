use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{gelu, tanh},
};

use crate::data::batcher::EncodedBatch;
use crate::domain::example::{CITATION_CLASSES, PRIMARY_CLASSES, SECTION_CLASSES};

// ─── Shared encoder ───────────────────────────────────────────────────────────
// The trainer treats this as opaque: (input_ids, attention_mask) in,
// one pooled embedding per example out.

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct TextEncoderConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl TextEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TextEncoder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let pooler     = LinearConfig::new(self.d_model, self.d_model).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        TextEncoder {
            token_embedding, position_embedding, layers,
            final_norm, pooler, dropout,
            max_seq_len: self.max_seq_len,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `mask_pad` is true at padding positions.
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn_input  = MhaInput::self_attn(x.clone()).mask_pad(mask_pad);
        let attn_output = self.self_attn.forward(attn_input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(gelu(self.ffn_linear1.forward(x.clone())));
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct TextEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub pooler:             Linear<B>,
    pub dropout:            Dropout,
    pub max_seq_len:        usize,
}

impl<B: Backend> TextEncoder<B> {
    /// input_ids, attention_mask: [batch, seq_len] → pooled: [batch, d_model]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch_size, seq_len] = input_ids.dims();
        let mask_pad = attention_mask.equal_elem(0);

        let tok_emb = self.token_embedding.forward(input_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
        }
        let x = self.final_norm.forward(x); // [batch, seq_len, d_model]
        let [_, _, d_model] = x.dims();

        // BERT-style pooling: first ([CLS]) position → dense → tanh.
        let cls = x
            .slice([0..batch_size, 0..1, 0..d_model])
            .reshape([batch_size, d_model]);
        tanh(self.pooler.forward(cls))
    }
}

// ─── Task heads ───────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct TaskHeadConfig {
    pub d_input:     usize,
    pub d_hidden:    usize,
    pub num_classes: usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
}

impl TaskHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TaskHead<B> {
        TaskHead {
            fc1:     LinearConfig::new(self.d_input, self.d_hidden).init(device),
            fc2:     LinearConfig::new(self.d_hidden, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// linear → tanh → dropout → linear
#[derive(Module, Debug)]
pub struct TaskHead<B: Backend> {
    pub fc1:     Linear<B>,
    pub fc2:     Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> TaskHead<B> {
    /// embedding: [batch, d_input] → logits: [batch, num_classes]
    pub fn forward(&self, embedding: Tensor<B, 2>) -> Tensor<B, 2> {
        let hidden = tanh(self.fc1.forward(embedding));
        self.fc2.forward(self.dropout.forward(hidden))
    }
}

// ─── Multi-task model ─────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct MultiTaskConfig {
    pub encoder: TextEncoderConfig,
    /// Applied to the pooled embedding and inside every head.
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl MultiTaskConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiTaskModel<B> {
        let d = self.encoder.d_model;
        let head = |classes| TaskHeadConfig::new(d, d, classes).with_dropout(self.dropout);
        MultiTaskModel {
            encoder:       self.encoder.init(device),
            primary_head:  head(PRIMARY_CLASSES).init(device),
            section_head:  head(SECTION_CLASSES).init(device),
            citation_head: head(CITATION_CLASSES).init(device),
            dropout:       DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// One encoder, three heads. The heads never share parameters;
/// every task's gradient flows into the same encoder.
#[derive(Module, Debug)]
pub struct MultiTaskModel<B: Backend> {
    pub encoder:       TextEncoder<B>,
    pub primary_head:  TaskHead<B>,
    pub section_head:  TaskHead<B>,
    pub citation_head: TaskHead<B>,
    pub dropout:       Dropout,
}

/// Which heads a forward pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSelector {
    Joint,
    SectionOnly,
    CitationOnly,
}

impl TaskSelector {
    pub fn name(self) -> &'static str {
        match self {
            TaskSelector::Joint        => "joint",
            TaskSelector::SectionOnly  => "section",
            TaskSelector::CitationOnly => "citation",
        }
    }
}

pub struct JointLogits<B: Backend> {
    pub primary:  Tensor<B, 2>,
    pub section:  Tensor<B, 2>,
    pub citation: Tensor<B, 2>,
}

/// Single-head output, duplicated so downstream code can treat
/// every scaffold step the same way.
pub struct ScaffoldLogits<B: Backend> {
    pub output:    Tensor<B, 2>,
    pub reference: Tensor<B, 2>,
}

impl<B: Backend> ScaffoldLogits<B> {
    fn from_output(output: Tensor<B, 2>) -> Self {
        Self { reference: output.clone(), output }
    }
}

pub enum TaskLogits<B: Backend> {
    Joint(JointLogits<B>),
    Section(ScaffoldLogits<B>),
    Citation(ScaffoldLogits<B>),
}

impl<B: Backend> MultiTaskModel<B> {
    /// Shared encoder pass followed by dropout on the pooled embedding.
    pub fn embed(&self, batch: &EncodedBatch<B>) -> Tensor<B, 2> {
        let pooled = self.encoder.forward(batch.input_ids.clone(), batch.attention_mask.clone());
        self.dropout.forward(pooled)
    }

    pub fn forward_joint(&self, batch: &EncodedBatch<B>) -> JointLogits<B> {
        let emb = self.embed(batch);
        JointLogits {
            primary:  self.primary_head.forward(emb.clone()),
            section:  self.section_head.forward(emb.clone()),
            citation: self.citation_head.forward(emb),
        }
    }

    pub fn forward_section(&self, batch: &EncodedBatch<B>) -> ScaffoldLogits<B> {
        ScaffoldLogits::from_output(self.section_head.forward(self.embed(batch)))
    }

    pub fn forward_citation(&self, batch: &EncodedBatch<B>) -> ScaffoldLogits<B> {
        ScaffoldLogits::from_output(self.citation_head.forward(self.embed(batch)))
    }

    pub fn forward(&self, batch: &EncodedBatch<B>, selector: TaskSelector) -> TaskLogits<B> {
        match selector {
            TaskSelector::Joint        => TaskLogits::Joint(self.forward_joint(batch)),
            TaskSelector::SectionOnly  => TaskLogits::Section(self.forward_section(batch)),
            TaskSelector::CitationOnly => TaskLogits::Citation(self.forward_citation(batch)),
        }
    }
}

#[cfg(test)]
pub(crate) fn tiny_config() -> MultiTaskConfig {
    MultiTaskConfig::new(
        TextEncoderConfig::new(32, 4, 8, 2, 1, 16).with_dropout(0.0),
    )
    .with_dropout(0.0)
}
