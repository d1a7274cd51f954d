// ============================================================
// Layer 5 — Optimisation Step
// ============================================================
// Everything between "loss tensor" and "updated model":
//
//   loss.backward()
//       │
//       ▼
//   GradientGroups   → encoder grads | head grads
//       │
//       ▼
//   clip_global_norm → one norm over BOTH groups, scaled to ≤ 5.0
//       │
//       ▼
//   AdamW            → encoder at lr, heads at 10 × lr
//       │
//       ▼
//   PolynomialDecay  → advance the shared schedule by one step
//
// The schedule is shared by every step of every task, so the
// learning rate depends only on how many optimizer steps have
// happened so far, not on which source the batch came from.
//
// Clipping follows the usual total-norm rule:
//   norm  = sqrt(Σ ‖g‖²)  over every parameter
//   scale = max_norm / (norm + 1e-6), applied only if < 1

use std::marker::PhantomData;

use burn::{
    module::{AutodiffModule, ModuleVisitor, ParamId},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::ml::model::MultiTaskModel;

pub const MAX_GRAD_NORM:      f64 = 5.0;
pub const HEAD_LR_MULTIPLIER: f64 = 10.0;
const CLIP_EPSILON:           f64 = 1e-6;

// ─── Gradient groups ──────────────────────────────────────────────────────────

/// Gradients of one backward pass, split by learning-rate group.
pub struct GradientGroups {
    pub encoder: GradientsParams,
    pub heads:   GradientsParams,
}

impl GradientGroups {
    pub fn from_loss<B: AutodiffBackend>(loss: Tensor<B, 1>, model: &MultiTaskModel<B>) -> Self {
        let mut grads = loss.backward();
        // from_module removes the encoder's gradients, leaving only the heads'.
        let encoder = GradientsParams::from_module(&mut grads, &model.encoder);
        let heads   = GradientsParams::from_grads(grads, model);
        Self { encoder, heads }
    }

    /// L2 norm over every gradient in both groups.
    pub fn global_norm<B: AutodiffBackend, M: AutodiffModule<B>>(&self, model: &M) -> f64 {
        let mut visitor = SquaredNorm::<B> { groups: self, sum_sq: 0.0, _backend: PhantomData };
        model.visit(&mut visitor);
        visitor.sum_sq.sqrt()
    }

    /// Rescale every gradient so the global norm is at most `max_norm`.
    /// Returns the norm measured before clipping.
    pub fn clip_global_norm<B: AutodiffBackend, M: AutodiffModule<B>>(
        &mut self,
        model:    &M,
        max_norm: f64,
    ) -> f64 {
        let norm  = self.global_norm::<B, M>(model);
        let scale = max_norm / (norm + CLIP_EPSILON);
        if scale < 1.0 {
            let mut visitor = ScaleGrads::<B> { groups: self, scale, _backend: PhantomData };
            model.visit(&mut visitor);
        }
        norm
    }
}

struct SquaredNorm<'a, B: AutodiffBackend> {
    groups:   &'a GradientGroups,
    sum_sq:   f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        let grad = self
            .groups
            .encoder
            .get::<B::InnerBackend, D>(id)
            .or_else(|| self.groups.heads.get::<B::InnerBackend, D>(id));
        if let Some(grad) = grad {
            self.sum_sq += grad.powf_scalar(2.0).sum().into_scalar().elem::<f64>();
        }
    }
}

struct ScaleGrads<'a, B: AutodiffBackend> {
    groups:   &'a mut GradientGroups,
    scale:    f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        for group in [&mut self.groups.encoder, &mut self.groups.heads] {
            if let Some(grad) = group.remove::<B::InnerBackend, D>(id) {
                group.register::<B::InnerBackend, D>(id, grad.mul_scalar(self.scale));
            }
        }
    }
}

// ─── Learning-rate schedule ───────────────────────────────────────────────────

/// Polynomial decay from `lr_init` to `lr_end` over `total_steps`,
/// no warmup. Past the horizon the rate stays at `lr_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialDecay {
    pub lr_init:     f64,
    pub lr_end:      f64,
    pub power:       f64,
    pub total_steps: usize,
    pub current:     usize,
}

impl PolynomialDecay {
    pub const DEFAULT_POWER:  f64 = 0.5;
    pub const DEFAULT_LR_END: f64 = 1e-7;

    pub fn new(lr_init: f64, total_steps: usize) -> Self {
        Self {
            lr_init,
            lr_end: Self::DEFAULT_LR_END,
            power: Self::DEFAULT_POWER,
            total_steps,
            current: 0,
        }
    }

    /// Multiplier applied to each group's base rate at `step`.
    pub fn factor_at(&self, step: usize) -> f64 {
        if step >= self.total_steps || self.total_steps == 0 {
            return self.lr_end / self.lr_init;
        }
        let remaining = 1.0 - step as f64 / self.total_steps as f64;
        let decayed = (self.lr_init - self.lr_end) * remaining.powf(self.power) + self.lr_end;
        decayed / self.lr_init
    }

    pub fn factor(&self) -> f64 {
        self.factor_at(self.current)
    }

    pub fn advance(&mut self) {
        self.current += 1;
    }
}

// ─── Optimisation bundle ──────────────────────────────────────────────────────

/// Result of one optimizer step, for logging.
#[derive(Debug, Clone, Copy)]
pub struct StepStats {
    pub grad_norm:  f64,
    pub encoder_lr: f64,
    pub head_lr:    f64,
}

/// One AdamW optimizer over both parameter groups plus the shared schedule.
pub struct Optimization<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<MultiTaskModel<B>, B>,
{
    pub optim:    O,
    pub schedule: PolynomialDecay,
    _backend:     PhantomData<B>,
}

impl<B, O> Optimization<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<MultiTaskModel<B>, B>,
{
    pub fn new(optim: O, schedule: PolynomialDecay) -> Self {
        Self { optim, schedule, _backend: PhantomData }
    }

    /// Optimizer steps taken so far across every task.
    pub fn steps(&self) -> usize {
        self.schedule.current
    }

    /// Back-propagate `objective`, clip, update both groups and advance the schedule.
    pub fn step(
        &mut self,
        model:     MultiTaskModel<B>,
        objective: Tensor<B, 1>,
    ) -> (MultiTaskModel<B>, StepStats) {
        let mut grads = GradientGroups::from_loss(objective, &model);
        let grad_norm = grads.clip_global_norm::<B, _>(&model, MAX_GRAD_NORM);

        let encoder_lr = self.schedule.lr_init * self.schedule.factor();
        let head_lr    = encoder_lr * HEAD_LR_MULTIPLIER;

        let model = self.optim.step(encoder_lr, model, grads.encoder);
        let model = self.optim.step(head_lr, model, grads.heads);
        self.schedule.advance();

        (model, StepStats { grad_norm, encoder_lr, head_lr })
    }
}
