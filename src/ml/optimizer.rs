// ============================================================
// Layer 5 — Optimizer Binder
// ============================================================
// One Adam optimizer per head, created on demand and kept for
// the lifetime of the container.
//
//   classification  updates every parameter that receives a
//                   gradient from the cross-entropy loss
//                   (trunk, fc_class, softmax)
//
//   regression      updates the regression variable set only
//                   (fc_regress, box_coord); gradients for any
//                   other parameter are dropped before the step
//
// Adam hyper-parameters: β1 = 0.9, β2 = 0.999, ε = 1e-8.
//
// Reference: Kingma & Ba (2015) Adam

use burn::{
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::error::LocaliseError;
use crate::domain::head::Head;
use crate::ml::model::LocaliseNet;

pub const ADAM_BETA_1: f32 = 0.9;
pub const ADAM_BETA_2: f32 = 0.999;
pub const ADAM_EPSILON: f32 = 1e-8;

pub type NetOptimizer<B> = OptimizerAdaptor<Adam, LocaliseNet<B>, B>;
pub type NetOptimizerRecord<B> = <NetOptimizer<B> as Optimizer<LocaliseNet<B>, B>>::Record;

// ─── HeadOptimizer ────────────────────────────────────────────────────────────
pub struct HeadOptimizer<B: AutodiffBackend> {
    head:          Head,
    learning_rate: f64,
    optim:         NetOptimizer<B>,
}

impl<B: AutodiffBackend> HeadOptimizer<B> {
    pub fn new(head: Head, learning_rate: f64) -> Self {
        let optim = AdamConfig::new()
            .with_beta_1(ADAM_BETA_1)
            .with_beta_2(ADAM_BETA_2)
            .with_epsilon(ADAM_EPSILON)
            .init();
        Self { head, learning_rate, optim }
    }

    pub fn head(&self) -> Head {
        self.head
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Backward pass from `loss`, then one Adam update of this head's
    /// variable set.
    pub fn step(&mut self, net: LocaliseNet<B>, loss: Tensor<B, 1>) -> LocaliseNet<B> {
        let mut grads = loss.backward();
        let grads = match self.head {
            Head::Classification => GradientsParams::from_grads(grads, &net),
            Head::Regression => {
                let scope = net.regression_params();
                GradientsParams::from_params(&mut grads, &net, &scope)
            }
        };
        self.optim.step(self.learning_rate, net, grads)
    }

    pub fn to_record(&self) -> NetOptimizerRecord<B> {
        self.optim.to_record()
    }

    pub fn load_record(&mut self, record: NetOptimizerRecord<B>) {
        self.optim = self.optim.clone().load_record(record);
    }
}

// ─── OptimizerBinder ──────────────────────────────────────────────────────────
pub struct OptimizerBinder<B: AutodiffBackend> {
    classification: Option<HeadOptimizer<B>>,
    regression:     Option<HeadOptimizer<B>>,
}

impl<B: AutodiffBackend> Default for OptimizerBinder<B> {
    fn default() -> Self {
        Self { classification: None, regression: None }
    }
}

impl<B: AutodiffBackend> OptimizerBinder<B> {
    /// Creates the optimizer for `head` unless one exists already.
    /// Returns whether a new optimizer was created.
    pub fn bind(&mut self, head: Head, learning_rate: f64) -> bool {
        let slot = self.slot_mut(head);
        if slot.is_some() {
            return false;
        }
        *slot = Some(HeadOptimizer::new(head, learning_rate));
        true
    }

    pub fn is_bound(&self, head: Head) -> bool {
        self.slot(head).is_some()
    }

    pub fn get(&self, head: Head) -> Result<&HeadOptimizer<B>, LocaliseError> {
        self.slot(head).as_ref().ok_or(LocaliseError::Unbound { head, what: "optimizer" })
    }

    pub fn get_mut(&mut self, head: Head) -> Result<&mut HeadOptimizer<B>, LocaliseError> {
        self.slot_mut(head).as_mut().ok_or(LocaliseError::Unbound { head, what: "optimizer" })
    }

    fn slot(&self, head: Head) -> &Option<HeadOptimizer<B>> {
        match head {
            Head::Classification => &self.classification,
            Head::Regression => &self.regression,
        }
    }

    fn slot_mut(&mut self, head: Head) -> &mut Option<HeadOptimizer<B>> {
        match head {
            Head::Classification => &mut self.classification,
            Head::Regression => &mut self.regression,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    #[test]
    fn test_bind_is_idempotent() {
        let mut binder = OptimizerBinder::<B>::default();
        assert!(binder.bind(Head::Regression, 0.001));
        assert!(!binder.bind(Head::Regression, 0.5));
        assert_eq!(binder.get(Head::Regression).unwrap().learning_rate(), 0.001);
        assert_eq!(binder.get(Head::Regression).unwrap().head(), Head::Regression);
    }

    #[test]
    fn test_unbound_head_is_an_error() {
        let mut binder = OptimizerBinder::<B>::default();
        binder.bind(Head::Classification, 0.001);
        assert!(binder.is_bound(Head::Classification));
        assert!(!binder.is_bound(Head::Regression));

        let err = binder.get_mut(Head::Regression).err().unwrap();
        assert!(matches!(err, LocaliseError::Unbound { head: Head::Regression, .. }));
    }
}
