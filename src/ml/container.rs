// ============================================================
// Layer 5 — Model Container
// ============================================================
// Owns everything one training session needs:
//
//   placeholders   static shapes of the three fed tensors
//   net            the two-headed network
//   steps          one global step counter per head
//   optimizers     per-head Adam, bound lazily
//   summaries      per-head loss summary, bound lazily
//
// Both heads share the same trunk parameters. A training step
// for a head fails with `Unbound` unless that head's optimizer
// was bound first; binding twice returns the existing one.
//
// Reference: Burn Book §5 (Training)

use std::{collections::HashMap, sync::Arc};

use burn::{prelude::*, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};

use crate::data::batcher::LocalisationBatch;
use crate::domain::error::LocaliseError;
use crate::domain::head::Head;
use crate::infra::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::infra::summary::{LossSummary, SummaryPolicy};
use crate::ml::layers::StaticShape;
use crate::ml::loss::{cross_entropy, squared_error};
use crate::ml::model::{image_shape, LocaliseNet, LocaliseNetConfig};
use crate::ml::optimizer::OptimizerBinder;

// ─── Placeholders ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    /// [?, 28, 28, 3]
    pub image:       StaticShape,
    /// [?, num_classes]
    pub class_label: StaticShape,
    /// [?, 4]
    pub bbox:        StaticShape,
}

impl Placeholders {
    pub fn new(num_classes: usize, num_coordinates: usize) -> Self {
        Self {
            image:       image_shape(),
            class_label: StaticShape::batched(&[num_classes]),
            bbox:        StaticShape::batched(&[num_coordinates]),
        }
    }

    /// Rejects a batch whose tensors do not fit the placeholders.
    pub fn check<B: Backend>(&self, batch: &LocalisationBatch<B>) -> Result<(), LocaliseError> {
        let fed = [
            ("image", &self.image, batch.images.dims().to_vec()),
            ("class_label", &self.class_label, batch.class_labels.dims().to_vec()),
            ("bbox", &self.bbox, batch.boxes.dims().to_vec()),
        ];
        for (name, expected, dims) in fed {
            if !expected.matches(&dims) {
                return Err(LocaliseError::shape(name, format!("fed {dims:?}, placeholder is {expected}")));
            }
        }
        let size = batch.size();
        if batch.class_labels.dims()[0] != size || batch.boxes.dims()[0] != size {
            return Err(LocaliseError::shape("batch", "tensors disagree on the batch size"));
        }
        Ok(())
    }
}

// ─── GlobalSteps ──────────────────────────────────────────────────────────────
/// Optimizer steps taken so far, per head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSteps {
    classification: u64,
    regression:     u64,
}

impl GlobalSteps {
    pub fn get(&self, head: Head) -> u64 {
        match head {
            Head::Classification => self.classification,
            Head::Regression => self.regression,
        }
    }

    fn slot(&mut self, head: Head) -> &mut u64 {
        match head {
            Head::Classification => &mut self.classification,
            Head::Regression => &mut self.regression,
        }
    }

    pub fn set(&mut self, head: Head, value: u64) {
        *self.slot(head) = value;
    }

    pub fn increment(&mut self, head: Head) -> u64 {
        let slot = self.slot(head);
        *slot += 1;
        *slot
    }
}

// ─── ModelContainer ───────────────────────────────────────────────────────────
pub struct ModelContainer<B: AutodiffBackend> {
    config:        LocaliseNetConfig,
    learning_rate: f64,
    device:        B::Device,
    placeholders:  Arc<Placeholders>,
    net:           LocaliseNet<B>,
    steps:         GlobalSteps,
    optimizers:    OptimizerBinder<B>,
    summaries:     HashMap<Head, LossSummary>,
}

impl<B: AutodiffBackend> ModelContainer<B> {
    /// Creates the placeholders and the full network. Fails on an invalid
    /// learning rate or any construction error from the layer builders.
    pub fn build(config: LocaliseNetConfig, learning_rate: f64, device: B::Device) -> Result<Self, LocaliseError> {
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(LocaliseError::Config(format!(
                "learning rate must be positive and finite, got {learning_rate}"
            )));
        }
        let placeholders = Arc::new(Placeholders::new(config.num_classes, config.num_coordinates));
        let net = config.init::<B>(&placeholders.image, &device)?;
        tracing::info!(
            "Model ready: {} classes, {} box coordinates, lr={}",
            config.num_classes,
            config.num_coordinates,
            learning_rate
        );

        Ok(Self {
            config,
            learning_rate,
            device,
            placeholders,
            net,
            steps: GlobalSteps::default(),
            optimizers: OptimizerBinder::default(),
            summaries: HashMap::new(),
        })
    }

    /// The shared input description. Every call hands out the same handle.
    pub fn create_placeholders(&self) -> Arc<Placeholders> {
        Arc::clone(&self.placeholders)
    }

    pub fn config(&self) -> &LocaliseNetConfig {
        &self.config
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn net(&self) -> &LocaliseNet<B> {
        &self.net
    }

    pub fn steps(&self) -> GlobalSteps {
        self.steps
    }

    /// Binds the Adam optimizer for `head`; a second call keeps the first.
    pub fn bind_optimizer(&mut self, head: Head) -> bool {
        let created = self.optimizers.bind(head, self.learning_rate);
        if created {
            tracing::debug!("Bound {head} optimizer (lr={})", self.learning_rate);
        }
        created
    }

    /// Binds the loss summary for `head` under its tag (cat_loss / reg_loss).
    pub fn bind_summary(&mut self, head: Head, policy: SummaryPolicy) -> bool {
        if self.summaries.contains_key(&head) {
            return false;
        }
        self.summaries.insert(head, LossSummary::new(head.loss_name(), policy));
        true
    }

    pub fn summary(&self, head: Head) -> Result<&LossSummary, LocaliseError> {
        self.summaries.get(&head).ok_or(LocaliseError::Unbound { head, what: "summary" })
    }

    /// Fails unless both the optimizer and the summary of `head` exist.
    pub fn ensure_bound(&self, head: Head) -> Result<(), LocaliseError> {
        self.optimizers.get(head)?;
        self.summary(head).map(|_| ())
    }

    /// Loss of `head` on `batch`. The regression loss sees the trunk
    /// through a detached copy, so it has no gradient path into it.
    pub fn loss(&self, head: Head, batch: &LocalisationBatch<B>) -> Tensor<B, 1> {
        let features = self.net.trunk(batch.images.clone());
        match head {
            Head::Classification => cross_entropy(self.net.class_logits(features), batch.class_labels.clone()),
            Head::Regression => squared_error(self.net.box_predictions(features.detach()), batch.boxes.clone()),
        }
    }

    /// One optimizer step of `head` on `batch`. Returns the loss value
    /// computed before the update.
    pub fn train_step(&mut self, head: Head, batch: &LocalisationBatch<B>) -> Result<f64, LocaliseError> {
        self.placeholders.check(batch)?;
        self.optimizers.get(head)?;

        let loss = self.loss(head, batch);
        let value: f64 = loss.clone().into_scalar().elem::<f64>();

        let optimizer = self.optimizers.get_mut(head)?;
        self.net = optimizer.step(self.net.clone(), loss);
        let step = self.steps.increment(head);

        tracing::trace!("{head} step {step}: loss={value:.6}");
        Ok(value)
    }

    pub fn save_checkpoint(
        &self,
        manager: &CheckpointManager,
        head:    Head,
        epoch:   usize,
    ) -> Result<CheckpointMeta, LocaliseError> {
        let optimizer = self.optimizers.get(head)?;
        manager.save(&self.net, optimizer, epoch, self.steps.get(head))
    }

    /// Restores `head` from the latest checkpoint in `manager`, if any.
    /// Parameters, optimizer state and the head's global step all come back.
    pub fn restore_checkpoint(
        &mut self,
        manager: &CheckpointManager,
        head:    Head,
    ) -> Result<Option<CheckpointMeta>, LocaliseError> {
        let Some(meta) = manager.latest()? else {
            return Ok(None);
        };
        let optimizer = self.optimizers.get_mut(head)?;
        self.net = manager.restore(&meta, self.net.clone(), optimizer, &self.device)?;
        self.steps.set(head, meta.global_step);
        Ok(Some(meta))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::Param;
    use burn::tensor::Distribution;

    type B = Autodiff<NdArray>;

    fn container(num_classes: usize) -> ModelContainer<B> {
        ModelContainer::build(LocaliseNetConfig::new(num_classes), 0.001, Default::default()).unwrap()
    }

    fn batch(size: usize, num_classes: usize) -> LocalisationBatch<B> {
        let device = Default::default();
        let mut labels = vec![0.0f32; size * num_classes];
        for row in 0..size {
            labels[row * num_classes + row % num_classes] = 1.0;
        }
        LocalisationBatch {
            images: Tensor::random([size, 28, 28, 3], Distribution::Normal(0.0, 1.0), &device),
            class_labels: Tensor::from_data(TensorData::new(labels, [size, num_classes]), &device),
            boxes: Tensor::random([size, 4], Distribution::Uniform(0.0, 1.0), &device),
        }
    }

    fn values<const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
        tensor.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_placeholders_are_shared() {
        let model = container(20);
        let a = model.create_placeholders();
        let b = model.create_placeholders();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.image, StaticShape::batched(&[28, 28, 3]));
        assert_eq!(a.class_label, StaticShape::batched(&[20]));
        assert_eq!(a.bbox, StaticShape::batched(&[4]));
    }

    #[test]
    fn test_build_rejects_bad_learning_rate() {
        let result = ModelContainer::<B>::build(LocaliseNetConfig::new(3), 0.0, Default::default());
        assert!(matches!(result, Err(LocaliseError::Config(_))));
    }

    #[test]
    fn test_train_step_requires_bound_optimizer() {
        let mut model = container(3);
        let err = model.train_step(Head::Classification, &batch(2, 3)).err().unwrap();
        assert!(matches!(err, LocaliseError::Unbound { head: Head::Classification, .. }));
        assert_eq!(model.steps().get(Head::Classification), 0);
    }

    #[test]
    fn test_train_step_rejects_wrong_label_width() {
        let mut model = container(3);
        model.bind_optimizer(Head::Classification);
        let err = model.train_step(Head::Classification, &batch(2, 5)).err().unwrap();
        assert!(matches!(err, LocaliseError::Shape { .. }));
    }

    #[test]
    fn test_binding_is_idempotent() {
        let mut model = container(3);
        assert!(model.bind_optimizer(Head::Regression));
        assert!(!model.bind_optimizer(Head::Regression));
        assert!(model.bind_summary(Head::Regression, SummaryPolicy::LastBatch));
        assert!(!model.bind_summary(Head::Regression, SummaryPolicy::PerBatch));
        assert_eq!(model.summary(Head::Regression).unwrap().policy(), SummaryPolicy::LastBatch);
        assert_eq!(model.summary(Head::Regression).unwrap().tag(), "reg_loss");
        assert!(model.ensure_bound(Head::Regression).is_ok());
        assert!(model.ensure_bound(Head::Classification).is_err());
    }

    #[test]
    fn test_classification_step_moves_trunk_and_counts() {
        let mut model = container(3);
        model.bind_optimizer(Head::Classification);
        let before = values(model.net().conv1.conv.weight.val());

        let loss = model.train_step(Head::Classification, &batch(4, 3)).unwrap();
        assert!(loss.is_finite());
        assert_eq!(model.steps().get(Head::Classification), 1);
        assert_eq!(model.steps().get(Head::Regression), 0);
        assert_ne!(values(model.net().conv1.conv.weight.val()), before);
    }

    #[test]
    fn test_regression_step_leaves_trunk_untouched() {
        let mut model = container(3);
        model.bind_optimizer(Head::Regression);

        // Large positive output bias keeps every box_coord ReLU active
        let bias = Tensor::<B, 1>::full([4], 100.0, model.device());
        model.net.box_coord.linear.bias = Some(Param::from_tensor(bias));

        let trunk_before = values(model.net().conv1.conv.weight.val());
        let class_before = values(model.net().fc_class.linear.weight.val());
        let softmax_before = values(model.net().softmax.linear.weight.val());
        let box_before = values(model.net().box_coord.linear.weight.val());

        let loss = model.train_step(Head::Regression, &batch(4, 3)).unwrap();
        assert!(loss > 0.0);

        assert_eq!(values(model.net().conv1.conv.weight.val()), trunk_before);
        assert_eq!(values(model.net().fc_class.linear.weight.val()), class_before);
        assert_eq!(values(model.net().softmax.linear.weight.val()), softmax_before);
        assert_ne!(values(model.net().box_coord.linear.weight.val()), box_before);
        assert_eq!(model.steps().get(Head::Regression), 1);
    }

    #[test]
    fn test_global_steps() {
        let mut steps = GlobalSteps::default();
        assert_eq!(steps.increment(Head::Regression), 1);
        assert_eq!(steps.increment(Head::Regression), 2);
        steps.set(Head::Classification, 40);
        assert_eq!(steps.get(Head::Classification), 40);
        assert_eq!(steps.get(Head::Regression), 2);
    }
}
