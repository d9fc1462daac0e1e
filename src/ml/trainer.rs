// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Trains one head of a ModelContainer:
//
//   1. Both bindings (optimizer, summary) must exist
//   2. Restore the head's latest checkpoint, if there is one
//   3. For each epoch: ⌊N / batch_size⌋ contiguous batches,
//      one optimizer step each; the last N mod batch_size
//      samples are never fed
//   4. Report total loss + wall-clock time, write summaries
//   5. Every `checkpoint_every` epochs save a checkpoint
//      tagged with the (1-indexed) epoch; a failed save ends
//      the run
//
// After a restore both the epoch index and the global step
// carry on from the checkpoint, so a resumed run never reuses
// a tag the pointer may still name.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::{path::Path, time::Instant};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::backend::AutodiffBackend,
};
use serde::Serialize;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{batch_ranges, LocalisationBatcher},
    dataset::LocalisationDataset,
};
use crate::domain::error::LocaliseError;
use crate::domain::head::Head;
use crate::infra::checkpoint::{CheckpointManager, CheckpointMeta};
use crate::infra::summary::SummaryWriter;
use crate::ml::container::ModelContainer;

/// Outcome of one epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochStats {
    pub epoch:      usize,
    pub batches:    usize,
    /// Sum of the batch losses
    pub total_loss: f64,
    pub mean_loss:  f64,
    pub seconds:    f64,
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub head:         Head,
    pub resumed_from: Option<CheckpointMeta>,
    pub epochs:       Vec<EpochStats>,
    pub checkpoints:  Vec<CheckpointMeta>,
    /// The head's global step when training finished
    pub global_step:  u64,
}

pub fn run_training<B: AutodiffBackend>(
    container: &mut ModelContainer<B>,
    dataset:   &LocalisationDataset,
    head:      Head,
    cfg:       &TrainConfig,
) -> Result<TrainingReport, LocaliseError> {
    if cfg.batch_size == 0 {
        return Err(LocaliseError::Config("batch size must be at least 1".to_string()));
    }
    if cfg.checkpoint_every == 0 {
        return Err(LocaliseError::Config("checkpoint_every must be at least 1".to_string()));
    }
    if dataset.num_classes() != container.config().num_classes {
        return Err(LocaliseError::Dataset(format!(
            "class rows have {} columns but the network outputs {} classes",
            dataset.num_classes(),
            container.config().num_classes
        )));
    }
    container.ensure_bound(head)?;

    let head_dir = cfg.head_dir(head);
    let checkpoints = CheckpointManager::new(&cfg.checkpoint_root, head_dir, cfg.max_to_keep);
    let mut writer = SummaryWriter::new(Path::new(&cfg.graphs_root).join(head_dir))?;

    // ── Restore or start fresh ────────────────────────────────────────────────
    let resumed_from = container.restore_checkpoint(&checkpoints, head)?;
    match &resumed_from {
        Some(meta) => tracing::info!(
            "Model restored from '{}' (epoch {}, step {})",
            meta.tag,
            meta.epoch,
            meta.global_step
        ),
        None => tracing::info!("No checkpoint in '{}'; training the {head} head from scratch", checkpoints.dir().display()),
    }

    let first_epoch = resumed_from.as_ref().map_or(0, |meta| meta.epoch) + 1;
    let last_epoch = first_epoch + cfg.epochs - 1;

    let samples = dataset.len();
    let batches_per_epoch = samples / cfg.batch_size;
    let dropped = samples % cfg.batch_size;
    if batches_per_epoch == 0 {
        tracing::warn!("{samples} samples do not fill one batch of {}; epochs will be empty", cfg.batch_size);
    } else if dropped > 0 {
        tracing::warn!("{dropped} trailing samples are dropped every epoch");
    }

    let batcher = LocalisationBatcher::<B>::new(container.device().clone());
    let mut epochs = Vec::with_capacity(cfg.epochs);
    let mut saved = Vec::new();

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in first_epoch..first_epoch + cfg.epochs {
        let start = Instant::now();
        let mut batch_losses = Vec::with_capacity(batches_per_epoch);

        for range in batch_ranges(samples, cfg.batch_size) {
            let items = range.filter_map(|i| dataset.get(i)).collect();
            let batch = batcher.batch(items);
            let loss = container.train_step(head, &batch)?;
            let step = container.steps().get(head);
            container.summary(head)?.on_batch(&mut writer, step, loss)?;
            tracing::debug!("{head} step {step}: loss={loss:.6}");
            batch_losses.push(loss);
        }

        let total_loss: f64 = batch_losses.iter().sum();
        let mean_loss = if batch_losses.is_empty() { f64::NAN } else { total_loss / batch_losses.len() as f64 };
        if !total_loss.is_finite() {
            tracing::warn!("epoch {epoch}: loss is not finite ({total_loss})");
        }
        container.summary(head)?.on_epoch(&mut writer, epoch, &batch_losses)?;

        let seconds = start.elapsed().as_secs_f64();
        println!("Epoch: {epoch}\t Loss: {total_loss:.6}\t Time: {seconds:.2}s");
        tracing::info!(
            "{head} epoch {epoch}/{last_epoch}: {} batches, loss={total_loss:.6}",
            batch_losses.len()
        );

        epochs.push(EpochStats { epoch, batches: batch_losses.len(), total_loss, mean_loss, seconds });

        if epoch % cfg.checkpoint_every == 0 {
            let meta = container.save_checkpoint(&checkpoints, head, epoch)?;
            println!("Storing session as checkpoint '{}'", meta.tag);
            saved.push(meta);
        }
    }

    Ok(TrainingReport {
        head,
        resumed_from,
        epochs,
        checkpoints: saved,
        global_step: container.steps().get(head),
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    use crate::data::dataset::LocalisationItem;
    use crate::domain::crop::IMAGE_LEN;
    use crate::infra::summary::SummaryPolicy;
    use crate::ml::model::{LocaliseNet, LocaliseNetConfig};
    use crate::ml::optimizer::HeadOptimizer;

    type B = Autodiff<NdArray>;

    const CLASSES: usize = 4;

    fn dataset(samples: usize, zeros: bool) -> LocalisationDataset {
        let items = (0..samples)
            .map(|i| {
                let mut class_label = vec![0.0; CLASSES];
                class_label[i % CLASSES] = 1.0;
                let image = if zeros {
                    vec![0.0; IMAGE_LEN]
                } else {
                    (0..IMAGE_LEN).map(|p| ((p + i) % 7) as f32 / 7.0 - 0.5).collect()
                };
                LocalisationItem { image, class_label, bbox: vec![0.1, 0.2, 0.3, 0.4] }
            })
            .collect();
        LocalisationDataset::new(items, CLASSES).unwrap()
    }

    fn config(dir: &TempDir, epochs: usize, batch_size: usize) -> TrainConfig {
        TrainConfig {
            checkpoint_root: dir.path().join("checkpoints").to_string_lossy().into_owned(),
            graphs_root: dir.path().join("graphs").to_string_lossy().into_owned(),
            epochs,
            batch_size,
            num_classes: CLASSES,
            ..TrainConfig::default()
        }
    }

    fn bound_container() -> ModelContainer<B> {
        let mut container = ModelContainer::build(LocaliseNetConfig::new(CLASSES), 1e-3, Default::default()).unwrap();
        for head in Head::ALL {
            container.bind_optimizer(head);
            container.bind_summary(head, SummaryPolicy::LastBatch);
        }
        container
    }

    fn weights(container: &ModelContainer<B>) -> Vec<f32> {
        net_weights(container.net())
    }

    fn net_weights(net: &LocaliseNet<B>) -> Vec<f32> {
        let mut values = net.conv1.conv.weight.val().into_data().to_vec::<f32>().unwrap();
        values.extend(net.softmax.linear.weight.val().into_data().to_vec::<f32>().unwrap());
        values.extend(net.box_coord.linear.weight.val().into_data().to_vec::<f32>().unwrap());
        values
    }

    #[test]
    fn test_zero_images_one_epoch() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 1, 128);
        let mut container = bound_container();

        let report = run_training(&mut container, &dataset(256, true), Head::Classification, &cfg).unwrap();

        assert!(report.resumed_from.is_none());
        assert_eq!(report.epochs.len(), 1);
        assert_eq!(report.epochs[0].batches, 2);
        assert!(report.epochs[0].total_loss.is_finite());
        assert!(report.epochs[0].total_loss >= 0.0);
        assert_eq!(report.global_step, 2);
        assert!(report.checkpoints.is_empty());
        assert!(!dir.path().join("checkpoints/two_layer/checkpoint").exists());
    }

    #[test]
    fn test_remainder_is_dropped() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 2, 4);
        let mut container = bound_container();

        let report = run_training(&mut container, &dataset(10, false), Head::Regression, &cfg).unwrap();
        assert!(report.epochs.iter().all(|e| e.batches == 2));
        assert_eq!(report.global_step, 4);
        assert_eq!(container.steps().get(Head::Classification), 0);
    }

    #[test]
    fn test_five_epochs_write_one_checkpoint() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 5, 16);
        let mut container = bound_container();

        let report = run_training(&mut container, &dataset(32, false), Head::Classification, &cfg).unwrap();

        assert_eq!(report.checkpoints.len(), 1);
        let meta = &report.checkpoints[0];
        assert_eq!(meta.tag, "two_layer-5");
        assert_eq!(meta.epoch, 5);
        assert_eq!(meta.global_step, 10);
        assert!(dir.path().join("checkpoints/two_layer/two_layer-5.mpk.gz").exists());

        let scalars = std::fs::read_to_string(dir.path().join("graphs/two_layer/scalars.csv")).unwrap();
        assert_eq!(scalars.lines().count(), 6);
        assert!(scalars.lines().nth(1).unwrap().starts_with("cat_loss,1,"));
    }

    #[test]
    fn test_resume_restores_parameters_and_step() {
        let dir = TempDir::new().unwrap();
        let data = dataset(32, false);
        let mut first = bound_container();
        run_training(&mut first, &data, Head::Classification, &config(&dir, 5, 16)).unwrap();

        // Fresh parameters, then zero epochs: only the restore happens
        let mut second = bound_container();
        assert_ne!(weights(&second), weights(&first));
        let report = run_training(&mut second, &data, Head::Classification, &config(&dir, 0, 16)).unwrap();

        let resumed = report.resumed_from.unwrap();
        assert_eq!(resumed.tag, "two_layer-5");
        assert_eq!(report.global_step, 10);
        assert_eq!(second.steps().get(Head::Classification), 10);
        assert_eq!(weights(&second), weights(&first));
        assert!(report.epochs.is_empty());

        // Training continues counting from the restored epoch and step
        let report = run_training(&mut second, &data, Head::Classification, &config(&dir, 1, 16)).unwrap();
        assert_eq!(report.epochs[0].epoch, 6);
        assert_eq!(report.global_step, 12);
    }

    #[test]
    fn test_resumed_run_writes_a_new_tag() {
        let dir = TempDir::new().unwrap();
        let data = dataset(32, false);
        let cfg = config(&dir, 5, 16);
        let mut first = bound_container();
        run_training(&mut first, &data, Head::Classification, &cfg).unwrap();
        let first_weights = weights(&first);

        let mut second = bound_container();
        let report = run_training(&mut second, &data, Head::Classification, &cfg).unwrap();
        assert_eq!(report.epochs.first().unwrap().epoch, 6);
        assert_eq!(report.checkpoints.len(), 1);
        assert_eq!(report.checkpoints[0].tag, "two_layer-10");
        assert_eq!(report.checkpoints[0].retained, vec!["two_layer-5".to_string(), "two_layer-10".to_string()]);

        // The epoch-5 checkpoint still holds the first run's parameters
        let manager = CheckpointManager::new(&cfg.checkpoint_root, "two_layer", cfg.max_to_keep);
        let mut earlier = manager.latest().unwrap().unwrap();
        earlier.tag = "two_layer-5".to_string();
        let mut optimizer = HeadOptimizer::<B>::new(Head::Classification, cfg.lr);
        let restored = manager
            .restore(&earlier, bound_container().net().clone(), &mut optimizer, &Default::default())
            .unwrap();
        assert_eq!(net_weights(&restored), first_weights);
    }

    #[test]
    fn test_failed_checkpoint_write_ends_the_run() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 7, 16);
        // A directory where the epoch-5 parameter file belongs
        std::fs::create_dir_all(dir.path().join("checkpoints/two_layer/two_layer-5.mpk.gz")).unwrap();
        let mut container = bound_container();

        let err = run_training(&mut container, &dataset(32, false), Head::Classification, &cfg).err().unwrap();

        assert!(matches!(err, LocaliseError::CheckpointWrite { .. }));
        assert_eq!(container.steps().get(Head::Classification), 10);
        let scalars = std::fs::read_to_string(dir.path().join("graphs/two_layer/scalars.csv")).unwrap();
        assert_eq!(scalars.lines().count(), 6);
        assert!(!dir.path().join("checkpoints/two_layer/checkpoint").exists());
    }

    #[test]
    fn test_class_width_must_match_network() {
        let dir = TempDir::new().unwrap();
        let mut container = ModelContainer::<B>::build(LocaliseNetConfig::new(CLASSES + 1), 1e-3, Default::default()).unwrap();
        container.bind_optimizer(Head::Classification);
        container.bind_summary(Head::Classification, SummaryPolicy::LastBatch);

        let err = run_training(&mut container, &dataset(8, false), Head::Classification, &config(&dir, 1, 8)).err().unwrap();
        assert!(matches!(err, LocaliseError::Dataset(_)));
        assert_eq!(container.steps().get(Head::Classification), 0);
    }

    #[test]
    fn test_regression_after_classification_keeps_trunk() {
        let dir = TempDir::new().unwrap();
        let data = dataset(16, false);
        let mut container = bound_container();
        run_training(&mut container, &data, Head::Classification, &config(&dir, 1, 8)).unwrap();

        let trunk = container.net().conv2.conv.weight.val().into_data().to_vec::<f32>().unwrap();
        run_training(&mut container, &data, Head::Regression, &config(&dir, 1, 8)).unwrap();
        let after = container.net().conv2.conv.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(trunk, after);
    }

    #[test]
    fn test_unbound_head_fails_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 1, 8);
        let mut container = ModelContainer::<B>::build(LocaliseNetConfig::new(CLASSES), 1e-3, Default::default()).unwrap();
        container.bind_optimizer(Head::Regression);

        let err = run_training(&mut container, &dataset(8, false), Head::Regression, &cfg).err().unwrap();
        assert!(matches!(err, LocaliseError::Unbound { head: Head::Regression, what: "summary" }));
        assert!(!dir.path().join("graphs").exists());
    }

    #[test]
    fn test_small_dataset_gives_empty_epochs() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 1, 64);
        let mut container = bound_container();
        let report = run_training(&mut container, &dataset(8, false), Head::Classification, &cfg).unwrap();
        assert_eq!(report.epochs[0].batches, 0);
        assert_eq!(report.global_step, 0);
    }
}
