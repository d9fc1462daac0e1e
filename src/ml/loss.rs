// ============================================================
// Layer 5 — Losses
// ============================================================
// classification: mean over the batch of −Σ y·log p, where p is
// the softmax of the logits. Computed as log_softmax(logits) so
// that large logits never produce log(0).
//
// regression: mean over the batch of Σ (y − ŷ)², summed over the
// four box coordinates.
//
// Both return a single-element tensor so the autodiff graph can
// call `.backward()` on it directly.

use burn::{prelude::*, tensor::activation::log_softmax};

/// logits, labels: [batch, num_classes] → [1]
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    (labels * log_probs).sum_dim(1).neg().mean()
}

/// predictions, targets: [batch, 4] → [1]
pub fn squared_error<B: Backend>(predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    (targets - predictions).powf_scalar(2.0).sum_dim(1).mean()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn tensor(rows: &[[f32; 4]]) -> Tensor<B, 2> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [rows.len(), 4]), &Default::default())
    }

    #[test]
    fn test_cross_entropy_of_uniform_logits_is_log_k() {
        let logits = tensor(&[[0.0; 4], [0.0; 4]]);
        let labels = tensor(&[[1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0]]);
        let loss: f32 = cross_entropy(logits, labels).into_scalar();
        assert!((loss - 4.0f32.ln()).abs() < 1e-5, "loss = {loss}");
    }

    #[test]
    fn test_cross_entropy_stays_finite_for_extreme_logits() {
        let logits = tensor(&[[1000.0, -1000.0, 0.0, 0.0]]);
        let labels = tensor(&[[0.0, 1.0, 0.0, 0.0]]);
        let loss: f32 = cross_entropy(logits, labels).into_scalar();
        assert!(loss.is_finite());
        assert!((loss - 2000.0).abs() < 1.0, "loss = {loss}");
    }

    #[test]
    fn test_cross_entropy_ignores_all_zero_rows() {
        // Rows without a label contribute nothing, but still count in the mean
        let logits = tensor(&[[0.0; 4], [5.0, 1.0, 0.0, 0.0]]);
        let labels = tensor(&[[1.0, 0.0, 0.0, 0.0], [0.0; 4]]);
        let loss: f32 = cross_entropy(logits, labels).into_scalar();
        assert!((loss - 4.0f32.ln() / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_squared_error_sums_coordinates_and_averages_rows() {
        let predictions = tensor(&[[0.0; 4], [1.0; 4]]);
        let targets = tensor(&[[1.0; 4], [1.0; 4]]);
        let loss: f32 = squared_error(predictions, targets).into_scalar();
        assert!((loss - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_squared_error_is_zero_on_exact_match() {
        let boxes = tensor(&[[0.1, 0.2, 0.3, 0.4]]);
        let loss: f32 = squared_error(boxes.clone(), boxes).into_scalar();
        assert_eq!(loss, 0.0);
    }
}
