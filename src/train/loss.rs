//! Softmax cross-entropy over class logits.

use crate::error::LayerError;
use crate::utils::activations::{argmax, softmax_rows};

/// Probabilities are clipped to this before taking the log.
const PROB_FLOOR: f32 = 1e-7;

/// Result of one loss evaluation over a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchLoss {
    /// Summed (not averaged) cross-entropy over the batch.
    pub total: f32,
    /// Number of rows whose argmax matched the label.
    pub correct: usize,
}

/// Softmax + cross-entropy.
///
/// Overwrites `logits` with probabilities and writes the gradient of the
/// *mean* batch loss into `grad`: `(p - onehot) / batch`.
pub fn softmax_cross_entropy(
    logits: &mut [f32],
    labels: &[u8],
    classes: usize,
    grad: &mut [f32],
) -> Result<BatchLoss, LayerError> {
    let batch = labels.len();
    LayerError::check_len("loss logits", batch * classes, logits.len())?;
    LayerError::check_len("loss grad", batch * classes, grad.len())?;

    softmax_rows(logits, batch, classes);
    let scale = 1.0 / batch.max(1) as f32;

    let mut total = 0.0f32;
    let mut correct = 0usize;
    for ((probs, delta), &label) in logits
        .chunks_exact(classes)
        .zip(grad.chunks_exact_mut(classes))
        .zip(labels)
    {
        let y = usize::from(label);
        total -= probs[y].max(PROB_FLOOR).ln();
        if argmax(probs) == y {
            correct += 1;
        }
        for (j, (d, &p)) in delta.iter_mut().zip(probs).enumerate() {
            let target = if j == y { 1.0 } else { 0.0 };
            *d = (p - target) * scale;
        }
    }
    Ok(BatchLoss { total, correct })
}

/// Loss and accuracy without a gradient, for evaluation.
pub fn score_logits(logits: &mut [f32], labels: &[u8], classes: usize) -> Result<BatchLoss, LayerError> {
    let mut grad = vec![0.0f32; logits.len()];
    softmax_cross_entropy(logits, labels, classes, &mut grad)
}
