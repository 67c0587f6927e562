//! Activation helpers shared by layers and the loss.
//!
//! - ReLU (in-place, plus its backward mask)
//! - Softmax (row-wise, max-subtracted)
//! - Argmax over rows for accuracy

/// ReLU applied in-place: negative values become 0.0.
pub fn relu_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        if *value < 0.0 {
            *value = 0.0;
        }
    }
}

/// ReLU backward given the post-activation values: gradient is zeroed where
/// the activation was not positive.
pub fn relu_backward(activated: &[f32], grad_output: &[f32], grad_input: &mut [f32]) {
    for ((g_in, &g_out), &a) in grad_input.iter_mut().zip(grad_output).zip(activated) {
        *g_in = if a > 0.0 { g_out } else { 0.0 };
    }
}

/// Softmax applied row-wise over a row-major `rows × cols` buffer.
///
/// Uses the max-subtraction trick so large logits do not overflow.
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let max_value = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}

/// Index of the largest value in `row` (first one wins on ties).
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0usize;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}
