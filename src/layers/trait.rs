//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait that all layer types must implement.
//! The trait provides a common interface for forward propagation, backward
//! propagation and parameter discovery by the optimizer.

use crate::error::LayerError;
use crate::layers::Parameter;

/// Core trait for neural network layers.
///
/// All layer types (Conv2D, LowRank, Dense, etc.) implement this trait to provide
/// a uniform interface for forward and backward propagation. Data is passed as
/// flat f32 buffers holding `batch_size` samples back to back.
///
/// # Example
///
/// ```ignore
/// // Forward pass through a layer
/// let mut output = vec![0.0f32; batch_size * layer.output_size()];
/// layer.forward(&input, &mut output, batch_size)?;
///
/// // Backward pass to compute gradients
/// let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
/// layer.backward(&input, &output, &grad_output, &mut grad_input, batch_size)?;
/// ```
pub trait Layer {
    /// Short human-readable layer name, e.g. `conv2d(1->4, 3x3)`.
    fn name(&self) -> String;

    /// Forward propagation through the layer.
    ///
    /// # Arguments
    ///
    /// * `input` - Input data flattened as a 1D array (batch_size × input_size)
    /// * `output` - Output buffer to store results (batch_size × output_size)
    /// * `batch_size` - Number of samples in the batch
    ///
    /// # Errors
    ///
    /// `LayerError::ShapeMismatch` if a buffer length does not match the layer.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize)
        -> Result<(), LayerError>;

    /// Backward propagation through the layer.
    ///
    /// Computes `grad_input` and accumulates gradients into the layer's
    /// parameters. Accumulated gradients are consumed by the optimizer.
    ///
    /// # Arguments
    ///
    /// * `input` - Input data from the forward pass (batch_size × input_size)
    /// * `output` - Output produced by that forward pass (batch_size × output_size)
    /// * `grad_output` - Gradient of loss w.r.t. layer output (batch_size × output_size)
    /// * `grad_input` - Buffer to store gradient w.r.t. input (batch_size × input_size)
    /// * `batch_size` - Number of samples in the batch
    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) -> Result<(), LayerError>;

    /// Trainable parameters, in a stable registration order.
    fn parameters(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    /// Mutable access to the trainable parameters, same order as `parameters`.
    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }

    /// Switch between training and inference behaviour (only dropout cares).
    fn set_training(&mut self, _training: bool) {}

    /// Expected number of input features per sample.
    fn input_size(&self) -> usize;

    /// Number of output features per sample.
    fn output_size(&self) -> usize;

    /// Total count of trainable scalars.
    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

/// Checks the four buffers handed to `Layer::backward`.
pub(crate) fn check_backward_buffers(
    layer: &dyn Layer,
    input: &[f32],
    output: &[f32],
    grad_output: &[f32],
    grad_input: &[f32],
    batch_size: usize,
) -> Result<(), LayerError> {
    let in_len = batch_size * layer.input_size();
    let out_len = batch_size * layer.output_size();
    LayerError::check_len("backward input", in_len, input.len())?;
    LayerError::check_len("backward output", out_len, output.len())?;
    LayerError::check_len("grad_output", out_len, grad_output.len())?;
    LayerError::check_len("grad_input", in_len, grad_input.len())
}

/// Checks the two buffers handed to `Layer::forward`.
pub(crate) fn check_forward_buffers(
    layer: &dyn Layer,
    input: &[f32],
    output: &[f32],
    batch_size: usize,
) -> Result<(), LayerError> {
    LayerError::check_len("input", batch_size * layer.input_size(), input.len())?;
    LayerError::check_len("output", batch_size * layer.output_size(), output.len())
}
