//! ReLU activation as a pipeline stage.

use crate::error::LayerError;
use crate::layers::r#trait::{check_backward_buffers, check_forward_buffers};
use crate::layers::Layer;
use crate::utils::activations::{relu_backward, relu_inplace};

/// Element-wise `max(0, x)` over `size` features.
#[derive(Debug, Clone)]
pub struct ReluLayer {
    size: usize,
}

impl ReluLayer {
    pub fn new(size: usize) -> Result<Self, LayerError> {
        if size == 0 {
            return Err(LayerError::invalid("relu size must be positive"));
        }
        Ok(Self { size })
    }
}

impl Layer for ReluLayer {
    fn name(&self) -> String {
        "relu".to_string()
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) -> Result<(), LayerError> {
        check_forward_buffers(self, input, output, batch_size)?;
        output.copy_from_slice(input);
        relu_inplace(output);
        Ok(())
    }

    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) -> Result<(), LayerError> {
        check_backward_buffers(self, input, output, grad_output, grad_input, batch_size)?;
        relu_backward(output, grad_output, grad_input);
        Ok(())
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }
}
