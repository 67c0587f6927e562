//! Dense (fully connected) layer implementation
//!
//! This module provides a DenseLayer (also known as Linear or Fully Connected layer)
//! that performs the transformation: output = input × weights + biases

use crate::error::LayerError;
use crate::layers::r#trait::{check_backward_buffers, check_forward_buffers};
use crate::layers::{Layer, Parameter};
use crate::utils::SimpleRng;

/// Dense (fully connected) layer with weights and biases.
///
/// Performs the linear transformation: y = xW + b
/// where x is the input (batch_size × input_size),
/// W is the weight matrix (input_size × output_size, row-major),
/// and b is the bias vector (output_size).
///
/// # Example
///
/// ```
/// use low_rank_mnist::layers::{DenseLayer, Layer};
/// use low_rank_mnist::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DenseLayer::new(144, 10, &mut rng).unwrap();
/// assert_eq!(layer.parameter_count(), 144 * 10 + 10);
/// ```
#[derive(Debug, Clone)]
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Parameter,
    biases: Parameter,
}

impl DenseLayer {
    /// Create a new DenseLayer with Xavier initialization.
    ///
    /// Weights are sampled from U[-limit, limit] with
    /// limit = sqrt(6 / (input_size + output_size)); biases start at zero.
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Result<Self, LayerError> {
        if input_size == 0 || output_size == 0 {
            return Err(LayerError::invalid(format!(
                "dense layer sizes must be positive, got {}x{}",
                input_size, output_size
            )));
        }

        // Xavier initialization: limit = sqrt(6 / (fan_in + fan_out))
        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let weights = (0..input_size * output_size)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Ok(Self {
            input_size,
            output_size,
            weights: Parameter::new("kernel", weights),
            biases: Parameter::new("bias", vec![0.0f32; output_size]),
        })
    }

    pub fn weights(&self) -> &[f32] {
        self.weights.values()
    }

    pub fn biases(&self) -> &[f32] {
        self.biases.values()
    }
}

impl Layer for DenseLayer {
    fn name(&self) -> String {
        format!("dense({}->{})", self.input_size, self.output_size)
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) -> Result<(), LayerError> {
        check_forward_buffers(self, input, output, batch_size)?;
        let weights = self.weights.values();
        let biases = self.biases.values();

        for (x, y) in input
            .chunks_exact(self.input_size)
            .zip(output.chunks_exact_mut(self.output_size))
        {
            y.copy_from_slice(biases);
            for (&x_i, w_row) in x.iter().zip(weights.chunks_exact(self.output_size)) {
                for (y_j, &w) in y.iter_mut().zip(w_row) {
                    *y_j += x_i * w;
                }
            }
        }
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
        let weights = self.weights.values();

        self.weights.with_grad_mut(|grad_w| {
            self.biases.with_grad_mut(|grad_b| {
                for ((x, g), g_in) in input
                    .chunks_exact(self.input_size)
                    .zip(grad_output.chunks_exact(self.output_size))
                    .zip(grad_input.chunks_exact_mut(self.input_size))
                {
                    for (gb, &g_j) in grad_b.iter_mut().zip(g) {
                        *gb += g_j;
                    }

                    for (i, (&x_i, g_in_i)) in x.iter().zip(g_in.iter_mut()).enumerate() {
                        let row = i * self.output_size..(i + 1) * self.output_size;
                        let mut acc = 0.0f32;
                        for ((gw, &w), &g_j) in grad_w[row.clone()].iter_mut().zip(&weights[row]).zip(g) {
                            *gw += x_i * g_j;
                            acc += g_j * w;
                        }
                        *g_in_i = acc;
                    }
                }
            })
        });
        Ok(())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weights, &self.biases]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weights, &mut self.biases]
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }
}
