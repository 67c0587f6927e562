//! 2D Convolutional layer implementation
//!
//! Feature maps are stored channel-major (CHW) per sample, samples back to back.

use crate::error::LayerError;
use crate::layers::r#trait::{check_backward_buffers, check_forward_buffers};
use crate::layers::{Layer, Parameter};
use crate::utils::SimpleRng;

/// Shape of a convolution: channels, square kernel, padding, stride and input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2DShape {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub padding: usize,
    pub stride: usize,
    pub input_height: usize,
    pub input_width: usize,
}

impl Conv2DShape {
    /// Unpadded, stride-1 convolution (Keras `padding="valid"`).
    pub fn valid(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        input_height: usize,
        input_width: usize,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            padding: 0,
            stride: 1,
            input_height,
            input_width,
        }
    }

    /// (input_height + 2*padding - kernel_size) / stride + 1
    pub fn output_height(&self) -> usize {
        (self.input_height + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    /// (input_width + 2*padding - kernel_size) / stride + 1
    pub fn output_width(&self) -> usize {
        (self.input_width + 2 * self.padding - self.kernel_size) / self.stride + 1
    }

    fn validate(&self) -> Result<(), LayerError> {
        if self.in_channels == 0 || self.out_channels == 0 || self.kernel_size == 0 || self.stride == 0 {
            return Err(LayerError::invalid(format!(
                "conv2d channels, kernel size and stride must be positive: {:?}",
                self
            )));
        }
        if self.input_height + 2 * self.padding < self.kernel_size
            || self.input_width + 2 * self.padding < self.kernel_size
        {
            return Err(LayerError::invalid(format!(
                "conv2d kernel {} does not fit a padded {}x{} input",
                self.kernel_size, self.input_height, self.input_width
            )));
        }
        Ok(())
    }
}

/// 2D Convolutional layer with learnable filters.
///
/// Weights are laid out `out_channels × in_channels × kernel_size × kernel_size`,
/// one bias per output channel.
///
/// # Example
///
/// ```
/// use low_rank_mnist::layers::{Conv2DLayer, Conv2DShape, Layer};
/// use low_rank_mnist::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = Conv2DLayer::new(Conv2DShape::valid(1, 4, 3, 28, 28), &mut rng).unwrap();
/// assert_eq!(layer.output_size(), 4 * 26 * 26);
/// ```
#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    shape: Conv2DShape,
    weights: Parameter,
    biases: Parameter,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with Xavier initialization.
    ///
    /// fan_in = in_channels × kernel_size², fan_out = out_channels × kernel_size²;
    /// weights are sampled from U[-limit, limit] with limit = sqrt(6 / (fan_in + fan_out)).
    /// Biases are initialized to zero.
    pub fn new(shape: Conv2DShape, rng: &mut SimpleRng) -> Result<Self, LayerError> {
        shape.validate()?;

        let k2 = shape.kernel_size * shape.kernel_size;
        let fan_in = (shape.in_channels * k2) as f32;
        let fan_out = (shape.out_channels * k2) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = shape.out_channels * shape.in_channels * k2;
        let weights = (0..weight_count)
            .map(|_| rng.gen_range_f32(-limit, limit))
            .collect();

        Ok(Self {
            shape,
            weights: Parameter::new("kernel", weights),
            biases: Parameter::new("bias", vec![0.0f32; shape.out_channels]),
        })
    }

    pub fn shape(&self) -> &Conv2DShape {
        &self.shape
    }

    /// Visit every (output index, input index, weight index) triple that
    /// contributes to the convolution of one sample.
    fn for_each_tap(&self, mut f: impl FnMut(usize, usize, usize)) {
        let s = &self.shape;
        let (out_h, out_w) = (s.output_height(), s.output_width());
        let in_spatial = s.input_height * s.input_width;
        let k = s.kernel_size;

        for oc in 0..s.out_channels {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let out_idx = (oc * out_h + oy) * out_w + ox;
                    for ic in 0..s.in_channels {
                        let w_base = (oc * s.in_channels + ic) * k * k;
                        for ky in 0..k {
                            // Padded coordinate; skip taps that land in the zero border.
                            let py = oy * s.stride + ky;
                            if py < s.padding || py - s.padding >= s.input_height {
                                continue;
                            }
                            let iy = py - s.padding;
                            for kx in 0..k {
                                let px = ox * s.stride + kx;
                                if px < s.padding || px - s.padding >= s.input_width {
                                    continue;
                                }
                                let ix = px - s.padding;
                                let in_idx = ic * in_spatial + iy * s.input_width + ix;
                                f(out_idx, in_idx, w_base + ky * k + kx);
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Layer for Conv2DLayer {
    fn name(&self) -> String {
        format!(
            "conv2d({}->{}, {}x{})",
            self.shape.in_channels, self.shape.out_channels, self.shape.kernel_size, self.shape.kernel_size
        )
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) -> Result<(), LayerError> {
        check_forward_buffers(self, input, output, batch_size)?;
        let weights = self.weights.values();
        let biases = self.biases.values();
        let out_spatial = self.shape.output_height() * self.shape.output_width();

        for (x, y) in input
            .chunks_exact(self.input_size())
            .zip(output.chunks_exact_mut(self.output_size()))
        {
            for (channel, &bias) in y.chunks_exact_mut(out_spatial).zip(biases) {
                channel.iter_mut().for_each(|v| *v = bias);
            }
            self.for_each_tap(|out_idx, in_idx, w_idx| {
                y[out_idx] += x[in_idx] * weights[w_idx];
            });
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
        grad_input.iter_mut().for_each(|v| *v = 0.0);

        self.weights.with_grad_mut(|grad_w| {
            self.biases.with_grad_mut(|grad_b| {
                for ((x, g), g_in) in input
                    .chunks_exact(self.input_size())
                    .zip(grad_output.chunks_exact(self.output_size()))
                    .zip(grad_input.chunks_exact_mut(self.input_size()))
                {
                    let out_spatial = self.shape.output_height() * self.shape.output_width();
                    for (gb, channel) in grad_b.iter_mut().zip(g.chunks_exact(out_spatial)) {
                        *gb += channel.iter().sum::<f32>();
                    }
                    self.for_each_tap(|out_idx, in_idx, w_idx| {
                        let g_o = g[out_idx];
                        grad_w[w_idx] += g_o * x[in_idx];
                        g_in[in_idx] += g_o * weights[w_idx];
                    });
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
        self.shape.in_channels * self.shape.input_height * self.shape.input_width
    }

    fn output_size(&self) -> usize {
        self.shape.out_channels * self.shape.output_height() * self.shape.output_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv2d_parameter_count() {
        let mut rng = SimpleRng::new(42);
        let layer = Conv2DLayer::new(Conv2DShape::valid(4, 16, 3, 13, 13), &mut rng).unwrap();
        // weights: 16 * 4 * 3 * 3 = 576, biases: 16
        assert_eq!(layer.parameter_count(), 592);
    }

    #[test]
    fn test_conv2d_output_dimensions() {
        let valid = Conv2DShape::valid(1, 4, 3, 28, 28);
        assert_eq!(valid.output_height(), 26);
        assert_eq!(valid.output_width(), 26);

        let padded = Conv2DShape {
            padding: 1,
            ..valid
        };
        assert_eq!(padded.output_height(), 28);
    }

    #[test]
    fn test_conv2d_rejects_oversized_kernel() {
        let mut rng = SimpleRng::new(42);
        assert!(Conv2DLayer::new(Conv2DShape::valid(1, 1, 5, 3, 3), &mut rng).is_err());
        assert!(Conv2DLayer::new(Conv2DShape::valid(0, 1, 3, 3, 3), &mut rng).is_err());
    }

    #[test]
    fn test_conv2d_forward_backward_single_tap() {
        let mut rng = SimpleRng::new(42);
        let mut layer = Conv2DLayer::new(Conv2DShape::valid(1, 1, 2, 3, 3), &mut rng).unwrap();
        layer.weights.values_mut().copy_from_slice(&[1.0, 0.0, 0.0, 1.0]);
        layer.biases.values_mut()[0] = 0.5;

        // Each output = x[y][x] + x[y+1][x+1] + 0.5
        let input: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let mut output = vec![0.0f32; 4];
        layer.forward(&input, &mut output, 1).unwrap();
        assert_eq!(output, vec![6.5, 8.5, 12.5, 14.5]);

        let grad_output = vec![1.0f32, 0.0, 0.0, 0.0];
        let mut grad_input = vec![0.0f32; 9];
        layer
            .backward(&input, &output, &grad_output, &mut grad_input, 1)
            .unwrap();
        assert_eq!(grad_input, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(layer.weights.grad(), vec![1.0, 2.0, 4.0, 5.0]);
        assert_eq!(layer.biases.grad(), vec![1.0]);
    }
}
