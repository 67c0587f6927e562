//! Max pooling layer
//!
//! Non-overlapping `pool × pool` windows with stride `pool`. Trailing rows and
//! columns that do not fill a window are dropped, so an 11×11 map pools to 5×5.

use crate::error::LayerError;
use crate::layers::r#trait::{check_backward_buffers, check_forward_buffers};
use crate::layers::Layer;

/// 2D max pooling over CHW feature maps.
#[derive(Debug, Clone)]
pub struct MaxPool2DLayer {
    channels: usize,
    input_height: usize,
    input_width: usize,
    pool: usize,
}

impl MaxPool2DLayer {
    pub fn new(
        channels: usize,
        input_height: usize,
        input_width: usize,
        pool: usize,
    ) -> Result<Self, LayerError> {
        if channels == 0 || pool == 0 || input_height < pool || input_width < pool {
            return Err(LayerError::invalid(format!(
                "cannot pool a {}x{}x{} map with window {}",
                channels, input_height, input_width, pool
            )));
        }
        Ok(Self {
            channels,
            input_height,
            input_width,
            pool,
        })
    }

    pub fn output_height(&self) -> usize {
        self.input_height / self.pool
    }

    pub fn output_width(&self) -> usize {
        self.input_width / self.pool
    }

    /// Index (within one sample) of the max input of every pooled cell.
    /// Ties go to the first position in row-major window order.
    fn for_each_window(&self, x: &[f32], mut f: impl FnMut(usize, usize)) {
        let (out_h, out_w) = (self.output_height(), self.output_width());
        let in_spatial = self.input_height * self.input_width;

        for c in 0..self.channels {
            let in_base = c * in_spatial;
            for py in 0..out_h {
                for px in 0..out_w {
                    let mut best_idx = in_base + py * self.pool * self.input_width + px * self.pool;
                    for dy in 0..self.pool {
                        for dx in 0..self.pool {
                            let idx = in_base
                                + (py * self.pool + dy) * self.input_width
                                + px * self.pool
                                + dx;
                            if x[idx] > x[best_idx] {
                                best_idx = idx;
                            }
                        }
                    }
                    f((c * out_h + py) * out_w + px, best_idx);
                }
            }
        }
    }
}

impl Layer for MaxPool2DLayer {
    fn name(&self) -> String {
        format!("maxpool({}x{})", self.pool, self.pool)
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) -> Result<(), LayerError> {
        check_forward_buffers(self, input, output, batch_size)?;

        for (x, y) in input
            .chunks_exact(self.input_size())
            .zip(output.chunks_exact_mut(self.output_size()))
        {
            self.for_each_window(x, |out_idx, in_idx| y[out_idx] = x[in_idx]);
        }
        Ok(())
    }

    /// Gradients are routed to the argmax of each window, recomputed from `input`.
    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) -> Result<(), LayerError> {
        check_backward_buffers(self, input, output, grad_output, grad_input, batch_size)?;
        grad_input.iter_mut().for_each(|v| *v = 0.0);

        for ((x, g), g_in) in input
            .chunks_exact(self.input_size())
            .zip(grad_output.chunks_exact(self.output_size()))
            .zip(grad_input.chunks_exact_mut(self.input_size()))
        {
            self.for_each_window(x, |out_idx, in_idx| g_in[in_idx] += g[out_idx]);
        }
        Ok(())
    }

    fn input_size(&self) -> usize {
        self.channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.channels * self.output_height() * self.output_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_output_size() {
        let layer = MaxPool2DLayer::new(16, 11, 11, 2).unwrap();
        assert_eq!(layer.output_height(), 5);
        assert_eq!(layer.output_size(), 16 * 25);
    }

    #[test]
    fn test_forward_and_backward_route_to_max() {
        let layer = MaxPool2DLayer::new(1, 3, 3, 2).unwrap();
        // Only the top-left 2x2 window is used; the last row/column are dropped.
        let input = [1.0, 4.0, 9.0, 3.0, 2.0, 9.0, 9.0, 9.0, 9.0];
        let mut output = [0.0f32; 1];
        layer.forward(&input, &mut output, 1).unwrap();
        assert_eq!(output, [4.0]);

        let mut grad_input = [0.0f32; 9];
        layer
            .backward(&input, &output, &[2.5], &mut grad_input, 1)
            .unwrap();
        assert_eq!(grad_input, [0.0, 2.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rejects_window_larger_than_map() {
        assert!(MaxPool2DLayer::new(1, 1, 1, 2).is_err());
    }
}
