//! Dropout layer implementation for regularization
//!
//! During training a fraction of units is zeroed and the survivors are scaled by
//! 1/(1-drop_rate) (inverted dropout), so inference is a plain pass-through.

use crate::error::LayerError;
use crate::layers::r#trait::{check_backward_buffers, check_forward_buffers};
use crate::layers::Layer;
use crate::utils::rng::SimpleRng;
use std::cell::RefCell;

/// Dropout layer for regularization.
///
/// # Fields
///
/// * `size` - Number of input/output features (dropout doesn't change dimensions)
/// * `drop_rate` - Probability of dropping each unit
/// * `training` - Whether masks are applied (training) or inputs pass through
/// * `mask` - Keep mask (1.0 kept, 0.0 dropped) from the last training forward pass
/// * `rng` - Private generator for the masks
#[derive(Debug, Clone)]
pub struct DropoutLayer {
    size: usize,
    drop_rate: f32,
    training: bool,
    mask: RefCell<Vec<f32>>,
    rng: RefCell<SimpleRng>,
}

impl DropoutLayer {
    /// Creates a new dropout layer in training mode.
    ///
    /// The mask generator is forked from `rng` so masks do not replay the
    /// sequence used for weight initialisation.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `size` is zero or `drop_rate` is outside [0.0, 1.0).
    ///
    /// # Examples
    ///
    /// ```
    /// use low_rank_mnist::layers::{DropoutLayer, Layer};
    /// use low_rank_mnist::utils::SimpleRng;
    ///
    /// let mut rng = SimpleRng::new(42);
    /// let layer = DropoutLayer::new(256, 0.3, &mut rng).unwrap();
    /// assert_eq!(layer.parameter_count(), 0);
    /// ```
    pub fn new(size: usize, drop_rate: f32, rng: &mut SimpleRng) -> Result<Self, LayerError> {
        if size == 0 {
            return Err(LayerError::invalid("dropout size must be positive"));
        }
        if !(0.0..1.0).contains(&drop_rate) {
            return Err(LayerError::invalid(format!(
                "drop_rate must be in range [0.0, 1.0), got {}",
                drop_rate
            )));
        }

        let seed = (u64::from(rng.next_u32()) << 32) | u64::from(rng.next_u32());
        Ok(Self {
            size,
            drop_rate,
            training: true,
            mask: RefCell::new(Vec::new()),
            rng: RefCell::new(SimpleRng::fork(seed, 0)),
        })
    }

    pub fn drop_rate(&self) -> f32 {
        self.drop_rate
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    fn scale(&self) -> f32 {
        1.0 / (1.0 - self.drop_rate)
    }
}

impl Layer for DropoutLayer {
    fn name(&self) -> String {
        format!("dropout({})", self.drop_rate)
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) -> Result<(), LayerError> {
        check_forward_buffers(self, input, output, batch_size)?;

        if !self.training {
            output.copy_from_slice(input);
            return Ok(());
        }

        let scale = self.scale();
        let mut mask = self.mask.borrow_mut();
        let mut rng = self.rng.borrow_mut();
        mask.resize(input.len(), 0.0);

        for ((out, &x), keep) in output.iter_mut().zip(input).zip(mask.iter_mut()) {
            if rng.next_f32() >= self.drop_rate {
                *keep = 1.0;
                *out = x * scale;
            } else {
                *keep = 0.0;
                *out = 0.0;
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

        if !self.training {
            grad_input.copy_from_slice(grad_output);
            return Ok(());
        }

        let mask = self.mask.borrow();
        LayerError::check_len("dropout mask", grad_output.len(), mask.len())?;
        let scale = self.scale();
        for ((g_in, &g_out), &keep) in grad_input.iter_mut().zip(grad_output).zip(mask.iter()) {
            *g_in = g_out * keep * scale;
        }
        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }
}
