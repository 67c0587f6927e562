//! Optimizer abstractions for neural network parameter updates
//!
//! Optimizers consume the gradients accumulated in each registered
//! [`Parameter`] and update its values in place.
//!
//! # Available Optimizers
//!
//! - Adam: adaptive moment estimation (the experiment default)
//! - SGD: vanilla stochastic gradient descent
//!
//! # Example
//!
//! ```ignore
//! use low_rank_mnist::optimizers::{Adam, Optimizer};
//!
//! let mut optimizer = Adam::keras_defaults(0.001);
//! // after model.backward(...)
//! optimizer.step(model.parameters_mut());
//! ```

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::SGD;

use crate::layers::Parameter;

/// Core trait for neural network optimizers.
///
/// Each trainable tensor is addressed by its `slot`: its position in the
/// model's parameter registration order. Stateful optimizers key their
/// per-tensor state (e.g. Adam moments) by slot so tensors never share state.
pub trait Optimizer {
    /// Called once per batch before the per-slot updates.
    fn begin_step(&mut self) {}

    /// Update one parameter tensor in place.
    ///
    /// # Panics
    ///
    /// Implementations panic if `parameters` and `gradients` have different lengths.
    fn update(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]);

    /// Clear all accumulated state.
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);

    /// Apply one optimisation step to every parameter and clear their gradients.
    fn step(&mut self, parameters: Vec<&mut Parameter>) {
        self.begin_step();
        for (slot, param) in parameters.into_iter().enumerate() {
            let (values, grad) = param.values_and_grad();
            self.update(slot, values, grad);
            param.zero_grad();
        }
    }
}
