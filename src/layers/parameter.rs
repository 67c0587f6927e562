//! Trainable parameter registration.
//!
//! Every trainable tensor a layer owns is wrapped in a [`Parameter`]: a name,
//! its values and a gradient accumulator. Layers expose their parameters via
//! [`Layer::parameters`](crate::layers::Layer::parameters) so the optimizer can
//! find exactly the scalars it must update and nothing else.

use std::cell::RefCell;

/// A named, trainable f32 buffer with its gradient accumulator.
///
/// Gradients live behind a `RefCell` because `Layer::backward` takes `&self`;
/// the optimizer consumes them through `&mut` access and clears them.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    values: Vec<f32>,
    grad: RefCell<Vec<f32>>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, values: Vec<f32>) -> Self {
        let grad = RefCell::new(vec![0.0f32; values.len()]);
        Self {
            name: name.into(),
            values,
            grad,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Snapshot of the accumulated gradient.
    pub fn grad(&self) -> Vec<f32> {
        self.grad.borrow().clone()
    }

    /// Run `f` with mutable access to the gradient accumulator.
    pub fn with_grad_mut<R>(&self, f: impl FnOnce(&mut [f32]) -> R) -> R {
        f(&mut self.grad.borrow_mut())
    }

    /// Split into `(values, gradient)` for an optimizer step.
    pub fn values_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (self.values.as_mut_slice(), self.grad.get_mut().as_slice())
    }

    pub fn zero_grad(&mut self) {
        self.grad.get_mut().iter_mut().for_each(|g| *g = 0.0);
    }
}
