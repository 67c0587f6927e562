//! Adam (Adaptive Moment Estimation) optimizer implementation
//!
//! Combines momentum and per-scalar adaptive learning rates with bias
//! correction. Moments are kept per parameter slot.

use crate::optimizers::Optimizer;

/// First and second moment estimates for one parameter tensor.
#[derive(Debug, Clone, Default)]
struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
}

/// Adam optimizer.
///
/// ```text
/// m_t = β1 * m_{t-1} + (1 - β1) * gradient
/// v_t = β2 * v_{t-1} + (1 - β2) * gradient²
/// m_hat = m_t / (1 - β1^t)
/// v_hat = v_t / (1 - β2^t)
/// parameter = parameter - α * m_hat / (√v_hat + ε)
/// ```
///
/// `t` advances once per [`begin_step`](Optimizer::begin_step), i.e. once per
/// batch, and is shared by every slot.
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    moments: Vec<Moments>,
    t: u32,
}

impl Adam {
    /// Creates a new Adam optimizer with the specified hyperparameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use low_rank_mnist::optimizers::{Adam, Optimizer};
    ///
    /// let optimizer = Adam::new(0.001, 0.9, 0.999, 1e-8);
    /// assert_eq!(optimizer.learning_rate(), 0.001);
    /// ```
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            moments: Vec::new(),
            t: 0,
        }
    }

    /// β1 = 0.9, β2 = 0.999, ε = 1e-7 (the Keras defaults).
    pub fn keras_defaults(learning_rate: f32) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn time_step(&self) -> u32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update(&mut self, slot: usize, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.moments.len() <= slot {
            self.moments.resize_with(slot + 1, Moments::default);
        }
        let state = &mut self.moments[slot];
        if state.m.len() != parameters.len() {
            state.m = vec![0.0; parameters.len()];
            state.v = vec![0.0; parameters.len()];
        }

        // Updates issued without begin_step behave as the first step.
        let t = self.t.max(1) as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);

        for (((param, &grad), m), v) in parameters
            .iter_mut()
            .zip(gradients)
            .zip(state.m.iter_mut())
            .zip(state.v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * grad;
            *v = self.beta2 * *v + (1.0 - self.beta2) * grad * grad;

            let m_hat = *m / bias_correction1;
            let v_hat = *v / bias_correction2;
            *param -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.moments.clear();
        self.t = 0;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
