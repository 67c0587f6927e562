//! Low-rank linear layer
//!
//! Represents an N×N matrix implicitly as a sum of `rank` outer products:
//!
//! ```text
//! M = Σ_{i=0..rank} u_i ⊗ v_i        y = M · x = Σ_i u_i · (v_i · x)
//! ```
//!
//! Each `u_i` and `v_i` is a separately registered trainable vector, so the
//! layer exposes 2·rank·N scalars instead of the N² of a dense map.

use crate::error::LayerError;
use crate::layers::r#trait::{check_backward_buffers, check_forward_buffers};
use crate::layers::{Layer, Parameter};
use crate::utils::SimpleRng;

/// Standard deviation of the normal distribution the factors are drawn from.
pub const DEFAULT_INIT_STDDEV: f32 = 0.05;

/// Linear map `y = (Σ_i u_i v_iᵀ) x` applied to a batch of N-length columns.
///
/// # Example
///
/// ```
/// use low_rank_mnist::layers::LowRankLayer;
///
/// let layer = LowRankLayer::from_factors(
///     vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
///     vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
/// )
/// .unwrap();
///
/// let mut output = vec![0.0f32; 4];
/// layer.apply(&[1.0, 2.0, 3.0, 4.0], &mut output, 1).unwrap();
/// assert_eq!(output, vec![1.0, 2.0, 0.0, 0.0]);
/// ```
#[derive(Debug, Clone)]
pub struct LowRankLayer {
    dimension: usize,
    left: Vec<Parameter>,
    right: Vec<Parameter>,
}

impl LowRankLayer {
    /// Create a layer with factors drawn from N(0, 0.05²).
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `dimension` or `rank` is zero.
    pub fn new(dimension: usize, rank: usize, rng: &mut SimpleRng) -> Result<Self, LayerError> {
        Self::with_init_stddev(dimension, rank, DEFAULT_INIT_STDDEV, rng)
    }

    /// Create a layer with factors drawn from N(0, `std_dev`²).
    pub fn with_init_stddev(
        dimension: usize,
        rank: usize,
        std_dev: f32,
        rng: &mut SimpleRng,
    ) -> Result<Self, LayerError> {
        if dimension == 0 {
            return Err(LayerError::invalid("low-rank dimension must be positive"));
        }
        if rank == 0 {
            return Err(LayerError::invalid("low-rank rank must be positive"));
        }
        if std_dev.is_nan() || std_dev <= 0.0 {
            return Err(LayerError::invalid(format!(
                "init standard deviation must be positive, got {}",
                std_dev
            )));
        }

        let mut sample = || -> Vec<f32> {
            (0..dimension).map(|_| rng.next_gaussian(0.0, std_dev)).collect()
        };

        let mut left = Vec::with_capacity(rank);
        let mut right = Vec::with_capacity(rank);
        // u_i then v_i, pair by pair, so registration order matches draw order.
        for i in 0..rank {
            left.push(Parameter::new(format!("weightu_{}", i), sample()));
            right.push(Parameter::new(format!("weightv_{}", i), sample()));
        }

        Ok(Self {
            dimension,
            left,
            right,
        })
    }

    /// Build a layer from explicit factor vectors.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the lists are empty, differ in length, or any
    /// vector's length differs from the first one (or is zero).
    pub fn from_factors(left: Vec<Vec<f32>>, right: Vec<Vec<f32>>) -> Result<Self, LayerError> {
        if left.is_empty() {
            return Err(LayerError::invalid("low-rank rank must be positive"));
        }
        if left.len() != right.len() {
            return Err(LayerError::invalid(format!(
                "{} left factors but {} right factors",
                left.len(),
                right.len()
            )));
        }
        let dimension = left[0].len();
        if dimension == 0 {
            return Err(LayerError::invalid("low-rank dimension must be positive"));
        }
        if let Some(bad) = left.iter().chain(&right).find(|v| v.len() != dimension) {
            return Err(LayerError::invalid(format!(
                "factor of length {} in a layer of dimension {}",
                bad.len(),
                dimension
            )));
        }

        let left = left
            .into_iter()
            .enumerate()
            .map(|(i, v)| Parameter::new(format!("weightu_{}", i), v))
            .collect();
        let right = right
            .into_iter()
            .enumerate()
            .map(|(i, v)| Parameter::new(format!("weightv_{}", i), v))
            .collect();

        Ok(Self {
            dimension,
            left,
            right,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn rank(&self) -> usize {
        self.left.len()
    }

    /// The `u_i` vectors in ascending order.
    pub fn left_factors(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.left.iter().map(Parameter::values)
    }

    /// The `v_i` vectors in ascending order.
    pub fn right_factors(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.right.iter().map(Parameter::values)
    }

    /// `(u_i, v_i)` pairs in ascending order.
    pub fn factor_pairs(&self) -> impl Iterator<Item = (&[f32], &[f32])> + '_ {
        self.left_factors().zip(self.right_factors())
    }

    /// Owned copies of `(left, right)`, e.g. to rebuild the layer with
    /// [`from_factors`](Self::from_factors) on another thread.
    pub fn factors(&self) -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
        (
            self.left_factors().map(<[f32]>::to_vec).collect(),
            self.right_factors().map(<[f32]>::to_vec).collect(),
        )
    }

    /// Materialise `M = Σ_i u_i v_iᵀ` as a row-major N×N matrix.
    ///
    /// A single fold over the factor pairs starting from the zero matrix.
    pub fn materialize(&self) -> Vec<f32> {
        let n = self.dimension;
        self.factor_pairs()
            .fold(vec![0.0f32; n * n], |mut matrix, (u, v)| {
                for (row, &u_r) in matrix.chunks_exact_mut(n).zip(u) {
                    for (cell, &v_c) in row.iter_mut().zip(v) {
                        *cell += u_r * v_c;
                    }
                }
                matrix
            })
    }

    /// Whether materialising M is cheaper than the factored product for a
    /// batch of this size: `N·(R + B) < 2·R·B`.
    pub fn prefers_dense(&self, batch_size: usize) -> bool {
        let rank = self.rank();
        self.dimension.saturating_mul(rank + batch_size) < 2 * rank * batch_size
    }

    /// Apply the layer to `batch_size` column vectors stored back to back.
    ///
    /// Picks the cheaper of [`apply_factored`](Self::apply_factored) and
    /// [`apply_dense`](Self::apply_dense); both sum terms in ascending order.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `input` or `output` is not `batch_size × dimension`.
    pub fn apply(&self, input: &[f32], output: &mut [f32], batch_size: usize) -> Result<(), LayerError> {
        if self.prefers_dense(batch_size) {
            self.apply_dense(input, output, batch_size)
        } else {
            self.apply_factored(input, output, batch_size)
        }
    }

    /// `y = Σ_i u_i · (v_i · x)` without forming M.
    pub fn apply_factored(
        &self,
        input: &[f32],
        output: &mut [f32],
        batch_size: usize,
    ) -> Result<(), LayerError> {
        check_forward_buffers(self, input, output, batch_size)?;
        let n = self.dimension;

        for (x, y) in input.chunks_exact(n).zip(output.chunks_exact_mut(n)) {
            y.iter_mut().for_each(|v| *v = 0.0);
            for (u, v) in self.factor_pairs() {
                let s = dot(v, x);
                for (y_r, &u_r) in y.iter_mut().zip(u) {
                    *y_r += u_r * s;
                }
            }
        }
        Ok(())
    }

    /// `y = M · x` with M materialised once for the whole batch.
    pub fn apply_dense(
        &self,
        input: &[f32],
        output: &mut [f32],
        batch_size: usize,
    ) -> Result<(), LayerError> {
        check_forward_buffers(self, input, output, batch_size)?;
        let n = self.dimension;
        let matrix = self.materialize();

        for (x, y) in input.chunks_exact(n).zip(output.chunks_exact_mut(n)) {
            for (y_r, row) in y.iter_mut().zip(matrix.chunks_exact(n)) {
                *y_r = dot(row, x);
            }
        }
        Ok(())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Layer for LowRankLayer {
    fn name(&self) -> String {
        format!("low_rank({}, rank {})", self.dimension, self.rank())
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize) -> Result<(), LayerError> {
        self.apply(input, output, batch_size)
    }

    /// With `s_i = v_i·x` and `t_i = u_i·g`:
    /// `∂L/∂u_i += s_i·g`, `∂L/∂v_i += t_i·x`, `∂L/∂x = Σ_i t_i·v_i`.
    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) -> Result<(), LayerError> {
        check_backward_buffers(self, input, output, grad_output, grad_input, batch_size)?;
        let n = self.dimension;

        for ((x, g), g_in) in input
            .chunks_exact(n)
            .zip(grad_output.chunks_exact(n))
            .zip(grad_input.chunks_exact_mut(n))
        {
            g_in.iter_mut().for_each(|v| *v = 0.0);

            for (u_param, v_param) in self.left.iter().zip(&self.right) {
                let u = u_param.values();
                let v = v_param.values();
                let s = dot(v, x);
                let t = dot(u, g);

                u_param.with_grad_mut(|grad_u| {
                    for (gu, &g_r) in grad_u.iter_mut().zip(g) {
                        *gu += s * g_r;
                    }
                });
                v_param.with_grad_mut(|grad_v| {
                    for (gv, &x_c) in grad_v.iter_mut().zip(x) {
                        *gv += t * x_c;
                    }
                });
                for (gi, &v_c) in g_in.iter_mut().zip(v) {
                    *gi += t * v_c;
                }
            }
        }
        Ok(())
    }

    fn parameters(&self) -> Vec<&Parameter> {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(u, v)| [u, v])
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.left
            .iter_mut()
            .zip(self.right.iter_mut())
            .flat_map(|(u, v)| [u, v])
            .collect()
    }

    fn input_size(&self) -> usize {
        self.dimension
    }

    fn output_size(&self) -> usize {
        self.dimension
    }
}
