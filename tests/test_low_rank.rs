//! Tests for the low-rank layer
//!
//! - Construction (factor counts, registration, invalid configurations)
//! - Application against the explicit sum of outer products
//! - Linearity properties (zero input, scaling, extra zero terms)
//! - Shape errors

use approx::assert_abs_diff_eq;
use low_rank_mnist::layers::{Layer, LowRankLayer};
use low_rank_mnist::utils::SimpleRng;
use low_rank_mnist::LayerError;
use proptest::prelude::*;

// Σ_i u_i · (v_i · x) written out directly.
fn reference_apply(left: &[Vec<f32>], right: &[Vec<f32>], x: &[f32]) -> Vec<f32> {
    let n = x.len();
    let mut y = vec![0.0f32; n];
    for (u, v) in left.iter().zip(right) {
        let s: f32 = v.iter().zip(x).map(|(a, b)| a * b).sum();
        for r in 0..n {
            y[r] += u[r] * s;
        }
    }
    y
}

// Per-row bound on the magnitude of the terms summed into y, for tolerances.
fn magnitude(left: &[Vec<f32>], right: &[Vec<f32>], x: &[f32]) -> Vec<f32> {
    let mut m = vec![0.0f32; x.len()];
    for (u, v) in left.iter().zip(right) {
        let s: f32 = v.iter().zip(x).map(|(a, b)| (a * b).abs()).sum();
        for (m_r, u_r) in m.iter_mut().zip(u) {
            *m_r += u_r.abs() * s;
        }
    }
    m
}

fn apply(layer: &LowRankLayer, x: &[f32]) -> Vec<f32> {
    let mut y = vec![0.0f32; x.len()];
    layer.apply(x, &mut y, 1).unwrap();
    y
}

// ============================================================================
// Construction Tests
// ============================================================================

mod construction_tests {
    use super::*;

    #[test]
    fn test_factor_counts_and_registration() {
        let mut rng = SimpleRng::new(42);
        for (n, r) in [(1, 1), (4, 2), (144, 32), (784, 1)] {
            let layer = LowRankLayer::new(n, r, &mut rng).unwrap();
            assert_eq!(layer.rank(), r);
            assert_eq!(layer.dimension(), n);
            assert_eq!(layer.left_factors().count(), r);
            assert_eq!(layer.right_factors().count(), r);
            assert!(layer.factor_pairs().all(|(u, v)| u.len() == n && v.len() == n));

            let params = layer.parameters();
            assert_eq!(params.len(), 2 * r);
            assert_eq!(layer.parameter_count(), 2 * r * n);
        }
    }

    #[test]
    fn test_zero_dimension_or_rank() {
        let mut rng = SimpleRng::new(1);
        assert!(matches!(
            LowRankLayer::new(0, 3, &mut rng),
            Err(LayerError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            LowRankLayer::new(5, 0, &mut rng),
            Err(LayerError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            LowRankLayer::from_factors(Vec::new(), Vec::new()),
            Err(LayerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_initialisation_is_small_and_independent() {
        let mut rng = SimpleRng::new(3);
        let layer = LowRankLayer::new(2000, 2, &mut rng).unwrap();
        let (left, right) = layer.factors();

        for v in left.iter().chain(&right) {
            let mean = v.iter().sum::<f32>() / v.len() as f32;
            let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / v.len() as f32;
            assert!(mean.abs() < 0.01, "mean {}", mean);
            assert!((var.sqrt() - 0.05).abs() < 0.01, "std {}", var.sqrt());
        }
        assert_ne!(left[0], left[1]);
        assert_ne!(left[0], right[0]);
    }
}

// ============================================================================
// Application Tests
// ============================================================================

mod application_tests {
    use super::*;

    #[test]
    fn test_identity_prefix_end_to_end() {
        let layer = LowRankLayer::from_factors(
            vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
            vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
        )
        .unwrap();
        assert_eq!(apply(&layer, &[1.0, 2.0, 3.0, 4.0]), vec![1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rank_one_is_scaled_left_factor() {
        let u = vec![0.5f32, -1.0, 2.0];
        let v = vec![1.0f32, 1.0, -1.0];
        let layer = LowRankLayer::from_factors(vec![u.clone()], vec![v]).unwrap();
        let y = apply(&layer, &[3.0, 1.0, 2.0]);
        // v·x = 2
        for (a, b) in y.iter().zip(&u) {
            assert_abs_diff_eq!(*a, 2.0 * b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_batch_matches_per_column() {
        let mut rng = SimpleRng::new(11);
        let layer = LowRankLayer::new(6, 3, &mut rng).unwrap();
        let batch: Vec<f32> = (0..18).map(|i| (i as f32 * 0.37).sin()).collect();

        let mut out = vec![0.0f32; 18];
        layer.forward(&batch, &mut out, 3).unwrap();
        for (col, expected) in batch.chunks(6).zip(out.chunks(6)) {
            let y = apply(&layer, col);
            for (a, b) in y.iter().zip(expected) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let mut rng = SimpleRng::new(2);
        let layer = LowRankLayer::new(4, 2, &mut rng).unwrap();
        let mut out = vec![0.0f32; 4];
        assert!(matches!(
            layer.apply(&[1.0, 2.0, 3.0], &mut out, 1),
            Err(LayerError::ShapeMismatch {
                expected: 4,
                actual: 3,
                ..
            })
        ));
        let mut short = vec![0.0f32; 3];
        assert!(layer.apply(&[1.0; 4], &mut short, 1).is_err());
        assert!(layer.apply(&[1.0; 4], &mut out, 2).is_err());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn factors(n: usize, r: usize) -> impl Strategy<Value = (Vec<Vec<f32>>, Vec<Vec<f32>>)> {
    let vec = move || prop::collection::vec(-1.0f32..1.0, n);
    (
        prop::collection::vec(vec(), r),
        prop::collection::vec(vec(), r),
    )
}

fn case() -> impl Strategy<Value = (Vec<Vec<f32>>, Vec<Vec<f32>>, Vec<f32>)> {
    (1usize..12, 1usize..5).prop_flat_map(|(n, r)| {
        (factors(n, r), prop::collection::vec(-1.0f32..1.0, n))
            .prop_map(|((left, right), x)| (left, right, x))
    })
}

proptest! {
    #[test]
    fn prop_matches_sum_of_outer_products((left, right, x) in case()) {
        let layer = LowRankLayer::from_factors(left.clone(), right.clone()).unwrap();
        let expected = reference_apply(&left, &right, &x);

        let mut factored = vec![0.0f32; x.len()];
        let mut dense = vec![0.0f32; x.len()];
        layer.apply_factored(&x, &mut factored, 1).unwrap();
        layer.apply_dense(&x, &mut dense, 1).unwrap();

        let scale = magnitude(&left, &right, &x);
        for i in 0..x.len() {
            let tol = 1e-5 * scale[i].max(1.0);
            prop_assert!((factored[i] - expected[i]).abs() < tol);
            prop_assert!((dense[i] - expected[i]).abs() < tol);
        }
    }

    #[test]
    fn prop_zero_input_gives_zero((left, right, x) in case()) {
        let layer = LowRankLayer::from_factors(left, right).unwrap();
        let zeros = vec![0.0f32; x.len()];
        prop_assert!(apply(&layer, &zeros).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn prop_scaling_input_scales_output((left, right, x) in case(), c in -3.0f32..3.0) {
        let scale = magnitude(&left, &right, &x);
        let layer = LowRankLayer::from_factors(left, right).unwrap();
        let scaled: Vec<f32> = x.iter().map(|v| v * c).collect();
        let y = apply(&layer, &x);
        let y_scaled = apply(&layer, &scaled);
        for ((a, b), m) in y.iter().zip(&y_scaled).zip(&scale) {
            prop_assert!((a * c - b).abs() < 1e-5 * (m * c.abs()).max(1.0));
        }
    }

    #[test]
    fn prop_extra_zero_terms_change_nothing((left, right, x) in case(), extra in 1usize..3) {
        let n = x.len();
        let scale = magnitude(&left, &right, &x);
        let layer = LowRankLayer::from_factors(left.clone(), right.clone()).unwrap();

        let mut left_padded = left;
        let mut right_padded = right;
        for _ in 0..extra {
            left_padded.push(vec![0.0; n]);
            right_padded.push(vec![0.0; n]);
        }
        let padded = LowRankLayer::from_factors(left_padded, right_padded).unwrap();

        // Padding can switch the evaluation strategy, so compare with a tolerance.
        let y = apply(&layer, &x);
        let y_padded = apply(&padded, &x);
        for ((a, b), m) in y.iter().zip(&y_padded).zip(&scale) {
            prop_assert!((a - b).abs() < 1e-5 * m.max(1.0));
        }
    }
}
