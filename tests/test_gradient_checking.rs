// Numerical gradient checks: analytical gradients from `backward` against
// central finite differences of a scalar loss L = Σ w ⊙ forward(x).
// Computed in f32, so tolerances are loose.

use low_rank_mnist::layers::{
    Conv2DLayer, Conv2DShape, DenseLayer, Layer, LowRankLayer, MaxPool2DLayer,
};
use low_rank_mnist::utils::SimpleRng;

const EPS: f32 = 1e-2;
const TOL: f32 = 2e-2;

fn loss(layer: &dyn Layer, input: &[f32], weights: &[f32], batch: usize) -> f32 {
    let mut out = vec![0.0f32; batch * layer.output_size()];
    layer.forward(input, &mut out, batch).unwrap();
    out.iter().zip(weights).map(|(o, w)| o * w).sum()
}

fn inputs(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = SimpleRng::new(seed);
    (0..n).map(|_| rng.gen_range_f32(-1.0, 1.0)).collect()
}

// Analytical (grad_input, parameter grads).
fn analytical(layer: &dyn Layer, input: &[f32], weights: &[f32], batch: usize) -> (Vec<f32>, Vec<Vec<f32>>) {
    let mut out = vec![0.0f32; batch * layer.output_size()];
    layer.forward(input, &mut out, batch).unwrap();
    let mut grad_input = vec![0.0f32; input.len()];
    layer.backward(input, &out, weights, &mut grad_input, batch).unwrap();
    let grads = layer.parameters().iter().map(|p| p.grad()).collect();
    (grad_input, grads)
}

fn assert_close(analytic: f32, numeric: f32, what: &str) {
    let scale = analytic.abs().max(numeric.abs()).max(1.0);
    assert!(
        (analytic - numeric).abs() / scale < TOL,
        "{}: analytic {} vs numeric {}",
        what,
        analytic,
        numeric
    );
}

fn check_input_gradient(layer: &dyn Layer, input: &[f32], weights: &[f32], batch: usize) {
    let (grad_input, _) = analytical(layer, input, weights, batch);
    for i in 0..input.len() {
        let mut plus = input.to_vec();
        let mut minus = input.to_vec();
        plus[i] += EPS;
        minus[i] -= EPS;
        let numeric = (loss(layer, &plus, weights, batch) - loss(layer, &minus, weights, batch)) / (2.0 * EPS);
        assert_close(grad_input[i], numeric, &format!("{} dx[{}]", layer.name(), i));
    }
}

fn check_parameter_gradients<L: Layer + Clone>(layer: &L, input: &[f32], weights: &[f32], batch: usize) {
    let (_, grads) = analytical(layer, input, weights, batch);
    for (p_idx, grad) in grads.iter().enumerate() {
        for k in 0..grad.len() {
            let perturbed = |delta: f32| {
                let mut copy = layer.clone();
                copy.parameters_mut()[p_idx].values_mut()[k] += delta;
                loss(&copy, input, weights, batch)
            };
            let numeric = (perturbed(EPS) - perturbed(-EPS)) / (2.0 * EPS);
            assert_close(
                grad[k],
                numeric,
                &format!("{} param {}[{}]", layer.name(), p_idx, k),
            );
        }
    }
}

mod low_rank_gradients {
    use super::*;

    #[test]
    fn test_low_rank_input_gradient() {
        let mut rng = SimpleRng::new(5);
        let layer = LowRankLayer::with_init_stddev(5, 3, 0.5, &mut rng).unwrap();
        let x = inputs(10, 1);
        let w = inputs(10, 2);
        check_input_gradient(&layer, &x, &w, 2);
    }

    #[test]
    fn test_low_rank_factor_gradients() {
        let mut rng = SimpleRng::new(6);
        let layer = LowRankLayer::with_init_stddev(4, 2, 0.5, &mut rng).unwrap();
        let x = inputs(12, 3);
        let w = inputs(12, 4);
        check_parameter_gradients(&layer, &x, &w, 3);
    }

    #[test]
    fn test_input_gradient_is_transpose_product() {
        let layer = LowRankLayer::from_factors(
            vec![vec![1.0, 2.0, 0.0]],
            vec![vec![0.0, 1.0, -1.0]],
        )
        .unwrap();
        let (grad_input, _) = analytical(&layer, &[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], 1);
        // Mᵀ g with u·g = 3 is 3·v.
        assert_eq!(grad_input, vec![0.0, 3.0, -3.0]);
    }
}

mod toolkit_gradients {
    use super::*;

    #[test]
    fn test_dense_gradients() {
        let mut rng = SimpleRng::new(7);
        let layer = DenseLayer::new(4, 3, &mut rng).unwrap();
        let x = inputs(8, 5);
        let w = inputs(6, 6);
        // Parameter check first: each analytical pass accumulates into the
        // layer's gradients.
        check_parameter_gradients(&layer, &x, &w, 2);
        check_input_gradient(&layer, &x, &w, 2);
    }

    #[test]
    fn test_conv_gradients() {
        let mut rng = SimpleRng::new(8);
        let shape = Conv2DShape::valid(2, 2, 3, 5, 5);
        let layer = Conv2DLayer::new(shape, &mut rng).unwrap();
        let x = inputs(2 * 25, 9);
        let w = inputs(layer.output_size(), 10);
        check_parameter_gradients(&layer, &x, &w, 1);
        check_input_gradient(&layer, &x, &w, 1);
    }

    #[test]
    fn test_maxpool_input_gradient() {
        let layer = MaxPool2DLayer::new(1, 4, 4, 2).unwrap();
        // Distinct values so no window sits on a tie.
        let x: Vec<f32> = (0..16).map(|i| ((i * 7) % 16) as f32 * 0.1).collect();
        let w = inputs(4, 11);
        check_input_gradient(&layer, &x, &w, 1);
    }
}
