//! Sequential model
//!
//! Chains boxed layers, keeps the per-layer activations of a training forward
//! pass and walks them backwards to accumulate parameter gradients.

use crate::error::LayerError;
use crate::layers::{Layer, Parameter};

/// Activations of one forward pass: `values[0]` is the input, `values[i + 1]`
/// the output of layer `i`.
pub struct Activations {
    values: Vec<Vec<f32>>,
    batch_size: usize,
}

impl Activations {
    /// Output of the last layer.
    pub fn output(&self) -> &[f32] {
        self.values.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// An ordered stack of layers applied one after another.
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
}

impl Sequential {
    /// Build a model, checking that every layer's output size matches the
    /// next layer's input size.
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Self, LayerError> {
        if layers.is_empty() {
            return Err(LayerError::invalid("a model needs at least one layer"));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].output_size() != pair[1].input_size() {
                return Err(LayerError::invalid(format!(
                    "layer {} ({}) outputs {} values but layer {} ({}) expects {}",
                    i,
                    pair[0].name(),
                    pair[0].output_size(),
                    i + 1,
                    pair[1].name(),
                    pair[1].input_size()
                )));
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    pub fn set_training(&mut self, training: bool) {
        for layer in &mut self.layers {
            layer.set_training(training);
        }
    }

    /// Forward pass keeping every intermediate activation for `backward`.
    pub fn forward_cached(&self, input: &[f32], batch_size: usize) -> Result<Activations, LayerError> {
        LayerError::check_len("model input", batch_size * self.input_size(), input.len())?;

        let mut values = Vec::with_capacity(self.layers.len() + 1);
        values.push(input.to_vec());
        for layer in &self.layers {
            let mut output = vec![0.0f32; batch_size * layer.output_size()];
            let last = values.last().map(Vec::as_slice).unwrap_or(input);
            layer.forward(last, &mut output, batch_size)?;
            values.push(output);
        }
        Ok(Activations { values, batch_size })
    }

    /// Forward pass returning only the final output.
    pub fn forward(&self, input: &[f32], batch_size: usize) -> Result<Vec<f32>, LayerError> {
        LayerError::check_len("model input", batch_size * self.input_size(), input.len())?;

        let mut current = input.to_vec();
        for layer in &self.layers {
            let mut output = vec![0.0f32; batch_size * layer.output_size()];
            layer.forward(&current, &mut output, batch_size)?;
            current = output;
        }
        Ok(current)
    }

    /// Backpropagate `grad_output` (gradient of the loss w.r.t. the model
    /// output) through the cached activations, accumulating parameter gradients.
    pub fn backward(&self, activations: &Activations, grad_output: &[f32]) -> Result<(), LayerError> {
        let batch_size = activations.batch_size;
        LayerError::check_len(
            "model grad_output",
            batch_size * self.output_size(),
            grad_output.len(),
        )?;

        let mut grad = grad_output.to_vec();
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
            layer.backward(
                &activations.values[i],
                &activations.values[i + 1],
                &grad,
                &mut grad_input,
                batch_size,
            )?;
            grad = grad_input;
        }
        Ok(())
    }

    /// All trainable parameters in registration order (layer by layer).
    pub fn parameters(&self) -> Vec<&Parameter> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layers.iter_mut().flat_map(|l| l.parameters_mut()).collect()
    }

    /// Parameters keyed `"{layer index}.{parameter name}"`.
    pub fn named_parameters(&self) -> Vec<(String, &Parameter)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .parameters()
                    .into_iter()
                    .map(move |p| (format!("{}.{}", i, p.name()), p))
            })
            .collect()
    }

    pub fn named_parameters_mut(&mut self) -> Vec<(String, &mut Parameter)> {
        self.layers
            .iter_mut()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .parameters_mut()
                    .into_iter()
                    .map(move |p| (format!("{}.{}", i, p.name()), p))
            })
            .collect()
    }

    /// One line per layer: name, output size and parameter count.
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.layers.len() + 1);
        for (i, layer) in self.layers.iter().enumerate() {
            lines.push(format!(
                "{:>3}  {:<28} out={:<6} params={}",
                i,
                layer.name(),
                layer.output_size(),
                layer.parameter_count()
            ));
        }
        lines.push(format!("total params: {}", self.parameter_count()));
        lines.join("\n")
    }
}
