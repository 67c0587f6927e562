//! Mini-batch training loop.

use super::loss::{score_logits, softmax_cross_entropy};
use super::metrics::{EpochMetrics, History, Score};
use crate::data::Dataset;
use crate::error::{ExperimentError, LayerError};
use crate::model::Sequential;
use crate::optimizers::Optimizer;
use crate::utils::rng::SimpleRng;
use std::time::Instant;
use tracing::{debug, info};

/// Runs `epochs` passes over the training data in shuffled mini-batches.
#[derive(Debug, Clone, Copy)]
pub struct Trainer {
    pub epochs: usize,
    pub batch_size: usize,
}

impl Trainer {
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        Self { epochs, batch_size }
    }

    /// Train `model` in place. Validation, when non-empty, is scored after
    /// every epoch with training-mode layers switched off.
    pub fn fit(
        &self,
        model: &mut Sequential,
        optimizer: &mut dyn Optimizer,
        train: &Dataset,
        validation: Option<&Dataset>,
        rng: &mut SimpleRng,
    ) -> Result<History, ExperimentError> {
        if train.is_empty() {
            return Err(ExperimentError::EmptyDataset);
        }
        if self.batch_size == 0 {
            return Err(LayerError::invalid("batch size must be positive").into());
        }
        LayerError::check_len("training sample", model.input_size(), train.sample_size())?;

        let mut history = History::new();
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut inputs = Vec::with_capacity(self.batch_size * train.sample_size());
        let mut labels = Vec::with_capacity(self.batch_size);
        let batches = train.len().div_ceil(self.batch_size);

        for epoch in 1..=self.epochs {
            let start = Instant::now();
            model.set_training(true);
            rng.shuffle_usize(&mut order);

            let mut total_loss = 0.0f32;
            let mut correct = 0usize;
            for (b, chunk) in order.chunks(self.batch_size).enumerate() {
                train.gather(chunk, &mut inputs, &mut labels);
                let step = train_step(model, optimizer, &inputs, &labels)?;
                total_loss += step.0;
                correct += step.1;
                if (b + 1) % 1000 == 0 {
                    debug!(epoch, batch = b + 1, batches, "training");
                }
            }

            let loss = total_loss / train.len() as f32;
            let accuracy = correct as f32 / train.len() as f32;
            let val = match validation {
                Some(v) if !v.is_empty() => Some(evaluate(model, v, self.batch_size)?),
                _ => None,
            };
            let seconds = start.elapsed().as_secs_f32();

            info!(
                epoch,
                epochs = self.epochs,
                loss,
                accuracy,
                val_loss = val.map(|s| s.loss),
                val_accuracy = val.map(|s| s.accuracy),
                seconds,
                "epoch complete"
            );
            history.push(EpochMetrics {
                epoch,
                loss,
                accuracy,
                val_loss: val.map(|s| s.loss),
                val_accuracy: val.map(|s| s.accuracy),
                seconds,
            });
        }

        model.set_training(false);
        Ok(history)
    }
}

/// One forward/backward/update over a single batch. Returns the summed loss
/// and the number of correct predictions.
pub fn train_step(
    model: &mut Sequential,
    optimizer: &mut dyn Optimizer,
    inputs: &[f32],
    labels: &[u8],
) -> Result<(f32, usize), LayerError> {
    let batch = labels.len();
    let classes = model.output_size();

    let activations = model.forward_cached(inputs, batch)?;
    let mut probs = activations.output().to_vec();
    let mut grad = vec![0.0f32; probs.len()];
    let loss = softmax_cross_entropy(&mut probs, labels, classes, &mut grad)?;

    model.backward(&activations, &grad)?;
    optimizer.step(model.parameters_mut());
    Ok((loss.total, loss.correct))
}

/// Mean loss and accuracy of `model` on `data` in inference mode.
pub fn evaluate(model: &mut Sequential, data: &Dataset, batch_size: usize) -> Result<Score, LayerError> {
    if data.is_empty() {
        return Ok(Score {
            loss: 0.0,
            accuracy: 0.0,
        });
    }
    model.set_training(false);

    let classes = model.output_size();
    let sample = data.sample_size();
    let mut total = 0.0f32;
    let mut correct = 0usize;
    for start in (0..data.len()).step_by(batch_size.max(1)) {
        let batch = (data.len() - start).min(batch_size.max(1));
        let inputs = &data.inputs()[start * sample..(start + batch) * sample];
        let labels = &data.labels()[start..start + batch];

        let mut logits = model.forward(inputs, batch)?;
        let loss = score_logits(&mut logits, labels, classes)?;
        total += loss.total;
        correct += loss.correct;
    }

    Ok(Score {
        loss: total / data.len() as f32,
        accuracy: correct as f32 / data.len() as f32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{DenseLayer, LowRankLayer};
    use crate::optimizers::Adam;

    fn separable(n: usize) -> Dataset {
        let mut inputs = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let label = (i % 2) as u8;
            let sign = if label == 0 { 1.0 } else { -1.0 };
            inputs.extend_from_slice(&[sign, 0.5 * sign, -sign, 0.25 * sign]);
            labels.push(label);
        }
        Dataset::new(inputs, labels, 4).unwrap()
    }

    fn model(rng: &mut SimpleRng) -> Sequential {
        Sequential::new(vec![
            Box::new(LowRankLayer::new(4, 2, rng).unwrap()),
            Box::new(DenseLayer::new(4, 2, rng).unwrap()),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_learns_separable_data() {
        let mut rng = SimpleRng::new(7);
        let mut model = model(&mut rng);
        let mut optimizer = Adam::keras_defaults(0.05);
        let data = separable(32);

        let before = evaluate(&mut model, &data, 8).unwrap();
        let history = Trainer::new(15, 4)
            .fit(&mut model, &mut optimizer, &data, Some(&data), &mut rng)
            .unwrap();
        let after = evaluate(&mut model, &data, 8).unwrap();

        assert_eq!(history.len(), 15);
        assert!(after.loss < before.loss);
        assert_eq!(after.accuracy, 1.0);
        assert!(history.last().unwrap().val_loss.is_some());
    }

    #[test]
    fn test_fit_rejects_empty_training_set() {
        let mut rng = SimpleRng::new(1);
        let mut model = model(&mut rng);
        let mut optimizer = Adam::keras_defaults(0.01);
        let empty = Dataset::new(Vec::new(), Vec::new(), 4).unwrap();
        assert!(matches!(
            Trainer::new(1, 4).fit(&mut model, &mut optimizer, &empty, None, &mut rng),
            Err(ExperimentError::EmptyDataset)
        ));
    }
}
