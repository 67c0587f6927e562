//! In-memory datasets and the MNIST reader.

pub mod mnist;

pub use mnist::load_mnist;

use crate::architecture::NUM_CLASSES;
use crate::error::DataError;

/// Flat samples with one class label each.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    inputs: Vec<f32>,
    labels: Vec<u8>,
    sample_size: usize,
}

impl Dataset {
    /// # Errors
    ///
    /// `CountMismatch` when `inputs` does not hold exactly one sample per label,
    /// `InvalidLabel` for labels outside `0..10`.
    pub fn new(inputs: Vec<f32>, labels: Vec<u8>, sample_size: usize) -> Result<Self, DataError> {
        let samples = if sample_size == 0 { 0 } else { inputs.len() / sample_size };
        if sample_size == 0 || inputs.len() % sample_size != 0 || samples != labels.len() {
            return Err(DataError::CountMismatch(samples, labels.len()));
        }
        if let Some(&bad) = labels.iter().find(|&&l| usize::from(l) >= NUM_CLASSES) {
            return Err(DataError::InvalidLabel(bad));
        }
        Ok(Self {
            inputs,
            labels,
            sample_size,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn inputs(&self) -> &[f32] {
        &self.inputs
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn sample(&self, index: usize) -> (&[f32], u8) {
        let start = index * self.sample_size;
        (&self.inputs[start..start + self.sample_size], self.labels[index])
    }

    /// Keep only the first `max` samples.
    pub fn truncate(&mut self, max: usize) {
        if max < self.len() {
            self.labels.truncate(max);
            self.inputs.truncate(max * self.sample_size);
        }
    }

    /// Hold out the trailing `fraction` of samples for validation, returning
    /// `(train, validation)`. Samples are not shuffled first, so the split is
    /// the same for every run over the same data.
    pub fn split_validation(&self, fraction: f64) -> (Dataset, Dataset) {
        let keep = (self.len() as f64 * (1.0 - fraction)).floor() as usize;
        let keep = keep.min(self.len());
        let cut = keep * self.sample_size;
        (
            Dataset {
                inputs: self.inputs[..cut].to_vec(),
                labels: self.labels[..keep].to_vec(),
                sample_size: self.sample_size,
            },
            Dataset {
                inputs: self.inputs[cut..].to_vec(),
                labels: self.labels[keep..].to_vec(),
                sample_size: self.sample_size,
            },
        )
    }

    /// Copy the samples at `indices` into contiguous batch buffers.
    pub fn gather(&self, indices: &[usize], out_inputs: &mut Vec<f32>, out_labels: &mut Vec<u8>) {
        out_inputs.clear();
        out_labels.clear();
        for &index in indices {
            let (sample, label) = self.sample(index);
            out_inputs.extend_from_slice(sample);
            out_labels.push(label);
        }
    }
}
