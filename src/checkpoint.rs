//! JSON checkpoints of trained parameters.

use crate::error::ExperimentError;
use crate::model::Sequential;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Every trainable vector of a model keyed `"{layer}.{name}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub variant: String,
    pub parameters: BTreeMap<String, Vec<f32>>,
}

impl Checkpoint {
    pub fn capture(variant: impl Into<String>, model: &Sequential) -> Self {
        let parameters = model
            .named_parameters()
            .into_iter()
            .map(|(name, p)| (name, p.values().to_vec()))
            .collect();
        Self {
            variant: variant.into(),
            parameters,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ExperimentError> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json).map_err(|source| ExperimentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ExperimentError> {
        let contents = fs::read_to_string(path).map_err(|source| ExperimentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Copy the stored values into `model`.
    ///
    /// # Errors
    ///
    /// `Checkpoint` if the parameter names or lengths differ from the model's.
    /// The model is left untouched in that case.
    pub fn restore(&self, model: &mut Sequential) -> Result<(), ExperimentError> {
        let mut targets = model.named_parameters_mut();
        if targets.len() != self.parameters.len() {
            return Err(ExperimentError::Checkpoint(format!(
                "checkpoint has {} tensors, model has {}",
                self.parameters.len(),
                targets.len()
            )));
        }
        for (name, param) in &targets {
            match self.parameters.get(name) {
                None => return Err(ExperimentError::Checkpoint(format!("missing {}", name))),
                Some(values) if values.len() != param.len() => {
                    return Err(ExperimentError::Checkpoint(format!(
                        "{} has {} values, model expects {}",
                        name,
                        values.len(),
                        param.len()
                    )))
                }
                Some(_) => {}
            }
        }
        for (name, param) in targets.iter_mut() {
            if let Some(values) = self.parameters.get(name.as_str()) {
                param.values_mut().copy_from_slice(values);
            }
        }
        Ok(())
    }
}
