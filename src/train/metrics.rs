//! Per-epoch training history.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Mean loss and accuracy over a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub loss: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based.
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
    pub seconds: f32,
}

/// Metrics for every completed epoch, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Writes `epoch,loss,accuracy,val_loss,val_accuracy,seconds`, leaving the
    /// validation columns empty when there was no validation set.
    pub fn write_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "epoch,loss,accuracy,val_loss,val_accuracy,seconds")?;
        let opt = |v: Option<f32>| v.map(|v| v.to_string()).unwrap_or_default();
        for m in &self.epochs {
            writeln!(
                out,
                "{},{},{},{},{},{:.3}",
                m.epoch,
                m.loss,
                m.accuracy,
                opt(m.val_loss),
                opt(m.val_accuracy),
                m.seconds
            )?;
        }
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_csv(&mut writer)?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_layout() {
        let mut history = History::new();
        history.push(EpochMetrics {
            epoch: 1,
            loss: 0.5,
            accuracy: 0.75,
            val_loss: Some(0.25),
            val_accuracy: Some(1.0),
            seconds: 1.5,
        });
        history.push(EpochMetrics {
            epoch: 2,
            loss: 0.25,
            accuracy: 1.0,
            val_loss: None,
            val_accuracy: None,
            seconds: 0.0,
        });

        let mut out = Vec::new();
        history.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,loss,accuracy,val_loss,val_accuracy,seconds");
        assert_eq!(lines[1], "1,0.5,0.75,0.25,1,1.500");
        assert_eq!(lines[2], "2,0.25,1,,,0.000");
        assert_eq!(history.last().map(|m| m.epoch), Some(2));
    }
}
