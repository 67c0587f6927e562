//! Architecture configuration and model building
//!
//! A model is described as an ordered list of [`LayerConfig`]s, either loaded
//! from JSON or generated for one of the experiment's variants, and turned into
//! a [`Sequential`] by [`build_model`].

use crate::error::{ConfigError, LayerError};
use crate::layers::{
    low_rank::DEFAULT_INIT_STDDEV, Conv2DLayer, Conv2DShape, DenseLayer, DropoutLayer, Layer,
    LowRankLayer, MaxPool2DLayer, ReluLayer,
};
use crate::model::Sequential;
use crate::utils::rng::SimpleRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// MNIST images are 28×28 single-channel.
pub const IMAGE_SIDE: usize = 28;
pub const NUM_INPUTS: usize = IMAGE_SIDE * IMAGE_SIDE;
pub const NUM_CLASSES: usize = 10;

/// Configuration for a single layer.
///
/// # Examples
///
/// ```json
/// { "layer_type": "conv2d", "in_channels": 1, "out_channels": 4, "kernel_size": 3,
///   "input_height": 28, "input_width": 28 }
/// ```
///
/// ```json
/// { "layer_type": "low_rank", "dimension": 784, "rank": 32 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case")]
pub enum LayerConfig {
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default)]
        padding: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        input_height: usize,
        input_width: usize,
    },
    Relu {
        size: usize,
    },
    MaxPool2d {
        channels: usize,
        input_height: usize,
        input_width: usize,
        #[serde(default = "default_pool")]
        pool: usize,
    },
    Dropout {
        size: usize,
        drop_rate: f32,
    },
    Dense {
        input_size: usize,
        output_size: usize,
    },
    LowRank {
        dimension: usize,
        rank: usize,
        #[serde(default = "default_init_stddev")]
        init_stddev: f32,
    },
}

fn default_stride() -> usize {
    1
}

fn default_pool() -> usize {
    2
}

fn default_init_stddev() -> f32 {
    DEFAULT_INIT_STDDEV
}

impl LayerConfig {
    /// Valid 3×3 stride-1 convolution, the only kind the experiment uses.
    fn conv3x3(in_channels: usize, out_channels: usize, side: usize) -> Self {
        LayerConfig::Conv2d {
            in_channels,
            out_channels,
            kernel_size: 3,
            padding: 0,
            stride: 1,
            input_height: side,
            input_width: side,
        }
    }

    fn pool2(channels: usize, side: usize) -> Self {
        LayerConfig::MaxPool2d {
            channels,
            input_height: side,
            input_width: side,
            pool: 2,
        }
    }

    pub fn input_size(&self) -> usize {
        match *self {
            LayerConfig::Conv2d {
                in_channels,
                input_height,
                input_width,
                ..
            } => in_channels * input_height * input_width,
            LayerConfig::MaxPool2d {
                channels,
                input_height,
                input_width,
                ..
            } => channels * input_height * input_width,
            LayerConfig::Relu { size } | LayerConfig::Dropout { size, .. } => size,
            LayerConfig::Dense { input_size, .. } => input_size,
            LayerConfig::LowRank { dimension, .. } => dimension,
        }
    }

    /// Output size, or `None` when the configuration cannot produce a layer
    /// (e.g. a kernel larger than its input).
    pub fn output_size(&self) -> Option<usize> {
        match *self {
            LayerConfig::Conv2d {
                out_channels,
                kernel_size,
                padding,
                stride,
                input_height,
                input_width,
                ..
            } => {
                let h = (input_height + 2 * padding).checked_sub(kernel_size)?;
                let w = (input_width + 2 * padding).checked_sub(kernel_size)?;
                if stride == 0 {
                    return None;
                }
                Some(out_channels * (h / stride + 1) * (w / stride + 1))
            }
            LayerConfig::MaxPool2d {
                channels,
                input_height,
                input_width,
                pool,
            } => {
                if pool == 0 {
                    return None;
                }
                Some(channels * (input_height / pool) * (input_width / pool))
            }
            LayerConfig::Relu { size } | LayerConfig::Dropout { size, .. } => Some(size),
            LayerConfig::Dense { output_size, .. } => Some(output_size),
            LayerConfig::LowRank { dimension, .. } => Some(dimension),
        }
    }

    /// Instantiate the layer, drawing initial weights from `rng`.
    pub fn build(&self, rng: &mut SimpleRng) -> Result<Box<dyn Layer>, LayerError> {
        let layer: Box<dyn Layer> = match *self {
            LayerConfig::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                padding,
                stride,
                input_height,
                input_width,
            } => Box::new(Conv2DLayer::new(
                Conv2DShape {
                    in_channels,
                    out_channels,
                    kernel_size,
                    padding,
                    stride,
                    input_height,
                    input_width,
                },
                rng,
            )?),
            LayerConfig::Relu { size } => Box::new(ReluLayer::new(size)?),
            LayerConfig::MaxPool2d {
                channels,
                input_height,
                input_width,
                pool,
            } => Box::new(MaxPool2DLayer::new(channels, input_height, input_width, pool)?),
            LayerConfig::Dropout { size, drop_rate } => {
                Box::new(DropoutLayer::new(size, drop_rate, rng)?)
            }
            LayerConfig::Dense {
                input_size,
                output_size,
            } => Box::new(DenseLayer::new(input_size, output_size, rng)?),
            LayerConfig::LowRank {
                dimension,
                rank,
                init_stddev,
            } => Box::new(LowRankLayer::with_init_stddev(dimension, rank, init_stddev, rng)?),
        };
        Ok(layer)
    }
}

/// Configuration for the entire network: layers applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerConfig>,
}

impl ArchitectureConfig {
    /// Trainable scalar count without building the layers.
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match *layer {
                LayerConfig::Conv2d {
                    in_channels,
                    out_channels,
                    kernel_size,
                    ..
                } => out_channels * in_channels * kernel_size * kernel_size + out_channels,
                LayerConfig::Dense {
                    input_size,
                    output_size,
                } => input_size * output_size + output_size,
                LayerConfig::LowRank {
                    dimension, rank, ..
                } => 2 * rank * dimension,
                _ => 0,
            })
            .sum()
    }
}

/// Loads an architecture configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use low_rank_mnist::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/layer4_rank32.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Builds the layers of `config` in order and chains them into a model.
///
/// # Errors
///
/// `InvalidConfiguration` if a layer cannot be built or adjacent sizes disagree.
pub fn build_model(config: &ArchitectureConfig, rng: &mut SimpleRng) -> Result<Sequential, LayerError> {
    let layers = config
        .layers
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            layer.build(rng).map_err(|err| match err {
                LayerError::InvalidConfiguration(msg) => {
                    LayerError::InvalidConfiguration(format!("layer {}: {}", i, msg))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Sequential::new(layers)
}

/// Where the low-rank layer sits in the classifier.
///
/// Depths count the classifier's stages the way the experiment numbers them:
///
/// | depth | inserted before | dimension |
/// |---|---|---|
/// | 2 | first conv | 784 |
/// | 3 | first pool | 2704 |
/// | 4 | second conv | 676 |
/// | 5 | second pool | 1936 |
/// | 6 | third conv | 400 |
/// | 7 | dropout | 144 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Control,
    Depth(u8),
}

impl Placement {
    pub const MIN_DEPTH: u8 = 2;
    pub const MAX_DEPTH: u8 = 7;

    /// Every low-rank placement, shallowest first.
    pub fn depths() -> impl Iterator<Item = Placement> {
        (Self::MIN_DEPTH..=Self::MAX_DEPTH).map(Placement::Depth)
    }

    pub fn depth(&self) -> Option<u8> {
        match *self {
            Placement::Control => None,
            Placement::Depth(d) => Some(d),
        }
    }

    /// Index in the base layer list at which the low-rank layer is inserted.
    fn insertion_index(&self) -> Option<usize> {
        match *self {
            Placement::Control => None,
            Placement::Depth(2) => Some(0),
            Placement::Depth(3) => Some(2),
            Placement::Depth(4) => Some(3),
            Placement::Depth(5) => Some(5),
            Placement::Depth(6) => Some(6),
            Placement::Depth(7) => Some(8),
            Placement::Depth(_) => None,
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Control => write!(f, "control"),
            Placement::Depth(d) => write!(f, "layer {}", d),
        }
    }
}

/// The control classifier:
/// conv(1→4) relu pool conv(4→16) relu pool conv(16→16) relu dropout dense(144→10).
pub fn base_architecture(dropout_rate: f32) -> ArchitectureConfig {
    ArchitectureConfig {
        layers: vec![
            LayerConfig::conv3x3(1, 4, 28),
            LayerConfig::Relu { size: 4 * 26 * 26 },
            LayerConfig::pool2(4, 26),
            LayerConfig::conv3x3(4, 16, 13),
            LayerConfig::Relu { size: 16 * 11 * 11 },
            LayerConfig::pool2(16, 11),
            LayerConfig::conv3x3(16, 16, 5),
            LayerConfig::Relu { size: 16 * 3 * 3 },
            LayerConfig::Dropout {
                size: 16 * 3 * 3,
                drop_rate: dropout_rate,
            },
            LayerConfig::Dense {
                input_size: 16 * 3 * 3,
                output_size: NUM_CLASSES,
            },
        ],
    }
}

/// The control classifier with a low-rank layer spliced in at `placement`.
///
/// The low-rank layer's dimension is the flattened size of the feature map at
/// that point, so it maps the map onto itself and the rest of the stack is
/// unchanged.
///
/// # Errors
///
/// `InvalidConfiguration` for depths outside 2..=7, or a zero rank for a
/// non-control placement.
pub fn variant_architecture(
    placement: Placement,
    rank: usize,
    dropout_rate: f32,
    init_stddev: f32,
) -> Result<ArchitectureConfig, LayerError> {
    let mut config = base_architecture(dropout_rate);
    let Some(index) = placement.insertion_index() else {
        return match placement {
            Placement::Control => Ok(config),
            Placement::Depth(d) => Err(LayerError::invalid(format!(
                "depth {} is outside {}..={}",
                d,
                Placement::MIN_DEPTH,
                Placement::MAX_DEPTH
            ))),
        };
    };

    if rank == 0 {
        return Err(LayerError::invalid(format!("{} needs a positive rank", placement)));
    }

    let dimension = config.layers[index].input_size();
    config.layers.insert(
        index,
        LayerConfig::LowRank {
            dimension,
            rank,
            init_stddev,
        },
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_architecture_sizes_chain() {
        let config = base_architecture(0.5);
        let mut size = NUM_INPUTS;
        for layer in &config.layers {
            assert_eq!(layer.input_size(), size, "{:?}", layer);
            size = layer.output_size().unwrap();
        }
        assert_eq!(size, NUM_CLASSES);
    }

    #[test]
    fn test_variant_dimensions() {
        let expected = [(2, 784), (3, 2704), (4, 676), (5, 1936), (6, 400), (7, 144)];
        for (depth, dimension) in expected {
            let config = variant_architecture(Placement::Depth(depth), 32, 0.5, 0.05).unwrap();
            let low_rank = config
                .layers
                .iter()
                .find_map(|l| match l {
                    LayerConfig::LowRank { dimension, rank, .. } => Some((*dimension, *rank)),
                    _ => None,
                })
                .unwrap();
            assert_eq!(low_rank, (dimension, 32), "depth {}", depth);
            assert_eq!(config.layers.len(), 11);
        }
    }

    #[test]
    fn test_variant_rejects_bad_depth_and_rank() {
        assert!(variant_architecture(Placement::Depth(1), 1, 0.5, 0.05).is_err());
        assert!(variant_architecture(Placement::Depth(8), 1, 0.5, 0.05).is_err());
        assert!(variant_architecture(Placement::Depth(3), 0, 0.5, 0.05).is_err());
        assert_eq!(
            variant_architecture(Placement::Control, 0, 0.5, 0.05).unwrap(),
            base_architecture(0.5)
        );
    }

    #[test]
    fn test_layer_config_json_roundtrip_tagging() {
        let json = r#"{"layer_type": "low_rank", "dimension": 144, "rank": 1}"#;
        let layer: LayerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            layer,
            LayerConfig::LowRank {
                dimension: 144,
                rank: 1,
                init_stddev: DEFAULT_INIT_STDDEV
            }
        );

        let json = r#"{"layer_type": "max_pool2d", "channels": 4, "input_height": 26, "input_width": 26}"#;
        let layer: LayerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(layer.output_size(), Some(4 * 13 * 13));
    }

    #[test]
    fn test_build_model_reports_layer_index() {
        let config = ArchitectureConfig {
            layers: vec![
                LayerConfig::Relu { size: 4 },
                LayerConfig::LowRank {
                    dimension: 4,
                    rank: 0,
                    init_stddev: 0.05,
                },
            ],
        };
        let mut rng = SimpleRng::new(42);
        match build_model(&config, &mut rng) {
            Err(LayerError::InvalidConfiguration(msg)) => assert!(msg.starts_with("layer 1:"), "{}", msg),
            other => panic!("expected InvalidConfiguration, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_placement_display_and_order() {
        assert_eq!(Placement::Control.to_string(), "control");
        assert_eq!(Placement::Depth(4).to_string(), "layer 4");
        assert!(Placement::Control < Placement::Depth(2));
        assert_eq!(Placement::depths().count(), 6);
    }
}
