//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait, trainable parameter registration and the
//! layer types the experiment stacks together: convolution, ReLU, max pooling,
//! dropout, dense and the low-rank layer.

mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod low_rank;
pub mod maxpool;
pub mod parameter;
pub mod relu;

pub use conv2d::{Conv2DLayer, Conv2DShape};
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use low_rank::LowRankLayer;
pub use maxpool::MaxPool2DLayer;
pub use parameter::Parameter;
pub use relu::ReluLayer;
pub use r#trait::Layer;
