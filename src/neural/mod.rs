//! Neural classifier: a batch-normalized funnel MLP built on candle and
//! trained with Adam

pub mod callbacks;
pub mod layers;
pub mod network;
pub mod weights;

pub use network::{EpochMetrics, LayerSpec, NeuralClassifier, NeuralConfig, TrainingHistory};
pub use weights::{NamedTensor, NetworkWeights};
