//! Tree-ensemble classifier
//!
//! A bagged random forest and a multinomial gradient-boosting model, both built
//! from the same histogram CART grower, combined by soft voting.

pub mod binning;
pub mod boosting;
pub mod cart;
pub mod ensemble;
pub mod forest;

pub use boosting::{BoostingConfig, GradientBoosting};
pub use ensemble::TreeEnsemble;
pub use forest::{ForestConfig, MaxFeatures, RandomForest};

/// Default quantile bins per feature for split search
pub const DEFAULT_MAX_BINS: usize = 64;
