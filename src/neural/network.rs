//! Funnel MLP classifier
//!
//! Linear blocks of shrinking width, each `linear → batch_norm → ReLU → dropout`,
//! followed by a softmax output layer. Built on candle and trained with Adam on
//! mini-batches, monitored on validation data with early stopping and plateau
//! learning-rate decay.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{accuracy, argmax, check_rows, Dataset, ProbabilisticClassifier};
use crate::error::ComputeError;
use crate::neural::callbacks::{EarlyStopping, ReduceLrOnPlateau};
use crate::neural::layers::{gather_rows, glorot_init, label_tensor, Network};
use crate::neural::weights::NetworkWeights;

/// One hidden block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub units: usize,
    /// Dropout rate after the activation; 0 disables dropout
    pub dropout: f64,
    /// L2 penalty on the dense kernel
    pub l2: f64,
}

impl LayerSpec {
    pub fn new(units: usize, dropout: f64, l2: f64) -> Self {
        Self { units, dropout, l2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralConfig {
    pub layers: Vec<LayerSpec>,
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Epochs without validation-accuracy gain before stopping
    pub early_stopping_patience: usize,
    pub lr_decay_factor: f64,
    pub lr_decay_patience: usize,
    pub lr_min_delta: f64,
    pub min_learning_rate: f64,
    pub batch_norm_momentum: f64,
    pub batch_norm_epsilon: f64,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            layers: vec![
                LayerSpec::new(256, 0.4, 0.001),
                LayerSpec::new(128, 0.3, 0.001),
                LayerSpec::new(64, 0.2, 0.001),
                LayerSpec::new(32, 0.0, 0.0),
            ],
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            batch_size: 32,
            max_epochs: 100,
            early_stopping_patience: 15,
            lr_decay_factor: 0.5,
            lr_decay_patience: 5,
            lr_min_delta: 1e-4,
            min_learning_rate: 1e-5,
            batch_norm_momentum: 0.99,
            batch_norm_epsilon: 1e-3,
        }
    }
}

impl NeuralConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.layers.is_empty() {
            return Err(ComputeError::InvalidConfig(
                "neural.layers must not be empty".into(),
            ));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.units == 0 {
                return Err(ComputeError::InvalidConfig(format!(
                    "neural.layers[{}].units must be > 0",
                    i
                )));
            }
            if !(0.0..1.0).contains(&layer.dropout) {
                return Err(ComputeError::InvalidConfig(format!(
                    "neural.layers[{}].dropout must be in [0, 1), got {}",
                    i, layer.dropout
                )));
            }
            if !(layer.l2 >= 0.0 && layer.l2.is_finite()) {
                return Err(ComputeError::InvalidConfig(format!(
                    "neural.layers[{}].l2 must be non-negative",
                    i
                )));
            }
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ComputeError::InvalidConfig(
                "neural.learning_rate must be positive".into(),
            ));
        }
        if self.batch_size < 2 || self.max_epochs == 0 {
            return Err(ComputeError::InvalidConfig(
                "neural.batch_size must be >= 2 and neural.max_epochs > 0".into(),
            ));
        }
        if !(self.lr_decay_factor > 0.0 && self.lr_decay_factor < 1.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "neural.lr_decay_factor must be in (0, 1), got {}",
                self.lr_decay_factor
            )));
        }
        if !(0.0..1.0).contains(&self.batch_norm_momentum) {
            return Err(ComputeError::InvalidConfig(
                "neural.batch_norm_momentum must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

/// Metrics recorded at the end of an epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch whose weights were kept
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

/// Mini-batches over `order`. A trailing single row joins the previous batch,
/// since batch statistics need at least two rows.
fn batches(order: &[usize], size: usize) -> Vec<&[usize]> {
    let mut out: Vec<&[usize]> = order.chunks(size).collect();
    if out.len() > 1 && out.last().map_or(false, |b| b.len() == 1) {
        out.pop();
        let start = (out.len() - 1) * size;
        if let Some(last) = out.last_mut() {
            *last = &order[start..];
        }
    }
    out
}

fn count_correct(
    logits: &Tensor,
    labels: &[usize],
    batch: &[usize],
) -> Result<usize, ComputeError> {
    let predicted = logits.argmax(D::Minus1)?.to_vec1::<u32>()?;
    Ok(predicted
        .iter()
        .zip(batch)
        .filter(|&(&p, &i)| p as usize == labels[i])
        .count())
}

/// Inference-mode `(loss, accuracy)` on the monitored set
fn evaluate(
    network: &Network,
    input: &Tensor,
    targets: &Tensor,
    labels: &[usize],
) -> Result<(f64, f64), ComputeError> {
    let logits = network.logits(input, None)?;
    let loss = candle_nn::loss::cross_entropy(&logits, targets)?.add(&network.l2_penalty()?)?;
    let proba = network.probabilities(input)?;
    let predicted: Vec<usize> = proba.iter().map(|p| argmax(p)).collect();
    Ok((f64::from(loss.to_scalar::<f32>()?), accuracy(&predicted, labels)))
}

/// Neural member of the hybrid predictor
///
/// Only the weight snapshot of the best epoch is kept; candle modules are
/// rebuilt from it on demand, so a fitted classifier is plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralClassifier {
    config: NeuralConfig,
    seed: u64,
    n_features: usize,
    n_classes: usize,
    weights: Option<NetworkWeights>,
    #[serde(default)]
    history: TrainingHistory,
}

impl NeuralClassifier {
    pub fn new(config: NeuralConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            n_features: 0,
            n_classes: 0,
            weights: None,
            history: TrainingHistory::default(),
        }
    }

    pub fn config(&self) -> &NeuralConfig {
        &self.config
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Input width the network was fitted on
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn weights(&self) -> Option<&NetworkWeights> {
        self.weights.as_ref()
    }

    /// Check that the stored weights describe the configured architecture
    pub fn validate_weights(&self) -> Result<(), ComputeError> {
        if let Some(weights) = &self.weights {
            self.network(weights, &Device::Cpu).map_err(|e| {
                ComputeError::FeatureMismatch(format!(
                    "neural weights do not fit the network: {}",
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn network(&self, weights: &NetworkWeights, device: &Device) -> Result<Network, ComputeError> {
        Network::build(
            weights.var_builder(device)?,
            self.n_features,
            self.n_classes,
            &self.config,
        )
    }
}

impl ProbabilisticClassifier for NeuralClassifier {
    fn name(&self) -> &'static str {
        "neural_network"
    }

    fn fit(
        &mut self,
        train: Dataset<'_>,
        validation: Option<Dataset<'_>>,
    ) -> Result<(), ComputeError> {
        self.config.validate()?;
        if train.len() < 2 {
            return Err(ComputeError::TrainingError(
                "batch normalization needs at least 2 training rows".into(),
            ));
        }

        let device = Device::Cpu;
        let n = train.len();
        let n_features = train.n_features();
        let n_classes = train.n_classes;

        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = Network::build(vb, n_features, n_classes, &self.config)?;
        let mut init_rng = ChaCha8Rng::seed_from_u64(self.seed);
        glorot_init(&mut varmap, n_features, n_classes, &self.config, &mut init_rng)?;

        let monitor = validation.unwrap_or(train);
        let monitor_rows: Vec<usize> = (0..monitor.len()).collect();
        let monitor_input = gather_rows(monitor.rows, &monitor_rows, n_features, &device)?;
        let monitor_targets = label_tensor(monitor.labels, &monitor_rows, &device)?;

        let mut optimizer = candle_nn::AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: self.config.learning_rate,
                beta1: self.config.beta1,
                beta2: self.config.beta2,
                eps: self.config.epsilon,
                weight_decay: 0.0,
            },
        )?;
        let mut early_stopping = EarlyStopping::new(self.config.early_stopping_patience);
        let mut plateau = ReduceLrOnPlateau::new(
            self.config.lr_decay_factor,
            self.config.lr_decay_patience,
            self.config.lr_min_delta,
            self.config.min_learning_rate,
        );

        let mut history = TrainingHistory::default();
        let mut best = NetworkWeights::capture(&varmap)?;
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..self.config.max_epochs {
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(1 + epoch as u64));
            order.sort_unstable();
            order.shuffle(&mut rng);

            let mut loss_sum = 0.0;
            let mut correct = 0;
            let mut n_batches = 0;
            for batch in batches(&order, self.config.batch_size) {
                let input = gather_rows(train.rows, batch, n_features, &device)?;
                let targets = label_tensor(train.labels, batch, &device)?;
                let logits = network.logits(&input, Some(&mut rng))?;
                let loss = candle_nn::loss::cross_entropy(&logits, &targets)?
                    .add(&network.l2_penalty()?)?;
                let loss_value = f64::from(loss.to_scalar::<f32>()?);
                if !loss_value.is_finite() {
                    return Err(ComputeError::TrainingError(format!(
                        "neural loss diverged at epoch {}",
                        epoch
                    )));
                }
                optimizer.backward_step(&loss)?;
                loss_sum += loss_value;
                correct += count_correct(&logits, train.labels, batch)?;
                n_batches += 1;
            }

            let (val_loss, val_accuracy) =
                evaluate(&network, &monitor_input, &monitor_targets, monitor.labels)?;
            let lr = optimizer.learning_rate();
            let metrics = EpochMetrics {
                epoch,
                loss: loss_sum / n_batches as f64,
                accuracy: correct as f64 / n as f64,
                val_loss,
                val_accuracy,
                learning_rate: lr,
            };
            debug!(
                epoch,
                loss = metrics.loss,
                accuracy = metrics.accuracy,
                val_loss,
                val_accuracy,
                lr,
                "neural epoch"
            );
            history.epochs.push(metrics);

            if early_stopping.observe(epoch, val_accuracy) {
                best = NetworkWeights::capture(&varmap)?;
            }
            optimizer.set_learning_rate(plateau.observe(val_loss, lr));

            if early_stopping.should_stop() {
                history.stopped_early = true;
                break;
            }
        }

        history.best_epoch = early_stopping.best_epoch();
        info!(
            epochs = history.epochs.len(),
            best_epoch = ?history.best_epoch,
            best_val_accuracy = early_stopping.best(),
            stopped_early = history.stopped_early,
            "neural network fitted"
        );

        self.n_features = n_features;
        self.n_classes = n_classes;
        self.weights = Some(best);
        self.history = history;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.weights.is_some()
    }

    fn predict_proba(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ComputeError> {
        let weights = self
            .weights
            .as_ref()
            .ok_or(ComputeError::NotFitted("neural network"))?;
        check_rows(rows, self.n_features)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let device = Device::Cpu;
        let network = self.network(weights, &device)?;
        let all: Vec<usize> = (0..rows.len()).collect();
        network.probabilities(&gather_rows(rows, &all, self.n_features, &device)?)
    }
}
