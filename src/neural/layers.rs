//! Candle modules of the neural classifier
//!
//! Each hidden block is `linear → batch_norm → ReLU → dropout`; the output layer
//! is a plain linear projection to class logits. Modules are built from a
//! [`VarBuilder`], so the same code path serves training (backed by a `VarMap`)
//! and inference (backed by a persisted weight snapshot).

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{BatchNorm, BatchNormConfig, Linear, Module, ModuleT, VarBuilder, VarMap};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::error::ComputeError;
use crate::neural::network::NeuralConfig;

/// Variable prefix of the class projection
const OUTPUT_PREFIX: &str = "output";

fn block_prefix(index: usize) -> String {
    format!("block{}", index)
}

struct Block {
    dense: Linear,
    norm: BatchNorm,
    dropout: f64,
    l2: f64,
}

impl Block {
    fn forward(
        &self,
        x: &Tensor,
        dropout_rng: Option<&mut ChaCha8Rng>,
    ) -> Result<Tensor, ComputeError> {
        let train = dropout_rng.is_some();
        let z = self.dense.forward(x)?;
        let a = self.norm.forward_t(&z, train)?.relu()?;
        match dropout_rng {
            Some(rng) if self.dropout > 0.0 => {
                let mask = dropout_mask(a.dims2()?, self.dropout, rng, a.device())?;
                Ok(a.mul(&mask)?)
            }
            _ => Ok(a),
        }
    }
}

/// Inverted-dropout mask drawn from the seeded training RNG.
///
/// Candle's CPU device cannot be seeded, so `candle_nn::Dropout` would make
/// training irreproducible.
fn dropout_mask(
    (rows, cols): (usize, usize),
    rate: f64,
    rng: &mut ChaCha8Rng,
    device: &Device,
) -> Result<Tensor, ComputeError> {
    let keep = 1.0 - rate;
    let scale = (1.0 / keep) as f32;
    let values: Vec<f32> = (0..rows * cols)
        .map(|_| if rng.gen::<f64>() < keep { scale } else { 0.0 })
        .collect();
    Ok(Tensor::from_vec(values, (rows, cols), device)?)
}

/// The funnel network
pub struct Network {
    blocks: Vec<Block>,
    output: Linear,
}

impl Network {
    /// Build modules for `n_features → layers → n_classes`, fetching every
    /// variable from `vb`
    pub fn build(
        vb: VarBuilder<'_>,
        n_features: usize,
        n_classes: usize,
        config: &NeuralConfig,
    ) -> Result<Self, ComputeError> {
        let mut width = n_features;
        let mut blocks = Vec::with_capacity(config.layers.len());
        for (i, layer) in config.layers.iter().enumerate() {
            let vb = vb.pp(block_prefix(i));
            let norm_config = BatchNormConfig {
                eps: config.batch_norm_epsilon,
                // candle weights the batch statistic; the config weights the running one
                momentum: 1.0 - config.batch_norm_momentum,
                ..Default::default()
            };
            blocks.push(Block {
                dense: candle_nn::linear(width, layer.units, vb.pp("dense"))?,
                norm: candle_nn::batch_norm(layer.units, norm_config, vb.pp("norm"))?,
                dropout: layer.dropout,
                l2: layer.l2,
            });
            width = layer.units;
        }
        let output = candle_nn::linear(width, n_classes, vb.pp(OUTPUT_PREFIX))?;
        Ok(Self { blocks, output })
    }

    /// Class logits. Passing an RNG selects training mode: batch statistics
    /// (updating the running ones) and dropout.
    pub fn logits(
        &self,
        x: &Tensor,
        mut dropout_rng: Option<&mut ChaCha8Rng>,
    ) -> Result<Tensor, ComputeError> {
        let mut a = x.clone();
        for block in &self.blocks {
            a = block.forward(&a, dropout_rng.as_deref_mut())?;
        }
        Ok(self.output.forward(&a)?)
    }

    /// `Σ l2 · ‖W‖²` over the hidden kernels, as a scalar tensor
    pub fn l2_penalty(&self) -> Result<Tensor, ComputeError> {
        let mut penalty = Tensor::zeros((), DType::F32, self.output.weight().device())?;
        for block in self.blocks.iter().filter(|b| b.l2 > 0.0) {
            let term = block.dense.weight().sqr()?.sum_all()?.affine(block.l2, 0.0)?;
            penalty = penalty.add(&term)?;
        }
        Ok(penalty)
    }

    /// Inference-mode class probabilities, one row per input row
    pub fn probabilities(&self, x: &Tensor) -> Result<Vec<Vec<f64>>, ComputeError> {
        let proba = candle_nn::ops::softmax(&self.logits(x, None)?, D::Minus1)?;
        Ok(proba
            .to_vec2::<f32>()?
            .into_iter()
            .map(|row| {
                let row: Vec<f64> = row.into_iter().map(f64::from).collect();
                let total: f64 = row.iter().sum();
                row.into_iter().map(|p| p / total).collect()
            })
            .collect())
    }
}

/// Overwrite the linear kernels in `varmap` with Glorot-uniform values and
/// zero biases drawn from `rng`, so initialization follows the seed
pub fn glorot_init(
    varmap: &mut VarMap,
    n_features: usize,
    n_classes: usize,
    config: &NeuralConfig,
    rng: &mut ChaCha8Rng,
) -> Result<(), ComputeError> {
    let mut shapes = Vec::with_capacity(config.layers.len() + 1);
    let mut width = n_features;
    for (i, layer) in config.layers.iter().enumerate() {
        shapes.push((format!("{}.dense", block_prefix(i)), width, layer.units));
        width = layer.units;
    }
    shapes.push((OUTPUT_PREFIX.to_string(), width, n_classes));

    for (prefix, fan_in, fan_out) in shapes {
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
        let weights: Vec<f32> = (0..fan_in * fan_out)
            .map(|_| rng.gen_range(-limit..limit) as f32)
            .collect();
        let weights = Tensor::from_vec(weights, (fan_out, fan_in), &Device::Cpu)?;
        varmap.set_one(format!("{}.weight", prefix), weights)?;
        let bias = Tensor::zeros(fan_out, DType::F32, &Device::Cpu)?;
        varmap.set_one(format!("{}.bias", prefix), bias)?;
    }
    Ok(())
}

/// Stack selected rows into an `f32` tensor of shape `(indices.len(), width)`
pub fn gather_rows(
    rows: &[Vec<f64>],
    indices: &[usize],
    width: usize,
    device: &Device,
) -> Result<Tensor, ComputeError> {
    let mut values = Vec::with_capacity(indices.len() * width);
    for &i in indices {
        values.extend(rows[i].iter().map(|&v| v as f32));
    }
    Ok(Tensor::from_vec(values, (indices.len(), width), device)?)
}

/// Class indices as the `u32` target tensor `cross_entropy` expects
pub fn label_tensor(
    labels: &[usize],
    indices: &[usize],
    device: &Device,
) -> Result<Tensor, ComputeError> {
    let targets: Vec<u32> = indices.iter().map(|&i| labels[i] as u32).collect();
    Ok(Tensor::from_vec(targets, indices.len(), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::network::LayerSpec;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    fn tiny_config() -> NeuralConfig {
        NeuralConfig {
            layers: vec![LayerSpec::new(6, 0.5, 0.01), LayerSpec::new(3, 0.0, 0.0)],
            ..NeuralConfig::default()
        }
    }

    fn tiny_network(varmap: &mut VarMap, seed: u64) -> Network {
        let config = tiny_config();
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        let network = Network::build(vb, 4, 2, &config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        glorot_init(varmap, 4, 2, &config, &mut rng).unwrap();
        network
    }

    #[test]
    fn test_glorot_init_is_seeded() {
        let mut a = VarMap::new();
        let mut b = VarMap::new();
        tiny_network(&mut a, 3);
        tiny_network(&mut b, 3);
        let weight = |m: &VarMap| {
            let vars = m.data().lock().unwrap();
            let values = vars["block0.dense.weight"]
                .as_tensor()
                .flatten_all()
                .unwrap()
                .to_vec1::<f32>()
                .unwrap();
            values
        };
        let wa = weight(&a);
        assert_eq!(wa, weight(&b));
        let limit = (6.0f32 / 10.0).sqrt();
        assert!(wa.iter().all(|w| w.abs() <= limit));
    }

    #[test]
    fn test_probabilities_are_normalized() {
        let mut varmap = VarMap::new();
        let network = tiny_network(&mut varmap, 1);
        let rows = vec![
            vec![0.5, -1.0, 2.0, 0.0],
            vec![0.0; 4],
            vec![-3.0, 1.0, 1.0, 4.0],
        ];
        let x = gather_rows(&rows, &[0, 1, 2], 4, &Device::Cpu).unwrap();
        let proba = network.probabilities(&x).unwrap();
        assert_eq!(proba.len(), 3);
        for p in proba {
            assert_eq!(p.len(), 2);
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_l2_penalty_counts_only_regularized_blocks() {
        let mut varmap = VarMap::new();
        let network = tiny_network(&mut varmap, 2);
        let expected: f32 = {
            let vars = varmap.data().lock().unwrap();
            let w = vars["block0.dense.weight"].as_tensor();
            w.sqr().unwrap().sum_all().unwrap().to_scalar::<f32>().unwrap() * 0.01
        };
        let penalty = network.l2_penalty().unwrap().to_scalar::<f32>().unwrap();
        assert!((penalty - expected).abs() < 1e-6);
    }

    #[test]
    fn test_dropout_mask_scales_kept_units() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mask = dropout_mask((50, 20), 0.25, &mut rng, &Device::Cpu).unwrap();
        let values = mask.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let scale = 1.0 / 0.75f32;
        assert!(values.iter().all(|&v| v == 0.0 || (v - scale).abs() < 1e-6));
        let kept = values.iter().filter(|&&v| v > 0.0).count() as f64 / values.len() as f64;
        assert!((kept - 0.75).abs() < 0.05);
    }
}
