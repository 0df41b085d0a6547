//! Serializable snapshot of the network's candle variables

use std::collections::{BTreeMap, HashMap};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// One named variable, flattened row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

/// Every variable of a network (kernels, biases, batch-norm scale, shift and
/// running statistics), keyed by its `VarMap` path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    tensors: BTreeMap<String, NamedTensor>,
}

impl NetworkWeights {
    /// Copy the current values out of `varmap`
    pub fn capture(varmap: &VarMap) -> Result<Self, ComputeError> {
        let vars = varmap
            .data()
            .lock()
            .map_err(|_| ComputeError::TrainingError("variable map lock poisoned".into()))?;
        let mut tensors = BTreeMap::new();
        for (name, var) in vars.iter() {
            let tensor = var.as_tensor();
            tensors.insert(
                name.clone(),
                NamedTensor {
                    shape: tensor.dims().to_vec(),
                    values: tensor.flatten_all()?.to_vec1::<f32>()?,
                },
            );
        }
        Ok(Self { tensors })
    }

    pub fn get(&self, name: &str) -> Option<&NamedTensor> {
        self.tensors.get(name)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// A read-only builder over the snapshot; fails if a variable's values do
    /// not fill its shape
    pub fn var_builder(&self, device: &Device) -> Result<VarBuilder<'static>, ComputeError> {
        let mut map = HashMap::with_capacity(self.tensors.len());
        for (name, t) in &self.tensors {
            let tensor = Tensor::from_vec(t.values.clone(), t.shape.clone(), device)?;
            map.insert(name.clone(), tensor);
        }
        Ok(VarBuilder::from_tensors(map, DType::F32, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn populated_varmap() -> VarMap {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        candle_nn::linear(3, 2, vb.pp("layer")).unwrap();
        varmap
    }

    #[test]
    fn test_capture_copies_every_variable() {
        let varmap = populated_varmap();
        let weights = NetworkWeights::capture(&varmap).unwrap();
        assert_eq!(weights.len(), 2);
        let kernel = weights.get("layer.weight").unwrap();
        assert_eq!(kernel.shape, vec![2, 3]);
        assert_eq!(kernel.values.len(), 6);
        assert_eq!(weights.get("layer.bias").unwrap().shape, vec![2]);
    }

    #[test]
    fn test_var_builder_serves_captured_values() {
        let varmap = populated_varmap();
        let weights = NetworkWeights::capture(&varmap).unwrap();
        let vb = weights.var_builder(&Device::Cpu).unwrap();
        let layer = candle_nn::linear(3, 2, vb.pp("layer")).unwrap();
        let values = layer.weight().flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(values, weights.get("layer.weight").unwrap().values);

        // Wrong width is reported rather than silently reshaped
        let vb = weights.var_builder(&Device::Cpu).unwrap();
        assert!(candle_nn::linear(4, 2, vb.pp("layer")).is_err());
    }

    #[test]
    fn test_truncated_values_are_rejected() {
        let varmap = populated_varmap();
        let mut weights = NetworkWeights::capture(&varmap).unwrap();
        if let Some(t) = weights.tensors.get_mut("layer.weight") {
            t.values.pop();
        }
        assert!(weights.var_builder(&Device::Cpu).is_err());
    }
}
