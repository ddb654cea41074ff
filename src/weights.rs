//! SafeTensors weight loading and name mapping utilities.
//!
//! Checkpoints exported from the training code use PyTorch module paths
//! (`first_conv.weight`, `conv_layers.3.conv1x1_skip.bias`, ...). These
//! helpers read them, strip wrapper prefixes and fold weight-normalised
//! parameters into plain weights.

use crate::error::WaveNetError;
use anyhow::Result;
use burn::tensor::{backend::Backend, Tensor, TensorData as BurnTensorData};
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Raw tensor payload extracted from a SafeTensors file.
#[derive(Debug, Clone)]
pub struct TensorData {
    /// Scalar dtype in the file.
    pub dtype: Dtype,
    /// Shape as a list of dimensions.
    pub shape: Vec<usize>,
    /// Raw byte buffer in row-major order.
    pub data: Vec<u8>,
}

impl TensorData {
    /// Create TensorData from a safetensors TensorView.
    pub fn from_safetensor(tensor: safetensors::tensor::TensorView<'_>) -> Self {
        Self {
            dtype: tensor.dtype(),
            shape: tensor.shape().to_vec(),
            data: tensor.data().to_vec(),
        }
    }

    /// Create an F32 payload from decoded values.
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Self {
        Self {
            dtype: Dtype::F32,
            shape,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// Decode the payload to `f32` values.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, WaveNetError> {
        match self.dtype {
            Dtype::F32 => Ok(self
                .data
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect()),
            Dtype::BF16 => Ok(self
                .data
                .chunks_exact(2)
                .map(|chunk| {
                    let bits = u16::from_le_bytes([chunk[0], chunk[1]]) as u32;
                    f32::from_bits(bits << 16)
                })
                .collect()),
            other => Err(WaveNetError::Weights(format!("Unsupported dtype {other:?}"))),
        }
    }

    /// Convert into a rank-`D` burn tensor on `device`.
    pub fn to_tensor<B: Backend, const D: usize>(
        &self,
        device: &B::Device,
    ) -> Result<Tensor<B, D>, WaveNetError> {
        let shape: [usize; D] = self.shape.clone().try_into().map_err(|_| {
            WaveNetError::Weights(format!(
                "Expected {D}D tensor, got shape {:?}",
                self.shape
            ))
        })?;
        let values = self.to_f32_vec()?;
        Ok(Tensor::from_data(BurnTensorData::new(values, shape), device))
    }
}

/// Load a WaveNet checkpoint and map names into module paths.
pub fn load_wavenet_state_dict(path: impl AsRef<Path>) -> Result<HashMap<String, TensorData>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let tensors = SafeTensors::deserialize(&bytes)?;
    let mut state = HashMap::new();

    for name in tensors.names() {
        if let Some(mapped) = map_wavenet_name(name) {
            let tensor = tensors.tensor(name)?;
            state.insert(mapped, TensorData::from_safetensor(tensor));
        }
    }

    fold_weight_norm(&mut state)?;
    Ok(state)
}

/// Map checkpoint tensor names into module paths.
fn map_wavenet_name(name: &str) -> Option<String> {
    const SKIP_SUFFIXES: &[&str] = &["num_batches_tracked"];

    let mut name = name;
    while let Some(rest) = strip_wrapper_prefix(name) {
        name = rest;
    }

    if SKIP_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        return None;
    }
    Some(name.to_string())
}

/// Strip one DataParallel / wrapper module prefix, if present.
fn strip_wrapper_prefix(name: &str) -> Option<&str> {
    const WRAPPER_PREFIXES: &[&str] = &["module.", "model."];
    WRAPPER_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(*prefix))
}

/// Replace every `*.weight_g` / `*.weight_v` pair with the equivalent `*.weight`.
///
/// `weight = g * v / ||v||`, with the norm taken per output channel over all
/// remaining dimensions.
fn fold_weight_norm(state: &mut HashMap<String, TensorData>) -> Result<()> {
    let bases: Vec<String> = state
        .keys()
        .filter_map(|key| key.strip_suffix(".weight_v"))
        .map(str::to_string)
        .collect();

    for base in bases {
        let v = state
            .remove(&format!("{base}.weight_v"))
            .ok_or_else(|| WaveNetError::Weights(format!("missing {base}.weight_v")))?;
        let g = state
            .remove(&format!("{base}.weight_g"))
            .ok_or_else(|| WaveNetError::Weights(format!("missing {base}.weight_g")))?;

        let out_channels = v.shape.first().copied().unwrap_or(0);
        let v_values = v.to_f32_vec()?;
        let g_values = g.to_f32_vec()?;
        if out_channels == 0 || g_values.len() != out_channels {
            anyhow::bail!(
                "weight norm for {base}: g has {} values, v has shape {:?}",
                g_values.len(),
                v.shape
            );
        }

        let row = v_values.len() / out_channels;
        let mut folded = Vec::with_capacity(v_values.len());
        for (gain, values) in g_values.iter().zip(v_values.chunks_exact(row)) {
            let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
            let scale = if norm > 0.0 { gain / norm } else { 0.0 };
            folded.extend(values.iter().map(|x| x * scale));
        }
        state.insert(
            format!("{base}.weight"),
            TensorData::from_f32(v.shape.clone(), &folded),
        );
    }
    Ok(())
}
