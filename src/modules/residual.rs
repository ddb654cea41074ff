//! Gated, conditioned residual block.
//!
//! Each block runs one dilated [`CausalConv1d`], adds the projected local and
//! global conditioning, splits the result into filter and gate halves and
//! combines them as `tanh(filter) * sigmoid(gate)`. Two 1x1 projections turn
//! the gated activation into a residual update and a skip branch.

use crate::error::{Result, WaveNetError};
use crate::modules::causal_conv::{CausalConv1d, ConvBuffer};
use crate::state::StreamingModule;
use burn::tensor::{
    activation::{sigmoid, tanh},
    backend::Backend,
    Tensor,
};

/// Scale applied every time a skip branch is added to the running sum.
pub const SKIP_SCALE: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Fold one more skip branch into the running sum.
///
/// The first branch is taken as is; every later one is added and the total
/// rescaled by `sqrt(0.5)`. Bulk and step paths share this helper so they
/// accumulate identically.
pub fn accumulate_skip<B: Backend, const D: usize>(
    skips: Option<Tensor<B, D>>,
    skip: Tensor<B, D>,
) -> Tensor<B, D> {
    match skips {
        Some(acc) => (acc + skip).mul_scalar(SKIP_SCALE),
        None => skip,
    }
}

/// Split channels (dim 1) in half and apply the gated activation unit.
fn gated_activation<B: Backend, const D: usize>(input: Tensor<B, D>) -> Tensor<B, D> {
    let half = input.dims()[1] / 2;
    let filter = input.clone().narrow(1, 0, half);
    let gate = input.narrow(1, half, half);
    tanh(filter) * sigmoid(gate)
}

/// Residual block with gated activation and optional conditioning.
#[derive(Debug, Clone)]
pub struct ResidualConv1dGlu<B: Backend> {
    /// Dilated convolution producing filter and gate halves.
    pub conv: CausalConv1d<B>,
    /// 1x1 projection of local conditioning features.
    pub local_proj: Option<CausalConv1d<B>>,
    /// 1x1 projection of the global conditioning vector.
    pub global_proj: Option<CausalConv1d<B>>,
    /// 1x1 projection of the gated activation onto the residual path.
    pub out_proj: CausalConv1d<B>,
    /// 1x1 projection of the gated activation onto the skip path.
    pub skip_proj: CausalConv1d<B>,
}

impl<B: Backend> ResidualConv1dGlu<B> {
    /// Assemble a block, checking that the pieces fit together.
    pub fn new(
        conv: CausalConv1d<B>,
        local_proj: Option<CausalConv1d<B>>,
        global_proj: Option<CausalConv1d<B>>,
        out_proj: CausalConv1d<B>,
        skip_proj: CausalConv1d<B>,
    ) -> Result<Self> {
        let gate_channels = conv.config.out_channels;
        if gate_channels % 2 != 0 {
            return Err(WaveNetError::config(format!(
                "gate channels ({gate_channels}) must be even"
            )));
        }
        for (name, proj) in [("local", &local_proj), ("global", &global_proj)] {
            if let Some(proj) = proj {
                if proj.config.kernel_size != 1 || proj.config.out_channels != gate_channels {
                    return Err(WaveNetError::config(format!(
                        "{name} conditioning projection must be 1x1 onto {gate_channels} channels"
                    )));
                }
            }
        }
        for (name, proj) in [("residual", &out_proj), ("skip", &skip_proj)] {
            if proj.config.kernel_size != 1 || proj.config.in_channels != gate_channels / 2 {
                return Err(WaveNetError::config(format!(
                    "{name} projection must be 1x1 from {} channels",
                    gate_channels / 2
                )));
            }
        }
        if out_proj.config.out_channels != conv.config.in_channels {
            return Err(WaveNetError::config(
                "residual projection must map back to the block input width",
            ));
        }
        Ok(Self {
            conv,
            local_proj,
            global_proj,
            out_proj,
            skip_proj,
        })
    }

    /// Run the block over `[batch, channels, time]` inputs.
    ///
    /// `local` is `[batch, cin, time]`; `global` is the broadcast
    /// `[batch, gin, time]` view. Returns `(x + residual, skip)`.
    pub fn forward_bulk(
        &self,
        input: Tensor<B, 3>,
        local: Option<&Tensor<B, 3>>,
        global: Option<&Tensor<B, 3>>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let mut hidden = self.conv.apply_bulk(input.clone())?;
        if let Some(local) = local {
            hidden = hidden + projection(&self.local_proj, "local")?.apply_bulk(local.clone())?;
        }
        if let Some(global) = global {
            hidden = hidden + projection(&self.global_proj, "global")?.apply_bulk(global.clone())?;
        }
        let gated = gated_activation(hidden);
        let skip = self.skip_proj.apply_bulk(gated.clone())?;
        let residual = self.out_proj.apply_bulk(gated)?;
        Ok((input + residual, skip))
    }

    /// Run the block for one `[batch, channels]` frame.
    ///
    /// `local` and `global` are the single-step `[batch, cin]` / `[batch, gin]`
    /// slices for this time step.
    pub fn forward_step(
        &self,
        buffer: &mut ConvBuffer<B>,
        input: Tensor<B, 2>,
        local: Option<Tensor<B, 2>>,
        global: Option<Tensor<B, 2>>,
    ) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        let mut hidden = self.conv.apply_step(buffer, input.clone())?;
        if let Some(local) = local {
            hidden = hidden + projection(&self.local_proj, "local")?.apply_pointwise(local)?;
        }
        if let Some(global) = global {
            hidden = hidden + projection(&self.global_proj, "global")?.apply_pointwise(global)?;
        }
        let gated = gated_activation(hidden);
        let skip = self.skip_proj.apply_pointwise(gated.clone())?;
        let residual = self.out_proj.apply_pointwise(gated)?;
        Ok((input + residual, skip))
    }
}

fn projection<'a, B: Backend>(
    proj: &'a Option<CausalConv1d<B>>,
    name: &str,
) -> Result<&'a CausalConv1d<B>> {
    proj.as_ref().ok_or_else(|| {
        WaveNetError::config(format!(
            "{name} conditioning given, but the model has no {name} conditioning channels"
        ))
    })
}

impl<B: Backend> StreamingModule<B> for ResidualConv1dGlu<B> {
    type State = ConvBuffer<B>;

    fn init_state(&self, batch_size: usize) -> Self::State {
        self.conv.init_state(batch_size)
    }
}
