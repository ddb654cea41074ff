//! Stacked dilation schedule for the residual blocks.

use crate::error::{Result, WaveNetError};

/// Dilation assigned to every residual block, in forward order.
///
/// Blocks are split into `stacks` equal groups; within a group the dilation
/// doubles from 1, and it restarts at 1 at every group boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DilationSchedule {
    dilations: Vec<usize>,
    stacks: usize,
}

impl DilationSchedule {
    /// Build the schedule for `layers` blocks split into `stacks` cycles.
    pub fn new(layers: usize, stacks: usize) -> Result<Self> {
        if layers == 0 || stacks == 0 {
            return Err(WaveNetError::config("layers and stacks must be positive"));
        }
        if layers % stacks != 0 {
            return Err(WaveNetError::config(format!(
                "layers ({layers}) must be divisible by stacks ({stacks})"
            )));
        }
        let per_stack = layers / stacks;
        let dilations = (0..layers)
            .map(|layer| {
                u32::try_from(layer % per_stack)
                    .ok()
                    .and_then(|exponent| 1usize.checked_shl(exponent))
                    .ok_or_else(|| {
                        WaveNetError::config(format!(
                            "{per_stack} layers per stack overflow the dilation of layer {layer}"
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { dilations, stacks })
    }

    /// Dilations in block order.
    pub fn dilations(&self) -> &[usize] {
        &self.dilations
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.dilations.len()
    }

    /// True when the schedule has no blocks.
    pub fn is_empty(&self) -> bool {
        self.dilations.is_empty()
    }

    /// Number of dilation cycles.
    pub fn stacks(&self) -> usize {
        self.stacks
    }

    /// Frames of history block `layer` keeps in step mode.
    pub fn buffer_len(&self, layer: usize, kernel_size: usize) -> Result<usize> {
        let dilation = *self.dilations.get(layer).ok_or_else(|| {
            WaveNetError::config(format!("layer {layer} is outside the schedule"))
        })?;
        kernel_size
            .saturating_sub(1)
            .checked_mul(dilation)
            .and_then(|padding| padding.checked_add(1))
            .ok_or_else(|| {
                WaveNetError::config(format!(
                    "history of layer {layer} (dilation {dilation}, kernel {kernel_size}) overflows"
                ))
            })
    }

    /// Number of past samples (including the current one) that can influence
    /// one output of the residual stack.
    pub fn receptive_field(&self, kernel_size: usize) -> Result<usize> {
        self.dilations
            .iter()
            .try_fold(0usize, |total, &dilation| total.checked_add(dilation))
            .and_then(|total| kernel_size.saturating_sub(1).checked_mul(total))
            .and_then(|padding| padding.checked_add(1))
            .ok_or_else(|| {
                WaveNetError::config(format!(
                    "receptive field of kernel {kernel_size} over {} layers overflows",
                    self.dilations.len()
                ))
            })
    }
}
