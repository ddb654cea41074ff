//! Dilated causal 1D convolution with a ring-buffer step mode.
//!
//! A [`CausalConv1d`] owns one weight set and exposes two ways of applying it:
//! [`CausalConv1d::apply_bulk`] convolves a whole `[batch, channels, time]`
//! sequence, while [`CausalConv1d::apply_step`] consumes one `[batch, channels]`
//! frame at a time, remembering exactly the history the kernel needs in a
//! [`ConvBuffer`]. Both produce the same values for the same time step.

use crate::error::{Result, WaveNetError};
use crate::state::{StreamingModule, StreamingState};
use burn::tensor::{
    backend::Backend,
    module::{conv1d, linear},
    ops::ConvOptions,
    s, Tensor,
};

/// Shape parameters of a causal convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CausalConvConfig {
    /// Input channels.
    pub in_channels: usize,
    /// Output channels.
    pub out_channels: usize,
    /// Kernel size in samples.
    pub kernel_size: usize,
    /// Dilation factor.
    pub dilation: usize,
}

impl CausalConvConfig {
    /// Configuration for a pointwise (1x1) projection.
    pub fn pointwise(in_channels: usize, out_channels: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size: 1,
            dilation: 1,
        }
    }

    /// Left padding needed to keep the bulk convolution causal.
    pub fn causal_padding(&self) -> usize {
        (self.kernel_size - 1) * self.dilation
    }

    /// Frames of history a step-mode ring must retain (including the newest).
    pub fn buffer_len(&self) -> usize {
        self.causal_padding() + 1
    }
}

/// Causal 1D convolution over raw weights.
#[derive(Debug, Clone)]
pub struct CausalConv1d<B: Backend> {
    /// Shape parameters.
    pub config: CausalConvConfig,
    /// Weight tensor `[out, in, kernel]`.
    pub weight: Tensor<B, 3>,
    /// Optional bias `[out]`.
    pub bias: Option<Tensor<B, 1>>,
    /// Per-tap `[in, out]` matrices used by the step path, oldest tap first.
    taps: Vec<Tensor<B, 2>>,
}

impl<B: Backend> CausalConv1d<B> {
    /// Create a convolution from a `[out, in, kernel]` weight.
    pub fn new(
        config: CausalConvConfig,
        weight: Tensor<B, 3>,
        bias: Option<Tensor<B, 1>>,
    ) -> Result<Self> {
        let expected = [config.out_channels, config.in_channels, config.kernel_size];
        if weight.dims() != expected {
            return Err(WaveNetError::shape("conv weight", expected, weight.dims()));
        }
        if let Some(bias) = bias.as_ref() {
            if bias.dims() != [config.out_channels] {
                return Err(WaveNetError::shape(
                    "conv bias",
                    [config.out_channels],
                    bias.dims(),
                ));
            }
        }
        if config.dilation == 0 || config.kernel_size == 0 {
            return Err(WaveNetError::config(
                "kernel size and dilation must be positive",
            ));
        }
        let taps = (0..config.kernel_size)
            .map(|tap| {
                weight
                    .clone()
                    .narrow(2, tap, 1)
                    .reshape([config.out_channels, config.in_channels])
                    .transpose()
            })
            .collect();
        Ok(Self {
            config,
            weight,
            bias,
            taps,
        })
    }

    /// Convolve a full `[batch, in, time]` sequence into `[batch, out, time]`.
    ///
    /// Output at time `t` only reads inputs at times `<= t`; the first
    /// `(kernel_size - 1) * dilation` steps see zeros before the sequence.
    pub fn apply_bulk(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let [batch, channels, time] = input.dims();
        if channels != self.config.in_channels {
            return Err(WaveNetError::shape(
                "conv input channels",
                self.config.in_channels,
                channels,
            ));
        }
        if time == 0 {
            return Ok(Tensor::zeros(
                [batch, self.config.out_channels, 0],
                &input.device(),
            ));
        }
        let pad = self.config.causal_padding();
        let padded = if pad > 0 {
            let zeros = Tensor::zeros([batch, channels, pad], &input.device());
            Tensor::cat(vec![zeros, input], 2)
        } else {
            input
        };
        Ok(conv1d(
            padded,
            self.weight.clone(),
            self.bias.clone(),
            ConvOptions::new([1], [0], [self.config.dilation], 1),
        ))
    }

    /// Convolve one `[batch, in]` frame, treating it as the newest time step.
    ///
    /// The frame is written into `buffer`, and the kernel reads the newest
    /// frame plus `kernel_size - 1` older ones spaced `dilation` apart.
    pub fn apply_step(&self, buffer: &mut ConvBuffer<B>, frame: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [batch, channels] = frame.dims();
        if channels != self.config.in_channels {
            return Err(WaveNetError::shape(
                "conv step input channels",
                self.config.in_channels,
                channels,
            ));
        }

        if self.config.kernel_size == 1 {
            return self.apply_pointwise(frame);
        }

        let len = self.config.buffer_len();
        let history = match buffer.frames.take() {
            Some(frames) if frames.dims() == [batch, len, channels] => frames,
            _ => {
                // A differently shaped run: start from a fresh zeroed ring.
                buffer.cursor = 0;
                Tensor::zeros([batch, len, channels], &frame.device())
            }
        };

        let slot = buffer.cursor;
        let history = history.slice_assign(
            s![.., slot..slot + 1, ..],
            frame.reshape([batch, 1, channels]),
        );
        buffer.cursor = (slot + 1) % len;

        // After advancing, `cursor` points at the oldest frame, which is the
        // one kernel tap 0 reads.
        let last = self.taps.len() - 1;
        let mut output: Option<Tensor<B, 2>> = None;
        for (tap, weight) in self.taps.iter().enumerate() {
            let position = (buffer.cursor + tap * self.config.dilation) % len;
            let input = history
                .clone()
                .narrow(1, position, 1)
                .reshape([batch, channels]);
            let bias = if tap == last { self.bias.clone() } else { None };
            let projected = linear(input, weight.clone(), bias);
            output = Some(match output {
                Some(acc) => acc + projected,
                None => projected,
            });
        }
        buffer.frames = Some(history);

        output.ok_or_else(|| WaveNetError::config("convolution has no kernel taps"))
    }

    /// Apply a 1x1 convolution to one `[batch, in]` frame without any history.
    pub fn apply_pointwise(&self, frame: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        if self.config.kernel_size != 1 {
            return Err(WaveNetError::config(format!(
                "kernel size {} needs a history buffer",
                self.config.kernel_size
            )));
        }
        let channels = frame.dims()[1];
        if channels != self.config.in_channels {
            return Err(WaveNetError::shape(
                "pointwise input channels",
                self.config.in_channels,
                channels,
            ));
        }
        Ok(linear(frame, self.taps[0].clone(), self.bias.clone()))
    }
}

/// Ring buffer holding the input history of one [`CausalConv1d`].
///
/// The ring length is `(kernel_size - 1) * dilation + 1` and is fixed when the
/// buffer is created. Pointwise convolutions carry no ring at all.
#[derive(Debug, Clone)]
pub struct ConvBuffer<B: Backend> {
    /// Stored frames `[batch, len, in_channels]`, time-major.
    frames: Option<Tensor<B, 3>>,
    /// Slot the next frame is written to.
    cursor: usize,
}

impl<B: Backend> ConvBuffer<B> {
    /// A buffer with no ring, used by pointwise convolutions.
    pub fn empty() -> Self {
        Self {
            frames: None,
            cursor: 0,
        }
    }

    /// Number of frames retained, or zero when no ring is allocated.
    pub fn len(&self) -> usize {
        self.frames.as_ref().map(|f| f.dims()[1]).unwrap_or(0)
    }

    /// True when no ring is allocated.
    pub fn is_empty(&self) -> bool {
        self.frames.is_none()
    }

    /// Index of the slot the next frame will be written to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Snapshot of the stored frames, if any.
    pub fn frames(&self) -> Option<&Tensor<B, 3>> {
        self.frames.as_ref()
    }
}

impl<B: Backend> StreamingState for ConvBuffer<B> {
    fn reset(&mut self) {
        if let Some(frames) = self.frames.take() {
            self.frames = Some(frames.zeros_like());
        }
        self.cursor = 0;
    }
}

impl<B: Backend> StreamingModule<B> for CausalConv1d<B> {
    type State = ConvBuffer<B>;

    fn init_state(&self, batch_size: usize) -> Self::State {
        if self.config.kernel_size == 1 {
            return ConvBuffer::empty();
        }
        let device = self.weight.device();
        ConvBuffer {
            frames: Some(Tensor::zeros(
                [batch_size, self.config.buffer_len(), self.config.in_channels],
                &device,
            )),
            cursor: 0,
        }
    }
}
