//! WaveNet model: bulk forward pass and incremental generation.
//!
//! The bulk pass ([`WaveNet::forward`]) convolves whole `[batch, labels, time]`
//! sequences. Incremental generation ([`WaveNet::incremental_forward`]) runs
//! the same weights one sample at a time, feeding each output back as the
//! next input while every dilated convolution remembers only the history its
//! kernel needs.

use crate::conditioner::features::{
    align_local, expand_global, GlobalConditioning, LocalConditioning,
};
use crate::config::WaveNetConfig;
use crate::error::{Result, WaveNetError};
use crate::model::sampling::{one_hot, sample_one_hot};
use crate::modules::causal_conv::{CausalConv1d, CausalConvConfig, ConvBuffer};
use crate::modules::dilation::DilationSchedule;
use crate::modules::output_head::{HeadLayer, HeadLayerState};
use crate::modules::residual::{accumulate_skip, ResidualConv1dGlu};
use crate::perf::{self, Metric};
use crate::state::{StreamStep, StreamingModule, StreamingState};
use crate::weights::TensorData as WeightTensor;
use burn::tensor::{activation::softmax, backend::Backend, Tensor, TensorData};
use log::{debug, trace};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::collections::HashMap;
use std::ops::ControlFlow;

/// Category used for the first input frame when no seed is supplied.
///
/// This is an arbitrary fixed choice with no acoustic meaning; it is clamped
/// to the last category for models with fewer than 128 labels.
pub const DEFAULT_SEED_CATEGORY: usize = 127;

/// Arguments for one incremental generation run.
///
/// Tensors may be given channel-major (`[batch, labels, time]`) or
/// time-major (`[batch, time, labels]`); they are converted internally.
#[derive(Debug, Clone)]
pub struct GenerateOptions<B: Backend> {
    /// First input frame, `[batch, labels, 1]`. Defaults to a one-hot
    /// [`DEFAULT_SEED_CATEGORY`] frame.
    pub initial_input: Option<Tensor<B, 3>>,
    /// Local conditioning aligned to the step count, `[batch, cin, steps]`.
    pub local_conditioning: Option<Tensor<B, 3>>,
    /// Global conditioning vector, `[batch, gin]`.
    ///
    /// One vector per batch item. A `[batch, gin, 1]` tensor must be reshaped
    /// to `[batch, gin]` first; the broadcast over time happens internally.
    pub global_conditioning: Option<Tensor<B, 2>>,
    /// Number of samples to generate. Defaults to the teacher-forced length.
    pub steps: Option<usize>,
    /// Frames that replace the model's own feedback for the first steps.
    pub teacher_inputs: Option<Tensor<B, 3>>,
    /// Convert output scores to probabilities.
    pub softmax: bool,
    /// Sample a category and feed back its one-hot frame.
    pub quantize: bool,
}

impl<B: Backend> Default for GenerateOptions<B> {
    fn default() -> Self {
        Self {
            initial_input: None,
            local_conditioning: None,
            global_conditioning: None,
            steps: None,
            teacher_inputs: None,
            softmax: true,
            quantize: true,
        }
    }
}

impl<B: Backend> GenerateOptions<B> {
    /// Sample `steps` frames with softmax and quantisation enabled.
    pub fn new(steps: usize) -> Self {
        Self {
            steps: Some(steps),
            ..Self::default()
        }
    }

    /// Start from `input` instead of the default seed frame.
    pub fn with_initial_input(mut self, input: Tensor<B, 3>) -> Self {
        self.initial_input = Some(input);
        self
    }

    /// Condition every step on the matching frame of `local`.
    pub fn with_local_conditioning(mut self, local: Tensor<B, 3>) -> Self {
        self.local_conditioning = Some(local);
        self
    }

    /// Condition every step on the `[batch, gin]` vector `global`.
    ///
    /// Rank-2 only: reshape a `[batch, gin, 1]` tensor before passing it.
    pub fn with_global_conditioning(mut self, global: Tensor<B, 2>) -> Self {
        self.global_conditioning = Some(global);
        self
    }

    /// Force the first steps' inputs to `inputs`.
    pub fn with_teacher_inputs(mut self, inputs: Tensor<B, 3>) -> Self {
        self.teacher_inputs = Some(inputs);
        self
    }

    /// Toggle conversion of scores to probabilities.
    pub fn with_softmax(mut self, softmax: bool) -> Self {
        self.softmax = softmax;
        self
    }

    /// Toggle sampling of one-hot frames.
    pub fn with_quantize(mut self, quantize: bool) -> Self {
        self.quantize = quantize;
        self
    }
}

/// Observer consulted after every generated step.
///
/// Returning [`ControlFlow::Break`] aborts the run with
/// [`WaveNetError::Cancelled`].
pub trait GenerationObserver {
    /// Called after step `step` of `total` has been produced.
    fn on_step(&mut self, step: usize, total: usize) -> ControlFlow<()>;
}

/// Observer that never interrupts generation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl GenerationObserver for NoProgress {
    fn on_step(&mut self, _step: usize, _total: usize) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<F> GenerationObserver for F
where
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    fn on_step(&mut self, step: usize, total: usize) -> ControlFlow<()> {
        self(step, total)
    }
}

/// Per-run streaming state: one history buffer per stateful layer.
#[derive(Debug, Clone)]
pub struct WaveNetState<B: Backend> {
    first_conv: ConvBuffer<B>,
    conv_layers: Vec<ConvBuffer<B>>,
    last_conv_layers: Vec<HeadLayerState<B>>,
    step: StreamStep,
    batch_size: usize,
}

impl<B: Backend> WaveNetState<B> {
    /// Steps processed since the last reset.
    pub fn step(&self) -> usize {
        self.step.get()
    }

    /// Batch size the buffers were allocated for.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// History buffer of residual block `layer`.
    pub fn layer_buffer(&self, layer: usize) -> Option<&ConvBuffer<B>> {
        self.conv_layers.get(layer)
    }
}

impl<B: Backend> StreamingState for WaveNetState<B> {
    fn reset(&mut self) {
        self.first_conv.reset();
        self.conv_layers.iter_mut().for_each(StreamingState::reset);
        self.last_conv_layers.iter_mut().for_each(StreamingState::reset);
        self.step.reset();
    }
}

/// Autoregressive WaveNet built from gated, dilated causal convolutions.
#[derive(Debug, Clone)]
pub struct WaveNet<B: Backend> {
    /// Hyperparameters the model was built from.
    pub config: WaveNetConfig,
    /// Dilation of each residual block.
    pub schedule: DilationSchedule,
    /// 1x1 projection from one-hot input to residual channels.
    pub first_conv: CausalConv1d<B>,
    /// Residual blocks in schedule order.
    pub conv_layers: Vec<ResidualConv1dGlu<B>>,
    /// Output head applied to the accumulated skips.
    pub last_conv_layers: Vec<HeadLayer<B>>,
}

impl<B: Backend> WaveNet<B> {
    /// Build the architecture, asking `make_conv` for every named convolution.
    ///
    /// `make_conv` receives the checkpoint path of the convolution, its shape,
    /// and whether it carries a bias.
    fn build<F>(config: &WaveNetConfig, mut make_conv: F) -> Result<Self>
    where
        F: FnMut(&str, CausalConvConfig, bool) -> Result<CausalConv1d<B>>,
    {
        config.validate()?;
        let schedule = DilationSchedule::new(config.layers, config.stacks)?;
        let receptive_field = schedule.receptive_field(config.kernel_size)?;
        for layer in 0..schedule.len() {
            let history = schedule.buffer_len(layer, config.kernel_size)?;
            trace!(
                "layer {layer}: dilation {}, history {history} frames",
                schedule.dilations()[layer]
            );
        }
        let channels = config.channels;
        let half = channels / 2;

        let first_conv = make_conv(
            "first_conv",
            CausalConvConfig::pointwise(config.labels, channels),
            true,
        )?;

        let mut conv_layers = Vec::with_capacity(schedule.len());
        for (idx, &dilation) in schedule.dilations().iter().enumerate() {
            let prefix = format!("conv_layers.{idx}");
            let conv = make_conv(
                &format!("{prefix}.conv"),
                CausalConvConfig {
                    in_channels: channels,
                    out_channels: channels,
                    kernel_size: config.kernel_size,
                    dilation,
                },
                true,
            )?;
            let local_proj = config
                .cin_channels
                .map(|cin| {
                    make_conv(
                        &format!("{prefix}.conv1x1c"),
                        CausalConvConfig::pointwise(cin, channels),
                        false,
                    )
                })
                .transpose()?;
            let global_proj = config
                .gin_channels
                .map(|gin| {
                    make_conv(
                        &format!("{prefix}.conv1x1g"),
                        CausalConvConfig::pointwise(gin, channels),
                        false,
                    )
                })
                .transpose()?;
            let out_proj = make_conv(
                &format!("{prefix}.conv1x1_out"),
                CausalConvConfig::pointwise(half, channels),
                true,
            )?;
            let skip_proj = make_conv(
                &format!("{prefix}.conv1x1_skip"),
                CausalConvConfig::pointwise(half, channels),
                true,
            )?;
            conv_layers.push(ResidualConv1dGlu::new(
                conv,
                local_proj,
                global_proj,
                out_proj,
                skip_proj,
            )?);
        }

        let last_conv_layers = vec![
            HeadLayer::Relu,
            HeadLayer::Projection(make_conv(
                "last_conv_layers.1",
                CausalConvConfig::pointwise(channels, channels),
                true,
            )?),
            HeadLayer::Relu,
            HeadLayer::Projection(make_conv(
                "last_conv_layers.3",
                CausalConvConfig::pointwise(channels, config.labels),
                true,
            )?),
        ];

        debug!(
            "built wavenet: {} layers, receptive field {receptive_field}",
            schedule.len()
        );
        Ok(Self {
            config: config.clone(),
            schedule,
            first_conv,
            conv_layers,
            last_conv_layers,
        })
    }

    /// Build a model with uniform `±1/sqrt(fan_in)` weights drawn from `rng`.
    pub fn init<R: Rng + ?Sized>(
        config: &WaveNetConfig,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<Self> {
        Self::build(config, |_, conv, bias| {
            let fan_in = (conv.in_channels * conv.kernel_size) as f32;
            let bound = 1.0 / fan_in.sqrt();
            let dist = Uniform::new_inclusive(-bound, bound);
            let len = conv.out_channels * conv.in_channels * conv.kernel_size;
            let weight: Vec<f32> = (0..len).map(|_| dist.sample(rng)).collect();
            let weight = Tensor::from_data(
                TensorData::new(
                    weight,
                    [conv.out_channels, conv.in_channels, conv.kernel_size],
                ),
                device,
            );
            let bias = bias.then(|| {
                let values: Vec<f32> = (0..conv.out_channels).map(|_| dist.sample(rng)).collect();
                Tensor::from_data(TensorData::new(values, [conv.out_channels]), device)
            });
            CausalConv1d::new(conv, weight, bias)
        })
    }

    /// Build a model from checkpoint tensors keyed by module path.
    pub fn from_state_dict(
        config: &WaveNetConfig,
        state: &HashMap<String, WeightTensor>,
        device: &B::Device,
    ) -> Result<Self> {
        let _span = perf::span(Metric::LoadWeights);
        Self::build(config, |name, conv, bias| {
            let weight_name = format!("{name}.weight");
            let weight = state
                .get(&weight_name)
                .ok_or_else(|| WaveNetError::Weights(format!("missing tensor {weight_name}")))?
                .to_tensor::<B, 3>(device)?;
            let bias = if bias {
                let bias_name = format!("{name}.bias");
                let bias = state
                    .get(&bias_name)
                    .ok_or_else(|| WaveNetError::Weights(format!("missing tensor {bias_name}")))?
                    .to_tensor::<B, 1>(device)?;
                Some(bias)
            } else {
                None
            };
            CausalConv1d::new(conv, weight, bias).map_err(|err| match err {
                WaveNetError::ShapeMismatch {
                    expected, actual, ..
                } => WaveNetError::Weights(format!(
                    "{name}: expected shape {expected}, got {actual}"
                )),
                other => other,
            })
        })
    }

    /// Replace every weight with the tensors in `state`.
    pub fn load_state_dict(
        &mut self,
        state: &HashMap<String, WeightTensor>,
        device: &B::Device,
    ) -> Result<()> {
        *self = Self::from_state_dict(&self.config, state, device)?;
        Ok(())
    }

    /// Number of input samples that can influence one output.
    pub fn receptive_field(&self) -> Result<usize> {
        self.schedule.receptive_field(self.config.kernel_size)
    }

    fn check_global(&self, global: &GlobalConditioning<B>) -> Result<()> {
        check_conditioning("global", self.config.gin_channels, global.dims()[1])
    }

    fn check_local(&self, channels: usize) -> Result<()> {
        check_conditioning("local", self.config.cin_channels, channels)
    }

    /// Bulk forward pass over a whole sequence.
    ///
    /// * `input` - one-hot frames `[batch, labels, time]`
    /// * `local` - local conditioning `[batch, cin, time]`
    /// * `global` - global conditioning `[batch, gin]`
    ///
    /// Returns scores (or probabilities with `softmax`) `[batch, labels, time]`.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        local: Option<Tensor<B, 3>>,
        global: Option<Tensor<B, 2>>,
        softmax_output: bool,
    ) -> Result<Tensor<B, 3>> {
        let _span = perf::span(Metric::BulkForward);
        let [batch, labels, time] = input.dims();
        if labels != self.config.labels {
            return Err(WaveNetError::shape("input labels", self.config.labels, labels));
        }

        let global = expand_global(global, time);
        if let Some(global) = global.as_ref() {
            self.check_global(global)?;
            check_batch("global conditioning", batch, global.dims()[0])?;
        }
        let global_bct = global.map(|g| g.channel_major());
        if let Some(local) = local.as_ref() {
            let [local_batch, channels, local_time] = local.dims();
            self.check_local(channels)?;
            check_batch("local conditioning", batch, local_batch)?;
            if local_time != time {
                return Err(WaveNetError::config(format!(
                    "local conditioning has {local_time} frames, input has {time}"
                )));
            }
        }

        let mut x = self.first_conv.apply_bulk(input)?;
        let mut skips = None;
        for layer in &self.conv_layers {
            let (next, skip) = layer.forward_bulk(x, local.as_ref(), global_bct.as_ref())?;
            x = next;
            skips = Some(accumulate_skip(skips, skip));
        }

        let mut output =
            skips.ok_or_else(|| WaveNetError::config("model has no residual layers"))?;
        for layer in &self.last_conv_layers {
            output = layer.forward_bulk(output)?;
        }
        Ok(if softmax_output {
            softmax(output, 1)
        } else {
            output
        })
    }

    /// Advance the network by one time step.
    ///
    /// * `frame` - current input `[batch, labels]`
    /// * `local` / `global` - this step's conditioning slices
    ///
    /// Returns the raw output scores `[batch, labels]`.
    pub fn step(
        &self,
        state: &mut WaveNetState<B>,
        frame: Tensor<B, 2>,
        local: Option<Tensor<B, 2>>,
        global: Option<Tensor<B, 2>>,
    ) -> Result<Tensor<B, 2>> {
        let [batch, labels] = frame.dims();
        if labels != self.config.labels {
            return Err(WaveNetError::shape("input frame", self.config.labels, labels));
        }
        if state.conv_layers.len() != self.conv_layers.len()
            || state.last_conv_layers.len() != self.last_conv_layers.len()
        {
            return Err(WaveNetError::config(
                "streaming state was created for a different model",
            ));
        }
        if state.batch_size != batch {
            return Err(WaveNetError::shape("step batch", state.batch_size, batch));
        }

        let mut x = self.first_conv.apply_step(&mut state.first_conv, frame)?;
        let mut skips = None;
        {
            let _span = perf::span(Metric::ResidualStack);
            for (layer, buffer) in self.conv_layers.iter().zip(state.conv_layers.iter_mut()) {
                let (next, skip) = layer.forward_step(buffer, x, local.clone(), global.clone())?;
                x = next;
                skips = Some(accumulate_skip(skips, skip));
            }
        }

        let _span = perf::span(Metric::OutputHead);
        let mut output =
            skips.ok_or_else(|| WaveNetError::config("model has no residual layers"))?;
        for (layer, layer_state) in self
            .last_conv_layers
            .iter()
            .zip(state.last_conv_layers.iter_mut())
        {
            output = layer.forward_step(layer_state, output)?;
        }
        state.step.increment(1);
        Ok(output)
    }

    /// Generate samples autoregressively with a fresh streaming state.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        options: GenerateOptions<B>,
        rng: &mut R,
    ) -> Result<Tensor<B, 3>> {
        let mut state = self.init_state(1);
        self.incremental_forward(&mut state, options, rng, &mut NoProgress)
    }

    /// Generate samples autoregressively, one step at a time.
    ///
    /// `state` is reset before the first step and again on every exit path,
    /// so a failed or cancelled run leaves no history behind. `rng` is only
    /// used when `options.quantize` is set.
    ///
    /// Returns the generated frames `[batch, labels, steps]`: one-hot frames
    /// when quantising, otherwise the probabilities or raw scores.
    pub fn incremental_forward<R, O>(
        &self,
        state: &mut WaveNetState<B>,
        options: GenerateOptions<B>,
        rng: &mut R,
        observer: &mut O,
    ) -> Result<Tensor<B, 3>>
    where
        R: Rng + ?Sized,
        O: GenerationObserver + ?Sized,
    {
        let _span = perf::span(Metric::Generate);
        state.reset();
        let result = self.run_steps(state, options, rng, observer);
        state.reset();
        if let Err(err) = result.as_ref() {
            debug!("generation stopped: {err}");
        }
        result
    }

    fn run_steps<R, O>(
        &self,
        state: &mut WaveNetState<B>,
        options: GenerateOptions<B>,
        rng: &mut R,
        observer: &mut O,
    ) -> Result<Tensor<B, 3>>
    where
        R: Rng + ?Sized,
        O: GenerationObserver + ?Sized,
    {
        let GenerateOptions {
            initial_input,
            local_conditioning,
            global_conditioning,
            steps,
            teacher_inputs,
            softmax: softmax_output,
            quantize,
        } = options;
        let labels = self.config.labels;

        if quantize && !softmax_output {
            return Err(WaveNetError::config(
                "quantize requires softmax: raw scores are not a distribution",
            ));
        }

        let teacher = teacher_inputs
            .map(|inputs| to_time_major(inputs, labels, "teacher-forced input"))
            .transpose()?;
        let teacher_len = teacher.as_ref().map(|t| t.dims()[1]);
        let steps = match (steps, teacher_len) {
            (Some(steps), Some(forced)) => steps.max(forced),
            (Some(steps), None) => steps,
            (None, Some(forced)) => forced,
            (None, None) => {
                return Err(WaveNetError::config(
                    "either steps or teacher-forced inputs must be given",
                ))
            }
        };
        if steps == 0 {
            return Err(WaveNetError::config("steps must be positive"));
        }

        let initial = initial_input
            .map(|input| to_time_major(input, labels, "initial input"))
            .transpose()?;
        if let Some(initial) = initial.as_ref() {
            if initial.dims()[1] != 1 {
                return Err(WaveNetError::shape(
                    "initial input time steps",
                    1,
                    initial.dims()[1],
                ));
            }
        }

        let global = expand_global(global_conditioning, steps);
        let local = align_local(local_conditioning, steps)?;
        if let Some(global) = global.as_ref() {
            self.check_global(global)?;
        }
        if let Some(local) = local.as_ref() {
            self.check_local(local.dims()[2])?;
        }

        let batch = resolve_batch(&[
            ("teacher-forced input", teacher.as_ref().map(|t| t.dims()[0])),
            ("initial input", initial.as_ref().map(|t| t.dims()[0])),
            ("local conditioning", local.as_ref().map(|c| c.dims()[0])),
            ("global conditioning", global.as_ref().map(|g| g.dims()[0])),
        ])?;

        if state.batch_size != batch {
            *state = self.init_state(batch);
        }

        let device = self.first_conv.weight.device();
        let mut current = match initial {
            Some(initial) => initial.reshape([batch, labels]),
            None => {
                let seed = DEFAULT_SEED_CATEGORY.min(labels - 1);
                one_hot(&vec![seed; batch], labels, &device)?
            }
        };

        debug!(
            "incremental forward: {steps} steps, batch {batch}, forced {}, softmax {softmax_output}, quantize {quantize}",
            teacher_len.unwrap_or(0)
        );

        let mut outputs = Vec::with_capacity(steps);
        for t in 0..steps {
            let _span = perf::span(Metric::GenerateStep);
            if let Some(teacher) = teacher.as_ref() {
                if t < teacher.dims()[1] {
                    current = teacher.clone().narrow(1, t, 1).reshape([batch, labels]);
                }
            }

            let local_t = local.as_ref().map(|c: &LocalConditioning<B>| c.at(t));
            let global_t = global.as_ref().map(|g| g.at(t));
            let scores = self.step(state, current, local_t, global_t)?;

            let mut frame = if softmax_output {
                softmax(scores, 1)
            } else {
                scores
            };
            if quantize {
                let _span = perf::span(Metric::Sampling);
                let (categories, one_hot) = sample_one_hot(frame, rng)?;
                trace!("step {t}: sampled {categories:?}");
                frame = one_hot;
            }

            outputs.push(frame.clone().reshape([batch, labels, 1]));
            current = frame;
            perf::add_count(Metric::GeneratedSteps, 1);

            if observer.on_step(t, steps).is_break() {
                return Err(WaveNetError::Cancelled { step: t });
            }
        }

        perf::add_count(Metric::GeneratedSamples, (steps * batch) as u64);
        Ok(Tensor::cat(outputs, 2))
    }
}

impl<B: Backend> StreamingModule<B> for WaveNet<B> {
    type State = WaveNetState<B>;

    fn init_state(&self, batch_size: usize) -> Self::State {
        WaveNetState {
            first_conv: self.first_conv.init_state(batch_size),
            conv_layers: self
                .conv_layers
                .iter()
                .map(|layer| layer.init_state(batch_size))
                .collect(),
            last_conv_layers: self
                .last_conv_layers
                .iter()
                .map(|layer| layer.init_state(batch_size))
                .collect(),
            step: StreamStep::new(),
            batch_size,
        }
    }
}

/// Convert a `[batch, labels, time]` or `[batch, time, labels]` tensor to time-major.
fn to_time_major<B: Backend>(input: Tensor<B, 3>, labels: usize, what: &str) -> Result<Tensor<B, 3>> {
    let dims = input.dims();
    if dims[1] == labels {
        Ok(input.swap_dims(1, 2))
    } else if dims[2] == labels {
        Ok(input)
    } else {
        Err(WaveNetError::shape(what, labels, dims))
    }
}

fn check_conditioning(kind: &str, configured: Option<usize>, given: usize) -> Result<()> {
    match configured {
        None => Err(WaveNetError::config(format!(
            "{kind} conditioning given, but the model has no {kind} conditioning channels"
        ))),
        Some(channels) if channels != given => Err(WaveNetError::config(format!(
            "{kind} conditioning has {given} channels, model expects {channels}"
        ))),
        Some(_) => Ok(()),
    }
}

fn check_batch(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(WaveNetError::shape(format!("{what} batch"), expected, actual));
    }
    Ok(())
}

/// Agree on one batch size across all supplied inputs (1 when none are given).
fn resolve_batch(sources: &[(&str, Option<usize>)]) -> Result<usize> {
    let mut batch: Option<(&str, usize)> = None;
    for &(what, size) in sources {
        let Some(size) = size else { continue };
        match batch {
            None => batch = Some((what, size)),
            Some((_, expected)) => check_batch(what, expected, size)?,
        }
    }
    Ok(batch.map(|(_, size)| size).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution as TensorDistribution;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn small_config() -> WaveNetConfig {
        WaveNetConfig {
            labels: 16,
            channels: 8,
            layers: 4,
            stacks: 2,
            kernel_size: 2,
            dropout: 0.0,
            cin_channels: None,
            gin_channels: None,
        }
    }

    fn model(config: &WaveNetConfig) -> WaveNet<TestBackend> {
        let mut rng = StdRng::seed_from_u64(11);
        WaveNet::init(config, &mut rng, &NdArrayDevice::default()).unwrap()
    }

    #[test]
    fn init_is_reproducible_from_the_rng() {
        let config = small_config();
        let a = model(&config);
        let b = model(&config);
        let diff = (a.first_conv.weight.clone() - b.first_conv.weight.clone())
            .abs()
            .max()
            .into_scalar();
        assert_eq!(diff, 0.0);
        assert_eq!(a.schedule.dilations(), &[1, 2, 1, 2]);
        assert_eq!(a.receptive_field().unwrap(), 7);
    }

    #[test]
    fn init_rejects_uneven_stacks() {
        let config = WaveNetConfig {
            layers: 10,
            stacks: 3,
            ..small_config()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let err = WaveNet::<TestBackend>::init(&config, &mut rng, &NdArrayDevice::default())
            .unwrap_err();
        assert!(matches!(err, WaveNetError::Configuration(_)));
    }

    #[test]
    fn init_rejects_overflowing_dilations() {
        let mut rng = StdRng::seed_from_u64(0);
        for (layers, stacks) in [(65, 1), (64, 1)] {
            let config = WaveNetConfig {
                layers,
                stacks,
                ..small_config()
            };
            let err = WaveNet::<TestBackend>::init(&config, &mut rng, &NdArrayDevice::default())
                .unwrap_err();
            assert!(matches!(err, WaveNetError::Configuration(_)), "{layers}/{stacks}");
        }
    }

    #[test]
    fn state_has_one_buffer_per_block() {
        let net = model(&small_config());
        let state = net.init_state(3);
        assert_eq!(state.batch_size(), 3);
        assert_eq!(state.layer_buffer(1).unwrap().len(), 3);
        assert_eq!(state.layer_buffer(2).unwrap().len(), 2);
        assert!(state.layer_buffer(4).is_none());
    }

    #[test]
    fn step_rejects_wrong_frame_width() {
        let net = model(&small_config());
        let mut state = net.init_state(1);
        let frame = Tensor::<TestBackend, 2>::zeros([1, 15], &NdArrayDevice::default());
        let err = net.step(&mut state, frame, None, None).unwrap_err();
        assert!(matches!(err, WaveNetError::ShapeMismatch { .. }));
    }

    #[test]
    fn missing_steps_and_prefix_is_a_configuration_error() {
        let net = model(&small_config());
        let mut rng = StdRng::seed_from_u64(0);
        let options = GenerateOptions::<TestBackend>::default();
        let err = net.generate(options, &mut rng).unwrap_err();
        assert!(matches!(err, WaveNetError::Configuration(_)));
    }

    #[test]
    fn quantize_without_softmax_is_rejected() {
        let net = model(&small_config());
        let mut rng = StdRng::seed_from_u64(0);
        let options = GenerateOptions::<TestBackend>::new(4).with_softmax(false);
        let err = net.generate(options, &mut rng).unwrap_err();
        assert!(matches!(err, WaveNetError::Configuration(_)));
    }

    #[test]
    fn wrong_seed_width_is_a_shape_error() {
        let net = model(&small_config());
        let mut rng = StdRng::seed_from_u64(0);
        let seed = Tensor::<TestBackend, 3>::zeros([1, 5, 1], &NdArrayDevice::default());
        let options = GenerateOptions::new(4).with_initial_input(seed);
        let err = net.generate(options, &mut rng).unwrap_err();
        assert!(matches!(err, WaveNetError::ShapeMismatch { .. }));
    }

    #[test]
    fn unexpected_global_conditioning_is_rejected() {
        let net = model(&small_config());
        let mut rng = StdRng::seed_from_u64(0);
        let g = Tensor::<TestBackend, 2>::random(
            [1, 3],
            TensorDistribution::Default,
            &NdArrayDevice::default(),
        );
        let options = GenerateOptions::new(4).with_global_conditioning(g);
        let err = net.generate(options, &mut rng).unwrap_err();
        assert!(matches!(err, WaveNetError::Configuration(_)));
    }

    #[test]
    fn generated_frames_are_one_hot() {
        let net = model(&small_config());
        let mut rng = StdRng::seed_from_u64(5);
        let output = net.generate(GenerateOptions::new(6), &mut rng).unwrap();
        assert_eq!(output.dims(), [1, 16, 6]);
        let per_step = output.sum_dim(1).to_data();
        for value in per_step.as_slice::<f32>().unwrap() {
            assert_eq!(*value, 1.0);
        }
    }

    #[test]
    fn default_seed_category_is_clamped_for_small_models() {
        let net = model(&small_config());
        let mut state = net.init_state(1);
        let mut rng = StdRng::seed_from_u64(0);
        // Teacher forcing with the clamped default seed reproduces the default run.
        let seed = one_hot::<TestBackend>(&[15], 16, &NdArrayDevice::default())
            .unwrap()
            .reshape([1, 16, 1]);
        let explicit = net
            .incremental_forward(
                &mut state,
                GenerateOptions::new(3)
                    .with_initial_input(seed)
                    .with_quantize(false),
                &mut rng,
                &mut NoProgress,
            )
            .unwrap();
        let implicit = net
            .incremental_forward(
                &mut state,
                GenerateOptions::new(3).with_quantize(false),
                &mut rng,
                &mut NoProgress,
            )
            .unwrap();
        let diff = (explicit - implicit).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }

    #[test]
    fn observer_can_cancel_and_state_is_reset() {
        let net = model(&small_config());
        let mut state = net.init_state(1);
        let mut rng = StdRng::seed_from_u64(1);
        let mut stop_after_two = |step: usize, _total: usize| {
            if step == 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        let err = net
            .incremental_forward(&mut state, GenerateOptions::new(8), &mut rng, &mut stop_after_two)
            .unwrap_err();
        assert!(matches!(err, WaveNetError::Cancelled { step: 1 }));
        assert_eq!(state.step(), 0);
        let buffer = state.layer_buffer(1).unwrap();
        assert_eq!(buffer.cursor(), 0);
        let frames = buffer.frames().unwrap().clone().to_data();
        assert!(frames.as_slice::<f32>().unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn resolve_batch_requires_agreement() {
        assert_eq!(resolve_batch(&[("a", None), ("b", None)]).unwrap(), 1);
        assert_eq!(resolve_batch(&[("a", Some(2)), ("b", None), ("c", Some(2))]).unwrap(), 2);
        assert!(resolve_batch(&[("a", Some(2)), ("b", Some(3))]).is_err());
    }
}
