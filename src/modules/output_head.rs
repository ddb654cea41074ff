//! Output head applied to the accumulated skip connections.
//!
//! The head is a short list of layers of two kinds: stateless pointwise
//! nonlinearities and projections that own a convolution (and therefore a
//! step-mode buffer). Each kind is matched explicitly, so a projection can
//! never be silently skipped in step mode.

use crate::error::{Result, WaveNetError};
use crate::modules::causal_conv::{CausalConv1d, ConvBuffer};
use crate::state::{StreamingModule, StreamingState};
use burn::tensor::{activation::relu, backend::Backend, Tensor};

/// One layer of the output head.
#[derive(Debug, Clone)]
pub enum HeadLayer<B: Backend> {
    /// Elementwise ReLU, no temporal dependency.
    Relu,
    /// Convolution with its own step-mode state.
    Projection(CausalConv1d<B>),
}

/// Step-mode state matching a [`HeadLayer`].
#[derive(Debug, Clone)]
pub enum HeadLayerState<B: Backend> {
    /// State of a stateless layer.
    Stateless,
    /// Buffer of a projection layer.
    Projection(ConvBuffer<B>),
}

impl<B: Backend> HeadLayer<B> {
    /// Apply the layer to a `[batch, channels, time]` tensor.
    pub fn forward_bulk(&self, input: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        match self {
            HeadLayer::Relu => Ok(relu(input)),
            HeadLayer::Projection(conv) => conv.apply_bulk(input),
        }
    }

    /// Apply the layer to one `[batch, channels]` frame.
    pub fn forward_step(
        &self,
        state: &mut HeadLayerState<B>,
        input: Tensor<B, 2>,
    ) -> Result<Tensor<B, 2>> {
        match (self, state) {
            (HeadLayer::Relu, HeadLayerState::Stateless) => Ok(relu(input)),
            (HeadLayer::Projection(conv), HeadLayerState::Projection(buffer)) => {
                conv.apply_step(buffer, input)
            }
            (HeadLayer::Relu, HeadLayerState::Projection(_))
            | (HeadLayer::Projection(_), HeadLayerState::Stateless) => Err(WaveNetError::config(
                "output head state does not match its layer kind",
            )),
        }
    }
}

impl<B: Backend> StreamingState for HeadLayerState<B> {
    fn reset(&mut self) {
        match self {
            HeadLayerState::Stateless => {}
            HeadLayerState::Projection(buffer) => buffer.reset(),
        }
    }
}

impl<B: Backend> StreamingModule<B> for HeadLayer<B> {
    type State = HeadLayerState<B>;

    fn init_state(&self, batch_size: usize) -> Self::State {
        match self {
            HeadLayer::Relu => HeadLayerState::Stateless,
            HeadLayer::Projection(conv) => HeadLayerState::Projection(conv.init_state(batch_size)),
        }
    }
}
