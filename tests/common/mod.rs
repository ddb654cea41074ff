//! Shared test utilities for small models and tensor comparisons.
#![allow(dead_code)]

use burn::tensor::{Tensor, TensorData};
use burn_ndarray::{NdArray, NdArrayDevice};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use wavenet::model::sampling::one_hot;
use wavenet::{WaveNet, WaveNetConfig};

pub type TestBackend = NdArray<f32>;

pub const FIXTURE_DIR: &str = "tests/fixtures";

/// A network small enough to run hundreds of steps in a unit test.
///
/// Two stacks of three blocks with kernel 3 give dilations `[1, 2, 4, 1, 2, 4]`.
pub fn small_config() -> WaveNetConfig {
    WaveNetConfig {
        labels: 16,
        channels: 8,
        layers: 6,
        stacks: 2,
        kernel_size: 3,
        dropout: 0.0,
        cin_channels: None,
        gin_channels: None,
    }
}

/// Build a model with seeded random weights.
pub fn small_model(config: &WaveNetConfig, seed: u64) -> WaveNet<TestBackend> {
    let mut rng = StdRng::seed_from_u64(seed);
    WaveNet::init(config, &mut rng, &NdArrayDevice::default()).expect("init model")
}

/// Assert two tensor data slices are element-wise close within tolerance.
pub fn assert_close(a: &TensorData, b: &TensorData, tol: f32) {
    let a_slice = a.as_slice::<f32>().expect("a slice");
    let b_slice = b.as_slice::<f32>().expect("b slice");
    assert_eq!(
        a_slice.len(),
        b_slice.len(),
        "tensor length mismatch: {} vs {}",
        a_slice.len(),
        b_slice.len()
    );
    for (idx, (x, y)) in a_slice.iter().zip(b_slice.iter()).enumerate() {
        if (x - y).abs() > tol {
            panic!(
                "mismatch at {idx}: {x} vs {y} (diff: {}, tol: {tol})",
                (x - y).abs()
            );
        }
    }
}

/// One-hot frames `[1, labels, categories.len()]` for a category sequence.
pub fn one_hot_sequence(categories: &[usize], labels: usize) -> Tensor<TestBackend, 3> {
    let device = NdArrayDevice::default();
    one_hot::<TestBackend>(categories, labels, &device)
        .expect("one hot")
        .reshape([1, categories.len(), labels])
        .swap_dims(1, 2)
}

/// Deterministic pseudo-random categories in `0..labels`.
pub fn category_sequence(len: usize, labels: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| (rng.next_u32() as usize) % labels)
        .collect()
}

/// Create a 2D tensor from nested Vecs.
pub fn tensor2(data: Vec<Vec<f32>>, device: &NdArrayDevice) -> Tensor<TestBackend, 2> {
    let rows = data.len();
    let cols = data.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<f32> = data.into_iter().flatten().collect();
    Tensor::from_data(TensorData::new(flat, [rows, cols]), device)
}

/// Create a 3D tensor from nested Vecs.
pub fn tensor3(data: Vec<Vec<Vec<f32>>>, device: &NdArrayDevice) -> Tensor<TestBackend, 3> {
    let d0 = data.len();
    let d1 = data.first().map(|v| v.len()).unwrap_or(0);
    let d2 = data
        .first()
        .and_then(|v| v.first())
        .map(|v| v.len())
        .unwrap_or(0);
    let flat: Vec<f32> = data.into_iter().flatten().flatten().collect();
    Tensor::from_data(TensorData::new(flat, [d0, d1, d2]), device)
}

/// Randomness source that fails the test if it is ever consulted.
pub struct PanickingRng;

impl RngCore for PanickingRng {
    fn next_u32(&mut self) -> u32 {
        panic!("randomness source must not be used");
    }

    fn next_u64(&mut self) -> u64 {
        panic!("randomness source must not be used");
    }

    fn fill_bytes(&mut self, _dest: &mut [u8]) {
        panic!("randomness source must not be used");
    }

    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        panic!("randomness source must not be used");
    }
}
