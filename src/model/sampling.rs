//! Categorical sampling and one-hot encoding of output frames.

use crate::error::{Result, WaveNetError};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Build `[batch, labels]` one-hot frames, one category per batch item.
pub fn one_hot<B: Backend>(
    categories: &[usize],
    labels: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let mut values = vec![0.0f32; categories.len() * labels];
    for (row, &category) in categories.iter().enumerate() {
        if category >= labels {
            return Err(WaveNetError::shape("category index", labels, category));
        }
        values[row * labels + category] = 1.0;
    }
    Ok(Tensor::from_data(
        TensorData::new(values, [categories.len(), labels]),
        device,
    ))
}

/// Read a `[batch, labels]` float tensor back as row-major `f32` rows.
pub(crate) fn rows_f32<B: Backend>(frame: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, labels] = frame.dims();
    let values = frame
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| WaveNetError::Sampling(format!("cannot read output frame: {err:?}")))?;
    Ok(values
        .chunks(labels.max(1))
        .map(|row| row.to_vec())
        .collect())
}

/// Draw one category per row of `probs` (`[batch, labels]`) using `rng`.
///
/// Returns the sampled categories and their one-hot encoding.
pub fn sample_one_hot<B: Backend, R: Rng + ?Sized>(
    probs: Tensor<B, 2>,
    rng: &mut R,
) -> Result<(Vec<usize>, Tensor<B, 2>)> {
    let [_, labels] = probs.dims();
    let device = probs.device();
    let categories = rows_f32(probs)?
        .iter()
        .map(|row| {
            WeightedIndex::new(row)
                .map(|dist| dist.sample(rng))
                .map_err(|err| WaveNetError::Sampling(format!("invalid distribution: {err}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let frame = one_hot(&categories, labels, &device)?;
    Ok((categories, frame))
}

/// Index of the largest value in every row of a `[batch, labels]` frame.
pub fn argmax_rows<B: Backend>(frame: Tensor<B, 2>) -> Result<Vec<usize>> {
    Ok(rows_f32(frame)?
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (idx, &value)| {
                    if value > best.1 {
                        (idx, value)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    #[test]
    fn one_hot_sets_single_category() {
        let device = NdArrayDevice::default();
        let frame = one_hot::<TestBackend>(&[2, 0], 3, &device).unwrap();
        assert_eq!(
            frame.to_data().as_slice::<f32>().unwrap(),
            &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0]
        );
        assert!(one_hot::<TestBackend>(&[3], 3, &device).is_err());
    }

    #[test]
    fn degenerate_distribution_always_picks_its_mass() {
        let device = NdArrayDevice::default();
        let probs = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0, 1.0, 0.0]], &device);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            let (categories, frame) = sample_one_hot(probs.clone(), &mut rng).unwrap();
            assert_eq!(categories, vec![2]);
            assert_eq!(argmax_rows(frame).unwrap(), vec![2]);
        }
    }

    #[test]
    fn same_seed_same_draws() {
        let device = NdArrayDevice::default();
        let probs = Tensor::<TestBackend, 2>::from_floats([[0.25, 0.25, 0.25, 0.25]], &device);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..16)
                .map(|_| sample_one_hot(probs.clone(), &mut rng).unwrap().0[0])
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
    }

    #[test]
    fn zero_mass_is_a_sampling_error() {
        let device = NdArrayDevice::default();
        let probs = Tensor::<TestBackend, 2>::zeros([1, 4], &device);
        let mut rng = StdRng::seed_from_u64(0);
        let err = sample_one_hot(probs, &mut rng).unwrap_err();
        assert!(matches!(err, WaveNetError::Sampling(_)));
    }
}
