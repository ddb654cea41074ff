//! Behaviour of the autoregressive generation loop.

mod common;

use burn::tensor::Tensor;
use burn_ndarray::NdArrayDevice;
use common::{
    assert_close, category_sequence, one_hot_sequence, small_config, small_model, tensor2,
    PanickingRng, TestBackend,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ops::ControlFlow;
use wavenet::model::sampling::argmax_rows;
use wavenet::model::wavenet::{NoProgress, DEFAULT_SEED_CATEGORY};
use wavenet::state::StreamingModule;
use wavenet::{GenerateOptions, WaveNetConfig, WaveNetError};

fn categories_of(output: Tensor<TestBackend, 3>) -> Vec<usize> {
    let [_, labels, steps] = output.dims();
    argmax_rows(output.swap_dims(1, 2).reshape([steps, labels])).expect("argmax")
}

#[test]
fn same_seed_same_samples() {
    let config = small_config();
    let model = small_model(&config, 1);
    let run = |seed| {
        let mut rng = StdRng::seed_from_u64(seed);
        categories_of(model.generate(GenerateOptions::new(50), &mut rng).expect("generate"))
    };
    let a = run(42);
    assert_eq!(a.len(), 50);
    assert_eq!(a, run(42));
}

#[test]
fn back_to_back_runs_share_no_history() {
    let config = small_config();
    let model = small_model(&config, 2);
    let mut state = model.init_state(1);

    let run = |state: &mut wavenet::WaveNetState<TestBackend>| {
        let mut rng = StdRng::seed_from_u64(7);
        model
            .incremental_forward(state, GenerateOptions::new(40), &mut rng, &mut NoProgress)
            .expect("generate")
    };
    let first = run(&mut state);
    let second = run(&mut state);
    let fresh = run(&mut model.init_state(1));
    assert_close(&first.to_data(), &second.to_data(), 0.0);
    assert_close(&first.to_data(), &fresh.to_data(), 0.0);
}

#[test]
fn prefix_is_forced_then_outputs_are_fed_back() {
    let config = small_config();
    let model = small_model(&config, 3);
    let prefix_len = 12;
    let steps = 30;
    let prefix = one_hot_sequence(&category_sequence(prefix_len, config.labels, 5), config.labels);

    let output = model
        .generate(
            GenerateOptions::new(steps)
                .with_teacher_inputs(prefix.clone())
                .with_quantize(false),
            &mut PanickingRng,
        )
        .expect("generate");
    assert_eq!(output.dims(), [1, config.labels, steps]);

    // Input at step t is prefix[t] for t < k, otherwise the output of step t-1.
    let fed_back = output.clone().narrow(2, prefix_len - 1, steps - prefix_len);
    let inputs = Tensor::cat(vec![prefix, fed_back], 2);
    let bulk = model.forward(inputs, None, None, true).expect("bulk");
    assert_close(&output.to_data(), &bulk.to_data(), 1e-5);
}

#[test]
fn quantized_outputs_are_fed_back_as_one_hot() {
    let config = small_config();
    let model = small_model(&config, 4);
    let mut rng = StdRng::seed_from_u64(3);
    let output = model
        .generate(GenerateOptions::new(25), &mut rng)
        .expect("generate");
    let sampled = categories_of(output.clone());

    // Seed followed by every sample but the last reproduces each step's input.
    let mut inputs = vec![DEFAULT_SEED_CATEGORY.min(config.labels - 1)];
    inputs.extend_from_slice(&sampled[..sampled.len() - 1]);
    // Forcing those inputs draws from the same distributions with the same
    // rng, so the samples must repeat.
    let mut rng = StdRng::seed_from_u64(3);
    let forced = model
        .generate(
            GenerateOptions::default().with_teacher_inputs(one_hot_sequence(&inputs, config.labels)),
            &mut rng,
        )
        .expect("forced");
    assert_eq!(categories_of(forced), sampled);
    let sums = output.sum_dim(1).to_data();
    assert!(sums.as_slice::<f32>().unwrap().iter().all(|v| *v == 1.0));
}

#[test]
fn steps_cover_at_least_the_prefix() {
    let config = small_config();
    let model = small_model(&config, 5);
    let prefix = one_hot_sequence(&category_sequence(9, config.labels, 1), config.labels);

    let longer_prefix = model
        .generate(
            GenerateOptions::new(4)
                .with_teacher_inputs(prefix.clone())
                .with_quantize(false),
            &mut PanickingRng,
        )
        .expect("generate");
    assert_eq!(longer_prefix.dims()[2], 9);

    let prefix_only = model
        .generate(
            GenerateOptions::default()
                .with_teacher_inputs(prefix)
                .with_quantize(false),
            &mut PanickingRng,
        )
        .expect("generate");
    assert_eq!(prefix_only.dims()[2], 9);
}

#[test]
fn unquantized_generation_never_touches_the_rng() {
    let config = small_config();
    let model = small_model(&config, 6);
    let output = model
        .generate(GenerateOptions::new(20).with_quantize(false), &mut PanickingRng)
        .expect("generate");
    let sums = output.sum_dim(1).to_data();
    for value in sums.as_slice::<f32>().unwrap() {
        assert!((value - 1.0).abs() < 1e-5);
    }
}

#[test]
fn default_seed_is_category_127() {
    let config = WaveNetConfig {
        labels: 256,
        ..small_config()
    };
    let model = small_model(&config, 7);
    let explicit_seed = one_hot_sequence(&[127], 256);
    let implicit = model
        .generate(GenerateOptions::new(6).with_quantize(false), &mut PanickingRng)
        .expect("default seed");
    let explicit = model
        .generate(
            GenerateOptions::new(6)
                .with_initial_input(explicit_seed)
                .with_quantize(false),
            &mut PanickingRng,
        )
        .expect("explicit seed");
    assert_close(&implicit.to_data(), &explicit.to_data(), 0.0);
}

#[test]
fn cancellation_leaves_a_clean_state() {
    let config = small_config();
    let model = small_model(&config, 8);
    let mut state = model.init_state(1);
    let mut seen = 0;
    let mut cancel_at_ten = |step: usize, total: usize| {
        assert_eq!(total, 100);
        seen += 1;
        if step == 9 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };
    let mut rng = StdRng::seed_from_u64(1);
    let err = model
        .incremental_forward(
            &mut state,
            GenerateOptions::new(100),
            &mut rng,
            &mut cancel_at_ten,
        )
        .unwrap_err();
    assert!(matches!(err, WaveNetError::Cancelled { step: 9 }));
    assert_eq!(seen, 10);
    assert_eq!(state.step(), 0);

    let mut rng = StdRng::seed_from_u64(2);
    let after_cancel = model
        .incremental_forward(&mut state, GenerateOptions::new(30), &mut rng, &mut NoProgress)
        .expect("generate");
    let mut rng = StdRng::seed_from_u64(2);
    let fresh = model
        .generate(GenerateOptions::new(30), &mut rng)
        .expect("generate");
    assert_close(&after_cancel.to_data(), &fresh.to_data(), 0.0);
}

#[test]
fn zero_steps_is_rejected() {
    let model = small_model(&small_config(), 9);
    let err = model
        .generate(GenerateOptions::new(0), &mut PanickingRng)
        .unwrap_err();
    assert!(matches!(err, WaveNetError::Configuration(_)));
}

#[test]
fn conditioning_without_projection_is_rejected() {
    let config = small_config();
    let model = small_model(&config, 10);
    let device = NdArrayDevice::default();
    let local = Tensor::<TestBackend, 3>::zeros([1, 3, 5], &device);
    let err = model
        .generate(
            GenerateOptions::new(5).with_local_conditioning(local),
            &mut PanickingRng,
        )
        .unwrap_err();
    assert!(matches!(err, WaveNetError::Configuration(_)));
}

#[test]
fn misaligned_local_conditioning_is_rejected() {
    let config = WaveNetConfig {
        cin_channels: Some(3),
        ..small_config()
    };
    let model = small_model(&config, 11);
    let local = Tensor::<TestBackend, 3>::zeros([1, 3, 7], &NdArrayDevice::default());
    let err = model
        .generate(
            GenerateOptions::new(5)
                .with_local_conditioning(local)
                .with_quantize(false),
            &mut PanickingRng,
        )
        .unwrap_err();
    assert!(matches!(err, WaveNetError::Configuration(_)));
}

#[test]
fn disagreeing_batch_sizes_are_a_shape_mismatch() {
    let config = WaveNetConfig {
        gin_channels: Some(2),
        ..small_config()
    };
    let model = small_model(&config, 12);
    let device = NdArrayDevice::default();
    let prefix = Tensor::cat(
        vec![
            one_hot_sequence(&[1, 2, 3], config.labels),
            one_hot_sequence(&[4, 5, 6], config.labels),
        ],
        0,
    );
    let global = tensor2(vec![vec![0.1, 0.2]], &device);
    let err = model
        .generate(
            GenerateOptions::default()
                .with_teacher_inputs(prefix)
                .with_global_conditioning(global)
                .with_quantize(false),
            &mut PanickingRng,
        )
        .unwrap_err();
    assert!(matches!(err, WaveNetError::ShapeMismatch { .. }));
}

#[test]
fn state_is_reallocated_for_a_new_batch_size() {
    let config = small_config();
    let model = small_model(&config, 13);
    let mut state = model.init_state(1);
    let prefix = Tensor::cat(
        vec![
            one_hot_sequence(&[1, 2, 3, 4], config.labels),
            one_hot_sequence(&[5, 6, 7, 8], config.labels),
            one_hot_sequence(&[9, 10, 11, 12], config.labels),
        ],
        0,
    );
    let output = model
        .incremental_forward(
            &mut state,
            GenerateOptions::default()
                .with_teacher_inputs(prefix)
                .with_quantize(false),
            &mut PanickingRng,
            &mut NoProgress,
        )
        .expect("generate");
    assert_eq!(output.dims(), [3, config.labels, 4]);
    assert_eq!(state.batch_size(), 3);
}
