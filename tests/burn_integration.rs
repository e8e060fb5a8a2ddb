//! Burn secondary engine behind a context and handle, on the NdArray device.
#![cfg(feature = "burn")]

mod helpers;

use approx::assert_abs_diff_eq;
use helpers::tolerances::FP16_EPSILON;
use helpers::*;
use hoshi::burn::burn::prelude::*;
use hoshi::burn::{BurnNetwork, NdArray, NetworkHeads, ScoreHeads, SecondaryEngine};
use hoshi::core::ModelSlots;
use hoshi::prelude::*;
use std::sync::Arc;

type B = NdArray;

/// Policy and ownership echo spatial channel 0; pass and value read
/// global 0; the two score heads count up from 0 and 100.
fn echo_network() -> BurnNetwork<B> {
    BurnNetwork::from_forward(|spatial: Tensor<B, 4>, global: Tensor<B, 2>| {
        let [n, _, _, _] = spatial.dims();
        let device = spatial.device();
        let g = global.narrow(1, 0, 1);
        let first = spatial.narrow(1, 0, 1);
        let misc: Vec<f32> = (0..n).flat_map(|_| (0..4).map(|i| i as f32)).collect();
        let more: Vec<f32> = (0..n).flat_map(|_| (0..8).map(|i| 100.0 + i as f32)).collect();
        NetworkHeads {
            policy: first.clone(),
            policy_pass: g.clone(),
            value: Tensor::cat(vec![g.clone(), g.clone(), g], 1),
            ownership: first,
            score_values: ScoreHeads::Split {
                misc: Tensor::<B, 1>::from_floats(misc.as_slice(), &device).reshape([n, 4]),
                more_misc: Tensor::<B, 1>::from_floats(more.as_slice(), &device).reshape([n, 8]),
            },
        }
    })
}

fn context(network: BurnNetwork<B>, fp16: Enabled) -> (ComputeContext, Arc<SecondaryEngine>) {
    let engine = Arc::new(SecondaryEngine::new(network));
    let ctx = ComputeContext::builder()
        .config(ContextConfig {
            extent: BoardExtent::square(9),
            fp16_mode: fp16,
            ..ContextConfig::default()
        })
        .secondary(engine.clone())
        .build()
        .unwrap();
    (ctx, engine)
}

#[test]
fn test_handle_over_ndarray_engine() {
    let (ctx, engine) = context(echo_network().with_version(9), Enabled::False);
    let handle = ComputeHandle::new(&ctx, &descriptor(10), 2, false, 100, 0).unwrap();
    assert_eq!(handle.kind(), EngineKind::Secondary);
    assert_eq!(handle.model_version(), 9);
    assert_eq!(engine.live_slots(), 1);

    let mut buffers = handle.create_buffers().unwrap();
    let requests = [
        indexed_request(&handle, 0.25).with_symmetry(Symmetry::new(7).unwrap()),
        indexed_request(&handle, 0.5),
    ];
    let outputs = run_batch(&handle, &mut buffers, &requests);

    let expected: Vec<f32> = (0..81).map(|i| i as f32).collect();
    for (out, g) in outputs.iter().zip([0.25, 0.5]) {
        assert_eq!(out.cell_policy(), expected.as_slice());
        assert_eq!(out.white_owner_map.as_deref(), Some(expected.as_slice()));
        assert_eq!(out.pass_prob(), g);
        // Split heads merge into slots 0-3 then 100..106.
        assert_eq!(out.white_score_mean, 0.0);
        assert_eq!(out.white_score_mean_sq, 1.0);
        assert_eq!(out.white_lead, 2.0);
        assert_eq!(out.var_time_left, 3.0);
        assert_eq!(out.shortterm_winloss_error, 100.0);
        assert_eq!(out.shortterm_score_error, 101.0);
    }

    drop(handle);
    assert_eq!(engine.live_slots(), 0);
}

#[test]
fn test_reduced_precision_on_cpu() {
    let (ctx, _engine) = context(echo_network(), Enabled::True);
    let handle = ComputeHandle::new(&ctx, &descriptor(10), 1, false, 100, 0).unwrap();
    assert!(handle.use_fp16());

    let mut buffers = handle.create_buffers().unwrap();
    let outputs = run_batch(&handle, &mut buffers, &[indexed_request(&handle, 0.1)]);
    assert_abs_diff_eq!(outputs[0].pass_prob(), 0.1, epsilon = FP16_EPSILON);
    assert_eq!(outputs[0].cell_policy()[80], 80.0);
}
