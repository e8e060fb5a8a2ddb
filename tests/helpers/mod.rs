//! Test helpers and fixtures for Hoshi integration tests
//!
//! Engines here are host closures over the batch buffers, so every test runs
//! without a GPU. Each one writes outputs that are a known function of its
//! inputs, which lets tests check orientation, row isolation and padding.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact copies and identities
//! - `BLEND_EPSILON` (1e-5): Policy optimism blending
//! - `FP16_EPSILON` (1e-3): Values rounded through half precision

pub mod tolerances;

use hoshi::core::{BatchInputs, BatchOutputs, SCORE_VALUE_SLOTS, VALUE_SLOTS};
use hoshi::prelude::*;
use hoshi::EngineError;
use std::sync::Arc;

/// Value written into every padded output cell by [`sentinel_engine`].
pub const PADDING_SENTINEL: f32 = -777.0;

/// Standard handle capacity for tests.
pub const TEST_BATCH_SIZE: usize = 4;

/// Echo forward pass.
///
/// - policy channel c and ownership copy spatial channel 0
/// - pass for channel c is `global[0] + c`
/// - value is `[g, 1 - g, row]` where `g = global[0]`
/// - score slot i is `g * 10 + i`
pub fn echo_forward(
    inputs: &BatchInputs<'_>,
    outputs: &mut BatchOutputs<'_>,
    batch_size: usize,
) -> Result<(), EngineError> {
    let cells = inputs.model_extent.cells();
    let spatial_row = inputs.spatial_channels * cells;
    let pc = outputs.policy_channels;
    let oc = outputs.ownership_channels;
    for n in 0..batch_size {
        let first = &inputs.spatial[n * spatial_row..n * spatial_row + cells];
        let g = inputs.global[n * inputs.global_channels];
        for c in 0..pc {
            let start = (n * pc + c) * cells;
            outputs.policy[start..start + cells].copy_from_slice(first);
            outputs.policy_pass[n * pc + c] = g + c as f32;
        }
        let own = n * oc * cells;
        outputs.ownership[own..own + cells].copy_from_slice(first);
        outputs.value[n * VALUE_SLOTS..(n + 1) * VALUE_SLOTS].copy_from_slice(&[g, 1.0 - g, n as f32]);
        let scores = &mut outputs.score_values[n * SCORE_VALUE_SLOTS..(n + 1) * SCORE_VALUE_SLOTS];
        for (i, v) in scores.iter_mut().enumerate() {
            *v = g * 10.0 + i as f32;
        }
    }
    Ok(())
}

/// Echo engine that also fills every cell outside `live` with
/// [`PADDING_SENTINEL`] and fails if any padded input cell is nonzero.
pub fn sentinel_engine(kind: EngineKind, live: BoardExtent) -> HostEngine {
    HostEngine::from_fn(kind, move |inputs, outputs, batch_size| {
        let model = inputs.model_extent;
        let cells = model.cells();
        let padded = |i: usize| {
            let (y, x) = ((i % cells) / model.x_len, i % model.x_len);
            y >= live.y_len || x >= live.x_len
        };
        let used = batch_size * inputs.spatial_channels * cells;
        if inputs.spatial[..used]
            .iter()
            .enumerate()
            .any(|(i, &v)| padded(i) && v != 0.0)
        {
            return Err(EngineError::ExecuteFailed("padding carries input".into()));
        }
        echo_forward(inputs, outputs, batch_size)?;
        for (i, v) in outputs.policy.iter_mut().enumerate() {
            if padded(i) {
                *v = PADDING_SENTINEL;
            }
        }
        for (i, v) in outputs.ownership.iter_mut().enumerate() {
            if padded(i) {
                *v = PADDING_SENTINEL;
            }
        }
        Ok(())
    })
}

pub fn echo_engine(kind: EngineKind) -> HostEngine {
    HostEngine::from_fn(kind, echo_forward)
}

/// Context at `extent` with an echo engine of each kind.
pub fn echo_context(extent: BoardExtent) -> ComputeContext {
    ComputeContext::builder()
        .extent(extent)
        .accelerated(Arc::new(echo_engine(EngineKind::Accelerated)))
        .secondary(Arc::new(echo_engine(EngineKind::Secondary)))
        .build()
        .expect("Failed to create test context")
}

pub fn descriptor(version: i32) -> ModelDescriptor {
    ModelDescriptor::for_version("test-net", version).expect("Unsupported test version")
}

/// Request whose spatial channel 0 holds `fill(y, x)`, in the handle's
/// input layout, with `global[0] = global0`.
pub fn request_with(
    handle: &ComputeHandle,
    global0: f32,
    fill: impl Fn(usize, usize) -> f32,
) -> EvalRequest {
    let desc = handle.descriptor();
    let extent = handle.nn_extent();
    let channels = desc.num_input_channels;
    let mut spatial = vec![0.0; channels * extent.cells()];
    for y in 0..extent.y_len {
        for x in 0..extent.x_len {
            let cell = y * extent.x_len + x;
            let idx = if handle.inputs_use_nhwc() {
                cell * channels
            } else {
                cell
            };
            spatial[idx] = fill(y, x);
        }
    }
    let mut global = vec![0.0; desc.num_input_global_channels];
    global[0] = global0;
    EvalRequest::new(spatial, global, extent).with_owner_map(true)
}

/// Request whose spatial channel 0 holds the cell index.
pub fn indexed_request(handle: &ComputeHandle, global0: f32) -> EvalRequest {
    let x_len = handle.nn_extent().x_len;
    request_with(handle, global0, |y, x| (y * x_len + x) as f32)
}

/// Runs `requests` as one batch and returns the decoded outputs.
pub fn run_batch(
    handle: &ComputeHandle,
    buffers: &mut InputBuffers,
    requests: &[EvalRequest],
) -> Vec<EvalOutput> {
    let mut outputs: Vec<EvalOutput> = requests.iter().map(EvalOutput::for_request).collect();
    handle
        .execute(buffers, requests, &mut outputs)
        .expect("Batch failed");
    outputs
}
