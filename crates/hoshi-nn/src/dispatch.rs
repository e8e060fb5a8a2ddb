//! Batch dispatch: pack rows, run the engine once, decode rows.

use crate::error::Result;
use crate::handle::ComputeHandle;
use hoshi_core::{copy_to_canonical, decode_row, EvalOutput, EvalRequest, InputBuffers, TensorLayout};

impl ComputeHandle {
    /// Evaluates `requests` as one batch, filling `outputs` row for row.
    ///
    /// # Panics
    ///
    /// On contract violations: an empty or over-capacity batch, mismatched
    /// request and output counts, an output or request extent other than
    /// [`nn_extent`](Self::nn_extent), request tensors not sized for the
    /// model, or a pool built for another model or extent.
    pub fn execute(
        &self,
        buffers: &mut InputBuffers,
        requests: &[EvalRequest],
        outputs: &mut [EvalOutput],
    ) -> Result<()> {
        let batch_size = requests.len();
        assert!(
            batch_size >= 1 && batch_size <= self.max_batch_size(),
            "batch size {} outside 1..={}",
            batch_size,
            self.max_batch_size()
        );
        assert!(
            batch_size <= buffers.max_batch_size(),
            "batch size {} exceeds pool capacity {}",
            batch_size,
            buffers.max_batch_size()
        );
        assert_eq!(outputs.len(), batch_size, "one output per request");
        self.check_pool(buffers);

        let extent = self.nn_extent();
        let sizes = *buffers.sizes();
        let channels = sizes.spatial_channels;
        let src_layout = TensorLayout::dense(extent, channels, self.inputs_use_nhwc());
        let dst_layout = sizes.input_layout();

        for (row, (request, output)) in requests.iter().zip(outputs.iter()).enumerate() {
            assert_eq!(
                output.extent(),
                extent,
                "output {} has extent {}, handle is {}",
                row,
                output.extent(),
                extent
            );
            assert_eq!(
                request.extent, extent,
                "request {} has extent {}, handle is {}",
                row, request.extent, extent
            );
            assert_eq!(
                request.spatial.len(),
                sizes.single_spatial,
                "request {} spatial input has wrong length",
                row
            );
            assert_eq!(
                request.global.len(),
                sizes.single_input_global,
                "request {} global input has wrong length",
                row
            );

            buffers.global_row_mut(row).copy_from_slice(&request.global);
            copy_to_canonical(
                &request.spatial,
                &src_layout,
                buffers.spatial_row_mut(row),
                &dst_layout,
                channels,
                request.symmetry,
            );
        }

        {
            let (inputs, mut batch_outputs) = buffers.batch_io(batch_size);
            self.engine()
                .execute_batch(self.model(), &inputs, &mut batch_outputs, batch_size)?;
        }
        tracing::trace!("{} executed batch of {}", self.kind(), batch_size);

        let version = self.model_version();
        for (row, (request, output)) in requests.iter().zip(outputs.iter_mut()).enumerate() {
            decode_row(buffers, row, request, output, version);
        }
        Ok(())
    }

    fn check_pool(&self, buffers: &InputBuffers) {
        let desc = self.descriptor();
        let sizes = buffers.sizes();
        assert_eq!(
            buffers.nn_extent(),
            self.nn_extent(),
            "pool extent does not match handle"
        );
        assert_eq!(
            buffers.model_extent(),
            self.model().config.model_extent,
            "pool backend extent does not match handle"
        );
        assert!(
            buffers.model_name() == desc.name
                && sizes.spatial_channels == desc.num_input_channels
                && sizes.single_input_global == desc.num_input_global_channels
                && sizes.policy_channels == desc.num_policy_channels
                && sizes.ownership_channels == desc.num_ownership_channels,
            "pool was built for another model"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::{ComputeContext, ComputeHandle};
    use approx::assert_abs_diff_eq;
    use hoshi_core::{
        BatchInputs, BatchOutputs, BoardExtent, ContextConfig, EngineError, EngineKind, EvalOutput,
        EvalRequest, HostEngine, ModelDescriptor, Symmetry,
    };
    use std::sync::Arc;

    /// Echoes spatial channel 0 into policy and ownership, and the first
    /// global feature into every scalar head.
    fn echo(
        inputs: &BatchInputs<'_>,
        outputs: &mut BatchOutputs<'_>,
        batch_size: usize,
    ) -> Result<(), EngineError> {
        let cells = inputs.model_extent.cells();
        let plane = inputs.spatial_channels * cells;
        let pc = outputs.policy_channels;
        for n in 0..batch_size {
            let first = &inputs.spatial[n * plane..n * plane + cells];
            let g = inputs.global[n * inputs.global_channels];
            for c in 0..pc {
                let start = (n * pc + c) * cells;
                outputs.policy[start..start + cells].copy_from_slice(first);
                outputs.policy_pass[n * pc + c] = g + c as f32;
            }
            outputs.ownership[n * cells..(n + 1) * cells].copy_from_slice(first);
            outputs.value[n * 3..(n + 1) * 3].copy_from_slice(&[g, 1.0 - g, 0.0]);
            for (i, v) in outputs.score_values[n * 10..(n + 1) * 10].iter_mut().enumerate() {
                *v = g * 10.0 + i as f32;
            }
        }
        Ok(())
    }

    fn handle(version: i32, extent: BoardExtent, nhwc: bool) -> ComputeHandle {
        let engine = Arc::new(HostEngine::from_fn(EngineKind::Accelerated, echo));
        let ctx = ComputeContext::builder()
            .config(ContextConfig {
                extent,
                ..ContextConfig::default()
            })
            .accelerated(engine)
            .build()
            .unwrap();
        let desc = ModelDescriptor::for_version("echo", version).unwrap();
        ComputeHandle::new(&ctx, &desc, 4, nhwc, 0, 0).unwrap()
    }

    fn request(handle: &ComputeHandle, global0: f32) -> EvalRequest {
        let desc = handle.descriptor();
        let extent = handle.nn_extent();
        let cells = extent.cells();
        let mut spatial = vec![0.0; desc.num_input_channels * cells];
        // Channel 0 holds the cell index, in the handle's input layout.
        for i in 0..cells {
            let idx = if handle.inputs_use_nhwc() {
                i * desc.num_input_channels
            } else {
                i
            };
            spatial[idx] = i as f32;
        }
        let mut global = vec![0.0; desc.num_input_global_channels];
        global[0] = global0;
        EvalRequest::new(spatial, global, extent).with_owner_map(true)
    }

    #[test]
    fn test_symmetry_round_trips_through_engine() {
        let h = handle(10, BoardExtent::square(5), false);
        let mut buffers = h.create_buffers().unwrap();
        for sym in Symmetry::all() {
            let req = request(&h, 0.25).with_symmetry(sym);
            let mut out = vec![EvalOutput::for_request(&req)];
            h.execute(&mut buffers, std::slice::from_ref(&req), &mut out).unwrap();
            let expected: Vec<f32> = (0..25).map(|i| i as f32).collect();
            assert_eq!(out[0].cell_policy(), expected.as_slice(), "symmetry {}", sym.code());
            assert_eq!(out[0].white_owner_map.as_deref(), Some(expected.as_slice()));
            assert_eq!(out[0].pass_prob(), 0.25);
        }
    }

    #[test]
    fn test_nhwc_inputs_on_rectangle() {
        let h = handle(10, BoardExtent::new(7, 4), true);
        let mut buffers = h.create_buffers().unwrap();
        let req = request(&h, 0.5).with_symmetry(Symmetry::new(7).unwrap());
        let mut out = vec![EvalOutput::for_request(&req)];
        h.execute(&mut buffers, std::slice::from_ref(&req), &mut out).unwrap();
        let expected: Vec<f32> = (0..28).map(|i| i as f32).collect();
        assert_eq!(out[0].cell_policy(), expected.as_slice());
    }

    #[test]
    fn test_scalars_and_version_table() {
        let h = handle(8, BoardExtent::square(9), false);
        let mut buffers = h.create_buffers().unwrap();
        let reqs = vec![request(&h, 0.1), request(&h, 0.2)];
        let mut outs: Vec<EvalOutput> = reqs.iter().map(EvalOutput::for_request).collect();
        h.execute(&mut buffers, &reqs, &mut outs).unwrap();

        assert_abs_diff_eq!(outs[1].white_win_prob, 0.2);
        assert_abs_diff_eq!(outs[1].white_loss_prob, 0.8);
        assert_abs_diff_eq!(outs[0].white_score_mean, 1.0);
        assert_abs_diff_eq!(outs[0].white_score_mean_sq, 2.0);
        assert_abs_diff_eq!(outs[0].white_lead, 3.0);
        assert_eq!(outs[0].var_time_left, 0.0);
        assert_eq!(outs[0].shortterm_score_error, 0.0);
    }

    #[test]
    fn test_optimistic_blend_through_engine() {
        let h = handle(14, BoardExtent::square(9), false);
        let mut buffers = h.create_buffers().unwrap();
        let req = request(&h, 0.2).with_policy_optimism(1.0);
        let mut out = vec![EvalOutput::for_request(&req)];
        h.execute(&mut buffers, std::slice::from_ref(&req), &mut out).unwrap();
        // Optimistic pass logit is channel 1: g + 1.
        assert_abs_diff_eq!(out[0].pass_prob(), 1.2);
    }

    #[test]
    fn test_engine_failure_propagates() {
        let engine = Arc::new(HostEngine::from_fn(EngineKind::Accelerated, |_, _, _| {
            Err(EngineError::ExecuteFailed("out of memory".into()))
        }));
        let ctx = ComputeContext::builder()
            .extent(BoardExtent::square(9))
            .accelerated(engine)
            .build()
            .unwrap();
        let desc = ModelDescriptor::for_version("m", 10).unwrap();
        let h = ComputeHandle::new(&ctx, &desc, 2, false, 0, 0).unwrap();
        let mut buffers = h.create_buffers().unwrap();
        let req = request(&h, 0.0);
        let mut out = vec![EvalOutput::for_request(&req)];
        assert!(h.execute(&mut buffers, std::slice::from_ref(&req), &mut out).is_err());
    }

    #[test]
    #[should_panic(expected = "has extent")]
    fn test_extent_mismatch_panics() {
        let h = handle(10, BoardExtent::square(9), false);
        let mut buffers = h.create_buffers().unwrap();
        let req = request(&h, 0.0);
        let mut out = vec![EvalOutput::new(BoardExtent::square(13), false)];
        let _ = h.execute(&mut buffers, std::slice::from_ref(&req), &mut out);
    }

    #[test]
    #[should_panic(expected = "batch size")]
    fn test_over_capacity_panics() {
        let h = handle(10, BoardExtent::square(9), false);
        let mut buffers = h.create_buffers().unwrap();
        let reqs: Vec<EvalRequest> = (0..5).map(|_| request(&h, 0.0)).collect();
        let mut outs: Vec<EvalOutput> = reqs.iter().map(EvalOutput::for_request).collect();
        let _ = h.execute(&mut buffers, &reqs, &mut outs);
    }
}
