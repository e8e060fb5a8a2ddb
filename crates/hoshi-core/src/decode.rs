//! Turns raw backend rows into [`EvalOutput`] fields.
//!
//! Per-cell heads are read from the live window of the canonical padded
//! planes and mapped back into request orientation with the row's symmetry.
//! Scalars (value, pass, score statistics) are orientation-invariant.

use crate::buffers::InputBuffers;
use crate::request::{EvalOutput, EvalRequest};
use crate::symmetry::{copy_from_canonical, Symmetry, TensorLayout};
use crate::version::SCORE_VALUE_SLOTS;

/// Linear blend between the base and optimistic policy.
///
/// `optimism == 0` returns `p` and `optimism == 1` returns `p_opt`, both exactly.
#[inline]
pub fn policy_optimism_blend(p: f32, p_opt: f32, optimism: f64) -> f32 {
    (p as f64 * (1.0 - optimism) + p_opt as f64 * optimism) as f32
}

/// Score statistics after applying the version table.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreValues {
    pub score_mean: f32,
    pub score_mean_sq: f32,
    pub lead: f32,
    pub var_time_left: f32,
    pub shortterm_winloss_error: f32,
    pub shortterm_score_error: f32,
}

impl ScoreValues {
    /// Maps raw score slots to semantic fields for a model of `version`.
    ///
    /// | version | mean  | mean_sq | lead  | var_time_left | st_winloss | st_score |
    /// |---------|-------|---------|-------|---------------|------------|----------|
    /// | < 4     | raw 0 | mean^2  | mean  | 0             | 0          | 0        |
    /// | 4..=7   | raw 0 | raw 1   | mean  | 0             | 0          | 0        |
    /// | 8       | raw 0 | raw 1   | raw 2 | 0             | 0          | 0        |
    /// | >= 9    | raw 0 | raw 1   | raw 2 | raw 3         | raw 4      | raw 5    |
    pub fn from_raw(raw: &[f32], version: i32) -> Self {
        assert!(
            raw.len() >= 6,
            "score block needs at least 6 slots, got {}",
            raw.len()
        );
        let mean = raw[0];
        let mut values = Self {
            score_mean: mean,
            // Pre-v4 models have no second-moment head.
            score_mean_sq: mean * mean,
            lead: mean,
            var_time_left: 0.0,
            shortterm_winloss_error: 0.0,
            shortterm_score_error: 0.0,
        };
        if version >= 4 {
            values.score_mean_sq = raw[1];
        }
        if version >= 8 {
            values.lead = raw[2];
        }
        if version >= 9 {
            values.var_time_left = raw[3];
            values.shortterm_winloss_error = raw[4];
            values.shortterm_score_error = raw[5];
        }
        values
    }

    pub fn apply_to(&self, output: &mut EvalOutput) {
        output.white_score_mean = self.score_mean;
        output.white_score_mean_sq = self.score_mean_sq;
        output.white_lead = self.lead;
        output.var_time_left = self.var_time_left;
        output.shortterm_winloss_error = self.shortterm_winloss_error;
        output.shortterm_score_error = self.shortterm_score_error;
    }
}

/// Decodes every field of one row.
pub fn decode_row(
    buffers: &mut InputBuffers,
    row: usize,
    request: &EvalRequest,
    output: &mut EvalOutput,
    version: i32,
) {
    let extent = buffers.nn_extent();
    assert_eq!(
        output.extent(),
        extent,
        "output extent {} does not match buffer extent {}",
        output.extent(),
        extent
    );
    assert_eq!(
        output.policy_probs.len(),
        extent.cells() + 1,
        "policy array must hold every cell plus the pass slot"
    );

    decode_policy(buffers, row, request, output);
    decode_value(buffers, row, output);
    decode_ownership(buffers, row, request.symmetry, output);
    decode_score_values(buffers, row, version, output);
}

/// Writes the per-cell policy (request orientation) and the pass slot.
pub fn decode_policy(
    buffers: &mut InputBuffers,
    row: usize,
    request: &EvalRequest,
    output: &mut EvalOutput,
) {
    let sizes = *buffers.sizes();
    let extent = sizes.nn_extent;
    let cells = sizes.single_nn_policy;
    let padded = sizes.output_layout();
    let dense = TensorLayout::nchw(extent);
    let channels = sizes.policy_channels;

    let policy_start = row * sizes.single_model_policy * channels;
    let policy = &buffers.policy_results[policy_start..policy_start + sizes.single_model_policy * channels];
    let pass = &buffers.policy_pass_results[row * channels..(row + 1) * channels];

    let (cell_out, pass_out) = output.policy_probs.split_at_mut(cells);

    if channels == 1 {
        pass_out[0] = pass[0];
        copy_from_canonical(policy, &padded, cell_out, &dense, 1, request.symmetry);
        return;
    }

    let optimism = request.policy_optimism;
    let (base, optimistic) = policy.split_at(sizes.single_model_policy);
    let scratch = &mut buffers.policy_probs[row * cells..(row + 1) * cells];
    for y in 0..extent.y_len {
        for x in 0..extent.x_len {
            let src = padded.index(0, y, x);
            scratch[dense.index(0, y, x)] =
                policy_optimism_blend(base[src], optimistic[src], optimism);
        }
    }
    pass_out[0] = policy_optimism_blend(pass[0], pass[1], optimism);
    copy_from_canonical(scratch, &dense, cell_out, &dense, 1, request.symmetry);
}

pub fn decode_value(buffers: &InputBuffers, row: usize, output: &mut EvalOutput) {
    let value = buffers.value_row(row);
    output.white_win_prob = value[0];
    output.white_loss_prob = value[1];
    output.white_no_result_prob = value[2];
}

/// Writes ownership only when the caller allocated an owner map.
pub fn decode_ownership(
    buffers: &InputBuffers,
    row: usize,
    symmetry: Symmetry,
    output: &mut EvalOutput,
) {
    let Some(owner_map) = output.white_owner_map.as_mut() else {
        return;
    };
    let sizes = buffers.sizes();
    let dense = TensorLayout::nchw(sizes.nn_extent);
    copy_from_canonical(
        buffers.ownership_row(row),
        &sizes.output_layout(),
        owner_map,
        &dense,
        1,
        symmetry,
    );
}

pub fn decode_score_values(
    buffers: &InputBuffers,
    row: usize,
    version: i32,
    output: &mut EvalOutput,
) {
    let raw = buffers.score_value_row(row);
    debug_assert_eq!(raw.len(), SCORE_VALUE_SLOTS);
    ScoreValues::from_raw(raw, version).apply_to(output);
}
