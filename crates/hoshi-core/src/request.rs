//! Per-request input and output records.

use crate::config::BoardExtent;
use crate::symmetry::Symmetry;
use serde::{Deserialize, Serialize};

/// One board evaluation submitted to a batch.
///
/// Spatial features are dense at `extent`, in the layout the handle was
/// created for (channel-last when `inputs_use_nhwc`).
#[derive(Debug, Clone, PartialEq)]
pub struct EvalRequest {
    pub spatial: Vec<f32>,
    pub global: Vec<f32>,
    pub symmetry: Symmetry,
    /// Blend weight toward the optimistic policy, in `[0, 1]`.
    pub policy_optimism: f64,
    pub include_owner_map: bool,
    /// Board extent the caller's position lives on.
    pub extent: BoardExtent,
}

impl EvalRequest {
    pub fn new(spatial: Vec<f32>, global: Vec<f32>, extent: BoardExtent) -> Self {
        Self {
            spatial,
            global,
            symmetry: Symmetry::IDENTITY,
            policy_optimism: 0.0,
            include_owner_map: false,
            extent,
        }
    }

    pub fn with_symmetry(mut self, symmetry: Symmetry) -> Self {
        self.symmetry = symmetry;
        self
    }

    pub fn with_policy_optimism(mut self, optimism: f64) -> Self {
        self.policy_optimism = optimism;
        self
    }

    pub fn with_owner_map(mut self, include: bool) -> Self {
        self.include_owner_map = include;
        self
    }
}

/// Decoded evaluation for one request, filled in place by the decoder.
///
/// All values are from white's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalOutput {
    pub nn_x_len: usize,
    pub nn_y_len: usize,
    /// Per-cell policy in request orientation, followed by the pass slot.
    pub policy_probs: Vec<f32>,
    pub white_win_prob: f32,
    pub white_loss_prob: f32,
    pub white_no_result_prob: f32,
    /// Per-cell ownership; `None` opts out of ownership decoding.
    pub white_owner_map: Option<Vec<f32>>,
    pub white_score_mean: f32,
    pub white_score_mean_sq: f32,
    pub white_lead: f32,
    pub var_time_left: f32,
    pub shortterm_winloss_error: f32,
    pub shortterm_score_error: f32,
}

impl EvalOutput {
    /// Zeroed output for `extent`, with an ownership map only if requested.
    pub fn new(extent: BoardExtent, with_owner_map: bool) -> Self {
        let cells = extent.cells();
        Self {
            nn_x_len: extent.x_len,
            nn_y_len: extent.y_len,
            policy_probs: vec![0.0; cells + 1],
            white_win_prob: 0.0,
            white_loss_prob: 0.0,
            white_no_result_prob: 0.0,
            white_owner_map: with_owner_map.then(|| vec![0.0; cells]),
            white_score_mean: 0.0,
            white_score_mean_sq: 0.0,
            white_lead: 0.0,
            var_time_left: 0.0,
            shortterm_winloss_error: 0.0,
            shortterm_score_error: 0.0,
        }
    }

    /// Output sized for `request`.
    pub fn for_request(request: &EvalRequest) -> Self {
        Self::new(request.extent, request.include_owner_map)
    }

    pub fn extent(&self) -> BoardExtent {
        BoardExtent::new(self.nn_x_len, self.nn_y_len)
    }

    pub fn pass_prob(&self) -> f32 {
        self.policy_probs[self.policy_probs.len() - 1]
    }

    /// Per-cell policy without the pass slot.
    pub fn cell_policy(&self) -> &[f32] {
        &self.policy_probs[..self.policy_probs.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_allocation() {
        let out = EvalOutput::new(BoardExtent::new(9, 7), true);
        assert_eq!(out.policy_probs.len(), 64);
        assert_eq!(out.cell_policy().len(), 63);
        assert_eq!(out.white_owner_map.as_ref().unwrap().len(), 63);
        assert!(EvalOutput::new(BoardExtent::square(9), false)
            .white_owner_map
            .is_none());
    }

    #[test]
    fn test_request_builder() {
        let req = EvalRequest::new(vec![0.0; 4], vec![0.0; 2], BoardExtent::square(2))
            .with_symmetry(Symmetry::new(3).unwrap())
            .with_policy_optimism(0.5)
            .with_owner_map(true);
        assert_eq!(req.symmetry.code(), 3);
        assert_eq!(req.policy_optimism, 0.5);
        let out = EvalOutput::for_request(&req);
        assert!(out.white_owner_map.is_some());
        assert_eq!(out.extent(), BoardExtent::square(2));
    }
}
