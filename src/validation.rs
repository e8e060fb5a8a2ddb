//! Single-position validation harness.
//!
//! Reads one position as JSON, evaluates it through a handle with no
//! symmetry, no optimism and ownership on, and reports the decoded heads in
//! board shape so they can be diffed against a reference implementation.
//!
//! ```json
//! {
//!   "boardXSize": 9,
//!   "boardYSize": 9,
//!   "spatial_input": [[[0.0, ...], ...], ...],
//!   "global_input": [0.0, ...]
//! }
//! ```

use crate::{Error, Result};
use hoshi_core::{
    copy_to_canonical, BoardExtent, EvalOutput, EvalRequest, InputBuffers, ModelDescriptor,
    Symmetry, TensorLayout, COMPILE_MAX_BOARD_LEN, MIN_BOARD_LEN,
};
use hoshi_nn::ComputeHandle;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One position: spatial features `[C][H][W]` and global features `[G]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationInput {
    #[serde(rename = "boardXSize")]
    pub board_x_size: usize,
    #[serde(rename = "boardYSize")]
    pub board_y_size: usize,
    pub spatial_input: Vec<Vec<Vec<f32>>>,
    pub global_input: Vec<f32>,
}

/// Decoded heads for one position, in board shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutput {
    /// `[H][W]`
    pub policy: Vec<Vec<f32>>,
    pub pass_policy: Vec<f32>,
    /// Win, loss, no result.
    pub value: Vec<f32>,
    /// `[H][W]`
    pub ownership: Vec<Vec<f32>>,
    /// Mean, mean square, lead, time-left variance, short-term win/loss
    /// error, short-term score error.
    pub score_value: Vec<f32>,
    pub model_version: i32,
    pub num_spatial_features: usize,
    pub num_global_features: usize,
    pub num_policy_channels: usize,
}

impl ValidationInput {
    /// Parses and checks the board size. Channel counts are checked against
    /// the model in [`to_request`](Self::to_request).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let input: Self = serde_json::from_str(json)?;
        input.check_board()?;
        Ok(input)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn extent(&self) -> BoardExtent {
        BoardExtent::new(self.board_x_size, self.board_y_size)
    }

    fn check_board(&self) -> Result<()> {
        let (x, y) = (self.board_x_size, self.board_y_size);
        let range = MIN_BOARD_LEN..=COMPILE_MAX_BOARD_LEN;
        if !range.contains(&x) || !range.contains(&y) {
            return Err(Error::Validation(format!(
                "board size must be between {} and {}, got {}x{}",
                MIN_BOARD_LEN, COMPILE_MAX_BOARD_LEN, x, y
            )));
        }
        if x != y {
            return Err(Error::Validation(format!(
                "board must be square, got {}x{}",
                x, y
            )));
        }
        Ok(())
    }

    /// Converts the NCHW features into a request laid out for the handle
    /// (`inputs_use_nhwc` selects channel-last).
    pub fn to_request(&self, desc: &ModelDescriptor, inputs_use_nhwc: bool) -> Result<EvalRequest> {
        self.check_board()?;
        let extent = self.extent();
        let channels = desc.num_input_channels;

        if self.spatial_input.len() != channels {
            return Err(Error::Validation(format!(
                "spatial_input has {} channels but model expects {}",
                self.spatial_input.len(),
                channels
            )));
        }
        if self.global_input.len() != desc.num_input_global_channels {
            return Err(Error::Validation(format!(
                "global_input has {} channels but model expects {}",
                self.global_input.len(),
                desc.num_input_global_channels
            )));
        }

        let mut nchw = Vec::with_capacity(channels * extent.cells());
        for (c, plane) in self.spatial_input.iter().enumerate() {
            if plane.len() != extent.y_len {
                return Err(Error::Validation(format!(
                    "spatial_input channel {} has {} rows, expected {}",
                    c,
                    plane.len(),
                    extent.y_len
                )));
            }
            for (y, row) in plane.iter().enumerate() {
                if row.len() != extent.x_len {
                    return Err(Error::Validation(format!(
                        "spatial_input channel {} row {} has {} elements, expected {}",
                        c,
                        y,
                        row.len(),
                        extent.x_len
                    )));
                }
                nchw.extend_from_slice(row);
            }
        }

        let spatial = if inputs_use_nhwc {
            let mut nhwc = vec![0.0; nchw.len()];
            copy_to_canonical(
                &nchw,
                &TensorLayout::nchw(extent),
                &mut nhwc,
                &TensorLayout::nhwc(extent, channels),
                channels,
                Symmetry::IDENTITY,
            );
            nhwc
        } else {
            nchw
        };

        Ok(EvalRequest::new(spatial, self.global_input.clone(), extent).with_owner_map(true))
    }
}

impl ValidationOutput {
    fn from_eval(output: &EvalOutput, handle: &ComputeHandle) -> Self {
        let extent = output.extent();
        let desc = handle.descriptor();
        Self {
            policy: to_board(output.cell_policy(), extent),
            pass_policy: vec![output.pass_prob()],
            value: vec![
                output.white_win_prob,
                output.white_loss_prob,
                output.white_no_result_prob,
            ],
            ownership: output
                .white_owner_map
                .as_deref()
                .map(|map| to_board(map, extent))
                .unwrap_or_default(),
            score_value: vec![
                output.white_score_mean,
                output.white_score_mean_sq,
                output.white_lead,
                output.var_time_left,
                output.shortterm_winloss_error,
                output.shortterm_score_error,
            ],
            model_version: handle.model_version(),
            num_spatial_features: desc.num_input_channels,
            num_global_features: desc.num_input_global_channels,
            num_policy_channels: desc.num_policy_channels,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn to_board(cells: &[f32], extent: BoardExtent) -> Vec<Vec<f32>> {
    cells.chunks(extent.x_len).map(<[f32]>::to_vec).collect()
}

/// Evaluates `input` as a batch of one through `handle`.
///
/// The board must match the handle's extent.
pub fn run_validation(
    handle: &ComputeHandle,
    buffers: &mut InputBuffers,
    input: &ValidationInput,
) -> Result<ValidationOutput> {
    if input.extent() != handle.nn_extent() {
        return Err(Error::Validation(format!(
            "input board is {}, handle evaluates {}",
            input.extent(),
            handle.nn_extent()
        )));
    }
    let request = input.to_request(handle.descriptor(), handle.inputs_use_nhwc())?;
    let mut outputs = [EvalOutput::for_request(&request)];
    handle.execute(buffers, std::slice::from_ref(&request), &mut outputs)?;

    tracing::debug!(
        "Validated {} position on {} model v{}",
        input.extent(),
        handle.kind(),
        handle.model_version()
    );
    Ok(ValidationOutput::from_eval(&outputs[0], handle))
}
