//! Batch scratch memory shared by every request in one `execute` call.
//!
//! Backend-facing tensors are allocated at [`COMPILE_MAX_BOARD_LEN`] because
//! engines are built for one fixed shape. The board actually evaluated (the
//! *live window*) sits in the top-left corner of each plane; everything else
//! is padding that is zeroed once at construction and never written again.
//!
//! [`COMPILE_MAX_BOARD_LEN`]: crate::config::COMPILE_MAX_BOARD_LEN

use crate::config::BoardExtent;
use crate::descriptor::ModelDescriptor;
use crate::symmetry::TensorLayout;
use crate::version::{SCORE_VALUE_SLOTS, VALUE_SLOTS};
use crate::Result;

/// Per-row element counts, computed once from the descriptor and both extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    /// Extent callers evaluate at.
    pub nn_extent: BoardExtent,
    /// Extent backend tensors are shaped for.
    pub model_extent: BoardExtent,
    pub spatial_channels: usize,
    pub policy_channels: usize,
    pub ownership_channels: usize,

    /// Caller-side spatial tensor (live window only).
    pub single_spatial: usize,
    /// Backend-side spatial tensor (full planes).
    pub single_input: usize,
    pub single_input_global: usize,
    /// Caller-visible policy cells.
    pub single_nn_policy: usize,
    /// Backend policy cells per channel.
    pub single_model_policy: usize,
    /// Caller-visible policy including the pass slot.
    pub single_policy_probs: usize,
    pub single_value: usize,
    pub single_nn_ownership: usize,
    pub single_model_ownership: usize,
    pub single_score_values: usize,
}

impl BufferSizes {
    pub fn new(desc: &ModelDescriptor, nn_extent: BoardExtent, model_extent: BoardExtent) -> Self {
        assert!(
            nn_extent.fits_within(&model_extent),
            "board extent {} exceeds compiled extent {}",
            nn_extent,
            model_extent
        );
        let nn_cells = nn_extent.cells();
        let model_cells = model_extent.cells();
        Self {
            nn_extent,
            model_extent,
            spatial_channels: desc.num_input_channels,
            policy_channels: desc.num_policy_channels,
            ownership_channels: desc.num_ownership_channels,
            single_spatial: desc.num_input_channels * nn_cells,
            single_input: desc.num_input_channels * model_cells,
            single_input_global: desc.num_input_global_channels,
            single_nn_policy: nn_cells,
            single_model_policy: model_cells,
            single_policy_probs: nn_cells + 1,
            single_value: desc.num_value_channels,
            single_nn_ownership: desc.num_ownership_channels * nn_cells,
            single_model_ownership: desc.num_ownership_channels * model_cells,
            single_score_values: SCORE_VALUE_SLOTS,
        }
    }

    /// Canonical layout of one row of the backend spatial tensor.
    pub fn input_layout(&self) -> TensorLayout {
        TensorLayout::padded_nchw(self.nn_extent, self.model_extent)
    }

    /// Canonical layout of one row of a backend per-cell output (policy,
    /// ownership), channels stacked.
    pub fn output_layout(&self) -> TensorLayout {
        TensorLayout::padded_nchw(self.nn_extent, self.model_extent)
    }
}

/// Batch buffer pool owned by one worker alongside its compute handle.
///
/// Sized once for `max_batch_size` rows and never resized; a different batch
/// capacity or board extent needs a new pool.
pub struct InputBuffers {
    max_batch_size: usize,
    sizes: BufferSizes,
    model_name: String,

    pub(crate) spatial_input: Vec<f32>,
    pub(crate) global_input: Vec<f32>,
    pub(crate) policy_results: Vec<f32>,
    pub(crate) policy_pass_results: Vec<f32>,
    pub(crate) value_results: Vec<f32>,
    pub(crate) ownership_results: Vec<f32>,
    pub(crate) score_value_results: Vec<f32>,
    /// Blended policy scratch, one live window per row.
    pub(crate) policy_probs: Vec<f32>,
}

impl InputBuffers {
    /// Allocates a pool shaped for the compile-time maximum board.
    pub fn new(desc: &ModelDescriptor, max_batch_size: usize, nn_extent: BoardExtent) -> Result<Self> {
        Self::with_model_extent(desc, max_batch_size, nn_extent, BoardExtent::compile_max())
    }

    /// Allocates a pool for an explicit backend extent.
    pub fn with_model_extent(
        desc: &ModelDescriptor,
        max_batch_size: usize,
        nn_extent: BoardExtent,
        model_extent: BoardExtent,
    ) -> Result<Self> {
        desc.validate()?;
        nn_extent.validate()?;
        if max_batch_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if !nn_extent.fits_within(&model_extent) {
            return Err(crate::Error::InvalidConfig(format!(
                "board extent {} exceeds backend extent {}",
                nn_extent, model_extent
            )));
        }

        let sizes = BufferSizes::new(desc, nn_extent, model_extent);
        let n = max_batch_size;

        tracing::debug!(
            "Allocating input buffers for {}: batch={} nn={} model={}",
            desc.name,
            n,
            nn_extent,
            model_extent
        );

        Ok(Self {
            max_batch_size,
            sizes,
            model_name: desc.name.clone(),
            spatial_input: vec![0.0; n * sizes.single_input],
            global_input: vec![0.0; n * sizes.single_input_global],
            policy_results: vec![0.0; n * sizes.single_model_policy * sizes.policy_channels],
            policy_pass_results: vec![0.0; n * sizes.policy_channels],
            value_results: vec![0.0; n * VALUE_SLOTS],
            ownership_results: vec![0.0; n * sizes.single_model_ownership],
            score_value_results: vec![0.0; n * sizes.single_score_values],
            policy_probs: vec![0.0; n * sizes.single_nn_policy],
        })
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn sizes(&self) -> &BufferSizes {
        &self.sizes
    }

    pub fn nn_extent(&self) -> BoardExtent {
        self.sizes.nn_extent
    }

    pub fn model_extent(&self) -> BoardExtent {
        self.sizes.model_extent
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Mutable backend spatial tensor for one row.
    pub fn spatial_row_mut(&mut self, row: usize) -> &mut [f32] {
        let n = self.sizes.single_input;
        &mut self.spatial_input[row * n..(row + 1) * n]
    }

    pub fn spatial_row(&self, row: usize) -> &[f32] {
        let n = self.sizes.single_input;
        &self.spatial_input[row * n..(row + 1) * n]
    }

    pub fn global_row_mut(&mut self, row: usize) -> &mut [f32] {
        let n = self.sizes.single_input_global;
        &mut self.global_input[row * n..(row + 1) * n]
    }

    /// Backend policy row: `policy_channels` planes of model cells.
    pub fn policy_row(&self, row: usize) -> &[f32] {
        let n = self.sizes.single_model_policy * self.sizes.policy_channels;
        &self.policy_results[row * n..(row + 1) * n]
    }

    /// Pass logits for one row, one per policy channel.
    pub fn policy_pass_row(&self, row: usize) -> &[f32] {
        let n = self.sizes.policy_channels;
        &self.policy_pass_results[row * n..(row + 1) * n]
    }

    pub fn value_row(&self, row: usize) -> &[f32] {
        &self.value_results[row * VALUE_SLOTS..(row + 1) * VALUE_SLOTS]
    }

    pub fn ownership_row(&self, row: usize) -> &[f32] {
        let n = self.sizes.single_model_ownership;
        &self.ownership_results[row * n..(row + 1) * n]
    }

    pub fn score_value_row(&self, row: usize) -> &[f32] {
        let n = self.sizes.single_score_values;
        &self.score_value_results[row * n..(row + 1) * n]
    }

    /// True when `(y, x)` lies in the live window.
    #[inline]
    pub fn in_live_window(&self, y: usize, x: usize) -> bool {
        y < self.sizes.nn_extent.y_len && x < self.sizes.nn_extent.x_len
    }

    /// True when every spatial-input cell outside the live window is still zero.
    pub fn spatial_padding_is_clear(&self) -> bool {
        let model = self.sizes.model_extent;
        let channels = self.sizes.spatial_channels;
        (0..self.max_batch_size).all(|row| {
            let data = self.spatial_row(row);
            (0..channels).all(|c| {
                (0..model.y_len).all(|y| {
                    (0..model.x_len).all(|x| {
                        self.in_live_window(y, x)
                            || data[c * model.cells() + y * model.x_len + x] == 0.0
                    })
                })
            })
        })
    }

    /// Splits the pool into the backend's view of the first `batch_size` rows.
    ///
    /// Rows past `batch_size` are not part of either slice.
    pub fn batch_io(&mut self, batch_size: usize) -> (BatchInputs<'_>, BatchOutputs<'_>) {
        assert!(
            batch_size >= 1 && batch_size <= self.max_batch_size,
            "batch size {} outside 1..={}",
            batch_size,
            self.max_batch_size
        );
        let s = &self.sizes;
        let inputs = BatchInputs {
            spatial: &self.spatial_input[..batch_size * s.single_input],
            global: &self.global_input[..batch_size * s.single_input_global],
            spatial_channels: s.spatial_channels,
            global_channels: s.single_input_global,
            model_extent: s.model_extent,
        };
        let outputs = BatchOutputs {
            policy: &mut self.policy_results[..batch_size * s.single_model_policy * s.policy_channels],
            policy_pass: &mut self.policy_pass_results[..batch_size * s.policy_channels],
            value: &mut self.value_results[..batch_size * VALUE_SLOTS],
            ownership: &mut self.ownership_results[..batch_size * s.single_model_ownership],
            score_values: &mut self.score_value_results[..batch_size * s.single_score_values],
            policy_channels: s.policy_channels,
            ownership_channels: s.ownership_channels,
            model_extent: s.model_extent,
        };
        (inputs, outputs)
    }
}

/// Read-only backend inputs for the occupied prefix of a batch.
///
/// `spatial` is `[batch][channel][model_y][model_x]`, `global` is
/// `[batch][global_channels]`.
pub struct BatchInputs<'a> {
    pub spatial: &'a [f32],
    pub global: &'a [f32],
    pub spatial_channels: usize,
    pub global_channels: usize,
    pub model_extent: BoardExtent,
}

impl BatchInputs<'_> {
    pub fn batch_size(&self) -> usize {
        if self.global_channels > 0 {
            self.global.len() / self.global_channels
        } else {
            self.spatial.len() / (self.spatial_channels * self.model_extent.cells()).max(1)
        }
    }
}

/// Backend output slots for the occupied prefix of a batch.
///
/// Per-cell heads use `[batch][channel][model_y][model_x]`. `score_values`
/// always has [`SCORE_VALUE_SLOTS`] slots per row.
pub struct BatchOutputs<'a> {
    pub policy: &'a mut [f32],
    pub policy_pass: &'a mut [f32],
    pub value: &'a mut [f32],
    pub ownership: &'a mut [f32],
    pub score_values: &'a mut [f32],
    pub policy_channels: usize,
    pub ownership_channels: usize,
    pub model_extent: BoardExtent,
}
