//! Opaque network wrapper and the tensor plumbing shared by both engines.

use burn::prelude::*;
use burn::tensor::backend::Backend;
use half::f16;
use hoshi_core::{BatchInputs, BatchOutputs, EngineError, MORE_MISC_VALUE_SLOTS, SCORE_VALUE_SLOTS};
use std::sync::Arc;

/// Auxiliary score head width of split-head models.
pub const MISC_VALUE_SLOTS: usize = 4;

/// Score outputs, either in the unified layout or split in two heads.
pub enum ScoreHeads<B: Backend> {
    /// `[N, 10]`
    Unified(Tensor<B, 2>),
    /// `misc` is `[N, 4]`, `more_misc` is `[N, 8]`.
    Split {
        misc: Tensor<B, 2>,
        more_misc: Tensor<B, 2>,
    },
}

/// Output heads of one forward pass. Per-cell heads are `[N, C, MAX, MAX]`.
pub struct NetworkHeads<B: Backend> {
    pub policy: Tensor<B, 4>,
    /// `[N, policy_channels]`
    pub policy_pass: Tensor<B, 2>,
    /// `[N, 3]`
    pub value: Tensor<B, 2>,
    pub ownership: Tensor<B, 4>,
    pub score_values: ScoreHeads<B>,
}

type ForwardFn<B> = dyn Fn(Tensor<B, 4>, Tensor<B, 2>) -> NetworkHeads<B> + Send + Sync;

/// Wraps a forward function `(spatial [N,C,MAX,MAX], global [N,G]) -> heads`.
pub struct BurnNetwork<B: Backend> {
    forward_fn: Arc<ForwardFn<B>>,
    version: Option<i32>,
}

impl<B: Backend> BurnNetwork<B> {
    pub fn from_forward(
        f: impl Fn(Tensor<B, 4>, Tensor<B, 2>) -> NetworkHeads<B> + Send + Sync + 'static,
    ) -> Self {
        Self {
            forward_fn: Arc::new(f),
            version: None,
        }
    }

    /// Version the compiled network declares, overriding the descriptor.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn forward(&self, spatial: Tensor<B, 4>, global: Tensor<B, 2>) -> NetworkHeads<B> {
        (self.forward_fn)(spatial, global)
    }

    /// Runs one batch from the flat buffers and writes every head back.
    pub(crate) fn run_batch(
        &self,
        device: &B::Device,
        inputs: &BatchInputs<'_>,
        outputs: &mut BatchOutputs<'_>,
        batch_size: usize,
        use_fp16: bool,
    ) -> Result<(), EngineError> {
        let extent = inputs.model_extent;
        let shape = [
            batch_size,
            inputs.spatial_channels,
            extent.y_len,
            extent.x_len,
        ];
        let spatial = input_tensor::<B>(inputs.spatial, device, use_fp16).reshape(shape);
        let global = input_tensor::<B>(inputs.global, device, use_fp16)
            .reshape([batch_size, inputs.global_channels]);

        let heads = self.forward(spatial, global);

        read_head(heads.policy, outputs.policy, "policy", use_fp16)?;
        read_head(heads.policy_pass, outputs.policy_pass, "policy_pass", use_fp16)?;
        read_head(heads.value, outputs.value, "value", use_fp16)?;
        read_head(heads.ownership, outputs.ownership, "ownership", use_fp16)?;
        match heads.score_values {
            ScoreHeads::Unified(scores) => {
                read_head(scores, outputs.score_values, "score_values", use_fp16)?
            }
            ScoreHeads::Split { misc, more_misc } => {
                let misc = head_values(misc, "misc", use_fp16)?;
                let more_misc = head_values(more_misc, "more_misc", use_fp16)?;
                merge_score_heads(&misc, &more_misc, outputs.score_values, batch_size)?;
            }
        }
        Ok(())
    }
}

impl<B: Backend> Clone for BurnNetwork<B> {
    fn clone(&self) -> Self {
        Self {
            forward_fn: Arc::clone(&self.forward_fn),
            version: self.version,
        }
    }
}

/// Rounds through f16 in place.
pub(crate) fn round_f16(data: &mut [f32]) {
    for v in data {
        *v = f16::from_f32(*v).to_f32();
    }
}

fn input_tensor<B: Backend>(data: &[f32], device: &B::Device, use_fp16: bool) -> Tensor<B, 1> {
    if use_fp16 {
        let mut rounded = data.to_vec();
        round_f16(&mut rounded);
        Tensor::<B, 1>::from_floats(rounded.as_slice(), device)
    } else {
        Tensor::<B, 1>::from_floats(data, device)
    }
}

fn head_values<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    head: &str,
    use_fp16: bool,
) -> Result<Vec<f32>, EngineError> {
    let mut values = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| EngineError::ExecuteFailed(format!("{} head: {:?}", head, e)))?;
    if use_fp16 {
        round_f16(&mut values);
    }
    Ok(values)
}

fn read_head<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    dst: &mut [f32],
    head: &str,
    use_fp16: bool,
) -> Result<(), EngineError> {
    let values = head_values(tensor, head, use_fp16)?;
    if values.len() != dst.len() {
        return Err(EngineError::ShapeMismatch(format!(
            "{} head produced {} values, expected {}",
            head,
            values.len(),
            dst.len()
        )));
    }
    dst.copy_from_slice(&values);
    Ok(())
}

/// Packs split score heads into the unified block: slots 0-3 from `misc`,
/// slots 4-9 from the first six `more_misc` values.
pub(crate) fn merge_score_heads(
    misc: &[f32],
    more_misc: &[f32],
    dst: &mut [f32],
    batch_size: usize,
) -> Result<(), EngineError> {
    if misc.len() != batch_size * MISC_VALUE_SLOTS
        || more_misc.len() != batch_size * MORE_MISC_VALUE_SLOTS
        || dst.len() != batch_size * SCORE_VALUE_SLOTS
    {
        return Err(EngineError::ShapeMismatch(format!(
            "score heads {}+{} do not fit {} rows",
            misc.len(),
            more_misc.len(),
            batch_size
        )));
    }
    let from_more = SCORE_VALUE_SLOTS - MISC_VALUE_SLOTS;
    for n in 0..batch_size {
        let row = &mut dst[n * SCORE_VALUE_SLOTS..(n + 1) * SCORE_VALUE_SLOTS];
        row[..MISC_VALUE_SLOTS]
            .copy_from_slice(&misc[n * MISC_VALUE_SLOTS..(n + 1) * MISC_VALUE_SLOTS]);
        let more = &more_misc[n * MORE_MISC_VALUE_SLOTS..];
        row[MISC_VALUE_SLOTS..].copy_from_slice(&more[..from_more]);
    }
    Ok(())
}
