//! Model version table: input feature layout and output slot widths.

use crate::{Error, Result};

/// Oldest model version the decoder understands.
pub const MIN_MODEL_VERSION: i32 = 3;

/// Newest model version the decoder understands.
pub const MAX_MODEL_VERSION: i32 = 16;

/// First version whose policy head carries the optimistic channel.
pub const OPTIMISTIC_POLICY_VERSION: i32 = 12;

/// Raw win/loss/no-result slots per row.
pub const VALUE_SLOTS: usize = 3;

/// Raw score-statistics slots per row. Only a version-dependent prefix is live.
pub const SCORE_VALUE_SLOTS: usize = 10;

/// Width of the auxiliary value head some compiled models emit separately.
pub const MORE_MISC_VALUE_SLOTS: usize = 8;

/// Spatial and global input channel counts for one model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureLayout {
    pub inputs_version: i32,
    pub spatial_channels: usize,
    pub global_channels: usize,
}

impl FeatureLayout {
    /// Looks up the input layout a model of `version` was trained with.
    pub fn for_version(version: i32) -> Result<Self> {
        let (inputs_version, spatial_channels, global_channels) = match version {
            3 => (3, 22, 14),
            4 => (4, 22, 14),
            5 => (5, 13, 12),
            6 => (6, 22, 16),
            7..=MAX_MODEL_VERSION => (7, 22, 19),
            other => return Err(Error::UnsupportedVersion(other)),
        };
        Ok(Self {
            inputs_version,
            spatial_channels,
            global_channels,
        })
    }
}

/// Number of policy channels a model of `version` must produce.
pub fn policy_channels_for_version(version: i32) -> usize {
    if version >= OPTIMISTIC_POLICY_VERSION {
        2
    } else {
        1
    }
}
