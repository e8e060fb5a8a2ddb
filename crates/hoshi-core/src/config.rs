//! Compute context configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Largest board edge the backend tensors are shaped for.
///
/// Every backend-facing tensor is allocated at this extent regardless of the
/// board actually being evaluated; smaller boards occupy the top-left window.
pub const COMPILE_MAX_BOARD_LEN: usize = 19;

/// Smallest supported board edge.
pub const MIN_BOARD_LEN: usize = 2;

/// Tri-state switch for features a backend may or may not honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enabled {
    #[default]
    Auto,
    True,
    False,
}

impl Enabled {
    /// Returns true unless the feature was explicitly disabled.
    pub fn allows(self) -> bool {
        self != Enabled::False
    }

    /// Returns true only when the feature was explicitly enabled.
    pub fn forces(self) -> bool {
        self == Enabled::True
    }
}

impl FromStr for Enabled {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Enabled::Auto),
            "true" => Ok(Enabled::True),
            "false" => Ok(Enabled::False),
            other => Err(Error::InvalidConfig(format!(
                "expected auto|true|false, got '{}'",
                other
            ))),
        }
    }
}

/// Board width and height in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardExtent {
    pub x_len: usize,
    pub y_len: usize,
}

impl BoardExtent {
    pub const fn new(x_len: usize, y_len: usize) -> Self {
        Self { x_len, y_len }
    }

    pub const fn square(len: usize) -> Self {
        Self::new(len, len)
    }

    /// The fixed extent backend tensors are shaped for.
    pub const fn compile_max() -> Self {
        Self::square(COMPILE_MAX_BOARD_LEN)
    }

    pub const fn cells(&self) -> usize {
        self.x_len * self.y_len
    }

    pub const fn is_square(&self) -> bool {
        self.x_len == self.y_len
    }

    /// True when this extent fits inside `other`.
    pub const fn fits_within(&self, other: &BoardExtent) -> bool {
        self.x_len <= other.x_len && self.y_len <= other.y_len
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |len: usize| (MIN_BOARD_LEN..=COMPILE_MAX_BOARD_LEN).contains(&len);
        if !ok(self.x_len) || !ok(self.y_len) {
            return Err(Error::InvalidConfig(format!(
                "board extent {}x{} out of range ({}-{})",
                self.x_len, self.y_len, MIN_BOARD_LEN, COMPILE_MAX_BOARD_LEN
            )));
        }
        Ok(())
    }
}

impl Default for BoardExtent {
    fn default() -> Self {
        Self::compile_max()
    }
}

impl core::fmt::Display for BoardExtent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}", self.x_len, self.y_len)
    }
}

/// Process-scoped settings shared by every handle bound to one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Board extent requested by callers of this context.
    pub extent: BoardExtent,
    /// Reduced-precision compute.
    pub fp16_mode: Enabled,
    /// Channel-last layout inside the engine.
    pub nhwc_mode: Enabled,
    /// Devices the accelerated engine may use. Empty means the default device.
    pub device_indices: Vec<i32>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            extent: BoardExtent::compile_max(),
            fp16_mode: Enabled::Auto,
            nhwc_mode: Enabled::Auto,
            device_indices: Vec::new(),
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> Result<()> {
        self.extent.validate()
    }
}
