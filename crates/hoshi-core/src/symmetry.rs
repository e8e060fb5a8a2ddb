//! The eight board symmetries (dihedral group of the square) and the tensor
//! copies that move data between request orientation and the canonical
//! orientation the network computes in.
//!
//! A symmetry code packs three bits: `1` flips rows (y), `2` flips columns
//! (x), `4` transposes. Flips are applied first, then the transpose. On
//! rectangular boards the transpose bit is ignored, so every code stays a
//! bijection of the board onto itself.
//!
//! Copies never allocate. Both sides are described by a [`TensorLayout`],
//! which lets the same routine read dense channel-last requests and write
//! into the padded max-extent planes of the batch buffers.

use crate::config::BoardExtent;
use serde::{Deserialize, Serialize};

/// One of the eight board symmetries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Symmetry(u8);

impl Symmetry {
    pub const IDENTITY: Symmetry = Symmetry(0);
    pub const COUNT: u8 = 8;

    const FLIP_Y: u8 = 0x1;
    const FLIP_X: u8 = 0x2;
    const TRANSPOSE: u8 = 0x4;

    /// Returns `None` for codes outside 0..8.
    pub const fn new(code: u8) -> Option<Self> {
        if code < Self::COUNT {
            Some(Self(code))
        } else {
            None
        }
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Symmetry> {
        (0..Self::COUNT).map(Symmetry)
    }

    pub const fn flips_y(self) -> bool {
        self.0 & Self::FLIP_Y != 0
    }

    pub const fn flips_x(self) -> bool {
        self.0 & Self::FLIP_X != 0
    }

    pub const fn transposes(self) -> bool {
        self.0 & Self::TRANSPOSE != 0
    }

    /// The symmetry actually applied on `extent` (transpose dropped on
    /// rectangular boards).
    pub const fn effective(self, extent: BoardExtent) -> Symmetry {
        if extent.is_square() {
            self
        } else {
            Symmetry(self.0 & !Self::TRANSPOSE)
        }
    }

    /// Algebraic inverse: undoing flip-then-transpose means transposing first,
    /// which swaps the roles of the two flips.
    pub const fn inverse(self) -> Symmetry {
        if self.transposes() && (self.flips_x() != self.flips_y()) {
            Symmetry(self.0 ^ (Self::FLIP_X | Self::FLIP_Y))
        } else {
            self
        }
    }

    /// Maps a request-orientation cell to its canonical-orientation cell.
    #[inline]
    pub fn to_canonical(self, y: usize, x: usize, extent: BoardExtent) -> (usize, usize) {
        let sym = self.effective(extent);
        let y = if sym.flips_y() { extent.y_len - 1 - y } else { y };
        let x = if sym.flips_x() { extent.x_len - 1 - x } else { x };
        if sym.transposes() {
            (x, y)
        } else {
            (y, x)
        }
    }
}

impl TryFrom<u8> for Symmetry {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Symmetry::new(code).ok_or_else(|| format!("symmetry code {} out of range 0-7", code))
    }
}

impl From<Symmetry> for u8 {
    fn from(sym: Symmetry) -> u8 {
        sym.0
    }
}

/// Strided view of a `[channel][y][x]` tensor.
///
/// `extent` is the live board window; strides may describe a larger
/// allocation (padding beyond the window is never touched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorLayout {
    pub extent: BoardExtent,
    pub channel_stride: usize,
    pub row_stride: usize,
    pub cell_stride: usize,
}

impl TensorLayout {
    /// Dense channel-first layout.
    pub const fn nchw(extent: BoardExtent) -> Self {
        Self {
            extent,
            channel_stride: extent.cells(),
            row_stride: extent.x_len,
            cell_stride: 1,
        }
    }

    /// Dense channel-last (row-major, channels innermost) layout.
    pub const fn nhwc(extent: BoardExtent, channels: usize) -> Self {
        Self {
            extent,
            channel_stride: 1,
            row_stride: extent.x_len * channels,
            cell_stride: channels,
        }
    }

    /// Dense layout in whichever convention the caller uses.
    pub const fn dense(extent: BoardExtent, channels: usize, use_nhwc: bool) -> Self {
        if use_nhwc {
            Self::nhwc(extent, channels)
        } else {
            Self::nchw(extent)
        }
    }

    /// Channel-first planes of size `plane`, with `live` in the top-left corner.
    pub const fn padded_nchw(live: BoardExtent, plane: BoardExtent) -> Self {
        Self {
            extent: live,
            channel_stride: plane.cells(),
            row_stride: plane.x_len,
            cell_stride: 1,
        }
    }

    #[inline]
    pub const fn index(&self, c: usize, y: usize, x: usize) -> usize {
        c * self.channel_stride + y * self.row_stride + x * self.cell_stride
    }

    /// Minimum slice length holding `channels` channels of the live window.
    pub const fn required_len(&self, channels: usize) -> usize {
        if channels == 0 || self.extent.x_len == 0 || self.extent.y_len == 0 {
            return 0;
        }
        self.index(channels - 1, self.extent.y_len - 1, self.extent.x_len - 1) + 1
    }
}

fn check_layouts(
    src: &[f32],
    src_layout: &TensorLayout,
    dst: &[f32],
    dst_layout: &TensorLayout,
    channels: usize,
) {
    assert_eq!(
        src_layout.extent, dst_layout.extent,
        "symmetry copy between different board extents"
    );
    assert!(
        src.len() >= src_layout.required_len(channels),
        "source tensor too small: {} < {}",
        src.len(),
        src_layout.required_len(channels)
    );
    assert!(
        dst.len() >= dst_layout.required_len(channels),
        "destination tensor too small: {} < {}",
        dst.len(),
        dst_layout.required_len(channels)
    );
}

/// Copies a request-orientation tensor into canonical orientation.
pub fn copy_to_canonical(
    src: &[f32],
    src_layout: &TensorLayout,
    dst: &mut [f32],
    dst_layout: &TensorLayout,
    channels: usize,
    symmetry: Symmetry,
) {
    check_layouts(src, src_layout, dst, dst_layout, channels);
    let extent = src_layout.extent;
    for c in 0..channels {
        for y in 0..extent.y_len {
            for x in 0..extent.x_len {
                let (cy, cx) = symmetry.to_canonical(y, x, extent);
                dst[dst_layout.index(c, cy, cx)] = src[src_layout.index(c, y, x)];
            }
        }
    }
}

/// Copies a canonical-orientation tensor back into request orientation.
///
/// Exact inverse of [`copy_to_canonical`] for the same `symmetry`.
pub fn copy_from_canonical(
    src: &[f32],
    src_layout: &TensorLayout,
    dst: &mut [f32],
    dst_layout: &TensorLayout,
    channels: usize,
    symmetry: Symmetry,
) {
    check_layouts(src, src_layout, dst, dst_layout, channels);
    let extent = src_layout.extent;
    for c in 0..channels {
        for y in 0..extent.y_len {
            for x in 0..extent.x_len {
                let (cy, cx) = symmetry.to_canonical(y, x, extent);
                dst[dst_layout.index(c, y, x)] = src[src_layout.index(c, cy, cx)];
            }
        }
    }
}

/// Copies dense spatial inputs into a dense channel-first canonical tensor.
pub fn copy_inputs_with_symmetry(
    src: &[f32],
    dst: &mut [f32],
    extent: BoardExtent,
    channels: usize,
    inputs_use_nhwc: bool,
    symmetry: Symmetry,
) {
    copy_to_canonical(
        src,
        &TensorLayout::dense(extent, channels, inputs_use_nhwc),
        dst,
        &TensorLayout::nchw(extent),
        channels,
        symmetry,
    );
}

/// Copies a dense single-plane canonical output back into request orientation.
pub fn copy_outputs_with_symmetry(
    src: &[f32],
    dst: &mut [f32],
    extent: BoardExtent,
    symmetry: Symmetry,
) {
    let layout = TensorLayout::nchw(extent);
    copy_from_canonical(src, &layout, dst, &layout, 1, symmetry);
}
