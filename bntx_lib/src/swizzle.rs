//! Conversions between the Tegra X1 block linear memory layout and a
//! standard row-major layout.
//!
//! # Overview
//! Texture surfaces in BNTX files use a tiled memory layout optimized for
//! GPU cache locality. Bytes are grouped into fixed 64x8 byte "GOBs"
//! (groups of bytes), and rows of GOBs are themselves grouped by a
//! configurable power of two block height.
//!
//! Use [deswizzle_surface] to convert tiled data to the tightly packed
//! row-major layout expected by DDS files and modern graphics APIs.
//! Use [swizzle_surface] for the inverse direction.
//!
//! Both functions operate on opaque blocks of `bytes_per_block` bytes.
//! For uncompressed formats a block is a single pixel. For block compressed
//! formats like BC1 or ASTC, a block covers multiple pixels and the
//! dimensions in [BlockDim] describe the pixel footprint of one block.
use std::num::NonZeroU32;

/// The width in bytes of one GOB.
const GOB_WIDTH_IN_BYTES: usize = 64;

/// The height in rows of one GOB.
const GOB_HEIGHT_IN_ROWS: usize = 8;

/// The size in bytes of one GOB.
const GOB_SIZE_IN_BYTES: usize = 512;

/// The memory layout of a stored surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMode {
    /// Rows of blocks padded to a 32 byte pitch.
    Pitch,
    /// The tiled GOB layout used for most textures.
    BlockLinear,
}

impl TileMode {
    /// Convert the tile mode field stored in a texture descriptor.
    pub fn from_raw(value: u16) -> Self {
        if value == 1 {
            TileMode::Pitch
        } else {
            TileMode::BlockLinear
        }
    }
}

/// The height of a block in GOBs, always a power of two in the range `1..=32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BlockHeight {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
    Sixteen = 16,
    ThirtyTwo = 32,
}

impl BlockHeight {
    /// Create the block height `2^exponent` from the size range exponent
    /// stored in a texture descriptor.
    ///
    /// Returns [None] if `exponent` is not in the range `0..=5`.
    pub fn from_log2(exponent: u32) -> Option<Self> {
        match exponent {
            0 => Some(BlockHeight::One),
            1 => Some(BlockHeight::Two),
            2 => Some(BlockHeight::Four),
            3 => Some(BlockHeight::Eight),
            4 => Some(BlockHeight::Sixteen),
            5 => Some(BlockHeight::ThirtyTwo),
            _ => None,
        }
    }
}

/// Calculates the block height for the base mip level
/// of a surface with `height_in_blocks` rows of blocks.
///
/// This matches the hardware default used when a container revision
/// does not store an explicit size range exponent.
pub fn block_height_mip0(height_in_blocks: usize) -> BlockHeight {
    let block_height = height_in_blocks.div_ceil(GOB_HEIGHT_IN_ROWS).next_power_of_two();
    match block_height {
        0..=1 => BlockHeight::One,
        2 => BlockHeight::Two,
        4 => BlockHeight::Four,
        8 => BlockHeight::Eight,
        16 => BlockHeight::Sixteen,
        _ => BlockHeight::ThirtyTwo,
    }
}

/// The dimensions in pixels of a compressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDim {
    /// The width of the block in pixels.
    pub width: NonZeroU32,
    /// The height of the block in pixels.
    pub height: NonZeroU32,
}

impl BlockDim {
    /// A block covering `width` x `height` pixels.
    ///
    /// # Panics
    /// Panics if either dimension is zero.
    pub fn new(width: u32, height: u32) -> Self {
        BlockDim {
            width: NonZeroU32::new(width).unwrap(),
            height: NonZeroU32::new(height).unwrap(),
        }
    }

    /// A 1x1 block for formats without block compression like R8G8B8A8.
    pub fn uncompressed() -> Self {
        BlockDim::new(1, 1)
    }

    /// A 4x4 compressed block used by all of the BCn formats.
    pub fn block_4x4() -> Self {
        BlockDim::new(4, 4)
    }
}

/// Calculates the byte address of the block at `(x, y)` in a block linear
/// surface with `block_count_x` blocks per row.
///
/// Coordinates are in blocks, and `bytes_per_block` is the size of the
/// addressing unit. The function is pure and depends only on its arguments.
pub fn tiled_address(
    x: usize,
    y: usize,
    block_count_x: usize,
    bytes_per_block: usize,
    base_offset: usize,
    block_height: BlockHeight,
) -> usize {
    let block_height = block_height as usize;
    let gobs_per_row = (block_count_x * bytes_per_block).div_ceil(GOB_WIDTH_IN_BYTES);

    let bx = x * bytes_per_block;

    let gob_address = base_offset
        + (y / (GOB_HEIGHT_IN_ROWS * block_height))
            * GOB_SIZE_IN_BYTES
            * block_height
            * gobs_per_row
        + (bx / GOB_WIDTH_IN_BYTES) * GOB_SIZE_IN_BYTES * block_height
        + (y % (GOB_HEIGHT_IN_ROWS * block_height) / GOB_HEIGHT_IN_ROWS) * GOB_SIZE_IN_BYTES;

    // The bytes within one GOB are interleaved from the low coordinate bits.
    gob_address
        + (bx % 64 / 32) * 256
        + (y % 8 / 2) * 64
        + (bx % 32 / 16) * 32
        + (y % 2) * 16
        + (bx % 16)
}

/// The size in bytes of the tiled surface for the given dimensions,
/// including row pitch padding and the trailing surface alignment.
pub fn swizzled_surface_size(
    width: usize,
    height: usize,
    block_dim: BlockDim,
    bytes_per_block: usize,
    tile_mode: TileMode,
    block_height: BlockHeight,
    alignment: usize,
) -> usize {
    let block_count_x = width.div_ceil(block_dim.width.get() as usize);
    let block_count_y = height.div_ceil(block_dim.height.get() as usize);
    let pitch = surface_pitch(block_count_x, bytes_per_block, tile_mode);

    let unaligned = match tile_mode {
        TileMode::Pitch => pitch * block_count_y,
        TileMode::BlockLinear => {
            pitch * block_count_y.next_multiple_of(block_height as usize * GOB_HEIGHT_IN_ROWS)
        }
    };
    unaligned.next_multiple_of(alignment.max(1))
}

/// The size in bytes of the tightly packed row-major surface
/// for the given dimensions.
pub fn deswizzled_surface_size(
    width: usize,
    height: usize,
    block_dim: BlockDim,
    bytes_per_block: usize,
) -> usize {
    let block_count_x = width.div_ceil(block_dim.width.get() as usize);
    let block_count_y = height.div_ceil(block_dim.height.get() as usize);
    block_count_x * block_count_y * bytes_per_block
}

/// Converts the tiled surface in `source` to a tightly packed row-major
/// layout. `width` and `height` are in pixels.
///
/// Blocks whose computed source address lies outside `source` are left
/// zero filled in the output. Tiling legitimately addresses padding past
/// the logical image for blocks near surface edges, so this is not an error.
pub fn deswizzle_surface(
    width: usize,
    height: usize,
    block_dim: BlockDim,
    bytes_per_block: usize,
    tile_mode: TileMode,
    block_height: BlockHeight,
    alignment: usize,
    source: &[u8],
) -> Vec<u8> {
    swizzle_inner(
        width,
        height,
        block_dim,
        bytes_per_block,
        tile_mode,
        block_height,
        alignment,
        source,
        false,
    )
}

/// Converts the row-major surface in `source` to the tiled layout.
/// The inverse of [deswizzle_surface].
///
/// The output includes pitch and block height padding and is aligned
/// to `alignment` bytes.
pub fn swizzle_surface(
    width: usize,
    height: usize,
    block_dim: BlockDim,
    bytes_per_block: usize,
    tile_mode: TileMode,
    block_height: BlockHeight,
    alignment: usize,
    source: &[u8],
) -> Vec<u8> {
    swizzle_inner(
        width,
        height,
        block_dim,
        bytes_per_block,
        tile_mode,
        block_height,
        alignment,
        source,
        true,
    )
}

fn surface_pitch(block_count_x: usize, bytes_per_block: usize, tile_mode: TileMode) -> usize {
    match tile_mode {
        TileMode::Pitch => (block_count_x * bytes_per_block).next_multiple_of(32),
        TileMode::BlockLinear => {
            (block_count_x * bytes_per_block).next_multiple_of(GOB_WIDTH_IN_BYTES)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn swizzle_inner(
    width: usize,
    height: usize,
    block_dim: BlockDim,
    bytes_per_block: usize,
    tile_mode: TileMode,
    block_height: BlockHeight,
    alignment: usize,
    source: &[u8],
    to_tiled: bool,
) -> Vec<u8> {
    let block_count_x = width.div_ceil(block_dim.width.get() as usize);
    let block_count_y = height.div_ceil(block_dim.height.get() as usize);
    let pitch = surface_pitch(block_count_x, bytes_per_block, tile_mode);

    let destination_size = if to_tiled {
        swizzled_surface_size(
            width,
            height,
            block_dim,
            bytes_per_block,
            tile_mode,
            block_height,
            alignment,
        )
    } else {
        deswizzled_surface_size(width, height, block_dim, bytes_per_block)
    };
    let mut destination = vec![0u8; destination_size];

    for y in 0..block_count_y {
        for x in 0..block_count_x {
            let tiled_offset = match tile_mode {
                TileMode::Pitch => y * pitch + x * bytes_per_block,
                TileMode::BlockLinear => {
                    tiled_address(x, y, block_count_x, bytes_per_block, 0, block_height)
                }
            };
            let linear_offset = (y * block_count_x + x) * bytes_per_block;

            let (src, dst) = if to_tiled {
                (linear_offset, tiled_offset)
            } else {
                (tiled_offset, linear_offset)
            };

            // Skip blocks that address padding outside either buffer.
            if src + bytes_per_block <= source.len() && dst + bytes_per_block <= destination.len()
            {
                destination[dst..dst + bytes_per_block]
                    .copy_from_slice(&source[src..src + bytes_per_block]);
            }
        }
    }

    destination
}
