//! Textures in `.bntx` files.
//!
//! # Overview
//! A [Bntx] container starts with a fixed header followed by an `NX  `
//! index substructure holding pointers to one `BRTI` descriptor per texture.
//! Descriptors reference their name string, a per mip pointer array,
//! and the raw image data elsewhere in the file, so parsing requires random
//! access by absolute offset rather than streaming.
//!
//! The image data uses a tiled memory layout optimized for the Tegra X1
//! and must be decoded to a standard row-major layout using
//! [Texture::deswizzled_image_data] for use on other hardware.
//!
//! All multi byte integers are decoded using the byte order selected by the
//! order mark at offset 0xC. The header revision selects between two
//! historical descriptor conventions, see [SchemaVersion].
use std::{
    io::{Cursor, Read, Seek, SeekFrom},
    path::Path,
};

use binrw::{BinRead, Endian, VecArgs};
use log::trace;
use thiserror::Error;

use crate::swizzle::{self, BlockDim, BlockHeight, TileMode};

const BOM_OFFSET: u64 = 0xC;

/// The longest embedded file name the bounded terminator scan will read.
const FILE_NAME_SCAN_LIMIT: u64 = 256;

/// A parsed BNTX texture container.
#[derive(Debug, Clone, PartialEq)]
pub struct Bntx {
    /// The file name embedded in the container's string section.
    pub file_name: String,
    pub version: u32,
    pub revision: u16,
    /// The descriptor convention selected by [revision](#structfield.revision).
    pub schema: SchemaVersion,
    /// One entry per descriptor in the index, in file order.
    /// Textures with unrecognized formats are included and classified
    /// at conversion time rather than dropped while parsing.
    pub textures: Vec<Texture>,
}

/// Errors while reading a [Bntx] container.
///
/// All of these are fatal for the whole parse. Offsets in the container are
/// interdependent, so a single corrupt pointer invalidates everything
/// reached through it.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized byte order mark {0:02X?}")]
    InvalidByteOrder([u8; 2]),

    #[error("invalid BNTX signature")]
    InvalidSignature,

    #[error("error reading container data: {0}")]
    Binrw(#[from] binrw::Error),

    #[error("error reading data: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while converting a single texture's image data.
///
/// Unlike [DecodeError], these are per texture. The affected texture is
/// reported and skipped and remaining textures convert normally.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("format {0:#06x} is not supported")]
    UnsupportedFormat(u32),

    #[error("unsupported number of faces {0}")]
    UnsupportedFaceCount(u32),

    #[error("block height exponent {0} is out of range")]
    UnsupportedBlockHeight(u32),

    #[error("mip level {0} is out of range")]
    InvalidMipLevel(u16),
}

/// The descriptor decoding convention for a container revision.
///
/// The on disk descriptor layout diverged across revisions of the format.
/// Legacy files predate the explicit texture layout word and store the
/// component selector in the opposite byte order, so each revision keeps
/// its own decoding path rather than assuming the newest layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    Legacy,
    Modern,
}

impl SchemaVersion {
    pub fn from_revision(revision: u16) -> Self {
        if revision < 0x0400 {
            SchemaVersion::Legacy
        } else {
            SchemaVersion::Modern
        }
    }
}

#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
struct ContainerHeader {
    /// `BNTX` followed by four padding bytes.
    /// Only the first four bytes are validated.
    signature: [u8; 8],
    version: u32,
    bom: u16,
    revision: u16,
    file_name_addr: u32,
    flags: u16,
    string_pool_addr: u16,
    reloc_addr: u32,
    file_size: u32,
}

#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(magic = b"NX  ")]
#[allow(dead_code)]
struct TextureIndex {
    count: u32,
    info_ptrs_addr: u64,
    data_block_addr: u64,
    dict_addr: u64,
    string_dict_size: u32,
}

/// The `BRTI` record layout used by legacy revisions.
///
/// The dword at 0x34 holds the channel count here. Legacy files carry no
/// size range exponent, so the tiling block height is derived from the
/// surface height instead.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(magic = b"BRTI")]
#[allow(dead_code)]
struct DescriptorLegacy {
    size: u32,
    size2: u64,
    flags: u8,
    dim: u8,
    tile_mode: u16,
    swizzle: u16,
    mipmap_count: u16,
    sample_count: u16,
    unk1a: u16,
    format: u32,
    access_flags: u32,
    width: u32,
    height: u32,
    depth: u32,
    layer_count: u32,
    channel_count: u32,
    unk38: u32,
    reserved: [u8; 20],
    image_size: u32,
    alignment: u32,
    comp_sel: u32,
    dimension: u32,
    name_addr: u64,
    parent_addr: u64,
    ptrs_addr: u64,
}

/// The `BRTI` record layout used by modern revisions.
///
/// The dword at 0x34 is the texture layout word whose low bits carry the
/// size range exponent for the tiled layout.
#[derive(BinRead, Debug, Clone, PartialEq, Eq)]
#[br(magic = b"BRTI")]
#[allow(dead_code)]
struct DescriptorModern {
    size: u32,
    size2: u64,
    flags: u8,
    dim: u8,
    tile_mode: u16,
    swizzle: u16,
    mipmap_count: u16,
    sample_count: u16,
    unk1a: u16,
    format: u32,
    access_flags: u32,
    width: u32,
    height: u32,
    depth: u32,
    layer_count: u32,
    texture_layout: u32,
    texture_layout2: u32,
    reserved: [u8; 20],
    image_size: u32,
    alignment: u32,
    comp_sel: u32,
    dimension: u32,
    name_addr: u64,
    parent_addr: u64,
    ptrs_addr: u64,
}

/// The common result shape produced by both descriptor decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TextureDescriptor {
    tile_mode: u16,
    mipmap_count: u16,
    format: u32,
    width: u32,
    height: u32,
    depth: u32,
    layer_count: u32,
    /// [None] for legacy records without a texture layout word.
    block_height_log2: Option<u32>,
    image_size: u32,
    alignment: u32,
    component_selector: [u8; 4],
    dimension: u32,
    name_addr: u64,
    ptrs_addr: u64,
}

impl SchemaVersion {
    fn read_descriptor<R: Read + Seek>(
        &self,
        reader: &mut R,
        endian: Endian,
    ) -> binrw::BinResult<TextureDescriptor> {
        match self {
            SchemaVersion::Legacy => {
                let d = DescriptorLegacy::read_options(reader, endian, ())?;
                Ok(TextureDescriptor {
                    tile_mode: d.tile_mode,
                    mipmap_count: d.mipmap_count,
                    format: d.format,
                    width: d.width,
                    height: d.height,
                    depth: d.depth,
                    layer_count: d.layer_count,
                    block_height_log2: None,
                    image_size: d.image_size,
                    alignment: d.alignment,
                    component_selector: legacy_component_selector(d.comp_sel),
                    dimension: d.dimension,
                    name_addr: d.name_addr,
                    ptrs_addr: d.ptrs_addr,
                })
            }
            SchemaVersion::Modern => {
                let d = DescriptorModern::read_options(reader, endian, ())?;
                Ok(TextureDescriptor {
                    tile_mode: d.tile_mode,
                    mipmap_count: d.mipmap_count,
                    format: d.format,
                    width: d.width,
                    height: d.height,
                    depth: d.depth,
                    layer_count: d.layer_count,
                    block_height_log2: Some(d.texture_layout & 7),
                    image_size: d.image_size,
                    alignment: d.alignment,
                    component_selector: modern_component_selector(d.comp_sel),
                    dimension: d.dimension,
                    name_addr: d.name_addr,
                    ptrs_addr: d.ptrs_addr,
                })
            }
        }
    }
}

/// Channel `c` reads byte `c` of the packed word.
fn modern_component_selector(word: u32) -> [u8; 4] {
    [0, 1, 2, 3].map(|c| (word >> (8 * c)) as u8)
}

/// Legacy parsers walked the selector bytes from the high end, which
/// makes a zero valued source default to the mirrored channel identity.
fn legacy_component_selector(word: u32) -> [u8; 4] {
    [0u32, 1, 2, 3].map(|c| {
        let value = (word >> (8 * c)) as u8;
        if value == 0 {
            (5 - c) as u8
        } else {
            value
        }
    })
}

/// The source feeding one output channel, in the descriptor's encoding:
/// 0 = constant zero, 1 = constant one, 2..=5 = red through alpha.
pub fn channel_source_name(value: u8) -> &'static str {
    match value {
        0 => "Zero",
        1 => "One",
        2 => "Red",
        3 => "Green",
        4 => "Blue",
        5 => "Alpha",
        _ => "Unknown",
    }
}

/// The image type stored in a texture descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
    Cube,
    CubeFar,
}

impl TextureDimension {
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(TextureDimension::D1),
            1 => Some(TextureDimension::D2),
            2 => Some(TextureDimension::D3),
            3 => Some(TextureDimension::Cube),
            8 => Some(TextureDimension::CubeFar),
            _ => None,
        }
    }
}

/// A single texture entry with its metadata and an owned copy
/// of its tiled image data.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    /// The raw 16 bit format code.
    /// The high byte selects the format family and the low byte the numeric
    /// encoding variant like UNORM or SRGB.
    pub format_code: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mipmap_count: u16,
    /// The number of array faces. Values of 2 or more are parsed
    /// but excluded from image conversion.
    pub layer_count: u32,
    pub tile_mode: TileMode,
    /// The size range exponent, or [None] for legacy records
    /// where the block height is derived from the surface height.
    pub block_height_log2: Option<u32>,
    /// The surface byte alignment requirement.
    pub alignment: u32,
    /// The source feeding each of the R, G, B and A output channels.
    pub component_selector: [u8; 4],
    /// The raw image type field, see [Texture::dimension].
    pub image_dimension: u32,
    /// Byte offsets of each mip level relative to the base data address.
    /// Entry 0 is always 0.
    pub mip_offsets: Vec<u64>,
    /// The tiled image data spanning all mip levels.
    pub image_data: Vec<u8>,
}

impl Bntx {
    /// Read a container, detecting the byte order from the order mark.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, DecodeError> {
        reader.seek(SeekFrom::Start(BOM_OFFSET))?;
        let mut bom = [0u8; 2];
        reader.read_exact(&mut bom)?;
        let endian = detect_byte_order(bom)?;

        reader.seek(SeekFrom::Start(0))?;
        let header = ContainerHeader::read_options(reader, endian, ())?;
        if &header.signature[..4] != b"BNTX" {
            return Err(DecodeError::InvalidSignature);
        }

        // The index substructure immediately follows the fixed header.
        let index = TextureIndex::read_options(reader, endian, ())?;

        let file_name = read_terminated_string(reader, header.file_name_addr as u64)?;

        let schema = SchemaVersion::from_revision(header.revision);

        let mut textures = Vec::with_capacity(index.count as usize);
        for i in 0..index.count as u64 {
            reader.seek(SeekFrom::Start(index.info_ptrs_addr + i * 8))?;
            let descriptor_addr = u64::read_options(reader, endian, ())?;
            trace!("BRTI {i}: {descriptor_addr:#x}");

            reader.seek(SeekFrom::Start(descriptor_addr))?;
            let descriptor = schema.read_descriptor(reader, endian)?;
            textures.push(read_texture(reader, endian, &descriptor)?);
        }

        Ok(Bntx {
            file_name,
            version: header.version,
            revision: header.revision,
            schema,
            textures,
        })
    }

    /// Read from `path` using a fully buffered reader for performance.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let mut reader = Cursor::new(std::fs::read(path)?);
        Self::read(&mut reader)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Self, DecodeError> {
        Self::read(&mut Cursor::new(bytes))
    }
}

fn detect_byte_order(bom: [u8; 2]) -> Result<Endian, DecodeError> {
    match bom {
        [0xFF, 0xFE] => Ok(Endian::Little),
        [0xFE, 0xFF] => Ok(Endian::Big),
        _ => Err(DecodeError::InvalidByteOrder(bom)),
    }
}

fn read_texture<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    descriptor: &TextureDescriptor,
) -> Result<Texture, DecodeError> {
    let name = read_string_ptr(reader, endian, descriptor.name_addr)?;

    // Entry 0 of the pointer array is the base data address.
    let mip_count = descriptor.mipmap_count.max(1);
    reader.seek(SeekFrom::Start(descriptor.ptrs_addr))?;
    let mip_ptrs = Vec::<u64>::read_options(
        reader,
        endian,
        VecArgs {
            count: mip_count as usize,
            inner: (),
        },
    )?;
    let base_addr = mip_ptrs[0];
    let mip_offsets = mip_ptrs.iter().map(|p| p.saturating_sub(base_addr)).collect();

    trace!("{name}: image data {base_addr:#x}+{:#x}", descriptor.image_size);
    reader.seek(SeekFrom::Start(base_addr))?;
    let mut image_data = vec![0u8; descriptor.image_size as usize];
    reader.read_exact(&mut image_data)?;

    Ok(Texture {
        name,
        format_code: descriptor.format,
        width: descriptor.width,
        height: descriptor.height,
        depth: descriptor.depth,
        mipmap_count: descriptor.mipmap_count,
        layer_count: descriptor.layer_count,
        tile_mode: TileMode::from_raw(descriptor.tile_mode),
        block_height_log2: descriptor.block_height_log2,
        alignment: descriptor.alignment,
        component_selector: descriptor.component_selector,
        image_dimension: descriptor.dimension,
        mip_offsets,
        image_data,
    })
}

/// Read a string with a 2 byte length prefix at `address`.
fn read_string_ptr<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    address: u64,
) -> binrw::BinResult<String> {
    reader.seek(SeekFrom::Start(address))?;
    let length = u16::read_options(reader, endian, ())?;
    let bytes = Vec::<u8>::read_options(
        reader,
        endian,
        VecArgs {
            count: length as usize,
            inner: (),
        },
    )?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a C style string at `address` with a bounded terminator scan.
/// If no terminator is found, the whole scanned slice is the string.
fn read_terminated_string<R: Read + Seek>(
    reader: &mut R,
    address: u64,
) -> Result<String, DecodeError> {
    reader.seek(SeekFrom::Start(address))?;
    let mut bytes = Vec::new();
    reader
        .by_ref()
        .take(FILE_NAME_SCAN_LIMIT)
        .read_to_end(&mut bytes)?;
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

impl Texture {
    /// The format table entry for this texture's format code,
    /// or [None] for unrecognized codes.
    pub fn image_format(&self) -> Option<ImageFormat> {
        ImageFormat::from_code(self.format_code)
    }

    pub fn dimension(&self) -> Option<TextureDimension> {
        TextureDimension::from_raw(self.image_dimension)
    }

    /// Deswizzles the base mip level to a standard row-major memory layout.
    ///
    /// The output is the exact logical size of the image with no padding.
    pub fn deswizzled_image_data(&self) -> Result<Vec<u8>, ConvertError> {
        self.deswizzled_mip(0)
    }

    /// Deswizzles the mip level `level` to a standard row-major memory layout.
    pub fn deswizzled_mip(&self, level: u16) -> Result<Vec<u8>, ConvertError> {
        let format = self
            .image_format()
            .ok_or(ConvertError::UnsupportedFormat(self.format_code))?;
        if self.layer_count >= 2 {
            return Err(ConvertError::UnsupportedFaceCount(self.layer_count));
        }

        let width = (self.width >> level).max(1) as usize;
        let height = (self.height >> level).max(1) as usize;
        let block_dim = format.block_dim();

        let block_height = match self.block_height_log2 {
            Some(exponent) => BlockHeight::from_log2(exponent)
                .ok_or(ConvertError::UnsupportedBlockHeight(exponent))?,
            None => {
                swizzle::block_height_mip0(height.div_ceil(block_dim.height.get() as usize))
            }
        };

        let offset = *self
            .mip_offsets
            .get(level as usize)
            .ok_or(ConvertError::InvalidMipLevel(level))? as usize;
        let source = self.image_data.get(offset..).unwrap_or(&[]);

        Ok(swizzle::deswizzle_surface(
            width,
            height,
            block_dim,
            format.bytes_per_block(),
            self.tile_mode,
            block_height,
            self.alignment.max(1) as usize,
            source,
        ))
    }
}

/// The base format family selected by the high byte of a format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    R8,
    R5G6B5,
    R8G8,
    R8G8B8A8,
    Bc1,
    Bc2,
    Bc3,
    Bc4,
    Bc5,
    Bc6,
    Bc7,
    Astc4x4,
    Astc5x4,
    Astc5x5,
    Astc6x5,
    Astc6x6,
    Astc8x5,
    Astc8x6,
    Astc8x8,
    Astc10x5,
    Astc10x6,
    Astc10x8,
    Astc10x10,
    Astc12x10,
    Astc12x12,
}

/// The numeric encoding variant selected by the low byte of a format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVariant {
    Unorm,
    Snorm,
    Srgb,
}

/// How downstream logic should treat a format family's blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    /// One block is one pixel.
    Raw,
    /// Fixed ratio 4x4 pixel compressed blocks.
    Bcn,
    /// Adaptive compressed blocks with per family pixel dimensions.
    Astc,
}

/// A recognized pixel format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageFormat {
    family: FormatFamily,
    variant: FormatVariant,
}

impl FormatFamily {
    fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x02 => Some(FormatFamily::R8),
            0x07 => Some(FormatFamily::R5G6B5),
            0x09 => Some(FormatFamily::R8G8),
            0x0b => Some(FormatFamily::R8G8B8A8),
            0x1a => Some(FormatFamily::Bc1),
            0x1b => Some(FormatFamily::Bc2),
            0x1c => Some(FormatFamily::Bc3),
            0x1d => Some(FormatFamily::Bc4),
            0x1e => Some(FormatFamily::Bc5),
            0x1f => Some(FormatFamily::Bc6),
            0x20 => Some(FormatFamily::Bc7),
            0x2d => Some(FormatFamily::Astc4x4),
            0x2e => Some(FormatFamily::Astc5x4),
            0x2f => Some(FormatFamily::Astc5x5),
            0x30 => Some(FormatFamily::Astc6x5),
            0x31 => Some(FormatFamily::Astc6x6),
            0x32 => Some(FormatFamily::Astc8x5),
            0x33 => Some(FormatFamily::Astc8x6),
            0x34 => Some(FormatFamily::Astc8x8),
            0x35 => Some(FormatFamily::Astc10x5),
            0x36 => Some(FormatFamily::Astc10x6),
            0x37 => Some(FormatFamily::Astc10x8),
            0x38 => Some(FormatFamily::Astc10x10),
            0x39 => Some(FormatFamily::Astc12x10),
            0x3a => Some(FormatFamily::Astc12x12),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            FormatFamily::R8 => 0x02,
            FormatFamily::R5G6B5 => 0x07,
            FormatFamily::R8G8 => 0x09,
            FormatFamily::R8G8B8A8 => 0x0b,
            FormatFamily::Bc1 => 0x1a,
            FormatFamily::Bc2 => 0x1b,
            FormatFamily::Bc3 => 0x1c,
            FormatFamily::Bc4 => 0x1d,
            FormatFamily::Bc5 => 0x1e,
            FormatFamily::Bc6 => 0x1f,
            FormatFamily::Bc7 => 0x20,
            FormatFamily::Astc4x4 => 0x2d,
            FormatFamily::Astc5x4 => 0x2e,
            FormatFamily::Astc5x5 => 0x2f,
            FormatFamily::Astc6x5 => 0x30,
            FormatFamily::Astc6x6 => 0x31,
            FormatFamily::Astc8x5 => 0x32,
            FormatFamily::Astc8x6 => 0x33,
            FormatFamily::Astc8x8 => 0x34,
            FormatFamily::Astc10x5 => 0x35,
            FormatFamily::Astc10x6 => 0x36,
            FormatFamily::Astc10x8 => 0x37,
            FormatFamily::Astc10x10 => 0x38,
            FormatFamily::Astc12x10 => 0x39,
            FormatFamily::Astc12x12 => 0x3a,
        }
    }

    pub fn kind(&self) -> FormatKind {
        match self {
            FormatFamily::R8
            | FormatFamily::R5G6B5
            | FormatFamily::R8G8
            | FormatFamily::R8G8B8A8 => FormatKind::Raw,
            FormatFamily::Bc1
            | FormatFamily::Bc2
            | FormatFamily::Bc3
            | FormatFamily::Bc4
            | FormatFamily::Bc5
            | FormatFamily::Bc6
            | FormatFamily::Bc7 => FormatKind::Bcn,
            _ => FormatKind::Astc,
        }
    }

    pub fn bytes_per_block(&self) -> usize {
        match self {
            FormatFamily::R8 => 1,
            FormatFamily::R5G6B5 => 2,
            FormatFamily::R8G8 => 2,
            FormatFamily::R8G8B8A8 => 4,
            FormatFamily::Bc1 => 8,
            FormatFamily::Bc4 => 8,
            _ => 16,
        }
    }

    pub fn block_dim(&self) -> BlockDim {
        match self {
            FormatFamily::Astc4x4 => BlockDim::new(4, 4),
            FormatFamily::Astc5x4 => BlockDim::new(5, 4),
            FormatFamily::Astc5x5 => BlockDim::new(5, 5),
            FormatFamily::Astc6x5 => BlockDim::new(6, 5),
            FormatFamily::Astc6x6 => BlockDim::new(6, 6),
            FormatFamily::Astc8x5 => BlockDim::new(8, 5),
            FormatFamily::Astc8x6 => BlockDim::new(8, 6),
            FormatFamily::Astc8x8 => BlockDim::new(8, 8),
            FormatFamily::Astc10x5 => BlockDim::new(10, 5),
            FormatFamily::Astc10x6 => BlockDim::new(10, 6),
            FormatFamily::Astc10x8 => BlockDim::new(10, 8),
            FormatFamily::Astc10x10 => BlockDim::new(10, 10),
            FormatFamily::Astc12x10 => BlockDim::new(12, 10),
            FormatFamily::Astc12x12 => BlockDim::new(12, 12),
            _ if self.kind() == FormatKind::Bcn => BlockDim::block_4x4(),
            _ => BlockDim::uncompressed(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FormatFamily::R8 => "R8",
            FormatFamily::R5G6B5 => "R5_G6_B5",
            FormatFamily::R8G8 => "R8_G8",
            FormatFamily::R8G8B8A8 => "R8_G8_B8_A8",
            FormatFamily::Bc1 => "BC1",
            FormatFamily::Bc2 => "BC2",
            FormatFamily::Bc3 => "BC3",
            FormatFamily::Bc4 => "BC4",
            FormatFamily::Bc5 => "BC5",
            FormatFamily::Bc6 => "BC6H",
            FormatFamily::Bc7 => "BC7",
            FormatFamily::Astc4x4 => "ASTC4x4",
            FormatFamily::Astc5x4 => "ASTC5x4",
            FormatFamily::Astc5x5 => "ASTC5x5",
            FormatFamily::Astc6x5 => "ASTC6x5",
            FormatFamily::Astc6x6 => "ASTC6x6",
            FormatFamily::Astc8x5 => "ASTC8x5",
            FormatFamily::Astc8x6 => "ASTC8x6",
            FormatFamily::Astc8x8 => "ASTC8x8",
            FormatFamily::Astc10x5 => "ASTC10x5",
            FormatFamily::Astc10x6 => "ASTC10x6",
            FormatFamily::Astc10x8 => "ASTC10x8",
            FormatFamily::Astc10x10 => "ASTC10x10",
            FormatFamily::Astc12x10 => "ASTC12x10",
            FormatFamily::Astc12x12 => "ASTC12x12",
        }
    }
}

impl FormatVariant {
    fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(FormatVariant::Unorm),
            0x02 => Some(FormatVariant::Snorm),
            0x06 => Some(FormatVariant::Srgb),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            FormatVariant::Unorm => 0x01,
            FormatVariant::Snorm => 0x02,
            FormatVariant::Srgb => 0x06,
        }
    }
}

impl ImageFormat {
    /// Look up a format code, accepting only the family and variant
    /// combinations the format actually uses.
    pub fn from_code(code: u32) -> Option<Self> {
        if code > 0xFFFF {
            return None;
        }
        let family = FormatFamily::from_byte((code >> 8) as u8)?;
        let variant = FormatVariant::from_byte(code as u8)?;

        use FormatFamily as F;
        use FormatVariant as V;
        let valid = match (family, variant) {
            (F::R8G8B8A8, V::Unorm | V::Srgb) => true,
            (F::R8 | F::R5G6B5 | F::R8G8, V::Unorm) => true,
            (F::Bc1 | F::Bc2 | F::Bc3 | F::Bc7, V::Unorm | V::Srgb) => true,
            (F::Bc4 | F::Bc5 | F::Bc6, V::Unorm | V::Snorm) => true,
            (family, V::Unorm | V::Srgb) if family.kind() == FormatKind::Astc => true,
            _ => false,
        };
        valid.then_some(ImageFormat { family, variant })
    }

    pub fn code(&self) -> u32 {
        ((self.family.to_byte() as u32) << 8) | self.variant.to_byte() as u32
    }

    pub fn family(&self) -> FormatFamily {
        self.family
    }

    pub fn variant(&self) -> FormatVariant {
        self.variant
    }

    pub fn bytes_per_block(&self) -> usize {
        self.family.bytes_per_block()
    }

    pub fn block_dim(&self) -> BlockDim {
        self.family.block_dim()
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = match (self.family, self.variant) {
            (FormatFamily::Bc6, FormatVariant::Unorm) => "_UF16",
            (FormatFamily::Bc6, FormatVariant::Snorm) => "_SF16",
            (_, FormatVariant::Unorm) => "_UNORM",
            (_, FormatVariant::Snorm) => "_SNORM",
            (_, FormatVariant::Srgb) => "_SRGB",
        };
        write!(f, "{}{suffix}", self.family.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Offsets within the synthetic container built by TestFile.
    const HEADER_SIZE: u64 = 0x20;
    const INDEX_SIZE: u64 = 0x24;

    /// Builds a minimal single texture container for parser tests.
    struct TestFile {
        revision: u16,
        big_endian: bool,
        format: u32,
        width: u32,
        height: u32,
        layer_count: u32,
        tile_mode: u16,
        texture_layout: u32,
        comp_sel: u32,
        mip_count: u16,
        /// Extra bytes between consecutive mip pointers.
        mip_stride: u64,
        image_data: Vec<u8>,
    }

    impl TestFile {
        fn rgba_2x2() -> Self {
            // Pitch linear 2x2 R8G8B8A8 with rows at the 32 byte pitch.
            let mut image_data = vec![0u8; 64];
            image_data[0..8].copy_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);
            image_data[32..40].copy_from_slice(&[8, 9, 10, 11, 12, 13, 14, 15]);
            TestFile {
                revision: 0x0400,
                big_endian: false,
                format: 0x0b01,
                width: 2,
                height: 2,
                layer_count: 1,
                tile_mode: 1,
                texture_layout: 0,
                comp_sel: 0x05040302,
                mip_count: 1,
                mip_stride: 0x40,
                image_data,
            }
        }

        fn build(&self) -> Vec<u8> {
            let e = self.big_endian;
            fn put16(out: &mut Vec<u8>, v: u16, be: bool) {
                out.extend_from_slice(&if be { v.to_be_bytes() } else { v.to_le_bytes() });
            }
            fn put32(out: &mut Vec<u8>, v: u32, be: bool) {
                out.extend_from_slice(&if be { v.to_be_bytes() } else { v.to_le_bytes() });
            }
            fn put64(out: &mut Vec<u8>, v: u64, be: bool) {
                out.extend_from_slice(&if be { v.to_be_bytes() } else { v.to_le_bytes() });
            }

            let ptr_table_addr = HEADER_SIZE + INDEX_SIZE; // 0x44
            let descriptor_addr = ptr_table_addr + 8; // 0x4c
            let name_addr = descriptor_addr + 0x78; // 0xc4
            let file_name_addr = name_addr + 6; // length prefix + "tex" + nul
            let mip_ptrs_addr = file_name_addr + 8;
            let data_addr = mip_ptrs_addr + self.mip_count as u64 * 8;

            let mut out = Vec::new();
            // Container header.
            out.extend_from_slice(b"BNTX\0\0\0\0");
            put32(&mut out, 0x000c0008, e);
            out.extend_from_slice(if e { &[0xFE, 0xFF] } else { &[0xFF, 0xFE] });
            put16(&mut out, self.revision, e);
            put32(&mut out, file_name_addr as u32, e);
            put16(&mut out, 0, e);
            put16(&mut out, 0, e);
            put32(&mut out, 0, e);
            put32(&mut out, 0, e);
            assert_eq!(HEADER_SIZE as usize, out.len());

            // Texture index.
            out.extend_from_slice(b"NX  ");
            put32(&mut out, 1, e);
            put64(&mut out, ptr_table_addr, e);
            put64(&mut out, 0, e);
            put64(&mut out, 0, e);
            put32(&mut out, 0, e);
            assert_eq!((HEADER_SIZE + INDEX_SIZE) as usize, out.len());

            put64(&mut out, descriptor_addr, e);

            // BRTI descriptor.
            out.extend_from_slice(b"BRTI");
            put32(&mut out, 0x78, e);
            put64(&mut out, 0x78, e);
            out.push(0); // flags
            out.push(1); // dim
            put16(&mut out, self.tile_mode, e);
            put16(&mut out, 0, e); // swizzle
            put16(&mut out, self.mip_count, e);
            put16(&mut out, 1, e); // sample count
            put16(&mut out, 0, e);
            put32(&mut out, self.format, e);
            put32(&mut out, 0, e); // access flags
            put32(&mut out, self.width, e);
            put32(&mut out, self.height, e);
            put32(&mut out, 1, e); // depth
            put32(&mut out, self.layer_count, e);
            put32(&mut out, self.texture_layout, e);
            put32(&mut out, 0, e);
            out.extend_from_slice(&[0u8; 20]);
            put32(&mut out, self.image_data.len() as u32, e);
            put32(&mut out, 512, e); // alignment
            put32(&mut out, self.comp_sel, e);
            put32(&mut out, 1, e); // dimension: 2D
            put64(&mut out, name_addr, e);
            put64(&mut out, 0, e);
            put64(&mut out, mip_ptrs_addr, e);
            assert_eq!(descriptor_addr as usize + 0x78, out.len());

            // Length prefixed name then the nul terminated file name.
            put16(&mut out, 3, e);
            out.extend_from_slice(b"tex\0");
            out.extend_from_slice(b"texfile\0");

            for level in 0..self.mip_count as u64 {
                put64(&mut out, data_addr + level * self.mip_stride, e);
            }
            out.extend_from_slice(&self.image_data);
            out
        }
    }

    #[test]
    fn read_single_texture_container() {
        let bntx = Bntx::from_bytes(TestFile::rgba_2x2().build()).unwrap();

        assert_eq!("texfile", bntx.file_name);
        assert_eq!(SchemaVersion::Modern, bntx.schema);
        assert_eq!(1, bntx.textures.len());

        let texture = &bntx.textures[0];
        assert_eq!("tex", texture.name);
        assert_eq!(0x0b01, texture.format_code);
        assert_eq!((2, 2), (texture.width, texture.height));
        assert_eq!(1, texture.layer_count);
        assert_eq!(TileMode::Pitch, texture.tile_mode);
        assert_eq!(Some(0), texture.block_height_log2);
        assert_eq!([2, 3, 4, 5], texture.component_selector);
        assert_eq!(Some(TextureDimension::D2), texture.dimension());
        assert_eq!(vec![0], texture.mip_offsets);
        assert_eq!(64, texture.image_data.len());
    }

    #[test]
    fn read_big_endian_container() {
        let mut file = TestFile::rgba_2x2();
        file.big_endian = true;
        let bntx = Bntx::from_bytes(file.build()).unwrap();

        let texture = &bntx.textures[0];
        assert_eq!("tex", texture.name);
        assert_eq!(0x0b01, texture.format_code);
        assert_eq!((2, 2), (texture.width, texture.height));
    }

    #[test]
    fn deswizzle_pitch_linear_identity() {
        // Row 1 is read at the 32 byte pitch, so the linear image
        // is the identity permutation of the logical bytes.
        let bntx = Bntx::from_bytes(TestFile::rgba_2x2().build()).unwrap();
        let linear = bntx.textures[0].deswizzled_image_data().unwrap();

        let expected: Vec<u8> = (0..16).collect();
        assert_eq!(expected, linear);
    }

    #[test]
    fn invalid_byte_order_mark_fails() {
        let mut data = TestFile::rgba_2x2().build();
        data[0xC] = 0x00;
        data[0xD] = 0x00;
        assert!(matches!(
            Bntx::from_bytes(data),
            Err(DecodeError::InvalidByteOrder([0, 0]))
        ));
    }

    #[test]
    fn invalid_signature_fails() {
        let mut data = TestFile::rgba_2x2().build();
        data[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            Bntx::from_bytes(data),
            Err(DecodeError::InvalidSignature)
        ));
    }

    #[test]
    fn signature_padding_bytes_are_not_validated() {
        let mut data = TestFile::rgba_2x2().build();
        data[4..8].copy_from_slice(b"\x01\x02\x03\x04");
        assert!(Bntx::from_bytes(data).is_ok());
    }

    #[test]
    fn truncated_image_data_fails() {
        let mut data = TestFile::rgba_2x2().build();
        data.truncate(data.len() - 8);
        assert!(matches!(
            Bntx::from_bytes(data),
            Err(DecodeError::Io(_) | DecodeError::Binrw(_))
        ));
    }

    #[test]
    fn unsupported_format_is_parsed_but_not_converted() {
        let mut file = TestFile::rgba_2x2();
        file.format = 0x9999;
        let bntx = Bntx::from_bytes(file.build()).unwrap();

        let texture = &bntx.textures[0];
        assert!(texture.image_format().is_none());
        assert!(matches!(
            texture.deswizzled_image_data(),
            Err(ConvertError::UnsupportedFormat(0x9999))
        ));
    }

    #[test]
    fn cubemap_faces_are_parsed_but_not_converted() {
        let mut file = TestFile::rgba_2x2();
        file.layer_count = 2;
        let bntx = Bntx::from_bytes(file.build()).unwrap();

        let texture = &bntx.textures[0];
        assert_eq!(2, texture.layer_count);
        let error = texture.deswizzled_image_data().unwrap_err();
        assert!(matches!(error, ConvertError::UnsupportedFaceCount(2)));
        assert_eq!("unsupported number of faces 2", error.to_string());
    }

    #[test]
    fn out_of_range_block_height_is_rejected() {
        let mut file = TestFile::rgba_2x2();
        file.tile_mode = 0;
        file.texture_layout = 6;
        let bntx = Bntx::from_bytes(file.build()).unwrap();
        assert!(matches!(
            bntx.textures[0].deswizzled_image_data(),
            Err(ConvertError::UnsupportedBlockHeight(6))
        ));
    }

    #[test]
    fn legacy_revision_selects_legacy_schema() {
        let mut file = TestFile::rgba_2x2();
        file.revision = 0x0001;
        // Zero valued selector bytes fall back to the mirrored identity.
        file.comp_sel = 0x00000300;
        let bntx = Bntx::from_bytes(file.build()).unwrap();

        assert_eq!(SchemaVersion::Legacy, bntx.schema);
        let texture = &bntx.textures[0];
        assert_eq!([5, 3, 3, 2], texture.component_selector);
        // Legacy records derive the block height instead of storing it.
        assert_eq!(None, texture.block_height_log2);
        assert!(texture.deswizzled_image_data().is_ok());
    }

    #[test]
    fn modern_selector_bytes_are_taken_as_stored() {
        let mut file = TestFile::rgba_2x2();
        file.comp_sel = 0x00010203;
        let bntx = Bntx::from_bytes(file.build()).unwrap();
        assert_eq!([3, 2, 1, 0], bntx.textures[0].component_selector);
    }

    #[test]
    fn mip_offsets_are_relative_to_the_base_pointer() {
        let mut file = TestFile::rgba_2x2();
        file.width = 4;
        file.height = 4;
        file.mip_count = 2;
        file.mip_stride = 0x40;
        file.image_data = vec![0u8; 0x80];
        let bntx = Bntx::from_bytes(file.build()).unwrap();

        let texture = &bntx.textures[0];
        assert_eq!(2, texture.mipmap_count);
        assert_eq!(vec![0, 0x40], texture.mip_offsets);
        // Mip 1 halves the dimensions and reads past the base offset.
        assert_eq!(16, texture.deswizzled_mip(1).unwrap().len());
        assert!(matches!(
            texture.deswizzled_mip(2),
            Err(ConvertError::InvalidMipLevel(2))
        ));
    }

    #[test]
    fn format_table_lookups() {
        let bc1 = ImageFormat::from_code(0x1a01).unwrap();
        assert_eq!(8, bc1.bytes_per_block());
        assert_eq!(4, bc1.block_dim().width.get());
        assert_eq!(4, bc1.block_dim().height.get());
        assert_eq!(FormatKind::Bcn, bc1.family().kind());
        assert_eq!("BC1_UNORM", bc1.to_string());

        let astc = ImageFormat::from_code(0x3a01).unwrap();
        assert_eq!(16, astc.bytes_per_block());
        assert_eq!(12, astc.block_dim().width.get());
        assert_eq!(12, astc.block_dim().height.get());
        assert_eq!(FormatKind::Astc, astc.family().kind());

        assert_eq!("BC6H_UF16", ImageFormat::from_code(0x1f01).unwrap().to_string());
        assert_eq!(0x0b06, ImageFormat::from_code(0x0b06).unwrap().code());

        // Variants a family never uses are rejected.
        assert!(ImageFormat::from_code(0x1a02).is_none());
        assert!(ImageFormat::from_code(0x0702).is_none());
        assert!(ImageFormat::from_code(0x9999).is_none());
        assert!(ImageFormat::from_code(0x10b01).is_none());
    }

    #[test]
    fn bounded_file_name_scan_stops_at_terminator() {
        let mut reader = Cursor::new(b"abc\0def".to_vec());
        assert_eq!("abc", read_terminated_string(&mut reader, 0).unwrap());

        // Without a terminator the whole scanned slice is returned.
        let mut reader = Cursor::new(b"abcdef".to_vec());
        assert_eq!("abcdef", read_terminated_string(&mut reader, 0).unwrap());
    }
}
