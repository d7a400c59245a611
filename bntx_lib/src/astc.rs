//! ASTC file serialization for decoded textures.
//!
//! The `.astc` container is a 16 byte header followed by the compressed
//! blocks in row-major order. Dimensions are stored as 3 byte little endian
//! integers regardless of the source container's byte order.
use thiserror::Error;

use crate::bntx::{ConvertError, FormatKind, Texture};

pub const ASTC_MAGIC: [u8; 4] = [0x13, 0xAB, 0xA1, 0x5C];

#[derive(Debug, Error)]
pub enum CreateAstcError {
    #[error("texture cannot be converted: {0}")]
    Convert(#[from] ConvertError),

    #[error("format {0:#06x} is not an ASTC format")]
    NotAstc(u32),
}

/// Deswizzles the base mip level and serializes it as an `.astc` file.
pub fn create_astc(texture: &Texture) -> Result<Vec<u8>, CreateAstcError> {
    let format = texture
        .image_format()
        .ok_or(ConvertError::UnsupportedFormat(texture.format_code))?;
    if format.family().kind() != FormatKind::Astc {
        return Err(CreateAstcError::NotAstc(format.code()));
    }

    let data = texture.deswizzled_image_data()?;
    let block_dim = format.block_dim();

    let mut out = Vec::with_capacity(16 + data.len());
    out.extend_from_slice(&ASTC_MAGIC);
    out.push(block_dim.width.get() as u8);
    out.push(block_dim.height.get() as u8);
    out.push(1);
    out.extend_from_slice(&u24_le(texture.width));
    out.extend_from_slice(&u24_le(texture.height));
    out.extend_from_slice(&u24_le(1));
    out.extend_from_slice(&data);
    Ok(out)
}

fn u24_le(value: u32) -> [u8; 3] {
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}
