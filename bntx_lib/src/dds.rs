//! Direct Draw Surface serialization for decoded textures.
//!
//! The classic 128 byte header covers the uncompressed formats and BC1-BC3.
//! BC4-BC7 use the `DX10` FourCC with an extension header naming the DXGI
//! format. ASTC textures are not representable in DDS and use the
//! [astc](crate::astc) container instead.
use std::io::Cursor;

use binrw::{BinWrite, BinWriterExt};
use thiserror::Error;

use crate::bntx::{ConvertError, FormatFamily, FormatKind, FormatVariant, ImageFormat, Texture};

const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PITCH: u32 = 0x8;
const DDSD_PIXELFORMAT: u32 = 0x1000;
const DDSD_MIPMAPCOUNT: u32 = 0x20000;
const DDSD_LINEARSIZE: u32 = 0x80000;

const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDPF_ALPHA: u32 = 0x2;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;
const DDPF_LUMINANCE: u32 = 0x20000;

const DDSCAPS_TEXTURE: u32 = 0x1000;
const DDSCAPS_COMPLEX: u32 = 0x8;
const DDSCAPS_MIPMAP: u32 = 0x400000;

#[derive(Debug, Error)]
pub enum CreateDdsError {
    #[error("texture cannot be converted: {0}")]
    Convert(#[from] ConvertError),

    #[error("ASTC format {0:#06x} is not representable in DDS")]
    AstcFormat(u32),

    #[error("error writing DDS data: {0}")]
    Binrw(#[from] binrw::Error),
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
#[bw(magic = b"DDS ")]
struct DdsHeader {
    size: u32,
    flags: u32,
    height: u32,
    width: u32,
    pitch_or_linear_size: u32,
    depth: u32,
    mipmap_count: u32,
    reserved1: [u32; 11],
    pixel_format: DdsPixelFormat,
    caps: u32,
    caps2: u32,
    caps3: u32,
    caps4: u32,
    reserved2: u32,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
struct DdsPixelFormat {
    size: u32,
    flags: u32,
    four_cc: [u8; 4],
    rgb_bit_count: u32,
    r_mask: u32,
    g_mask: u32,
    b_mask: u32,
    a_mask: u32,
}

#[derive(BinWrite, Debug, Clone, PartialEq, Eq)]
struct Dx10Header {
    dxgi_format: u32,
    resource_dimension: u32,
    misc_flag: u32,
    array_size: u32,
    misc_flags2: u32,
}

/// Deswizzles the base mip level and serializes it as a DDS file.
pub fn create_dds(texture: &Texture) -> Result<Vec<u8>, CreateDdsError> {
    let format = texture
        .image_format()
        .ok_or(ConvertError::UnsupportedFormat(texture.format_code))?;
    if format.family().kind() == FormatKind::Astc {
        return Err(CreateDdsError::AstcFormat(format.code()));
    }

    let data = texture.deswizzled_image_data()?;
    let (header, dx10) = dds_header(
        format,
        texture.width,
        texture.height,
        texture.component_selector,
        data.len() as u32,
        1,
    );

    let mut writer = Cursor::new(Vec::new());
    writer.write_le(&header)?;
    if let Some(dx10) = dx10 {
        writer.write_le(&dx10)?;
    }
    writer.write_le(&data)?;
    Ok(writer.into_inner())
}

fn dds_header(
    format: ImageFormat,
    width: u32,
    height: u32,
    component_selector: [u8; 4],
    data_size: u32,
    mipmap_count: u32,
) -> (DdsHeader, Option<Dx10Header>) {
    let mut flags = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT;
    let mut caps = DDSCAPS_TEXTURE;
    if mipmap_count > 1 {
        flags |= DDSD_MIPMAPCOUNT;
        caps |= DDSCAPS_COMPLEX | DDSCAPS_MIPMAP;
    }

    let (pixel_format, dx10, pitch_or_linear_size) = match format.family().kind() {
        FormatKind::Raw => {
            flags |= DDSD_PITCH;
            let (pixel_format, bytes_per_pixel) = raw_pixel_format(format, component_selector);
            (pixel_format, None, width * bytes_per_pixel)
        }
        _ => {
            flags |= DDSD_LINEARSIZE;
            let (four_cc, dx10) = compressed_four_cc(format);
            let pixel_format = DdsPixelFormat {
                size: 32,
                flags: DDPF_FOURCC,
                four_cc,
                rgb_bit_count: 0,
                r_mask: 0,
                g_mask: 0,
                b_mask: 0,
                a_mask: 0,
            };
            (pixel_format, dx10, data_size)
        }
    };

    let header = DdsHeader {
        size: 124,
        flags,
        height,
        width,
        pitch_or_linear_size,
        depth: 0,
        mipmap_count: mipmap_count.max(1),
        reserved1: [0; 11],
        pixel_format,
        caps,
        caps2: 0,
        caps3: 0,
        caps4: 0,
        reserved2: 0,
    };
    (header, dx10)
}

fn raw_pixel_format(format: ImageFormat, component_selector: [u8; 4]) -> (DdsPixelFormat, u32) {
    // Masks indexed by the channel source values 0..=5.
    let (masks, bytes_per_pixel, luminance, mut has_alpha): ([u32; 6], u32, bool, bool) =
        match format.family() {
            FormatFamily::R8G8B8A8 => (
                [0, 0, 0x000000ff, 0x0000ff00, 0x00ff0000, 0xff000000],
                4,
                false,
                true,
            ),
            FormatFamily::R5G6B5 => ([0, 0, 0xf800, 0x07e0, 0x001f, 0], 2, false, false),
            FormatFamily::R8 => (
                [0, 0, 0xff, 0, 0, 0],
                1,
                true,
                component_selector[3] == 2,
            ),
            FormatFamily::R8G8 => ([0, 0, 0xff, 0xff00, 0, 0], 2, true, true),
            _ => unreachable!("raw pixel formats only"),
        };

    // An image is alpha only when no color channel reads red
    // but the alpha channel does.
    let alpha_only = component_selector[0] != 2
        && component_selector[1] != 2
        && component_selector[2] != 2
        && component_selector[3] == 2;

    let mut pf_flags = if alpha_only {
        has_alpha = false;
        DDPF_ALPHA
    } else if luminance {
        DDPF_LUMINANCE
    } else {
        DDPF_RGB
    };
    if has_alpha {
        pf_flags |= DDPF_ALPHAPIXELS;
    }

    let mask = |source: u8| masks.get(source as usize).copied().unwrap_or(0);

    (
        DdsPixelFormat {
            size: 32,
            flags: pf_flags,
            four_cc: [0; 4],
            rgb_bit_count: bytes_per_pixel * 8,
            r_mask: mask(component_selector[0]),
            g_mask: mask(component_selector[1]),
            b_mask: mask(component_selector[2]),
            a_mask: mask(component_selector[3]),
        },
        bytes_per_pixel,
    )
}

fn compressed_four_cc(format: ImageFormat) -> ([u8; 4], Option<Dx10Header>) {
    let dx10 = |dxgi_format| {
        Some(Dx10Header {
            dxgi_format,
            resource_dimension: 3,
            misc_flag: 0,
            array_size: 1,
            misc_flags2: 0,
        })
    };

    match (format.family(), format.variant()) {
        (FormatFamily::Bc1, _) => (*b"DXT1", None),
        (FormatFamily::Bc2, _) => (*b"DXT3", None),
        (FormatFamily::Bc3, _) => (*b"DXT5", None),
        (FormatFamily::Bc4, FormatVariant::Snorm) => (*b"DX10", dx10(81)),
        (FormatFamily::Bc4, _) => (*b"DX10", dx10(80)),
        (FormatFamily::Bc5, FormatVariant::Snorm) => (*b"DX10", dx10(84)),
        (FormatFamily::Bc5, _) => (*b"DX10", dx10(83)),
        (FormatFamily::Bc6, FormatVariant::Snorm) => (*b"DX10", dx10(96)),
        (FormatFamily::Bc6, _) => (*b"DX10", dx10(95)),
        (FormatFamily::Bc7, _) => (*b"DX10", dx10(98)),
        _ => unreachable!("compressed formats only"),
    }
}

#[cfg(test)]
mod tests {
    use hexlit::hex;

    use super::*;

    fn header_bytes(header: &DdsHeader, dx10: Option<&Dx10Header>) -> Vec<u8> {
        let mut writer = Cursor::new(Vec::new());
        writer.write_le(header).unwrap();
        if let Some(dx10) = dx10 {
            writer.write_le(dx10).unwrap();
        }
        writer.into_inner()
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn rgba8_classic_header() {
        let format = ImageFormat::from_code(0x0b01).unwrap();
        let (header, dx10) = dds_header(format, 2, 2, [2, 3, 4, 5], 16, 1);
        assert!(dx10.is_none());

        let bytes = header_bytes(&header, None);
        assert_eq!(128, bytes.len());
        assert_eq!(b"DDS ", &bytes[0..4]);
        assert_eq!(124, u32_at(&bytes, 4));
        // caps, height, width, pixelformat and pitch for uncompressed data.
        assert_eq!(0x100F, u32_at(&bytes, 8));
        assert_eq!(2, u32_at(&bytes, 12));
        assert_eq!(2, u32_at(&bytes, 16));
        assert_eq!(8, u32_at(&bytes, 20));
        assert_eq!(1, u32_at(&bytes, 28));
        assert_eq!(32, u32_at(&bytes, 76));
        assert_eq!(DDPF_RGB | DDPF_ALPHAPIXELS, u32_at(&bytes, 80));
        assert_eq!(32, u32_at(&bytes, 88));
        assert_eq!(0x000000ff, u32_at(&bytes, 92));
        assert_eq!(0x0000ff00, u32_at(&bytes, 96));
        assert_eq!(0x00ff0000, u32_at(&bytes, 100));
        assert_eq!(0xff000000, u32_at(&bytes, 104));
        assert_eq!(DDSCAPS_TEXTURE, u32_at(&bytes, 108));
    }

    #[test]
    fn swapped_selectors_swap_channel_masks() {
        // A BGRA selector moves the red mask to the blue byte.
        let format = ImageFormat::from_code(0x0b01).unwrap();
        let (header, _) = dds_header(format, 4, 4, [4, 3, 2, 5], 64, 1);
        assert_eq!(0x00ff0000, header.pixel_format.r_mask);
        assert_eq!(0x000000ff, header.pixel_format.b_mask);
    }

    #[test]
    fn alpha_only_r8_header() {
        // R8 sourcing only alpha from red is an alpha format without
        // the luminance or alpha pixels flags.
        let format = ImageFormat::from_code(0x0201).unwrap();
        let (header, _) = dds_header(format, 8, 8, [0, 0, 0, 2], 64, 1);
        assert_eq!(DDPF_ALPHA, header.pixel_format.flags);
        assert_eq!(8, header.pixel_format.rgb_bit_count);
    }

    #[test]
    fn r8_luminance_header() {
        let format = ImageFormat::from_code(0x0201).unwrap();
        let (header, _) = dds_header(format, 8, 8, [2, 2, 2, 5], 64, 1);
        assert_eq!(DDPF_LUMINANCE, header.pixel_format.flags);
        assert_eq!(0xff, header.pixel_format.r_mask);
    }

    #[test]
    fn bc1_classic_header() {
        let format = ImageFormat::from_code(0x1a01).unwrap();
        let (header, dx10) = dds_header(format, 64, 64, [2, 3, 4, 5], 2048, 1);
        assert!(dx10.is_none());

        let bytes = header_bytes(&header, None);
        assert_eq!(DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT | DDSD_LINEARSIZE,
            u32_at(&bytes, 8));
        assert_eq!(2048, u32_at(&bytes, 20));
        assert_eq!(DDPF_FOURCC, u32_at(&bytes, 80));
        assert_eq!(b"DXT1", &bytes[84..88]);
    }

    #[test]
    fn bc7_dx10_header() {
        let format = ImageFormat::from_code(0x2001).unwrap();
        let (header, dx10) = dds_header(format, 64, 64, [2, 3, 4, 5], 4096, 1);

        let bytes = header_bytes(&header, dx10.as_ref());
        assert_eq!(148, bytes.len());
        assert_eq!(b"DX10", &bytes[84..88]);
        assert_eq!(98, u32_at(&bytes, 128));
        assert_eq!(3, u32_at(&bytes, 132));
        assert_eq!(1, u32_at(&bytes, 140));
    }

    #[test]
    fn bc4_extension_header_bytes() {
        let format = ImageFormat::from_code(0x1d01).unwrap();
        let (_, dx10) = dds_header(format, 4, 4, [2, 3, 4, 5], 8, 1);

        let mut writer = Cursor::new(Vec::new());
        writer.write_le(&dx10.unwrap()).unwrap();
        assert_eq!(
            hex!("50000000 03000000 00000000 01000000 00000000"),
            writer.into_inner()[..]
        );
    }

    #[test]
    fn bc4_and_bc5_variants_pick_dxgi_formats() {
        let dxgi = |code| {
            let format = ImageFormat::from_code(code).unwrap();
            let (_, dx10) = dds_header(format, 4, 4, [2, 3, 4, 5], 16, 1);
            dx10.unwrap().dxgi_format
        };
        assert_eq!(80, dxgi(0x1d01));
        assert_eq!(81, dxgi(0x1d02));
        assert_eq!(83, dxgi(0x1e01));
        assert_eq!(84, dxgi(0x1e02));
        assert_eq!(95, dxgi(0x1f01));
        assert_eq!(96, dxgi(0x1f02));
    }

    #[test]
    fn create_dds_rejects_astc_and_unknown_codes() {
        let mut texture = Texture {
            name: "a".into(),
            format_code: 0x2d01,
            width: 4,
            height: 4,
            depth: 1,
            mipmap_count: 1,
            layer_count: 1,
            tile_mode: crate::swizzle::TileMode::Pitch,
            block_height_log2: Some(0),
            alignment: 512,
            component_selector: [2, 3, 4, 5],
            image_dimension: 1,
            mip_offsets: vec![0],
            image_data: vec![0; 32],
        };
        assert!(matches!(
            create_dds(&texture),
            Err(CreateDdsError::AstcFormat(0x2d01))
        ));

        texture.format_code = 0x9999;
        assert!(matches!(
            create_dds(&texture),
            Err(CreateDdsError::Convert(ConvertError::UnsupportedFormat(
                0x9999
            )))
        ));
    }
}
