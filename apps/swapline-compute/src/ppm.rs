//! Binary PPM output of packed pixels.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::error::{ParameterError, ParameterErrorKind};
use image::{ExtendedColorType, ImageEncoder, ImageError};

/// Split a packed `0xRRGGBBAA` pixel into RGB bytes.
pub fn unpack_rgb(pixel: u32) -> [u8; 3] {
    let [r, g, b, _a] = pixel.to_be_bytes();
    [r, g, b]
}

/// Encode packed pixels as a `P6` pixmap.
pub fn encode_ppm<W: Write>(
    writer: W,
    pixels: &[u32],
    width: u32,
    height: u32,
) -> image::ImageResult<()> {
    if pixels.len() as u64 != u64::from(width) * u64::from(height) {
        return Err(ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        )));
    }
    let rgb: Vec<u8> = pixels.iter().flat_map(|&p| unpack_rgb(p)).collect();
    PnmEncoder::new(writer)
        .with_subtype(PnmSubtype::Pixmap(SampleEncoding::Binary))
        .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
}

/// Write packed pixels to `path` as a binary PPM.
pub fn save_ppm(path: &Path, pixels: &[u32], width: u32, height: u32) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    encode_ppm(&mut writer, pixels, width, height)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_drops_alpha() {
        assert_eq!(unpack_rgb(0x1122_33FF), [0x11, 0x22, 0x33]);
        assert_eq!(unpack_rgb(0xFF00_0000), [0xFF, 0, 0]);
    }

    #[test]
    fn encodes_binary_pixmap() {
        let mut out = Vec::new();
        encode_ppm(&mut out, &[0xFF00_00FF, 0x00FF_00FF], 2, 1).unwrap();

        assert!(out.starts_with(b"P6"));
        assert!(out.ends_with(&[0xFF, 0, 0, 0, 0xFF, 0]));
    }

    #[test]
    fn rejects_short_pixel_data() {
        let mut out = Vec::new();
        assert!(encode_ppm(&mut out, &[0xFF00_00FF], 2, 2).is_err());
    }
}
