//! Image encoding: `DynamicImage` → PNG bytes, plus base64 helpers.
//!
//! Every image that leaves the pipeline is PNG. Embedded images come out of
//! the parser as raw bitmaps and canvas output needs an alpha channel for the
//! transparent padding, which JPEG cannot carry.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::{Cursor, Seek, Write};
use tracing::debug;

/// Encode an image as PNG into any seekable writer.
pub fn encode_png_into<W: Write + Seek>(
    img: &DynamicImage,
    out: &mut W,
) -> Result<(), image::ImageError> {
    img.write_to(out, ImageFormat::Png)
}

/// Encode an image as PNG into a fresh `Vec`.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    encode_png_into(img, &mut Cursor::new(&mut buf))?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn to_data_uri(bytes: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", mime_type(format), to_base64(bytes))
}

/// MIME type for the formats the pipeline produces.
pub fn mime_type(format: ImageFormat) -> &'static str {
    format.to_mime_type()
}

/// File extension (without the dot) for an image format.
pub fn extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("bin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[..4], b"\x89PNG");
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (10, 10));
    }

    #[test]
    fn data_uri_prefix() {
        let uri = to_data_uri(b"abc", ImageFormat::Png);
        assert_eq!(uri, "data:image/png;base64,YWJj");
    }

    #[test]
    fn extensions() {
        assert_eq!(extension(ImageFormat::Png), "png");
        assert_eq!(extension(ImageFormat::Jpeg), "jpg");
    }
}
