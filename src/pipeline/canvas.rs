//! Canvas transform: scale an image onto a fixed-size transparent canvas.
//!
//! All images in one archive come out at exactly the requested size. In
//! [`AspectMode::Fit`] the source keeps its proportions and is centred with
//! transparent bars on the unused axis; in [`AspectMode::Stretch`] it is
//! scaled to fill the canvas exactly.

use crate::config::{AspectMode, CanvasRequest};
use crate::error::ItemError;
use crate::pipeline::encode;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::{Seek, Write};

/// Size of the scaled source image for a `src_w × src_h` input.
///
/// Fit never exceeds the canvas on either axis and never collapses an axis
/// to zero; Stretch always returns the canvas size.
pub fn fit_dimensions(src_w: u32, src_h: u32, request: &CanvasRequest) -> (u32, u32) {
    let (cw, ch) = (request.width(), request.height());
    match request.mode() {
        AspectMode::Stretch => (cw, ch),
        AspectMode::Fit => {
            if src_w == 0 || src_h == 0 {
                return (cw, ch);
            }
            let scale = f64::min(cw as f64 / src_w as f64, ch as f64 / src_h as f64);
            let w = (src_w as f64 * scale).round() as u32;
            let h = (src_h as f64 * scale).round() as u32;
            (w.clamp(1, cw), h.clamp(1, ch))
        }
    }
}

/// Top-left position that centres a `scaled_w × scaled_h` image on the canvas.
pub fn centering_offset(scaled_w: u32, scaled_h: u32, request: &CanvasRequest) -> (u32, u32) {
    (
        request.width().saturating_sub(scaled_w) / 2,
        request.height().saturating_sub(scaled_h) / 2,
    )
}

/// Resize `img` and draw it centred on a transparent canvas.
pub fn apply_canvas(img: &DynamicImage, request: &CanvasRequest) -> RgbaImage {
    let (w, h) = fit_dimensions(img.width(), img.height(), request);
    let scaled = img.resize_exact(w, h, FilterType::CatmullRom).to_rgba8();

    let mut canvas = RgbaImage::from_pixel(request.width(), request.height(), Rgba([0, 0, 0, 0]));
    let (x, y) = centering_offset(w, h, request);
    imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
    canvas
}

/// Decode `bytes`, apply the canvas and write the result as PNG into `out`.
pub fn transform_into<W: Write + Seek>(
    index: usize,
    bytes: &[u8],
    request: &CanvasRequest,
    out: &mut W,
) -> Result<(), ItemError> {
    let img = image::load_from_memory(bytes).map_err(|e| ItemError::DecodeFailed {
        index,
        detail: e.to_string(),
    })?;

    let canvas = DynamicImage::ImageRgba8(apply_canvas(&img, request));

    encode::encode_png_into(&canvas, out).map_err(|e| ItemError::EncodeFailed {
        index,
        detail: e.to_string(),
    })
}

/// [`transform_into`] returning a fresh PNG `Vec`.
pub fn transform_bytes(index: usize, bytes: &[u8], request: &CanvasRequest) -> Result<Vec<u8>, ItemError> {
    let mut out = std::io::Cursor::new(Vec::new());
    transform_into(index, bytes, request, &mut out)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas(w: u32, h: u32, mode: AspectMode) -> CanvasRequest {
        CanvasRequest::new(w, h, mode).unwrap()
    }

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 255])))
    }

    #[test]
    fn wide_image_is_letterboxed() {
        let req = canvas(640, 480, AspectMode::Fit);
        assert_eq!(fit_dimensions(100, 50, &req), (640, 320));
        assert_eq!(centering_offset(640, 320, &req), (0, 80));
    }

    #[test]
    fn tall_image_is_pillarboxed() {
        let req = canvas(640, 480, AspectMode::Fit);
        let (w, h) = fit_dimensions(300, 600, &req);
        assert_eq!((w, h), (240, 480));
        assert_eq!(centering_offset(w, h, &req), (200, 0));
    }

    #[test]
    fn fit_never_exceeds_canvas() {
        let req = canvas(37, 91, AspectMode::Fit);
        for (sw, sh) in [(1, 1), (5000, 3), (3, 5000), (37, 91), (1000, 999), (13, 7)] {
            let (w, h) = fit_dimensions(sw, sh, &req);
            assert!(w >= 1 && w <= 37, "{sw}x{sh} → {w}x{h}");
            assert!(h >= 1 && h <= 91, "{sw}x{sh} → {w}x{h}");
        }
    }

    #[test]
    fn stretch_fills_exactly() {
        let req = canvas(320, 200, AspectMode::Stretch);
        assert_eq!(fit_dimensions(10, 999, &req), (320, 200));
        assert_eq!(centering_offset(320, 200, &req), (0, 0));
    }

    #[test]
    fn odd_padding_floors() {
        let req = canvas(11, 10, AspectMode::Fit);
        assert_eq!(centering_offset(4, 10, &req), (3, 0));
    }

    #[test]
    fn canvas_has_transparent_padding() {
        let req = canvas(640, 480, AspectMode::Fit);
        let out = apply_canvas(&solid(100, 50), &req);
        assert_eq!(out.dimensions(), (640, 480));
        assert_eq!(out.get_pixel(0, 0)[3], 0, "top bar should be transparent");
        assert_eq!(out.get_pixel(320, 479)[3], 0, "bottom bar should be transparent");
        assert_eq!(out.get_pixel(320, 240)[3], 255, "centre should be opaque");
    }

    #[test]
    fn transform_bytes_outputs_png_of_canvas_size() {
        let req = canvas(64, 48, AspectMode::Stretch);
        let src = encode::encode_png(&solid(10, 30)).unwrap();
        let png = transform_bytes(0, &src, &req).unwrap();
        let back = image::load_from_memory(&png).unwrap();
        assert_eq!((back.width(), back.height()), (64, 48));
    }

    #[test]
    fn undecodable_bytes_are_an_item_error() {
        let req = CanvasRequest::default();
        let err = transform_bytes(7, b"not an image", &req).unwrap_err();
        assert!(matches!(err, ItemError::DecodeFailed { index: 7, .. }));
    }
}
