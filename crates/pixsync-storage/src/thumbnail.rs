//! Thumbnail rendering for backends without a native thumbnail endpoint.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use pixsync_core::types::{ThumbnailFormat, ThumbnailMode, ThumbnailSize, ThumbnailSpec};
use pixsync_core::{RemoteError, RouteError};

/// Decode `data`, scale it per `spec`, and re-encode in the requested format.
pub fn render_thumbnail(data: &[u8], spec: ThumbnailSpec) -> Result<Vec<u8>, RemoteError> {
    let img = image::load_from_memory(data)
        .map_err(|_| RemoteError::Route(RouteError::UnsupportedImage))?;

    let (w, h) = img.dimensions();
    let (tw, th) = target_dimensions((w, h), spec.size, spec.mode);
    let thumb = if (tw, th) == (w, h) {
        img
    } else {
        img.resize_exact(tw, th, FilterType::Triangle)
    };

    let (thumb, format) = match spec.format {
        ThumbnailFormat::Png => (thumb, ImageFormat::Png),
        // JPEG has no alpha channel
        ThumbnailFormat::Jpeg => (DynamicImage::ImageRgb8(thumb.to_rgb8()), ImageFormat::Jpeg),
    };

    let mut out = Cursor::new(Vec::new());
    thumb
        .write_to(&mut out, format)
        .map_err(|e| RemoteError::Route(RouteError::Other(format!("conversion error: {e}"))))?;
    Ok(out.into_inner())
}

/// Output dimensions for a source of `src` pixels. Never upscales.
pub fn target_dimensions(src: (u32, u32), size: ThumbnailSize, mode: ThumbnailMode) -> (u32, u32) {
    let (w, h) = src;
    if w == 0 || h == 0 {
        return src;
    }
    let (mut bw, mut bh) = size.dimensions();

    // bestfit modes may use the box rotated to match the source orientation
    if mode != ThumbnailMode::Strict && (w >= h) != (bw >= bh) {
        std::mem::swap(&mut bw, &mut bh);
    }

    let sx = bw as f64 / w as f64;
    let sy = bh as f64 / h as f64;
    let scale = match mode {
        ThumbnailMode::Strict | ThumbnailMode::Bestfit => sx.min(sy),
        ThumbnailMode::FitoneBestfit => sx.max(sy),
    }
    .min(1.0);

    let scaled = |v: u32| ((v as f64 * scale).round() as u32).max(1);
    (scaled(w), scaled(h))
}
