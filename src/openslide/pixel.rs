//! Pixel conversion for OpenSlide output.
//!
//! OpenSlide returns premultiplied ARGB packed into native-endian 32-bit
//! words. Image crates expect straight (non-premultiplied) RGBA bytes.

use image::{Rgb, RgbImage, RgbaImage};

#[inline]
fn unpremultiply(pixel: u32) -> [u8; 4] {
    let a = (pixel >> 24) as u8;
    let r = (pixel >> 16) as u8;
    let g = (pixel >> 8) as u8;
    let b = pixel as u8;

    if a == 0 || a == 255 {
        return [r, g, b, a];
    }

    let scale = |c: u8| (u32::from(c) * 255 / u32::from(a)).min(255) as u8;
    [scale(r), scale(g), scale(b), a]
}

/// Rewrite a buffer of premultiplied ARGB words as straight RGBA bytes.
///
/// The buffer is interpreted as native-endian `u32` words, as written by
/// `openslide_read_region`. Trailing bytes that do not form a whole pixel
/// are left untouched.
pub fn argb_to_rgba_in_place(buf: &mut [u8]) {
    for chunk in buf.chunks_exact_mut(4) {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&unpremultiply(word));
    }
}

/// Convert premultiplied ARGB words into straight RGBA bytes.
pub fn argb_pixels_to_rgba(pixels: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 4);
    for &pixel in pixels {
        out.extend_from_slice(&unpremultiply(pixel));
    }
    out
}

/// Flatten an RGBA image onto an opaque background color.
pub fn composite_on(image: &RgbaImage, background: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let a = u32::from(a);
        let blend = |fg: u8, bg: u8| ((u32::from(fg) * a + u32::from(bg) * (255 - a) + 127) / 255) as u8;
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}
