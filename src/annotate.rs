//! Overlay canvas and compositing.
//!
//! The overlay is a mutable RGB annotation canvas, cleared and redrawn
//! once per inference cycle. Black pixels are transparent: compositing
//! masks the overlay with the per-pixel maximum of its channels, so
//! anything drawn in a non-black color replaces the live frame underneath
//! and untouched regions show through.

use crate::frame::Frame;

/// RGB color triple.
pub type Rgb = [u8; 3];

/// Banner color used for status text and the wait-progress bar.
pub const BANNER_COLOR: Rgb = [235, 184, 82];

/// Alert color for the inference-in-progress banner.
pub const ALERT_COLOR: Rgb = [255, 0, 0];

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = 6;

/// Mutable annotation canvas. Same dimensions as the processed frame.
#[derive(Clone)]
pub struct Overlay {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Overlay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0u8; (width as usize) * (height as usize) * 3],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Wipe all annotations (everything back to transparent).
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn put_pixel(&mut self, x: i64, y: i64, color: Rgb) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 3;
        self.pixels[idx..idx + 3].copy_from_slice(&color);
    }

    /// Filled circle, clipped at the canvas edges.
    pub fn draw_circle(&mut self, cx: i64, cy: i64, radius: i64, color: Rgb) {
        let r2 = radius * radius;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= r2 {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Draw text with the built-in 5x7 font, scaled up by `scale`.
    ///
    /// Lowercase maps to uppercase; unsupported characters advance the
    /// cursor without drawing.
    pub fn draw_text(&mut self, x: i64, y: i64, text: &str, color: Rgb, scale: u32) {
        let scale = scale.max(1) as i64;
        let mut cursor = x;
        for ch in text.chars() {
            if let Some(glyph) = glyph_columns(ch) {
                for (col, bits) in glyph.iter().enumerate() {
                    for row in 0..GLYPH_HEIGHT {
                        if bits & (1 << row) != 0 {
                            let px = cursor + (col as i64) * scale;
                            let py = y + (row as i64) * scale;
                            for sy in 0..scale {
                                for sx in 0..scale {
                                    self.put_pixel(px + sx, py + sy, color);
                                }
                            }
                        }
                    }
                }
            }
            cursor += (GLYPH_ADVANCE as i64) * scale;
        }
    }

    /// Draw text horizontally and vertically centered on the canvas.
    pub fn draw_text_centered(&mut self, text: &str, color: Rgb, scale: u32) {
        let w = text_width(text, scale) as i64;
        let h = (GLYPH_HEIGHT * scale.max(1)) as i64;
        let x = (self.width as i64 - w) / 2;
        let y = (self.height as i64 - h) / 2;
        self.draw_text(x, y, text, color, scale);
    }

    /// Wait-progress bar: a vertical line growing up the right edge as
    /// `fraction` moves from 0.0 to 1.0.
    pub fn draw_wait_bar(&mut self, fraction: f32, color: Rgb, thickness: u32) {
        let fraction = fraction.clamp(0.0, 1.0);
        let rise = (fraction * self.height as f32) as i64 + 10;
        let x0 = self.width as i64 - thickness as i64;
        let y0 = (self.height as i64 - rise).max(0);
        for y in y0..self.height as i64 {
            for x in x0..self.width as i64 {
                self.put_pixel(x, y, color);
            }
        }
    }

    /// Composite this overlay onto a frame: non-black overlay pixels win,
    /// weighted by their own brightness mask (so dim annotations blend).
    pub fn blend_over(&self, frame: &Frame) -> Frame {
        let mut out = frame.clone();
        if frame.width != self.width || frame.height != self.height {
            return out;
        }
        for (dst, src) in out.pixels.chunks_exact_mut(3).zip(self.pixels.chunks_exact(3)) {
            let mask = src[0].max(src[1]).max(src[2]) as u16;
            if mask == 0 {
                continue;
            }
            let inv = 255 - mask;
            for c in 0..3 {
                let blended = (dst[c] as u16 * inv + src[c] as u16 * mask) / 255;
                dst[c] = blended as u8;
            }
        }
        out
    }
}

/// Full-canvas banner shown while the model runs.
///
/// Model inference can take seconds; without this the preview would
/// silently show the previous cycle's overlay.
pub fn inferring_overlay(width: u32, height: u32) -> Overlay {
    let mut overlay = Overlay::new(width, height);
    overlay.draw_text_centered("-= INFERRING =-", ALERT_COLOR, 2);
    overlay
}

/// Pixel width of a text run at the given scale.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_ADVANCE * scale.max(1)
}

/// 5x7 glyphs, one byte per column, LSB at the top row.
fn glyph_columns(ch: char) -> Option<[u8; GLYPH_WIDTH as usize]> {
    let ch = ch.to_ascii_uppercase();
    let glyph = match ch {
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00],
        '-' => [0x08, 0x08, 0x08, 0x08, 0x08],
        '.' => [0x00, 0x60, 0x60, 0x00, 0x00],
        ':' => [0x00, 0x36, 0x36, 0x00, 0x00],
        '=' => [0x14, 0x14, 0x14, 0x14, 0x14],
        '0' => [0x3E, 0x51, 0x49, 0x45, 0x3E],
        '1' => [0x00, 0x42, 0x7F, 0x40, 0x00],
        '2' => [0x42, 0x61, 0x51, 0x49, 0x46],
        '3' => [0x21, 0x41, 0x45, 0x4B, 0x31],
        '4' => [0x18, 0x14, 0x12, 0x7F, 0x10],
        '5' => [0x27, 0x45, 0x45, 0x45, 0x39],
        '6' => [0x3C, 0x4A, 0x49, 0x49, 0x30],
        '7' => [0x01, 0x71, 0x09, 0x05, 0x03],
        '8' => [0x36, 0x49, 0x49, 0x49, 0x36],
        '9' => [0x06, 0x49, 0x49, 0x29, 0x1E],
        'A' => [0x7E, 0x11, 0x11, 0x11, 0x7E],
        'B' => [0x7F, 0x49, 0x49, 0x49, 0x36],
        'C' => [0x3E, 0x41, 0x41, 0x41, 0x22],
        'D' => [0x7F, 0x41, 0x41, 0x22, 0x1C],
        'E' => [0x7F, 0x49, 0x49, 0x49, 0x41],
        'F' => [0x7F, 0x09, 0x09, 0x09, 0x01],
        'G' => [0x3E, 0x41, 0x49, 0x49, 0x7A],
        'H' => [0x7F, 0x08, 0x08, 0x08, 0x7F],
        'I' => [0x00, 0x41, 0x7F, 0x41, 0x00],
        'L' => [0x7F, 0x40, 0x40, 0x40, 0x40],
        'M' => [0x7F, 0x02, 0x0C, 0x02, 0x7F],
        'N' => [0x7F, 0x04, 0x08, 0x10, 0x7F],
        'O' => [0x3E, 0x41, 0x41, 0x41, 0x3E],
        'P' => [0x7F, 0x09, 0x09, 0x09, 0x06],
        'R' => [0x7F, 0x09, 0x19, 0x29, 0x46],
        'S' => [0x46, 0x49, 0x49, 0x49, 0x31],
        'T' => [0x01, 0x01, 0x7F, 0x01, 0x01],
        'U' => [0x3F, 0x40, 0x40, 0x40, 0x3F],
        _ => return None,
    };
    Some(glyph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn blank_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![100u8; (width * height * 3) as usize], width, height, 0).unwrap()
    }

    #[test]
    fn clear_resets_to_transparent() {
        let mut overlay = Overlay::new(16, 16);
        overlay.draw_circle(8, 8, 3, [255, 0, 0]);
        assert!(overlay.pixels.iter().any(|&p| p != 0));
        overlay.clear();
        assert!(overlay.pixels.iter().all(|&p| p == 0));
    }

    #[test]
    fn circle_is_clipped_at_edges() {
        let mut overlay = Overlay::new(8, 8);
        // Center well outside the canvas; must not panic or wrap.
        overlay.draw_circle(-10, 4, 3, [0, 255, 0]);
        overlay.draw_circle(4, 4, 100, [0, 255, 0]);
        assert!(overlay.pixels.iter().any(|&p| p != 0));
    }

    #[test]
    fn blend_leaves_transparent_regions_untouched() {
        let frame = blank_frame(10, 10);
        let overlay = Overlay::new(10, 10);
        let out = overlay.blend_over(&frame);
        assert_eq!(out.pixels, frame.pixels);
    }

    #[test]
    fn blend_replaces_fully_bright_pixels() {
        let frame = blank_frame(4, 4);
        let mut overlay = Overlay::new(4, 4);
        overlay.put_pixel(1, 1, [255, 255, 255]);
        let out = overlay.blend_over(&frame);
        let idx = (1 * 4 + 1) * 3;
        assert_eq!(&out.pixels[idx..idx + 3], &[255, 255, 255]);
        // Neighbor untouched.
        assert_eq!(&out.pixels[0..3], &[100, 100, 100]);
    }

    #[test]
    fn blend_ignores_mismatched_dimensions() {
        let frame = blank_frame(6, 6);
        let mut overlay = Overlay::new(4, 4);
        overlay.draw_circle(2, 2, 2, [255, 0, 0]);
        let out = overlay.blend_over(&frame);
        assert_eq!(out.pixels, frame.pixels);
    }

    #[test]
    fn text_marks_pixels_for_known_glyphs() {
        let mut overlay = Overlay::new(120, 20);
        overlay.draw_text(2, 2, "People Count: 3", BANNER_COLOR, 1);
        assert!(overlay.pixels.iter().any(|&p| p != 0));
    }

    #[test]
    fn text_width_scales_linearly() {
        assert_eq!(text_width("AB", 1), 12);
        assert_eq!(text_width("AB", 3), 36);
    }

    #[test]
    fn inferring_overlay_draws_a_centered_banner() {
        let overlay = inferring_overlay(200, 60);
        assert_eq!((overlay.width(), overlay.height()), (200, 60));
        assert!(overlay.pixels.iter().any(|&p| p != 0));
        // Banner is centered, so the canvas edges stay transparent.
        assert!(overlay.pixels[..200 * 3].iter().all(|&p| p == 0));
    }

    #[test]
    fn wait_bar_grows_with_fraction() {
        let mut short = Overlay::new(20, 40);
        short.draw_wait_bar(0.1, BANNER_COLOR, 2);
        let mut long = Overlay::new(20, 40);
        long.draw_wait_bar(0.9, BANNER_COLOR, 2);
        let lit = |o: &Overlay| o.pixels.iter().filter(|&&p| p != 0).count();
        assert!(lit(&long) > lit(&short));
    }
}
