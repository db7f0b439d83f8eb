//! RGB raster surface for the PNG backend
//!
//! Minimal drawing ops over a row-major 24-bit pixel buffer: rect fills,
//! Bresenham lines with a square brush, filled circles, and text from an
//! embedded column-encoded 5×7 bitmap font. All ops clip at the edges.

use super::{Anchor, Rgb};

/// Glyph cell width including the 1-column gap
const GLYPH_ADVANCE: u32 = 6;
/// Glyph height in font rows
const GLYPH_HEIGHT: u32 = 7;

/// Column-encoded 5×7 glyphs for ASCII `0x20..=0x7E`; bit 0 of each
/// column byte is the top row
#[rustfmt::skip]
const FONT_5X7: [[u8; 5]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5F, 0x00, 0x00], // '!'
    [0x00, 0x07, 0x00, 0x07, 0x00], // '"'
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // '#'
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // '$'
    [0x23, 0x13, 0x08, 0x64, 0x62], // '%'
    [0x36, 0x49, 0x55, 0x22, 0x50], // '&'
    [0x00, 0x05, 0x03, 0x00, 0x00], // '\''
    [0x00, 0x1C, 0x22, 0x41, 0x00], // '('
    [0x00, 0x41, 0x22, 0x1C, 0x00], // ')'
    [0x14, 0x08, 0x3E, 0x08, 0x14], // '*'
    [0x08, 0x08, 0x3E, 0x08, 0x08], // '+'
    [0x00, 0x50, 0x30, 0x00, 0x00], // ','
    [0x08, 0x08, 0x08, 0x08, 0x08], // '-'
    [0x00, 0x60, 0x60, 0x00, 0x00], // '.'
    [0x20, 0x10, 0x08, 0x04, 0x02], // '/'
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // '0'
    [0x00, 0x42, 0x7F, 0x40, 0x00], // '1'
    [0x42, 0x61, 0x51, 0x49, 0x46], // '2'
    [0x21, 0x41, 0x45, 0x4B, 0x31], // '3'
    [0x18, 0x14, 0x12, 0x7F, 0x10], // '4'
    [0x27, 0x45, 0x45, 0x45, 0x39], // '5'
    [0x3C, 0x4A, 0x49, 0x49, 0x30], // '6'
    [0x01, 0x71, 0x09, 0x05, 0x03], // '7'
    [0x36, 0x49, 0x49, 0x49, 0x36], // '8'
    [0x06, 0x49, 0x49, 0x29, 0x1E], // '9'
    [0x00, 0x36, 0x36, 0x00, 0x00], // ':'
    [0x00, 0x56, 0x36, 0x00, 0x00], // ';'
    [0x08, 0x14, 0x22, 0x41, 0x00], // '<'
    [0x14, 0x14, 0x14, 0x14, 0x14], // '='
    [0x00, 0x41, 0x22, 0x14, 0x08], // '>'
    [0x02, 0x01, 0x51, 0x09, 0x06], // '?'
    [0x32, 0x49, 0x79, 0x41, 0x3E], // '@'
    [0x7E, 0x11, 0x11, 0x11, 0x7E], // 'A'
    [0x7F, 0x49, 0x49, 0x49, 0x36], // 'B'
    [0x3E, 0x41, 0x41, 0x41, 0x22], // 'C'
    [0x7F, 0x41, 0x41, 0x22, 0x1C], // 'D'
    [0x7F, 0x49, 0x49, 0x49, 0x41], // 'E'
    [0x7F, 0x09, 0x09, 0x09, 0x01], // 'F'
    [0x3E, 0x41, 0x49, 0x49, 0x7A], // 'G'
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // 'H'
    [0x00, 0x41, 0x7F, 0x41, 0x00], // 'I'
    [0x20, 0x40, 0x41, 0x3F, 0x01], // 'J'
    [0x7F, 0x08, 0x14, 0x22, 0x41], // 'K'
    [0x7F, 0x40, 0x40, 0x40, 0x40], // 'L'
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], // 'M'
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // 'N'
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // 'O'
    [0x7F, 0x09, 0x09, 0x09, 0x06], // 'P'
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // 'Q'
    [0x7F, 0x09, 0x19, 0x29, 0x46], // 'R'
    [0x46, 0x49, 0x49, 0x49, 0x31], // 'S'
    [0x01, 0x01, 0x7F, 0x01, 0x01], // 'T'
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // 'U'
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // 'V'
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // 'W'
    [0x63, 0x14, 0x08, 0x14, 0x63], // 'X'
    [0x07, 0x08, 0x70, 0x08, 0x07], // 'Y'
    [0x61, 0x51, 0x49, 0x45, 0x43], // 'Z'
    [0x00, 0x7F, 0x41, 0x41, 0x00], // '['
    [0x02, 0x04, 0x08, 0x10, 0x20], // '\\'
    [0x00, 0x41, 0x41, 0x7F, 0x00], // ']'
    [0x04, 0x02, 0x01, 0x02, 0x04], // '^'
    [0x40, 0x40, 0x40, 0x40, 0x40], // '_'
    [0x00, 0x01, 0x02, 0x04, 0x00], // '`'
    [0x20, 0x54, 0x54, 0x54, 0x78], // 'a'
    [0x7F, 0x48, 0x44, 0x44, 0x38], // 'b'
    [0x38, 0x44, 0x44, 0x44, 0x20], // 'c'
    [0x38, 0x44, 0x44, 0x48, 0x7F], // 'd'
    [0x38, 0x54, 0x54, 0x54, 0x18], // 'e'
    [0x08, 0x7E, 0x09, 0x01, 0x02], // 'f'
    [0x0C, 0x52, 0x52, 0x52, 0x3E], // 'g'
    [0x7F, 0x08, 0x04, 0x04, 0x78], // 'h'
    [0x00, 0x44, 0x7D, 0x40, 0x00], // 'i'
    [0x20, 0x40, 0x44, 0x3D, 0x00], // 'j'
    [0x7F, 0x10, 0x28, 0x44, 0x00], // 'k'
    [0x00, 0x41, 0x7F, 0x40, 0x00], // 'l'
    [0x7C, 0x04, 0x18, 0x04, 0x78], // 'm'
    [0x7C, 0x08, 0x04, 0x04, 0x78], // 'n'
    [0x38, 0x44, 0x44, 0x44, 0x38], // 'o'
    [0x7C, 0x14, 0x14, 0x14, 0x08], // 'p'
    [0x08, 0x14, 0x14, 0x18, 0x7C], // 'q'
    [0x7C, 0x08, 0x04, 0x04, 0x08], // 'r'
    [0x48, 0x54, 0x54, 0x54, 0x20], // 's'
    [0x04, 0x3F, 0x44, 0x40, 0x20], // 't'
    [0x3C, 0x40, 0x40, 0x20, 0x7C], // 'u'
    [0x1C, 0x20, 0x40, 0x20, 0x1C], // 'v'
    [0x3C, 0x40, 0x30, 0x40, 0x3C], // 'w'
    [0x44, 0x28, 0x10, 0x28, 0x44], // 'x'
    [0x0C, 0x50, 0x50, 0x50, 0x3C], // 'y'
    [0x44, 0x64, 0x54, 0x4C, 0x44], // 'z'
    [0x00, 0x08, 0x36, 0x41, 0x00], // '{'
    [0x00, 0x00, 0x7F, 0x00, 0x00], // '|'
    [0x00, 0x41, 0x36, 0x08, 0x00], // '}'
    [0x02, 0x01, 0x02, 0x04, 0x02], // '~'
];

fn glyph(c: char) -> [u8; 5] {
    let code = c as u32;
    if (0x20..=0x7E).contains(&code) {
        FONT_5X7[(code - 0x20) as usize]
    } else {
        // Anything outside printable ASCII renders as a blank cell.
        FONT_5X7[0]
    }
}

/// Font scale factor for a nominal pixel size
fn font_scale(size: u32) -> u32 {
    ((f64::from(size) / f64::from(GLYPH_HEIGHT)).round() as u32).max(1)
}

/// Row-major 24-bit RGB pixel surface
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    /// White surface of the given size
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0xFF; (width as usize) * (height as usize) * 3],
        }
    }

    /// Surface width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Surface height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB bytes, row-major, three bytes per pixel
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Set one pixel; coordinates outside the surface are ignored
    pub fn set_pixel(&mut self, x: i64, y: i64, color: Rgb) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[offset] = color.0;
        self.pixels[offset + 1] = color.1;
        self.pixels[offset + 2] = color.2;
    }

    /// Fill an axis-aligned rectangle given by its top-left corner
    pub fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb) {
        let x0 = x.round() as i64;
        let y0 = y.round() as i64;
        let x1 = (x + width).round() as i64;
        let y1 = (y + height).round() as i64;
        for py in y0..y1 {
            for px in x0..x1 {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Outline an axis-aligned rectangle, one pixel wide
    pub fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb) {
        let x0 = x.round() as i64;
        let y0 = y.round() as i64;
        let x1 = (x + width).round() as i64;
        let y1 = (y + height).round() as i64;
        for px in x0..=x1 {
            self.set_pixel(px, y0, color);
            self.set_pixel(px, y1, color);
        }
        for py in y0..=y1 {
            self.set_pixel(x0, py, color);
            self.set_pixel(x1, py, color);
        }
    }

    /// Stroke a segment with a square brush; `dashed` paints a 6-on/4-off
    /// pattern
    pub fn draw_line(
        &mut self,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Rgb,
        width: f64,
        dashed: bool,
    ) {
        let brush = (((width - 1.0) / 2.0).round() as i64).max(0);
        let mut x = x1.round() as i64;
        let mut y = y1.round() as i64;
        let xe = x2.round() as i64;
        let ye = y2.round() as i64;

        let dx = (xe - x).abs();
        let dy = -(ye - y).abs();
        let sx = if x < xe { 1 } else { -1 };
        let sy = if y < ye { 1 } else { -1 };
        let mut err = dx + dy;
        let mut step = 0i64;

        loop {
            if !dashed || step % 10 < 6 {
                for by in -brush..=brush {
                    for bx in -brush..=brush {
                        self.set_pixel(x + bx, y + by, color);
                    }
                }
            }
            if x == xe && y == ye {
                break;
            }
            step += 1;
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Fill a circle centered at (`cx`, `cy`)
    pub fn fill_circle(&mut self, cx: f64, cy: f64, r: f64, color: Rgb) {
        let x0 = cx.round() as i64;
        let y0 = cy.round() as i64;
        let ri = r.round() as i64;
        let r2 = (r * r).round() as i64;
        for dy in -ri..=ri {
            for dx in -ri..=ri {
                if dx * dx + dy * dy <= r2 {
                    self.set_pixel(x0 + dx, y0 + dy, color);
                }
            }
        }
    }

    /// Pixel width of a text run at a nominal size
    #[must_use]
    pub fn text_width(text: &str, size: u32) -> u32 {
        let scale = font_scale(size);
        (text.chars().count() as u32) * GLYPH_ADVANCE * scale
    }

    /// Draw a text run with its baseline at `y`
    pub fn draw_text(
        &mut self,
        x: f64,
        y: f64,
        text: &str,
        color: Rgb,
        size: u32,
        anchor: Anchor,
        bold: bool,
    ) {
        let scale = font_scale(size);
        let width = i64::from(Self::text_width(text, size));
        let x0 = match anchor {
            Anchor::Start => x.round() as i64,
            Anchor::Middle => x.round() as i64 - width / 2,
            Anchor::End => x.round() as i64 - width,
        };
        let top = y.round() as i64 - i64::from(GLYPH_HEIGHT * scale);

        let mut pen_x = x0;
        for c in text.chars() {
            let columns = glyph(c);
            for (col, &bits) in columns.iter().enumerate() {
                for row in 0..GLYPH_HEIGHT {
                    if bits >> row & 1 == 1 {
                        let px = pen_x + (col as i64) * i64::from(scale);
                        let py = top + i64::from(row * scale);
                        for sy in 0..i64::from(scale) {
                            for sx in 0..i64::from(scale) {
                                self.set_pixel(px + sx, py + sy, color);
                                if bold {
                                    self.set_pixel(px + sx + 1, py + sy, color);
                                }
                            }
                        }
                    }
                }
            }
            pen_x += i64::from(GLYPH_ADVANCE * scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb = Rgb(0, 0, 0);

    fn pixel(canvas: &Canvas, x: u32, y: u32) -> (u8, u8, u8) {
        let offset = (y as usize * canvas.width() as usize + x as usize) * 3;
        let p = canvas.pixels();
        (p[offset], p[offset + 1], p[offset + 2])
    }

    // ========================================================================
    // Surface basics
    // ========================================================================

    #[test]
    fn test_new_canvas_is_white() {
        let canvas = Canvas::new(4, 3);
        assert_eq!(canvas.pixels().len(), 36);
        assert_eq!(pixel(&canvas, 0, 0), (0xFF, 0xFF, 0xFF));
        assert_eq!(pixel(&canvas, 3, 2), (0xFF, 0xFF, 0xFF));
    }

    #[test]
    fn test_out_of_bounds_pixels_are_clipped() {
        let mut canvas = Canvas::new(4, 4);
        canvas.set_pixel(-1, 0, BLACK);
        canvas.set_pixel(0, -1, BLACK);
        canvas.set_pixel(4, 0, BLACK);
        canvas.set_pixel(0, 4, BLACK);
        assert!(canvas.pixels().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_fill_rect() {
        let mut canvas = Canvas::new(8, 8);
        canvas.fill_rect(2.0, 2.0, 3.0, 3.0, BLACK);
        assert_eq!(pixel(&canvas, 2, 2), (0, 0, 0));
        assert_eq!(pixel(&canvas, 4, 4), (0, 0, 0));
        assert_eq!(pixel(&canvas, 5, 5), (0xFF, 0xFF, 0xFF));
        assert_eq!(pixel(&canvas, 1, 2), (0xFF, 0xFF, 0xFF));
    }

    #[test]
    fn test_line_endpoints_painted() {
        let mut canvas = Canvas::new(16, 16);
        canvas.draw_line(1.0, 1.0, 12.0, 9.0, BLACK, 1.0, false);
        assert_eq!(pixel(&canvas, 1, 1), (0, 0, 0));
        assert_eq!(pixel(&canvas, 12, 9), (0, 0, 0));
    }

    #[test]
    fn test_dashed_line_leaves_gaps() {
        let mut canvas = Canvas::new(40, 3);
        canvas.draw_line(0.0, 1.0, 39.0, 1.0, BLACK, 1.0, true);
        let painted = (0..40).filter(|&x| pixel(&canvas, x, 1) == (0, 0, 0)).count();
        assert!(painted > 10);
        assert!(painted < 40);
    }

    #[test]
    fn test_fill_circle_covers_center() {
        let mut canvas = Canvas::new(16, 16);
        canvas.fill_circle(8.0, 8.0, 3.0, BLACK);
        assert_eq!(pixel(&canvas, 8, 8), (0, 0, 0));
        assert_eq!(pixel(&canvas, 8, 5), (0, 0, 0));
        assert_eq!(pixel(&canvas, 8, 2), (0xFF, 0xFF, 0xFF));
    }

    // ========================================================================
    // Text
    // ========================================================================

    #[test]
    fn test_glyph_orientation() {
        // 'A' at scale 1: column 0 has rows 1..=6 set, row 0 clear.
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_text(0.0, 7.0, "A", BLACK, 7, Anchor::Start, false);
        assert_eq!(pixel(&canvas, 0, 0), (0xFF, 0xFF, 0xFF));
        assert_eq!(pixel(&canvas, 0, 1), (0, 0, 0));
        assert_eq!(pixel(&canvas, 0, 6), (0, 0, 0));
        // Column 1 carries the top bar (row 0) and crossbar (row 4).
        assert_eq!(pixel(&canvas, 1, 0), (0, 0, 0));
        assert_eq!(pixel(&canvas, 1, 4), (0, 0, 0));
    }

    #[test]
    fn test_text_width_scales() {
        assert_eq!(Canvas::text_width("abc", 7), 18);
        assert_eq!(Canvas::text_width("abc", 14), 36);
        assert_eq!(Canvas::text_width("", 7), 0);
    }

    #[test]
    fn test_anchor_shifts_origin() {
        // 'm' is 6px wide at scale 1; its first column starts at rows 2..=6.
        let mut middle = Canvas::new(60, 20);
        middle.draw_text(30.0, 15.0, "m", BLACK, 7, Anchor::Middle, false);
        assert_eq!(pixel(&middle, 27, 12), (0, 0, 0));
        assert_eq!(pixel(&middle, 26, 12), (0xFF, 0xFF, 0xFF));

        let mut end = Canvas::new(60, 20);
        end.draw_text(33.0, 15.0, "m", BLACK, 7, Anchor::End, false);
        assert_eq!(pixel(&end, 27, 12), (0, 0, 0));
    }

    #[test]
    fn test_non_ascii_renders_blank() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_text(0.0, 7.0, "±", BLACK, 7, Anchor::Start, false);
        assert!(canvas.pixels().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_font_scale_rounds() {
        assert_eq!(font_scale(7), 1);
        assert_eq!(font_scale(11), 2);
        assert_eq!(font_scale(12), 2);
        assert_eq!(font_scale(18), 3);
        assert_eq!(font_scale(1), 1);
    }
}
