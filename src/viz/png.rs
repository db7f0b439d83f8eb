//! PNG backend
//!
//! Rasterizes chart geometry onto a [`Canvas`] and encodes the pixels as
//! an 8-bit truecolor PNG. The IDAT stream uses stored (uncompressed)
//! deflate blocks, which every decoder accepts without pulling in a
//! compression dependency.

use super::canvas::Canvas;
use super::{ChartGeometry, Primitive};

/// Fixed 8-byte PNG file signature
const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
/// Stored deflate blocks carry at most this many bytes
const MAX_STORED_BLOCK: usize = 65535;
/// Largest prime below 2^16, per the zlib checksum definition
const ADLER_MODULUS: u32 = 65521;

/// Rasterize a laid-out chart and encode it as PNG bytes
#[must_use]
pub fn render(geometry: &ChartGeometry) -> Vec<u8> {
    let mut canvas = Canvas::new(geometry.width, geometry.height);
    for primitive in &geometry.primitives {
        paint(&mut canvas, primitive);
    }
    encode(canvas.width(), canvas.height(), canvas.pixels())
}

fn paint(canvas: &mut Canvas, primitive: &Primitive) {
    match primitive {
        Primitive::Rect {
            x,
            y,
            width,
            height,
            fill,
            stroke,
        } => {
            canvas.fill_rect(*x, *y, *width, *height, *fill);
            if let Some(stroke) = stroke {
                canvas.stroke_rect(*x, *y, *width, *height, *stroke);
            }
        }
        Primitive::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            width,
            dashed,
        } => {
            canvas.draw_line(*x1, *y1, *x2, *y2, *color, *width, *dashed);
        }
        Primitive::Polyline {
            points,
            color,
            width,
        } => {
            for pair in points.windows(2) {
                canvas.draw_line(pair[0].0, pair[0].1, pair[1].0, pair[1].1, *color, *width, false);
            }
        }
        Primitive::Circle { cx, cy, r, fill } => {
            canvas.fill_circle(*cx, *cy, *r, *fill);
        }
        Primitive::Square { cx, cy, r, fill } => {
            canvas.fill_rect(cx - r, cy - r, 2.0 * r, 2.0 * r, *fill);
        }
        Primitive::Cross {
            cx,
            cy,
            r,
            color,
            width,
        } => {
            canvas.draw_line(cx - r, cy - r, cx + r, cy + r, *color, *width, false);
            canvas.draw_line(cx - r, cy + r, cx + r, cy - r, *color, *width, false);
        }
        Primitive::Text {
            x,
            y,
            content,
            color,
            size,
            anchor,
            bold,
        } => {
            canvas.draw_text(*x, *y, content, *color, *size, *anchor, *bold);
        }
    }
}

/// Encode row-major RGB pixels as a complete PNG file
#[must_use]
pub fn encode(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);

    // Each scanline is preceded by a filter-type byte; 0 is unfiltered.
    let stride = width as usize * 3;
    let mut raw = Vec::with_capacity(pixels.len() + height as usize);
    for row in pixels.chunks(stride) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let mut out = Vec::with_capacity(raw.len() + raw.len() / MAX_STORED_BLOCK * 5 + 128);
    out.extend_from_slice(&SIGNATURE);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    // Bit depth 8, color type 2 (truecolor), deflate, adaptive filters,
    // no interlace.
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]);
    chunk(&mut out, b"IHDR", &ihdr);
    chunk(&mut out, b"IDAT", &zlib_stored(&raw));
    chunk(&mut out, b"IEND", &[]);
    out
}

/// Append one chunk: length, type, data, CRC over type and data
fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let crc = crc32_update(crc32_update(0xFFFF_FFFF, kind), data) ^ 0xFFFF_FFFF;
    out.extend_from_slice(&crc.to_be_bytes());
}

fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    crc
}

/// Wrap bytes in a zlib stream of stored deflate blocks
fn zlib_stored(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_STORED_BLOCK * 5 + 16);
    // CMF/FLG: deflate with a 32K window, no preset dictionary.
    out.push(0x78);
    out.push(0x01);

    let mut offset = 0;
    loop {
        let remaining = data.len() - offset;
        let len = remaining.min(MAX_STORED_BLOCK);
        let last = remaining <= MAX_STORED_BLOCK;
        // BFINAL in bit 0, BTYPE 00 (stored), then LEN and its complement
        // little-endian.
        out.push(u8::from(last));
        let len16 = len as u16;
        out.extend_from_slice(&len16.to_le_bytes());
        out.extend_from_slice(&(!len16).to_le_bytes());
        out.extend_from_slice(&data[offset..offset + len]);
        offset += len;
        if last {
            break;
        }
    }
    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    // 5552 is the longest run that cannot overflow u32 between reductions.
    for chunk in data.chunks(5552) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= ADLER_MODULUS;
        b %= ADLER_MODULUS;
    }
    (b << 16) | a
}
