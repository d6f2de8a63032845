//! Average-hash (aHash) perceptual fingerprints.
//!
//! # Algorithm
//!
//! 1. Decode the image bytes (PNG, JPEG, GIF, BMP, WebP).
//! 2. Downsample to 8×8 with area-average resampling: every output cell is
//!    the coverage-weighted mean of the source pixels under it.
//! 3. Convert each cell to luma with the BT.601 weights
//!    `0.299 R + 0.587 G + 0.114 B`, rounded.
//! 4. Bit `i` (row-major) is set when `luma[i] >= mean(luma)`.
//! 5. Encode the 64 bits as 16 lowercase hex digits, most significant bit
//!    first within each nibble.
//!
//! Undecodable input yields `None`; callers skip hashing in that case.
//!
//! ```rust
//! use archive_core::fingerprint::{average_hash_image, is_valid_hash};
//! use image::{DynamicImage, RgbImage};
//!
//! let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb([90, 90, 90])));
//! let hash = average_hash_image(&img);
//! assert_eq!(hash, "ffffffffffffffff");
//! assert!(is_valid_hash(&hash));
//! ```

use image::{DynamicImage, RgbImage};

/// Side length of the downsampled grid.
pub const GRID: usize = 8;

/// Length of an encoded hash in hex characters.
pub const HASH_HEX_LEN: usize = 16;

/// Fingerprint encoded image bytes. Returns `None` if the bytes cannot be
/// decoded as a supported image format.
pub fn average_hash(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match image::load_from_memory(bytes) {
        Ok(img) => Some(average_hash_image(&img)),
        Err(e) => {
            tracing::debug!(error = %e, "image could not be decoded, skipping fingerprint");
            None
        }
    }
}

/// Fingerprint an already decoded image.
pub fn average_hash_image(img: &DynamicImage) -> String {
    let rgb = img.to_rgb8();
    let lumas = downsample_luma(&rgb);
    let bits = threshold_bits(&lumas);
    encode_hash(bits)
}

/// True if `hash` is exactly 16 lowercase hex characters.
pub fn is_valid_hash(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// BT.601 luma of an RGB triple, rounded to the nearest integer.
fn luma(r: u8, g: u8, b: u8) -> u32 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64).round() as u32
}

/// Area-average the image onto an 8×8 grid and return per-cell luma,
/// row-major.
fn downsample_luma(rgb: &RgbImage) -> [u32; GRID * GRID] {
    let (w, h) = rgb.dimensions();
    let mut out = [0u32; GRID * GRID];
    if w == 0 || h == 0 {
        return out;
    }

    let x_spans: Vec<Vec<(u32, f64)>> = (0..GRID).map(|c| cell_span(c, w)).collect();
    let y_spans: Vec<Vec<(u32, f64)>> = (0..GRID).map(|c| cell_span(c, h)).collect();

    for (cy, ys) in y_spans.iter().enumerate() {
        for (cx, xs) in x_spans.iter().enumerate() {
            let mut acc = [0f64; 3];
            let mut total = 0f64;
            for &(y, wy) in ys {
                for &(x, wx) in xs {
                    let weight = wx * wy;
                    let px = rgb.get_pixel(x, y);
                    acc[0] += px[0] as f64 * weight;
                    acc[1] += px[1] as f64 * weight;
                    acc[2] += px[2] as f64 * weight;
                    total += weight;
                }
            }
            let channel = |v: f64| (v / total).round().clamp(0.0, 255.0) as u8;
            out[cy * GRID + cx] = luma(channel(acc[0]), channel(acc[1]), channel(acc[2]));
        }
    }
    out
}

/// Source pixels covered by output cell `cell` along an axis of `len`
/// pixels, with the fraction of each pixel that falls inside the cell.
fn cell_span(cell: usize, len: u32) -> Vec<(u32, f64)> {
    let scale = len as f64 / GRID as f64;
    let start = cell as f64 * scale;
    let end = (cell + 1) as f64 * scale;
    let first = start.floor() as u32;
    let last = (end.ceil() as u32).min(len);
    (first..last)
        .filter_map(|p| {
            let lo = (p as f64).max(start);
            let hi = ((p + 1) as f64).min(end);
            let weight = hi - lo;
            (weight > 0.0).then_some((p, weight))
        })
        .collect()
}

/// Bit `i` of the result (counting from the most significant bit) is set
/// when cell `i` is at least as bright as the mean.
fn threshold_bits(lumas: &[u32; GRID * GRID]) -> u64 {
    let mean = lumas.iter().map(|&l| l as f64).sum::<f64>() / (GRID * GRID) as f64;
    let mut bits = 0u64;
    for (i, &l) in lumas.iter().enumerate() {
        if l as f64 >= mean {
            bits |= 1u64 << (63 - i);
        }
    }
    bits
}

fn encode_hash(bits: u64) -> String {
    hex::encode(bits.to_be_bytes())
}
