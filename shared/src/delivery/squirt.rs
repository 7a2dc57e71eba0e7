//! SQUIRT image compression: run-length coding of RGBA8 pixels where run
//! membership is decided under a per-level color quantization mask. Each
//! 4-byte output record is the raw color of the run's first pixel with the
//! alpha byte replaced by the run length (0 means a run of one, 255 a run
//! of 256). Decompression restores opaque alpha, so the codec assumes
//! opaque imagery. Level 0 only merges identical colors and is lossless;
//! higher levels shave low-order color bits for longer runs at the same
//! resolution. The stream is never larger than the input.

use crate::errors::{CompositeError, RenderResult};
use crate::models::frame::BYTES_PER_PIXEL;

/// Per-level RGB quantization masks, level 0 through 5. Green keeps one bit
/// more than red and blue, the eye being most sensitive there.
const QUANT_MASKS: [[u8; 3]; 6] = [
    [0xFF, 0xFF, 0xFF],
    [0xFE, 0xFF, 0xFE],
    [0xFC, 0xFE, 0xFC],
    [0xF8, 0xFC, 0xF8],
    [0xF0, 0xF8, 0xF0],
    [0xE0, 0xF0, 0xE0],
];

const MAX_RUN: usize = 255;

/// Worst-case per-channel error introduced at `level`.
pub fn channel_error_bound(level: u8) -> u8 {
    let mask = QUANT_MASKS[level.min(5) as usize];
    !mask[0] // red and blue carry the widest mask
}

pub fn compress(rgba: &[u8], level: u8) -> Vec<u8> {
    let mask = QUANT_MASKS[level.min(5) as usize];
    let mut out = Vec::with_capacity(rgba.len());

    let mut pixels = rgba.chunks_exact(BYTES_PER_PIXEL).peekable();
    while let Some(first) = pixels.next() {
        let mut run = 0usize;
        while run < MAX_RUN {
            match pixels.peek() {
                Some(next) if same_under_mask(first, next, &mask) => {
                    pixels.next();
                    run += 1;
                }
                _ => break,
            }
        }
        out.extend_from_slice(&[first[0], first[1], first[2], run as u8]);
    }
    out
}

pub fn decompress(stream: &[u8], pixel_count: usize) -> RenderResult<Vec<u8>> {
    let mut out = Vec::with_capacity(pixel_count * BYTES_PER_PIXEL);

    for record in stream.chunks_exact(BYTES_PER_PIXEL) {
        let run = record[3] as usize + 1;
        if out.len() + run * BYTES_PER_PIXEL > pixel_count * BYTES_PER_PIXEL {
            return Err(CompositeError::SizeMismatch {
                expected: pixel_count * BYTES_PER_PIXEL,
                actual: out.len() + run * BYTES_PER_PIXEL,
            });
        }
        for _ in 0..run {
            out.extend_from_slice(&[record[0], record[1], record[2], 0xFF]);
        }
    }

    if out.len() != pixel_count * BYTES_PER_PIXEL || stream.len() % BYTES_PER_PIXEL != 0 {
        return Err(CompositeError::SizeMismatch {
            expected: pixel_count * BYTES_PER_PIXEL,
            actual: out.len(),
        });
    }
    Ok(out)
}

fn same_under_mask(a: &[u8], b: &[u8], mask: &[u8; 3]) -> bool {
    a[0] & mask[0] == b[0] & mask[0]
        && a[1] & mask[1] == b[1] & mask[1]
        && a[2] & mask[2] == b[2] & mask[2]
        && a[3] == b[3]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banded_image(pixel_count: usize) -> Vec<u8> {
        // Opaque horizontal bands with a gradient inside each band.
        (0..pixel_count)
            .flat_map(|i| {
                let band = ((i / 13) % 7) as u8;
                [band * 30, (i % 5) as u8, 200 - band * 10, 0xFF]
            })
            .collect()
    }

    #[test]
    fn level_zero_round_trip_is_lossless() {
        let image = banded_image(256);
        let compressed = compress(&image, 0);
        let restored = decompress(&compressed, 256).unwrap();
        assert_eq!(restored, image);
    }

    #[test]
    fn round_trip_error_is_bounded_by_level() {
        let image = banded_image(512);
        for level in 1..=5u8 {
            let bound = channel_error_bound(level);
            let restored = decompress(&compress(&image, level), 512).unwrap();
            for (a, b) in image.chunks_exact(4).zip(restored.chunks_exact(4)) {
                for c in 0..3 {
                    assert!(
                        a[c].abs_diff(b[c]) <= bound,
                        "level {level}: channel {c} off by {}",
                        a[c].abs_diff(b[c])
                    );
                }
                assert_eq!(b[3], 0xFF);
            }
        }
    }

    #[test]
    fn higher_level_never_produces_a_longer_stream() {
        let image = banded_image(1024);
        let mut previous = compress(&image, 0).len();
        assert!(previous <= image.len());
        for level in 1..=5u8 {
            let len = compress(&image, level).len();
            assert!(len <= previous, "level {level} grew the stream");
            previous = len;
        }
    }

    #[test]
    fn uniform_image_collapses_to_runs() {
        let image = [120u8, 130, 140, 255].repeat(256);
        let compressed = compress(&image, 0);
        // One full run of 256 pixels fits in a single record.
        assert_eq!(compressed.len(), 4);
        assert_eq!(decompress(&compressed, 256).unwrap(), image);
    }

    #[test]
    fn overflowing_stream_is_rejected() {
        let stream = [0u8, 0, 0, 255]; // run of 256 pixels
        assert!(matches!(
            decompress(&stream, 10),
            Err(CompositeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn short_stream_is_rejected() {
        let stream = [0u8, 0, 0, 3]; // run of 4 pixels
        assert!(matches!(
            decompress(&stream, 10),
            Err(CompositeError::SizeMismatch { .. })
        ));
    }
}
