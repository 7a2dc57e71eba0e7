//! Per-pixel merge kernels shared by the compositing strategies.

use crate::models::frame::BYTES_PER_PIXEL;

/// Z-compositing: for every pixel, keep the contributor nearer to the
/// camera (strictly smaller depth). Ties keep `dst`, so the caller decides
/// the deterministic winner by which side it passes as `dst`.
pub fn z_merge(
    dst_color: &mut [u8],
    dst_depth: &mut [f32],
    src_color: &[u8],
    src_depth: &[f32],
) {
    for (i, (&sz, dz)) in src_depth.iter().zip(dst_depth.iter_mut()).enumerate() {
        if sz < *dz {
            *dz = sz;
            let at = i * BYTES_PER_PIXEL;
            dst_color[at..at + BYTES_PER_PIXEL]
                .copy_from_slice(&src_color[at..at + BYTES_PER_PIXEL]);
        }
    }
}

/// Alpha-composites `front` OVER `back`, writing the result into `back`.
/// Straight (non-premultiplied) alpha.
pub fn blend_over(front: &[u8], back: &mut [u8]) {
    for (f, b) in front
        .chunks_exact(BYTES_PER_PIXEL)
        .zip(back.chunks_exact_mut(BYTES_PER_PIXEL))
    {
        let fa = f[3] as u16;
        let inv = 255 - fa;
        for c in 0..3 {
            b[c] = ((f[c] as u16 * fa + 127) / 255 + (b[c] as u16 * inv + 127) / 255).min(255)
                as u8;
        }
        b[3] = (fa + (b[3] as u16 * inv + 127) / 255).min(255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px(r: u8, z: f32) -> ([u8; 4], f32) {
        ([r, 0, 0, 255], z)
    }

    #[test]
    fn z_merge_keeps_minimum_depth_contributor() {
        let (a, az) = px(10, 2.0);
        let (b, bz) = px(20, 1.0);
        let mut color = a.to_vec();
        let mut depth = vec![az];
        z_merge(&mut color, &mut depth, &b, &[bz]);
        assert_eq!(color, b.to_vec());
        assert_eq!(depth, vec![1.0]);
    }

    #[test]
    fn z_merge_tie_keeps_dst() {
        let (a, az) = px(10, 1.5);
        let (b, bz) = px(20, 1.5);
        let mut color = a.to_vec();
        let mut depth = vec![az];
        z_merge(&mut color, &mut depth, &b, &[bz]);
        assert_eq!(color, a.to_vec());
    }

    #[test]
    fn z_merge_is_order_insensitive_for_distinct_depths() {
        // merge(merge(a, b), c) == merge(a, merge(b, c)) pixel-wise when all
        // depths differ: the minimum-depth contributor always wins.
        let contributions = [px(1, 3.0), px(2, 1.0), px(3, 2.0)];

        let mut left_c = contributions[0].0.to_vec();
        let mut left_z = vec![contributions[0].1];
        z_merge(&mut left_c, &mut left_z, &contributions[1].0, &[contributions[1].1]);
        z_merge(&mut left_c, &mut left_z, &contributions[2].0, &[contributions[2].1]);

        let mut right_c = contributions[1].0.to_vec();
        let mut right_z = vec![contributions[1].1];
        z_merge(&mut right_c, &mut right_z, &contributions[2].0, &[contributions[2].1]);
        let mut outer_c = contributions[0].0.to_vec();
        let mut outer_z = vec![contributions[0].1];
        z_merge(&mut outer_c, &mut outer_z, &right_c, &right_z);

        assert_eq!(left_c, outer_c);
        assert_eq!(left_z, outer_z);
        assert_eq!(left_c[0], 2); // depth 1.0 contributor
    }

    #[test]
    fn blend_over_opaque_front_wins() {
        let front = [200u8, 50, 0, 255];
        let mut back = [0u8, 0, 255, 255];
        blend_over(&front, &mut back);
        assert_eq!(back, front);
    }

    #[test]
    fn blend_over_scales_semitransparent_front() {
        let front = [200u8, 0, 0, 128];
        let mut back = [0u8, 0, 255, 255];
        blend_over(&front, &mut back);
        // Front red weighted by its own alpha: 200 * 128 / 255.
        assert_eq!(back[0], 100);
        assert_eq!(back[2], 127);
        assert_eq!(back[3], 255);
    }

    #[test]
    fn blend_over_transparent_front_keeps_back() {
        let front = [200u8, 50, 0, 0];
        let mut back = [0u8, 0, 255, 255];
        blend_over(&front, &mut back);
        assert_eq!(back, [0, 0, 255, 255]);
    }
}
