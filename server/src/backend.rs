//! A self-contained demo backend. Real deployments plug their own renderer
//! in through [`RenderBackend`]; this one paints each rank's horizontal slab
//! of a synthetic scene so the composited image visibly interleaves work
//! from every rank.

use shared::models::view::ViewState;

use crate::render_manager::RenderBackend;

/// Deterministic renderer for one rank: pixels inside the rank's slab sit
/// near the camera, everything else far behind, so depth compositing stitches
/// the slabs back together regardless of exchange order.
pub struct SlabBackend {
    rank: usize,
    total: usize,
}

impl SlabBackend {
    pub fn new(rank: usize, total: usize) -> Self {
        Self {
            rank,
            total: total.max(1),
        }
    }

    fn slab_rows(&self, height: u32) -> (u32, u32) {
        let h = height as usize;
        let begin = self.rank * h / self.total;
        let end = (self.rank + 1) * h / self.total;
        (begin as u32, end as u32)
    }

    fn base_color(&self, view: &ViewState) -> [u8; 3] {
        // Distinct per rank, shifted by the camera so moving the view
        // changes the image.
        let shift = (view.camera_position[2].abs() * 8.0) as usize;
        let tone = ((self.rank * 97 + shift) % 200 + 40) as u8;
        match self.rank % 3 {
            0 => [tone, 32, 32],
            1 => [32, tone, 32],
            _ => [32, 32, tone],
        }
    }
}

impl RenderBackend for SlabBackend {
    fn render(&mut self, view: &ViewState, width: u32, height: u32) -> (Vec<u8>, Option<Vec<f32>>) {
        let (slab_begin, slab_end) = self.slab_rows(height);
        let [r, g, b] = self.base_color(view);
        let background: [u8; 3] = [
            (view.background[0] * 255.0) as u8,
            (view.background[1] * 255.0) as u8,
            (view.background[2] * 255.0) as u8,
        ];

        let pixels = width as usize * height as usize;
        let mut color = Vec::with_capacity(pixels * 4);
        let mut depth = Vec::with_capacity(pixels);
        for y in 0..height {
            let in_slab = y >= slab_begin && y < slab_end;
            for x in 0..width {
                if in_slab {
                    // x gradient so downsampled renders stay recognizable.
                    let fade = (x * 128 / width.max(1)) as u8;
                    color.extend_from_slice(&[
                        r.saturating_add(fade),
                        g.saturating_add(fade),
                        b.saturating_add(fade),
                        0xff,
                    ]);
                    depth.push(0.1 + 0.001 * self.rank as f32);
                } else {
                    color.extend_from_slice(&[background[0], background[1], background[2], 0xff]);
                    depth.push(0.9 + 0.001 * self.rank as f32);
                }
            }
        }
        (color, Some(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slabs_tile_the_height_without_gaps() {
        let total = 3;
        let height = 16u32;
        let mut covered = vec![0u32; height as usize];
        for rank in 0..total {
            let backend = SlabBackend::new(rank, total);
            let (begin, end) = backend.slab_rows(height);
            for row in begin..end {
                covered[row as usize] += 1;
            }
        }
        assert!(covered.iter().all(|&n| n == 1), "coverage: {covered:?}");
    }

    #[test]
    fn render_is_deterministic_and_correctly_sized() {
        let view = ViewState::default();
        let mut backend = SlabBackend::new(1, 4);
        let (color_a, depth_a) = backend.render(&view, 32, 16);
        let (color_b, depth_b) = backend.render(&view, 32, 16);
        assert_eq!(color_a.len(), 32 * 16 * 4);
        assert_eq!(depth_a.as_ref().map(Vec::len), Some(32 * 16));
        assert_eq!(color_a, color_b);
        assert_eq!(depth_a, depth_b);
    }

    #[test]
    fn ranks_sit_in_front_only_inside_their_slab() {
        let view = ViewState::default();
        let width = 8u32;
        let height = 8u32;
        let mut nearest_rank = vec![usize::MAX; (width * height) as usize];
        let mut nearest_depth = vec![f32::MAX; (width * height) as usize];
        for rank in 0..4 {
            let (_, depth) = SlabBackend::new(rank, 4).render(&view, width, height);
            for (i, z) in depth.unwrap().into_iter().enumerate() {
                if z < nearest_depth[i] {
                    nearest_depth[i] = z;
                    nearest_rank[i] = rank;
                }
            }
        }
        // Row band y belongs to rank y / 2 for 4 ranks over 8 rows.
        for y in 0..height as usize {
            for x in 0..width as usize {
                assert_eq!(nearest_rank[y * width as usize + x], y / 2);
            }
        }
    }
}
