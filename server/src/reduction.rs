//! Adaptive image-reduction policy: picks the downsampling factor so that
//! projected render plus image-processing time meets the desired interactive
//! update rate.

/// Rounded-up size of the reduced image all ranks render at.
pub fn reduced_size(full_width: u32, full_height: u32, factor: u32) -> (u32, u32) {
    let f = factor.max(1);
    ((full_width + f - 1) / f, (full_height + f - 1) / f)
}

#[derive(Debug, Clone)]
pub struct ReductionPolicy {
    factor: u32,
    max_factor: u32,
    avg_time_per_pixel: f64,
}

impl ReductionPolicy {
    pub fn new(max_factor: u32) -> Self {
        Self {
            factor: 1,
            max_factor: max_factor.max(1),
            avg_time_per_pixel: 0.0,
        }
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    /// Recomputes the factor from the latest frame's timings. Geometry
    /// render time is fixed cost; image-processing time scales with the
    /// pixel count, so the factor is sized to fit the image-processing
    /// budget left over after rendering. A zero update rate disables
    /// reduction entirely.
    pub fn update(
        &mut self,
        desired_update_rate: f64,
        render_time: f64,
        image_processing_time: f64,
        full_pixels: usize,
    ) {
        if desired_update_rate == 0.0 {
            self.factor = 1;
            return;
        }

        let reduced_pixels = full_pixels / (self.factor * self.factor) as usize;
        if reduced_pixels == 0 {
            // Must be before the first real render.
            self.factor = 1;
            return;
        }
        let time_per_pixel = image_processing_time / reduced_pixels as f64;
        self.avg_time_per_pixel = if self.avg_time_per_pixel > 0.0 {
            (3.0 * self.avg_time_per_pixel + time_per_pixel) / 4.0
        } else {
            time_per_pixel
        };
        if self.avg_time_per_pixel <= 0.0 {
            self.factor = 1;
            return;
        }

        let mut allotted_pixel_time = 1.0 / desired_update_rate - render_time;
        // Leave the image pipeline at least 15% of the render time.
        if allotted_pixel_time < 0.15 * render_time {
            allotted_pixel_time = 0.15 * render_time;
        }

        let pixels_to_use = allotted_pixel_time / self.avg_time_per_pixel;
        let full = full_pixels as f64;
        if pixels_to_use < 1.0 || full / pixels_to_use > self.max_factor as f64 {
            self.factor = self.max_factor;
        } else if pixels_to_use >= full {
            self.factor = 1;
        } else {
            self.factor = ((full / pixels_to_use) as u32).clamp(1, self.max_factor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_frame_coarsens_the_factor() {
        // 10 fps requested, but the prior frame took 200 ms at factor 1:
        // the next factor must increase so less pixel work fits the budget.
        let mut policy = ReductionPolicy::new(16);
        policy.update(10.0, 0.1, 0.1, 300 * 300);
        assert!(policy.factor() > 1, "factor stayed at {}", policy.factor());
    }

    #[test]
    fn fast_frame_returns_to_full_resolution() {
        let mut policy = ReductionPolicy::new(16);
        policy.update(10.0, 0.1, 0.1, 300 * 300);
        assert!(policy.factor() > 1);
        // Frames now well under budget: plenty of pixel time available.
        for _ in 0..8 {
            policy.update(10.0, 0.001, 0.0001, 300 * 300);
        }
        assert_eq!(policy.factor(), 1);
    }

    #[test]
    fn zero_rate_disables_reduction() {
        let mut policy = ReductionPolicy::new(16);
        policy.update(10.0, 0.5, 0.5, 300 * 300);
        assert!(policy.factor() > 1);
        policy.update(0.0, 0.5, 0.5, 300 * 300);
        assert_eq!(policy.factor(), 1);
    }

    #[test]
    fn factor_is_clamped_to_the_maximum() {
        let mut policy = ReductionPolicy::new(4);
        policy.update(30.0, 5.0, 5.0, 1000 * 1000);
        assert_eq!(policy.factor(), 4);
    }

    #[test]
    fn reduced_size_rounds_up() {
        assert_eq!(reduced_size(301, 299, 2), (151, 150));
        assert_eq!(reduced_size(300, 300, 1), (300, 300));
    }
}
