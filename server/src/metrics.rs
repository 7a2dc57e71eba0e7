use shared::delivery::TimingMetrics;

/// Rolling per-session counters, reported when the display client leaves.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    frames_delivered: u64,
    frames_dropped: u64,
    total_render_time: f64,
    total_composite_time: f64,
    total_transfer_time: f64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered(&mut self, timings: TimingMetrics) {
        self.frames_delivered += 1;
        self.total_render_time += timings.render_time;
        self.total_composite_time += timings.composite_time;
        self.total_transfer_time += timings.transfer_time;
    }

    pub fn record_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn summary(&self) -> String {
        if self.frames_delivered == 0 {
            return format!(
                "Session over: 0 frames delivered, {} dropped",
                self.frames_dropped
            );
        }
        let n = self.frames_delivered as f64;
        format!(
            "Session over: {} frames delivered, {} dropped (avg render {:.1} ms, composite {:.1} ms, transfer {:.1} ms)",
            self.frames_delivered,
            self.frames_dropped,
            1000.0 * self.total_render_time / n,
            1000.0 * self.total_composite_time / n,
            1000.0 * self.total_transfer_time / n,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_cover_delivered_frames_only() {
        let mut metrics = SessionMetrics::new();
        metrics.record_delivered(TimingMetrics {
            render_time: 0.010,
            composite_time: 0.004,
            transfer_time: 0.002,
        });
        metrics.record_delivered(TimingMetrics {
            render_time: 0.030,
            composite_time: 0.004,
            transfer_time: 0.002,
        });
        metrics.record_dropped();

        assert_eq!(metrics.frames_delivered(), 2);
        assert_eq!(metrics.frames_dropped(), 1);
        assert!(metrics.summary().contains("avg render 20.0 ms"));
    }

    #[test]
    fn empty_session_has_a_summary() {
        let metrics = SessionMetrics::new();
        assert!(metrics.summary().contains("0 frames delivered"));
    }
}
