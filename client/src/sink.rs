use std::path::PathBuf;

use log::info;
use shared::errors::RenderResult;
use shared::models::frame::CompositeResult;

/// Consumes delivered frames beside (or instead of) the windowed viewer.
pub trait FrameSink: Send {
    fn on_frame_ready(&mut self, frame: &CompositeResult) -> RenderResult<()>;
}

/// Dumps every delivered frame as a numbered PNG file.
pub struct PngSink {
    dir: PathBuf,
}

impl PngSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl FrameSink for PngSink {
    fn on_frame_ready(&mut self, frame: &CompositeResult) -> RenderResult<()> {
        let path = self.dir.join(format!("frame-{:06}.png", frame.sequence));
        frame.save_png(&path)?;
        info!("Saved {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_sink_writes_a_numbered_file() {
        let dir = std::env::temp_dir().join(format!("sink-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let frame = CompositeResult::new(2, 2, vec![0xff; 2 * 2 * 4], None, 7).unwrap();
        PngSink::new(&dir).on_frame_ready(&frame).unwrap();
        assert!(dir.join("frame-000007.png").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
