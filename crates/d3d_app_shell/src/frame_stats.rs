/// Averages over one second of game time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub fps: f32,
    pub mspf: f32,
}

impl FrameSample {
    pub fn caption(&self, title: &str) -> String {
        format!("{title}    fps: {:.6}   mspf: {:.6}", self.fps, self.mspf)
    }
}

#[derive(Debug, Default)]
pub struct FrameStats {
    frame_count: u32,
    time_elapsed: f32,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a frame drawn at `total_time` seconds. Yields a sample once a full second
    /// has passed since the previous one.
    pub fn record(&mut self, total_time: f32) -> Option<FrameSample> {
        self.frame_count += 1;
        if total_time - self.time_elapsed < 1.0 {
            return None;
        }
        let fps = self.frame_count as f32;
        let sample = FrameSample {
            fps,
            mspf: 1000.0 / fps,
        };
        self.frame_count = 0;
        self.time_elapsed += 1.0;
        Some(sample)
    }
}
