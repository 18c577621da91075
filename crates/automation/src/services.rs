//! Host services scripts can query: video timing, video size, text metrics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use unicode_width::UnicodeWidthStr;

use subauto_config::Settings;
use subauto_document::Style;

// ============================================================================
// Video
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    /// 0 = default, 1 = fullscreen, 2 = widescreen, 3 = cinematic, 4 = custom
    pub aspect_ratio_type: i32,
}

pub trait VideoProvider: Send + Sync {
    fn timecodes_loaded(&self) -> bool;

    /// Frame being displayed at `ms`.
    fn frame_at_ms(&self, ms: i64) -> i64;

    /// Start time of `frame`.
    fn ms_at_frame(&self, frame: i64) -> i64;

    fn video_size(&self) -> Option<VideoSize>;
}

/// No video open.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVideo;

impl VideoProvider for NoVideo {
    fn timecodes_loaded(&self) -> bool {
        false
    }

    fn frame_at_ms(&self, _ms: i64) -> i64 {
        0
    }

    fn ms_at_frame(&self, _frame: i64) -> i64 {
        0
    }

    fn video_size(&self) -> Option<VideoSize> {
        None
    }
}

/// Constant frame rate `num/den` fps, optionally with a known frame size.
#[derive(Debug, Clone, Copy)]
pub struct ConstantFrameRate {
    num: i64,
    den: i64,
    size: Option<VideoSize>,
}

impl ConstantFrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self {
            num: i64::from(num.max(1)),
            den: i64::from(den.max(1)),
            size: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        let aspect_ratio = if height == 0 { 0.0 } else { f64::from(width) / f64::from(height) };
        self.size = Some(VideoSize { width, height, aspect_ratio, aspect_ratio_type: 0 });
        self
    }
}

impl VideoProvider for ConstantFrameRate {
    fn timecodes_loaded(&self) -> bool {
        true
    }

    fn frame_at_ms(&self, ms: i64) -> i64 {
        let frame = i128::from(ms.max(0)) * i128::from(self.num) / (i128::from(self.den) * 1000);
        saturate(frame)
    }

    fn ms_at_frame(&self, frame: i64) -> i64 {
        let num = i128::from(self.num);
        let ms = (i128::from(frame.max(0)) * i128::from(self.den) * 1000 + num - 1) / num;
        saturate(ms)
    }

    fn video_size(&self) -> Option<VideoSize> {
        self.size
    }
}

/// Times and frames past the end of `i64` clamp to its maximum.
fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// ============================================================================
// Text metrics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtents {
    pub width: f64,
    pub height: f64,
    pub descent: f64,
    pub external_leading: f64,
}

pub trait TextMetrics: Send + Sync {
    /// Rendered size of `text` in `style`. `None` if it cannot be measured.
    fn text_extents(&self, style: &Style, text: &str) -> Option<TextExtents>;
}

/// Approximates every glyph as half an em wide per terminal column.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonospaceMetrics;

impl TextMetrics for MonospaceMetrics {
    fn text_extents(&self, style: &Style, text: &str) -> Option<TextExtents> {
        if !(style.fontsize > 0.0) {
            return None;
        }
        let columns = text.width() as f64;
        let chars = text.chars().count() as f64;
        let scale_x = style.scale_x / 100.0;
        let scale_y = style.scale_y / 100.0;

        let width = columns * style.fontsize * 0.5 * scale_x + chars * style.spacing;
        let height = style.fontsize * scale_y;
        Some(TextExtents {
            width,
            height,
            descent: height * 0.2,
            external_leading: 0.0,
        })
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Everything a script runtime needs from the host.
#[derive(Clone)]
pub struct HostServices {
    pub video: Arc<dyn VideoProvider>,
    pub metrics: Arc<dyn TextMetrics>,
    pub include_dirs: Vec<PathBuf>,
    pub poll_interval: Duration,
}

impl HostServices {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            include_dirs: settings.include_dirs(),
            poll_interval: settings.poll_interval(),
            ..Self::default()
        }
    }

    pub fn with_video(mut self, video: Arc<dyn VideoProvider>) -> Self {
        self.video = video;
        self
    }

    pub fn with_include_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.include_dirs = dirs;
        self
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            video: Arc::new(NoVideo),
            metrics: Arc::new(MonospaceMetrics),
            include_dirs: Vec::new(),
            poll_interval: Duration::from_millis(25),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cfr_frame_conversion() {
        let v = ConstantFrameRate::new(25, 1);
        assert_eq!(v.frame_at_ms(0), 0);
        assert_eq!(v.frame_at_ms(39), 0);
        assert_eq!(v.frame_at_ms(40), 1);
        assert_eq!(v.ms_at_frame(25), 1000);
    }

    #[test]
    fn test_ntsc_frame_start_round_trips() {
        let v = ConstantFrameRate::new(24000, 1001);
        for frame in [0, 1, 2, 100, 12345] {
            assert_eq!(v.frame_at_ms(v.ms_at_frame(frame)), frame);
        }
    }

    #[test]
    fn test_cfr_huge_inputs_saturate() {
        let fast = ConstantFrameRate::new(u32::MAX, 1);
        assert_eq!(fast.frame_at_ms(i64::MAX), i64::MAX);
        let slow = ConstantFrameRate::new(1, u32::MAX);
        assert_eq!(slow.ms_at_frame(i64::MAX), i64::MAX);

        let pal = ConstantFrameRate::new(25, 1);
        assert_eq!(pal.frame_at_ms(i64::MAX), i64::MAX / 40);
        assert_eq!(pal.ms_at_frame(i64::MAX), i64::MAX);
    }

    #[test]
    fn test_monospace_metrics() {
        let style = Style { fontsize: 20.0, ..Style::default() };
        let ext = MonospaceMetrics.text_extents(&style, "abcd").unwrap();
        assert_eq!(ext.width, 40.0);
        assert_eq!(ext.height, 20.0);

        let zero = Style { fontsize: 0.0, ..Style::default() };
        assert!(MonospaceMetrics.text_extents(&zero, "x").is_none());
    }

    #[test]
    fn test_wide_glyphs_take_two_columns() {
        let style = Style { fontsize: 10.0, ..Style::default() };
        let ext = MonospaceMetrics.text_extents(&style, "日本").unwrap();
        assert_eq!(ext.width, 20.0);
    }
}
