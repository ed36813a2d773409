//! Still-frame capture for candidate utterances.
//!
//! The client pushes camera frames as they arrive; the correlator grabs the
//! latest one at the moment an utterance is finalized, mirrors it to match
//! the self-view, and encodes it as a base64 JPEG. Capture is best-effort:
//! an utterance without a frame is still a valid utterance.

use std::io::Cursor;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::interview::StillImage;

/// Latest decoded camera frame.
pub type Frame = Arc<DynamicImage>;

/// Frames wider or taller than this are scaled down before encoding.
pub const MAX_FRAME_EDGE: u32 = 640;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
}

/// Anything that can hand over its most recent frame.
pub trait VideoFeed: Send + Sync {
    fn grab(&mut self) -> Result<Frame, CaptureError>;
}

/// Feed backed by the frame channel the HTTP layer writes to.
pub struct WatchFeed {
    frames: watch::Receiver<Option<Frame>>,
}

impl WatchFeed {
    pub fn new(frames: watch::Receiver<Option<Frame>>) -> Self {
        Self { frames }
    }
}

impl VideoFeed for WatchFeed {
    fn grab(&mut self) -> Result<Frame, CaptureError> {
        self.frames
            .borrow_and_update()
            .clone()
            .ok_or_else(|| CaptureError::CaptureUnavailable("no frame received yet".to_string()))
    }
}

/// Binds at most one video feed to the running interview.
#[derive(Default)]
pub struct FrameCorrelator {
    feed: Option<Box<dyn VideoFeed>>,
}

impl FrameCorrelator {
    pub fn new(feed: Option<Box<dyn VideoFeed>>) -> Self {
        Self { feed }
    }

    pub fn is_attached(&self) -> bool {
        self.feed.is_some()
    }

    pub fn capture(&mut self) -> Result<StillImage, CaptureError> {
        let feed = self
            .feed
            .as_mut()
            .ok_or_else(|| CaptureError::CaptureUnavailable("no video feed".to_string()))?;
        let frame = feed.grab()?;
        encode_still(&frame)
    }

    /// Like `capture`, but a failure only costs the utterance its image.
    pub fn capture_best_effort(&mut self) -> Option<StillImage> {
        match self.capture() {
            Ok(image) => Some(image),
            Err(e) => {
                warn!("{e}; recording utterance without an image");
                None
            }
        }
    }

    /// Drops the feed handle. Later captures report `CaptureUnavailable`.
    pub fn release(&mut self) {
        if self.feed.take().is_some() {
            debug!("Video feed released");
        }
    }
}

/// Decodes an uploaded frame (any format the image crate recognizes).
pub fn decode_frame(bytes: &[u8]) -> Result<DynamicImage, CaptureError> {
    image::load_from_memory(bytes)
        .map_err(|e| CaptureError::CaptureUnavailable(format!("undecodable frame: {e}")))
}

/// Mirrors horizontally and bounds the frame size.
fn prepare(frame: &DynamicImage) -> DynamicImage {
    let mirrored = frame.fliph();
    if mirrored.width() > MAX_FRAME_EDGE || mirrored.height() > MAX_FRAME_EDGE {
        mirrored.thumbnail(MAX_FRAME_EDGE, MAX_FRAME_EDGE)
    } else {
        mirrored
    }
}

pub fn encode_still(frame: &DynamicImage) -> Result<StillImage, CaptureError> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(prepare(frame).to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| CaptureError::CaptureUnavailable(format!("JPEG encoding failed: {e}")))?;

    Ok(StillImage {
        mime_type: "image/jpeg".to_string(),
        data_base64: STANDARD.encode(buf.into_inner()),
    })
}
