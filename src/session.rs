//! Live capture session: the camera handle and capture state that must
//! survive between UI passes.

use std::time::Duration;
use uuid::Uuid;

use crate::camera::{CameraOpener, Frame, FrameSource};

/// Prefix of the filename stored for live captures
pub const CAPTURE_PREFIX: &str = "live_mood_capture";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    /// Camera disabled, handle released
    Off,
    /// Reading one frame per UI pass
    Streaming,
    /// A frame was captured; camera released until the view is restarted
    Captured,
    /// The camera failed; stays here until disabled (no retry)
    Unavailable,
}

/// What one [`LiveSession::poll`] produced
#[derive(Debug)]
pub enum LiveTick {
    /// Not streaming; nothing to render
    Idle,
    /// A new mirrored preview frame
    Frame(Frame),
    /// The capture flag was set; this is the frame to classify
    Captured(Frame),
    /// The camera could not be opened or read
    Failed(String),
}

pub struct LiveSession {
    opener: CameraOpener,
    camera: Option<Box<dyn FrameSource>>,
    last_frame: Option<Frame>,
    capture_requested: bool,
    state: LiveState,
    frame_interval: Duration,
    generation: u64,
}

impl LiveSession {
    pub fn new(opener: CameraOpener, frame_interval: Duration) -> Self {
        Self {
            opener,
            camera: None,
            last_frame: None,
            capture_requested: false,
            state: LiveState::Off,
            frame_interval,
            generation: 0,
        }
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    /// Delay before the next UI pass while streaming
    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    pub fn is_camera_held(&self) -> bool {
        self.camera.is_some()
    }

    /// Bumped on every enable and disable; a capture result tagged with an
    /// older generation belongs to a phase that has ended
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a fresh streaming phase. The camera is opened on the next poll.
    pub fn enable(&mut self) {
        if self.state == LiveState::Streaming {
            return;
        }
        self.release_camera();
        self.last_frame = None;
        self.capture_requested = false;
        self.state = LiveState::Streaming;
        self.generation += 1;
    }

    /// Stop streaming, release the camera and clear the preview
    pub fn disable(&mut self) {
        self.release_camera();
        self.last_frame = None;
        self.capture_requested = false;
        self.state = LiveState::Off;
        self.generation += 1;
    }

    /// Capture the next frame read while streaming
    pub fn request_capture(&mut self) {
        if self.state == LiveState::Streaming {
            self.capture_requested = true;
        }
    }

    /// One UI pass: read a frame, mirror it, and honour a pending capture
    pub fn poll(&mut self) -> LiveTick {
        if self.state != LiveState::Streaming {
            return LiveTick::Idle;
        }

        let frame = match self.read_frame() {
            Ok(frame) => frame.mirror_horizontal(),
            Err(e) => {
                log::warn!("Camera unavailable: {:#}", e);
                self.release_camera();
                self.last_frame = None;
                self.capture_requested = false;
                self.state = LiveState::Unavailable;
                return LiveTick::Failed(e.to_string());
            }
        };

        self.last_frame = Some(frame.clone());

        if self.capture_requested {
            self.capture_requested = false;
            self.release_camera();
            self.state = LiveState::Captured;
            return LiveTick::Captured(frame);
        }

        LiveTick::Frame(frame)
    }

    fn read_frame(&mut self) -> anyhow::Result<Frame> {
        if self.camera.is_none() {
            self.camera = Some((self.opener)()?);
        }
        match self.camera.as_mut() {
            Some(camera) => camera.read_frame(),
            None => Err(anyhow::anyhow!("Camera not open")),
        }
    }

    fn release_camera(&mut self) {
        if self.camera.take().is_some() {
            log::debug!("Live session released the camera");
        }
    }
}

/// Filename under which a live capture is stored
pub fn capture_filename() -> String {
    format!("{}{}", CAPTURE_PREFIX, Uuid::new_v4())
}
