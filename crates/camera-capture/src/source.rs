//! Frame sources
//!
//! A `FrameSource` is the blocking "get next frame" capability a monitor
//! worker pulls from. Live camera drivers live outside this crate; the two
//! sources here cover simulation (a directory of stills) and tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{CameraError, VideoFrame};

/// Blocking provider of sequential frames for one device.
pub trait FrameSource: Send {
    /// Acquire the underlying stream. Failure here is fatal for a session.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Pull the next frame. `CameraError::EndOfStream` is permanent, every
    /// other error is retryable.
    fn read_frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Release the underlying stream.
    fn release(&mut self);

    /// Human readable name used in logs.
    fn describe(&self) -> String;
}

/// In-memory source replaying a fixed list of frames.
///
/// `None` entries yield `CameraError::Unavailable` once, which mimics a
/// camera dropping frames.
pub struct ReplaySource {
    name: String,
    frames: VecDeque<Option<VideoFrame>>,
    fail_open: bool,
    read_delay: Duration,
    opened: bool,
    released: Arc<AtomicBool>,
}

impl ReplaySource {
    /// Replay the given frames once, then report end of stream
    pub fn new(name: impl Into<String>, frames: Vec<VideoFrame>) -> Self {
        Self::with_gaps(name, frames.into_iter().map(Some).collect())
    }

    /// Replay frames where `None` marks a transient read failure
    pub fn with_gaps(name: impl Into<String>, frames: Vec<Option<VideoFrame>>) -> Self {
        Self {
            name: name.into(),
            frames: frames.into(),
            fail_open: false,
            read_delay: Duration::ZERO,
            opened: false,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `count` solid frames of the given size, numbered from 1
    pub fn solid(name: impl Into<String>, count: u32, width: u32, height: u32) -> Self {
        let frames = (1..=count)
            .map(|seq| VideoFrame::filled(width, height, [90, 90, 90], seq))
            .collect();
        Self::new(name, frames)
    }

    /// Make `open` fail
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Block for `delay` on every read
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Flag set once `release` has been called
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl FrameSource for ReplaySource {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.fail_open {
            return Err(CameraError::Open(format!("{}: refused", self.name)));
        }
        self.opened = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if !self.opened {
            return Err(CameraError::NotInitialized);
        }
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        match self.frames.pop_front() {
            Some(Some(frame)) => Ok(frame),
            Some(None) => Err(CameraError::Unavailable),
            None => Err(CameraError::EndOfStream),
        }
    }

    fn release(&mut self) {
        self.opened = false;
        self.released.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.name)
    }
}

/// Reads JPEG/PNG stills from a directory in file-name order.
pub struct ImageDirSource {
    dir: PathBuf,
    looping: bool,
    files: Vec<PathBuf>,
    cursor: usize,
    sequence: u32,
    opened: bool,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>, looping: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            looping,
            files: Vec::new(),
            cursor: 0,
            sequence: 0,
            opened: false,
        }
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                ext == "jpg" || ext == "jpeg" || ext == "png"
            })
            .unwrap_or(false)
    }
}

impl FrameSource for ImageDirSource {
    fn open(&mut self) -> Result<(), CameraError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", self.dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| Self::is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "{}: no image frames found",
                self.dir.display()
            )));
        }

        info!("Opened image directory {} ({} frames)", self.dir.display(), files.len());
        self.files = files;
        self.cursor = 0;
        self.opened = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        if !self.opened {
            return Err(CameraError::NotInitialized);
        }

        if self.cursor >= self.files.len() {
            if !self.looping {
                return Err(CameraError::EndOfStream);
            }
            debug!("Looping image directory {}", self.dir.display());
            self.cursor = 0;
            self.sequence = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;

        let image = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("Skipping unreadable frame {}: {}", path.display(), e);
                return Err(CameraError::Stream(e.to_string()));
            }
        };

        self.sequence = self.sequence.wrapping_add(1);
        let timestamp_ns = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|ns| u64::try_from(ns).ok())
            .unwrap_or(0);

        Ok(VideoFrame::from_rgb_image(image, timestamp_ns, self.sequence))
    }

    fn release(&mut self) {
        self.files.clear();
        self.opened = false;
    }

    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }
}
