//! Capture sources.
//!
//! A [`CaptureSource`] wraps whatever surface produces screen images. The
//! capture service owns the source on its own thread and drops it when the
//! loop exits.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{CaptureError, Frame};

/// File extensions replayed by [`ImageSequenceSource`].
const SEQUENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// A producer of screen frames.
pub trait CaptureSource: Send {
    /// Grab one frame, waiting at most `timeout` for the surface.
    ///
    /// `Ok(None)` means no frame was available this tick. Errors are
    /// retried by the capture service with backoff.
    fn capture(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError>;

    /// Short name used in log messages.
    fn name(&self) -> &str {
        "capture"
    }
}

/// Capture source backed by a closure.
///
/// # Example
///
/// ```ignore
/// let source = FnSource::new("synthetic", move |_timeout| {
///     Ok(Some(Frame::from_gray(next_image())))
/// });
/// ```
pub struct FnSource<F> {
    name: String,
    capture_fn: F,
}

impl<F> FnSource<F>
where
    F: FnMut(Duration) -> Result<Option<Frame>, CaptureError> + Send,
{
    pub fn new(name: impl Into<String>, capture_fn: F) -> Self {
        Self {
            name: name.into(),
            capture_fn,
        }
    }
}

impl<F> CaptureSource for FnSource<F>
where
    F: FnMut(Duration) -> Result<Option<Frame>, CaptureError> + Send,
{
    fn capture(&mut self, timeout: Duration) -> Result<Option<Frame>, CaptureError> {
        (self.capture_fn)(timeout)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Replays image files from a directory in lexical order.
///
/// When the sequence ends it either wraps around (`looping`) or yields no
/// more frames and raises its [`finished`](Self::finished_flag) flag.
#[derive(Debug)]
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    finished: Arc<AtomicBool>,
}

impl ImageSequenceSource {
    /// Collect the image files in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Io` if the directory cannot be read and
    /// `CaptureError::WindowNotFound` if it contains no images.
    pub fn open(dir: &Path, looping: bool) -> Result<Self, CaptureError> {
        let mut files = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| SEQUENCE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::WindowNotFound);
        }

        tracing::debug!(
            dir = %dir.display(),
            frames = files.len(),
            looping,
            "Opened image sequence"
        );

        Ok(Self {
            files,
            next: 0,
            looping,
            finished: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Number of frames in one pass of the sequence.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Flag set once a non-looping sequence has been fully replayed.
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.finished)
    }
}

impl CaptureSource for ImageSequenceSource {
    fn capture(&mut self, _timeout: Duration) -> Result<Option<Frame>, CaptureError> {
        if self.next >= self.files.len() {
            if !self.looping {
                self.finished.store(true, Ordering::SeqCst);
                return Ok(None);
            }
            self.next = 0;
        }

        let path = &self.files[self.next];
        self.next += 1;

        let image = image::open(path).map_err(|e| CaptureError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(Frame::from_rgba(image.to_rgba8())))
    }

    fn name(&self) -> &str {
        "image-sequence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use tempfile::TempDir;

    fn write_sequence(dir: &Path, count: u8) {
        for i in 0..count {
            let img = GrayImage::from_pixel(8, 8, Luma([i * 20]));
            img.save(dir.join(format!("frame_{:03}.png", i))).unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    }

    #[test]
    fn test_sequence_replays_in_order() {
        let dir = TempDir::new().unwrap();
        write_sequence(dir.path(), 3);

        let mut source = ImageSequenceSource::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 3);

        for i in 0..3u8 {
            let frame = source.capture(Duration::from_millis(10)).unwrap().unwrap();
            assert_eq!(frame.to_gray().get_pixel(0, 0).0[0], i * 20);
        }
        assert!(source.capture(Duration::from_millis(10)).unwrap().is_none());
        assert!(source.finished_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_sequence_loops() {
        let dir = TempDir::new().unwrap();
        write_sequence(dir.path(), 2);

        let mut source = ImageSequenceSource::open(dir.path(), true).unwrap();
        let values: Vec<u8> = (0..5)
            .map(|_| {
                let frame = source.capture(Duration::ZERO).unwrap().unwrap();
                frame.to_gray().get_pixel(0, 0).0[0]
            })
            .collect();
        assert_eq!(values, vec![0, 20, 0, 20, 0]);
        assert!(!source.finished_flag().load(Ordering::SeqCst));
    }

    #[test]
    fn test_empty_directory_is_window_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ImageSequenceSource::open(dir.path(), false).unwrap_err();
        assert!(matches!(err, CaptureError::WindowNotFound));
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let err = ImageSequenceSource::open(Path::new("/nonexistent/frames"), false).unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
    }

    #[test]
    fn test_fn_source() {
        let mut calls = 0;
        let mut source = FnSource::new("counter", move |_| {
            calls += 1;
            if calls > 1 {
                Err(CaptureError::SurfaceLost("gone".to_string()))
            } else {
                Ok(Some(Frame::from_gray(GrayImage::new(2, 2))))
            }
        });
        assert_eq!(source.name(), "counter");
        assert!(source.capture(Duration::ZERO).unwrap().is_some());
        assert!(source.capture(Duration::ZERO).is_err());
    }
}
