//! Camera detections.
//!
//! A camera keeps reporting a QR code for as long as it stays in frame, so a
//! [`CameraSource`] emits the same payload over and over. Debouncing is the
//! gate's job, never the source's.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::Result;

/// One decoded QR code seen in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Decoded text.
    pub payload: String,
    /// When the frame was decoded.
    pub detected_at: DateTime<Utc>,
}

impl Detection {
    /// Create a detection stamped now.
    #[must_use]
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            detected_at: Utc::now(),
        }
    }

    /// BLAKE3 hash of the payload, used instead of the raw text in the journal.
    #[must_use]
    pub fn payload_hash(&self) -> String {
        blake3::hash(self.payload.as_bytes()).to_hex().to_string()
    }
}

/// Source of QR detections.
#[async_trait]
pub trait CameraSource: Send + 'static {
    /// Name of the source, for logs.
    fn name(&self) -> &'static str;

    /// Deliver detections until the source is exhausted or `sender` closes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device fails.
    async fn run(&mut self, sender: mpsc::Sender<Detection>) -> Result<()>;
}

/// Treats each input line as a code held in front of the camera.
///
/// Every non-empty line is reported `repeat` times, `frame_interval` apart,
/// the way a real detector keeps firing while the code is visible.
#[derive(Debug)]
pub struct LineCamera<R> {
    reader: R,
    repeat: u32,
    frame_interval: Duration,
}

impl<R> LineCamera<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Read codes from `reader`.
    pub fn new(reader: R, repeat: u32, frame_interval: Duration) -> Self {
        Self {
            reader,
            repeat: repeat.max(1),
            frame_interval,
        }
    }
}

#[async_trait]
impl<R> CameraSource for LineCamera<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "lines"
    }

    async fn run(&mut self, sender: mpsc::Sender<Detection>) -> Result<()> {
        let mut lines = (&mut self.reader).lines();
        while let Some(line) = lines.next_line().await? {
            let payload = line.trim();
            if payload.is_empty() {
                continue;
            }
            for frame in 0..self.repeat {
                if frame > 0 {
                    tokio::time::sleep(self.frame_interval).await;
                }
                trace!(frame, "code in frame");
                if sender.send(Detection::new(payload)).await.is_err() {
                    debug!("scanner closed, camera stopping");
                    return Ok(());
                }
            }
        }
        debug!("camera input exhausted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_hash_is_stable() {
        let a = Detection::new("{\"id\":1}");
        let b = Detection::new("{\"id\":1}");
        assert_eq!(a.payload_hash(), b.payload_hash());
        assert_ne!(a.payload_hash(), Detection::new("{\"id\":2}").payload_hash());
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_camera_repeats_each_code() {
        let input: &[u8] = b"first\n\n  second  \n";
        let mut camera = LineCamera::new(input, 3, Duration::from_millis(100));
        let (tx, mut rx) = mpsc::channel(16);

        camera.run(tx).await.unwrap();

        let mut payloads = Vec::new();
        while let Some(detection) = rx.recv().await {
            payloads.push(detection.payload);
        }
        assert_eq!(
            payloads,
            vec!["first", "first", "first", "second", "second", "second"]
        );
    }

    #[tokio::test]
    async fn test_line_camera_stops_when_receiver_dropped() {
        let input: &[u8] = b"code\n";
        let mut camera = LineCamera::new(input, 100, Duration::ZERO);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert!(camera.run(tx).await.is_ok());
    }
}
