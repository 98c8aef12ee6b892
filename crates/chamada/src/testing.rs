//! In-memory fakes for the scanner's collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::camera::{CameraSource, Detection};
use crate::credentials::{STUDENT_ID_KEY, TOKEN_KEY};
use crate::device::{Coordinates, Geolocator, Navigator, Route};
use crate::error::{Error, Result};
use crate::notify::{Banner, BannerSink};
use crate::storage::{AttemptEntry, DeviceStore};
use crate::submit::{AttendanceApi, ServerReply, SubmissionRecord};

#[derive(Debug, Default)]
struct SinkLog {
    shown: Vec<Banner>,
    fades: usize,
    hides: usize,
    statuses: Vec<String>,
}

/// Banner sink that remembers everything it was told.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn banners(&self) -> Vec<Banner> {
        self.log.lock().unwrap().shown.clone()
    }

    pub fn shown_texts(&self) -> Vec<String> {
        self.banners().into_iter().map(|b| b.text).collect()
    }

    pub fn fades(&self) -> usize {
        self.log.lock().unwrap().fades
    }

    pub fn hides(&self) -> usize {
        self.log.lock().unwrap().hides
    }

    pub fn statuses(&self) -> Vec<String> {
        self.log.lock().unwrap().statuses.clone()
    }
}

impl BannerSink for RecordingSink {
    fn show(&mut self, banner: &Banner) {
        self.log.lock().unwrap().shown.push(banner.clone());
    }

    fn fade(&mut self, _banner: &Banner) {
        self.log.lock().unwrap().fades += 1;
    }

    fn hide(&mut self) {
        self.log.lock().unwrap().hides += 1;
    }

    fn status(&mut self, text: &str) {
        self.log.lock().unwrap().statuses.push(text.to_string());
    }
}

/// Scripted answer of [`FakeApi`].
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Answer with `status` and an optional message after `delay`.
    Reply {
        status: u16,
        message: Option<&'static str>,
        delay: Duration,
    },
    /// No response.
    Transport,
    /// Never answer.
    Hang,
    /// The request task panics.
    Panic,
}

impl FakeReply {
    pub fn ok(message: &'static str) -> Self {
        Self::Reply {
            status: 200,
            message: Some(message),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, message: Option<&'static str>) -> Self {
        Self::Reply {
            status,
            message,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(status: u16, message: Option<&'static str>, delay: Duration) -> Self {
        Self::Reply {
            status,
            message,
            delay,
        }
    }
}

/// Attendance endpoint answering from a script; 200 without message once exhausted.
#[derive(Debug, Clone, Default)]
pub struct FakeApi {
    script: Arc<Mutex<VecDeque<FakeReply>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl FakeApi {
    pub fn new(script: impl IntoIterator<Item = FakeReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            calls: Arc::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Request bodies in call order.
    pub fn bodies(&self) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(token, _)| token.clone())
            .collect()
    }
}

#[async_trait]
impl AttendanceApi for FakeApi {
    async fn submit(&self, token: &str, record: &SubmissionRecord) -> Result<ServerReply> {
        let body = serde_json::to_value(record)?;
        self.calls.lock().unwrap().push((token.to_string(), body));
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeReply::Reply {
                status: 200,
                message: None,
                delay: Duration::ZERO,
            });

        match reply {
            FakeReply::Reply {
                status,
                message,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(ServerReply {
                    status,
                    message: message.map(str::to_string),
                })
            }
            FakeReply::Transport => Err(Error::network("connection reset")),
            FakeReply::Hang => std::future::pending().await,
            FakeReply::Panic => panic!("submission exploded"),
        }
    }
}

/// Geolocator answering from a script; fails once exhausted.
#[derive(Debug, Clone, Default)]
pub struct FakeGeolocator {
    script: Arc<Mutex<VecDeque<Option<Coordinates>>>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FakeGeolocator {
    pub fn new(script: impl IntoIterator<Item = Option<Coordinates>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self::new([Some(Coordinates::new(latitude, longitude))])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Geolocator for FakeGeolocator {
    async fn current_position(&self) -> Result<Coordinates> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .ok_or_else(|| Error::platform("position unavailable"))
    }
}

/// Device store kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    attempts: Arc<Mutex<Vec<AttemptEntry>>>,
}

impl MemoryStore {
    pub fn with_identity(token: &str, student_id: &str) -> Self {
        let store = Self::default();
        store.insert(TOKEN_KEY, token);
        store.insert(STUDENT_ID_KEY, student_id);
        store
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn attempts(&self) -> Vec<AttemptEntry> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn record_attempt(&self, entry: AttemptEntry) -> Result<()> {
        self.attempts.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Navigator remembering where and when it was sent.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    routes: Arc<Mutex<Vec<(Route, Instant)>>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<(Route, Instant)> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&mut self, route: Route) {
        self.routes.lock().unwrap().push((route, Instant::now()));
    }
}

/// Camera fed by the test through a channel; each message is one frame.
#[derive(Debug)]
pub struct ChannelCamera {
    frames: mpsc::Receiver<String>,
}

impl ChannelCamera {
    pub fn new() -> (mpsc::Sender<String>, Self) {
        let (tx, frames) = mpsc::channel(64);
        (tx, Self { frames })
    }
}

#[async_trait]
impl CameraSource for ChannelCamera {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn run(&mut self, sender: mpsc::Sender<Detection>) -> Result<()> {
        while let Some(frame) = self.frames.recv().await {
            if sender.send(Detection::new(frame)).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}
