//! The scanner screen.
//!
//! One task owns the [`ScanSession`] and reacts to camera detections,
//! finished background work and timers from a single `select!` loop.
//! Position queries and submissions run in a [`JoinSet`] and report back as
//! messages, so admission decisions never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::camera::{CameraSource, Detection};
use crate::config::{Config, LocationPolicy};
use crate::device::{Capability, Coordinates, Geolocator, Navigator, PermissionProbe, Route};
use crate::error::{Error, Result};
use crate::gate::{Admission, GateTimings};
use crate::notify::{messages, BannerKind, BannerSink, Presenter};
use crate::payload::ScanPayload;
use crate::session::{Identity, LocationState, ScanSession};
use crate::storage::{AttemptEntry, AttemptOutcome, DeviceStore};
use crate::submit::{AttendanceApi, ServerReply, SubmissionRecord};

/// Capacity of the detection channel between camera and screen.
const DETECTION_BUFFER: usize = 64;

/// Screen timing and policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenOptions {
    /// Gate debounce and fail-safe.
    pub gate: GateTimings,
    /// Time the success banner stays before leaving the screen.
    pub success_delay: Duration,
    /// Banner hold time.
    pub banner_hold: Duration,
    /// Banner fade time.
    pub banner_fade: Duration,
    /// What to do when the position could not be resolved.
    pub location_policy: LocationPolicy,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            gate: GateTimings::default(),
            success_delay: Duration::from_secs(3),
            banner_hold: Duration::from_secs(5),
            banner_fade: Duration::from_millis(500),
            location_policy: LocationPolicy::Block,
        }
    }
}

impl ScreenOptions {
    /// Options from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            gate: GateTimings {
                quiet: config.gate.quiet_interval(),
                failsafe: config.gate.failsafe_interval(),
            },
            success_delay: config.gate.success_delay(),
            banner_hold: config.banner.hold(),
            banner_fade: config.banner.fade(),
            location_policy: config.location.policy,
        }
    }
}

/// Everything the screen talks to.
pub struct Platform {
    /// Permission dialogs.
    pub permissions: Arc<dyn PermissionProbe>,
    /// Position queries.
    pub geolocator: Arc<dyn Geolocator>,
    /// Attendance endpoint.
    pub api: Arc<dyn AttendanceApi>,
    /// Stored credentials and the attempt journal.
    pub store: Arc<dyn DeviceStore>,
    /// Screen transitions.
    pub navigator: Box<dyn Navigator>,
    /// Banner rendering.
    pub sink: Box<dyn BannerSink>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

/// Why the screen stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenExit {
    /// Attendance was recorded and the screen left for `route`.
    Navigated(Route),
    /// The camera stopped delivering frames and nothing was pending.
    CameraClosed,
}

/// Context of an attempt whose request is on the wire.
#[derive(Debug, Clone)]
struct InFlight {
    admission: Admission,
    call_id: String,
    payload_hash: String,
}

/// Result of a background task.
#[derive(Debug)]
enum TaskDone {
    Location(Result<Coordinates>),
    Submission {
        attempt: InFlight,
        reply: Result<ServerReply>,
    },
}

/// Scheduled exit after a recorded attendance.
#[derive(Debug)]
struct PendingExit {
    admission: Admission,
    deadline: Instant,
    message: String,
}

/// Loop-owned state of a mounted screen.
#[derive(Debug)]
struct Mounted {
    session: ScanSession,
    tasks: JoinSet<TaskDone>,
    pending_exit: Option<PendingExit>,
    camera_open: bool,
}

impl Mounted {
    /// When to leave the screen.
    ///
    /// An outstanding request holds the exit until it answers or the gate
    /// gives up on it.
    fn exit_deadline(&self) -> Option<Instant> {
        let pending = self.pending_exit.as_ref()?;
        Some(match self.session.gate.in_flight_deadline() {
            Some(abandoned_at) => pending.deadline.max(abandoned_at),
            None => pending.deadline,
        })
    }
}

/// QR attendance scanner.
pub struct ScanScreen {
    options: ScreenOptions,
    permissions: Arc<dyn PermissionProbe>,
    geolocator: Arc<dyn Geolocator>,
    api: Arc<dyn AttendanceApi>,
    store: Arc<dyn DeviceStore>,
    navigator: Box<dyn Navigator>,
    presenter: Presenter,
}

impl std::fmt::Debug for ScanScreen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScreen")
            .field("options", &self.options)
            .field("presenter", &self.presenter)
            .finish_non_exhaustive()
    }
}

impl ScanScreen {
    /// Create a screen; nothing happens until [`ScanScreen::run`].
    #[must_use]
    pub fn new(options: ScreenOptions, platform: Platform) -> Self {
        Self {
            presenter: Presenter::new(options.banner_hold, options.banner_fade, platform.sink),
            options,
            permissions: platform.permissions,
            geolocator: platform.geolocator,
            api: platform.api,
            store: platform.store,
            navigator: platform.navigator,
        }
    }

    /// Mount the screen and process detections from `camera` until it
    /// navigates away or the camera closes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if camera access is refused, and
    /// credential errors if no login was stored. Scan failures are shown as
    /// banners and never returned.
    pub async fn run<C: CameraSource>(mut self, mut camera: C) -> Result<ScreenExit> {
        let mut mounted = self.mount().await?;

        let (detection_tx, mut detections) = mpsc::channel(DETECTION_BUFFER);
        let camera_name = camera.name();
        let camera_task = tokio::spawn(async move {
            if let Err(e) = camera.run(detection_tx).await {
                error!(camera = camera_name, "camera stopped: {}", e);
            }
        });
        info!(camera = camera_name, "scanner ready");

        let exit = loop {
            if !mounted.camera_open && mounted.tasks.is_empty() && mounted.pending_exit.is_none()
            {
                break ScreenExit::CameraClosed;
            }

            let exit_deadline = mounted.exit_deadline();
            let banner_deadline = self.presenter.next_deadline();

            tokio::select! {
                detection = detections.recv(), if mounted.camera_open => match detection {
                    Some(detection) => self.on_detection(&mut mounted, detection).await,
                    None => {
                        debug!("camera closed");
                        mounted.camera_open = false;
                    }
                },
                Some(joined) = mounted.tasks.join_next(), if !mounted.tasks.is_empty() => {
                    match joined {
                        Ok(done) => self.on_task_done(&mut mounted, done).await,
                        Err(e) => {
                            // Submissions catch their own panics, so this was a position query.
                            error!("location task failed: {}", e);
                            self.on_location(&mut mounted, Err(Error::internal(e.to_string())));
                        }
                    }
                }
                () = wait_until(exit_deadline) => {
                    if let Some(route) = self.on_exit_deadline(&mut mounted) {
                        break ScreenExit::Navigated(route);
                    }
                }
                () = wait_until(banner_deadline) => {
                    self.presenter.tick(Instant::now());
                }
            }
        };

        camera_task.abort();
        mounted.tasks.detach_all();
        info!(attempts = mounted.session.gate.attempts(), "scanner closed");
        Ok(exit)
    }

    /// Permissions, identity and the initial position query.
    async fn mount(&mut self) -> Result<Mounted> {
        if !self
            .permissions
            .request(Capability::Camera)
            .await
            .is_granted()
        {
            warn!("camera permission denied");
            self.presenter.status(messages::CAMERA_DENIED);
            return Err(Error::PermissionDenied {
                capability: Capability::Camera.name(),
            });
        }

        let location_permitted = self
            .permissions
            .request(Capability::Location)
            .await
            .is_granted();

        let identity = Identity::load(self.store.as_ref()).await?;
        let mut session = ScanSession::new(identity, self.options.gate);
        let mut tasks = JoinSet::new();

        self.presenter.status(messages::POINT_AT_CODE);
        if location_permitted {
            self.spawn_location(&mut session, &mut tasks);
        } else {
            warn!("location permission denied");
            session.location_permitted = false;
            session.location = LocationState::Failed("permission denied".to_string());
            self.presenter.status(messages::LOCATION_DENIED);
        }

        Ok(Mounted {
            session,
            tasks,
            pending_exit: None,
            camera_open: true,
        })
    }

    fn spawn_location(&self, session: &mut ScanSession, tasks: &mut JoinSet<TaskDone>) {
        debug!("resolving device position");
        session.resolving = true;
        let geolocator = Arc::clone(&self.geolocator);
        tasks.spawn(async move { TaskDone::Location(geolocator.current_position().await) });
    }

    async fn on_detection(&mut self, mounted: &mut Mounted, detection: Detection) {
        let now = Instant::now();
        let Some(admission) = mounted.session.gate.try_admit(now) else {
            trace!("detection ignored");
            return;
        };
        let payload_hash = detection.payload_hash();

        let payload = match ScanPayload::parse(&detection.payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.reject_locally(mounted, admission, None, payload_hash, &e)
                    .await;
                return;
            }
        };
        let call_id = payload.call_id.to_string();

        let device = match mounted
            .session
            .device_position(self.options.location_policy)
        {
            Ok(device) => device,
            Err(e) => {
                if mounted.session.should_re_resolve() {
                    self.spawn_location(&mut mounted.session, &mut mounted.tasks);
                }
                self.reject_locally(mounted, admission, Some(call_id), payload_hash, &e)
                    .await;
                return;
            }
        };

        let record = SubmissionRecord::new(mounted.session.identity.student_id, &payload, device);
        mounted.session.gate.mark_awaiting(admission);
        info!(
            attempt = admission.attempt(),
            call_id = %call_id,
            with_position = device.is_some(),
            "submitting attendance"
        );

        let api = Arc::clone(&self.api);
        let token = mounted.session.identity.auth_token.clone();
        let attempt = InFlight {
            admission,
            call_id,
            payload_hash,
        };
        mounted.tasks.spawn(async move {
            let request = tokio::spawn(async move { api.submit(&token, &record).await });
            let reply = request
                .await
                .unwrap_or_else(|e| Err(Error::network(format!("submission task failed: {e}"))));
            TaskDone::Submission { attempt, reply }
        });
    }

    /// End an attempt that failed before reaching the network.
    async fn reject_locally(
        &mut self,
        mounted: &mut Mounted,
        admission: Admission,
        call_id: Option<String>,
        payload_hash: String,
        error: &Error,
    ) {
        let (text, outcome) = match error {
            Error::LocationUnavailable => {
                (messages::AWAITING_LOCATION, AttemptOutcome::LocationUnavailable)
            }
            _ => (messages::INVALID_QR, AttemptOutcome::InvalidPayload),
        };
        info!(attempt = admission.attempt(), outcome = %outcome, "scan rejected: {}", error);

        let now = Instant::now();
        self.presenter.show(text, BannerKind::Error, now);
        mounted.session.gate.release(admission, now);
        journal(
            self.store.as_ref(),
            AttemptEntry::new(call_id, payload_hash, outcome, text),
        )
        .await;
    }

    async fn on_task_done(&mut self, mounted: &mut Mounted, done: TaskDone) {
        match done {
            TaskDone::Location(result) => self.on_location(mounted, result),
            TaskDone::Submission { attempt, reply } => {
                self.on_submission(mounted, attempt, reply).await;
            }
        }
    }

    fn on_location(&mut self, mounted: &mut Mounted, result: Result<Coordinates>) {
        mounted.session.resolving = false;
        match result {
            Ok(coordinates) => {
                info!(position = %coordinates, "device position resolved");
                if !matches!(mounted.session.location, LocationState::Known(_)) {
                    self.presenter.status(messages::POINT_AT_CODE);
                }
                mounted.session.location = LocationState::Known(coordinates);
            }
            Err(e) => {
                warn!("device position unavailable: {}", e);
                if !matches!(mounted.session.location, LocationState::Known(_)) {
                    mounted.session.location = LocationState::Failed(e.to_string());
                    self.presenter.status(messages::LOCATION_FAILED);
                }
            }
        }
    }

    async fn on_submission(
        &mut self,
        mounted: &mut Mounted,
        attempt: InFlight,
        reply: Result<ServerReply>,
    ) {
        let admission = attempt.admission;
        if !mounted.session.gate.clear_in_flight(admission) {
            debug!(attempt = admission.attempt(), "response for superseded attempt");
        }

        let now = Instant::now();
        let (text, outcome) = match reply.and_then(ServerReply::into_result) {
            Ok(message) => {
                let text = message.unwrap_or_else(|| messages::ATTENDANCE_RECORDED.to_string());
                info!(attempt = admission.attempt(), "attendance recorded");
                self.presenter.show(text.clone(), BannerKind::Success, now);
                let holds_gate = mounted.session.gate.holder() == Some(admission);
                if holds_gate || mounted.pending_exit.is_none() {
                    mounted.pending_exit = Some(PendingExit {
                        admission,
                        deadline: now + self.options.success_delay,
                        message: text.clone(),
                    });
                }
                (text, AttemptOutcome::Recorded)
            }
            Err(Error::RemoteRejection { status, message }) => {
                info!(attempt = admission.attempt(), status, "attendance rejected: {}", message);
                self.presenter.show(message.clone(), BannerKind::Error, now);
                mounted.session.gate.release(admission, now);
                (message, AttemptOutcome::Rejected)
            }
            Err(e) => {
                warn!(attempt = admission.attempt(), "attendance not sent: {}", e);
                self.presenter
                    .show(messages::NETWORK_ERROR, BannerKind::Error, now);
                mounted.session.gate.release(admission, now);
                (
                    messages::NETWORK_ERROR.to_string(),
                    AttemptOutcome::NetworkFailure,
                )
            }
        };

        journal(
            self.store.as_ref(),
            AttemptEntry::new(Some(attempt.call_id), attempt.payload_hash, outcome, text),
        )
        .await;
    }

    fn on_exit_deadline(&mut self, mounted: &mut Mounted) -> Option<Route> {
        let pending = mounted.pending_exit.take()?;
        mounted.session.gate.release(pending.admission, Instant::now());

        let route = Route::Home {
            message: Some(pending.message),
        };
        self.navigator.navigate(route.clone());
        Some(route)
    }
}

/// Journal failures are logged; they never affect the screen.
async fn journal(store: &dyn DeviceStore, entry: AttemptEntry) {
    if let Err(e) = store.record_attempt(entry).await {
        warn!("failed to journal attempt: {}", e);
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
