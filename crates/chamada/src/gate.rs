//! Admission control for camera detections.
//!
//! The camera reports a visible code many times per second for as long as it
//! stays in frame. [`AdmissionGate`] turns that level-triggered stream into at
//! most one attempt per scan intent and keeps a second attempt from starting
//! while one is still being processed.
//!
//! Every admitted attempt gets an [`Admission`] ticket. Transitions that end
//! an attempt take the ticket, so an attempt the fail-safe already gave up on
//! cannot unlock the gate for whoever holds it now.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Coarse state of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Detections may be admitted.
    Ready,
    /// An attempt is being validated or is showing its outcome.
    Locked,
    /// An attempt's request is on the wire.
    AwaitingResponse,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Locked => write!(f, "locked"),
            Self::AwaitingResponse => write!(f, "awaiting_response"),
        }
    }
}

/// Ticket for one admitted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Admission {
    attempt: u64,
}

impl Admission {
    /// Sequence number of the attempt within the session, starting at 1.
    #[must_use]
    pub fn attempt(&self) -> u64 {
        self.attempt
    }
}

/// Gate timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTimings {
    /// Minimum time since the last acceptance or release.
    pub quiet: Duration,
    /// Time after which a lock with an unanswered request is forcibly re-armed.
    pub failsafe: Duration,
}

impl Default for GateTimings {
    fn default() -> Self {
        Self {
            quiet: Duration::from_secs(3),
            failsafe: Duration::from_secs(10),
        }
    }
}

/// Debounce and exclusivity state of one scanner screen.
#[derive(Debug)]
pub struct AdmissionGate {
    timings: GateTimings,
    state: GateState,
    /// `None` means "never": the quiet interval is trivially satisfied.
    last_accepted_at: Option<Instant>,
    /// Attempt that currently owns the lock.
    holder: Option<Admission>,
    /// Attempt whose response has not arrived yet.
    in_flight: Option<Admission>,
    attempts: u64,
}

impl AdmissionGate {
    /// Create a ready gate.
    #[must_use]
    pub fn new(timings: GateTimings) -> Self {
        Self {
            timings,
            state: GateState::Ready,
            last_accepted_at: None,
            holder: None,
            in_flight: None,
            attempts: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Attempt holding the lock, if any.
    #[must_use]
    pub fn holder(&self) -> Option<Admission> {
        self.holder
    }

    /// Whether some attempt is still waiting for its response.
    ///
    /// This can stay true after the fail-safe re-armed the gate.
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// When the outstanding request, if any, stops blocking admission.
    #[must_use]
    pub fn in_flight_deadline(&self) -> Option<Instant> {
        self.in_flight?;
        self.last_accepted_at.map(|last| last + self.timings.failsafe)
    }

    /// Time of the last acceptance or release.
    #[must_use]
    pub fn last_accepted_at(&self) -> Option<Instant> {
        self.last_accepted_at
    }

    /// Number of attempts admitted so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Decide whether a detection at `now` becomes an attempt.
    ///
    /// Rejections leave the gate untouched.
    pub fn try_admit(&mut self, now: Instant) -> Option<Admission> {
        if self.state != GateState::Ready {
            // A lock whose response already arrived waits for its release.
            if self.in_flight.is_none() || !self.failsafe_elapsed(now) {
                return None;
            }
            warn!(
                attempt = self.holder.map(|a| a.attempt),
                state = %self.state,
                "no outcome within fail-safe interval, re-arming gate"
            );
            self.state = GateState::Ready;
            self.holder = None;
        }

        if let Some(last) = self.last_accepted_at {
            if now.saturating_duration_since(last) < self.timings.quiet {
                return None;
            }
        }

        if self.in_flight.is_some() && !self.failsafe_elapsed(now) {
            return None;
        }

        self.attempts += 1;
        let admission = Admission {
            attempt: self.attempts,
        };
        self.state = GateState::Locked;
        self.holder = Some(admission);
        self.last_accepted_at = Some(now);
        debug!(attempt = admission.attempt, "detection admitted");
        Some(admission)
    }

    /// Record that `admission`'s request has been sent.
    pub fn mark_awaiting(&mut self, admission: Admission) {
        self.in_flight = Some(admission);
        if self.holder == Some(admission) {
            self.state = GateState::AwaitingResponse;
        }
    }

    /// Record that `admission`'s response (or transport failure) arrived.
    ///
    /// Returns `false` if a later attempt already replaced it.
    pub fn clear_in_flight(&mut self, admission: Admission) -> bool {
        if self.in_flight != Some(admission) {
            return false;
        }
        self.in_flight = None;
        if self.holder == Some(admission) && self.state == GateState::AwaitingResponse {
            self.state = GateState::Locked;
        }
        true
    }

    /// End `admission` and re-arm the gate.
    ///
    /// The quiet interval restarts at `now`. Returns `false`, leaving the
    /// gate untouched, if the fail-safe already handed the lock to a newer
    /// attempt.
    pub fn release(&mut self, admission: Admission, now: Instant) -> bool {
        if self.holder != Some(admission) {
            debug!(
                attempt = admission.attempt,
                "ignoring release from superseded attempt"
            );
            return false;
        }
        self.state = GateState::Ready;
        self.holder = None;
        self.last_accepted_at = Some(now);
        debug!(attempt = admission.attempt, "gate released");
        true
    }

    fn failsafe_elapsed(&self, now: Instant) -> bool {
        self.last_accepted_at
            .map_or(true, |last| now.saturating_duration_since(last) >= self.timings.failsafe)
    }
}
