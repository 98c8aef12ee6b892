//! Per-mount scanner state.

use tracing::debug;

use crate::config::LocationPolicy;
use crate::credentials::{parse_student_id, STUDENT_ID_KEY, TOKEN_KEY};
use crate::device::Coordinates;
use crate::error::{Error, Result};
use crate::gate::{AdmissionGate, GateTimings};
use crate::storage::DeviceStore;

/// Who is scanning. Loaded once per mount and never changed afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Student id sent as `id_aluno`.
    pub student_id: i64,
    /// Bearer token for the attendance endpoint.
    pub auth_token: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("student_id", &self.student_id)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

impl Identity {
    /// Read the identity written by the login flow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if either value is absent, or
    /// [`Error::InvalidToken`] if the stored student id is not an integer.
    pub async fn load(store: &dyn DeviceStore) -> Result<Self> {
        let auth_token = store
            .get(TOKEN_KEY)
            .await?
            .filter(|token| !token.trim().is_empty())
            .ok_or(Error::MissingCredential { key: TOKEN_KEY })?;
        let raw_id = store
            .get(STUDENT_ID_KEY)
            .await?
            .ok_or(Error::MissingCredential {
                key: STUDENT_ID_KEY,
            })?;
        let student_id = parse_student_id(&raw_id)?;

        debug!(student_id, "identity loaded");
        Ok(Self {
            student_id,
            auth_token,
        })
    }
}

/// What is known about the device position.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    /// Still resolving.
    Pending,
    /// Resolved.
    Known(Coordinates),
    /// Permission refused or the query failed.
    Failed(String),
}

/// State of one scanner screen, owned by its event loop.
#[derive(Debug)]
pub struct ScanSession {
    /// Who is scanning.
    pub identity: Identity,
    /// Cached device position.
    pub location: LocationState,
    /// Debounce and exclusivity.
    pub gate: AdmissionGate,
    /// Whether location may be queried at all.
    pub location_permitted: bool,
    /// Whether a position query is running.
    pub resolving: bool,
}

impl ScanSession {
    /// Fresh session with a ready gate and an unresolved position.
    #[must_use]
    pub fn new(identity: Identity, timings: GateTimings) -> Self {
        Self {
            identity,
            location: LocationState::Pending,
            gate: AdmissionGate::new(timings),
            location_permitted: true,
            resolving: false,
        }
    }

    /// Device position to submit under `policy`.
    ///
    /// `Ok(None)` means "submit with null coordinates".
    ///
    /// # Errors
    ///
    /// Returns [`Error::LocationUnavailable`] while resolving, and after a
    /// failure unless `policy` allows null coordinates.
    pub fn device_position(&self, policy: LocationPolicy) -> Result<Option<Coordinates>> {
        match (&self.location, policy) {
            (LocationState::Known(coordinates), _) => Ok(Some(*coordinates)),
            (LocationState::Failed(_), LocationPolicy::AllowNull) => Ok(None),
            (LocationState::Pending | LocationState::Failed(_), _) => {
                Err(Error::LocationUnavailable)
            }
        }
    }

    /// Whether a failed scan should start another position query.
    #[must_use]
    pub fn should_re_resolve(&self) -> bool {
        self.location_permitted
            && !self.resolving
            && matches!(self.location, LocationState::Failed(_))
    }
}
