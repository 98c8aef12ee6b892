//! Transient banner shown on the scanner screen.
//!
//! A banner is fully visible for `hold`, fades for `fade`, then disappears.
//! Showing a new banner replaces the current one and restarts both timers.
//! Rendering goes through a [`BannerSink`]; the presenter only keeps time.

use std::io::Write;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

/// User-facing texts.
pub mod messages {
    /// Success without a server message.
    pub const ATTENDANCE_RECORDED: &str = "Chamada registrada!";
    /// Rejection without a readable server message.
    pub const ATTENDANCE_REJECTED: &str = "Erro ao registrar chamada";
    /// No response at all.
    pub const NETWORK_ERROR: &str = "Erro de rede. Tente novamente.";
    /// Unreadable or incomplete QR code.
    pub const INVALID_QR: &str = "QR Code inválido!";
    /// Position not resolved yet.
    pub const AWAITING_LOCATION: &str = "Aguardando localização...";
    /// Camera permission refused.
    pub const CAMERA_DENIED: &str = "Sem acesso à câmera.";
    /// Location permission refused.
    pub const LOCATION_DENIED: &str = "Permissão de localização negada";
    /// Position query failed.
    pub const LOCATION_FAILED: &str = "Não foi possível obter a localização";
    /// Screen ready for scanning.
    pub const POINT_AT_CODE: &str = "Aponte para o QR Code";
}

/// Visual variant of a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    /// Green banner.
    Success,
    /// Red banner.
    Error,
}

impl std::fmt::Display for BannerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Banner content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Text shown to the user.
    pub text: String,
    /// Visual variant.
    pub kind: BannerKind,
}

/// Where a banner is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerPhase {
    /// Nothing on screen.
    Hidden,
    /// Fully opaque.
    Visible,
    /// Fading out.
    Fading,
}

/// Renders banners and the persistent status line.
pub trait BannerSink: Send {
    /// A banner appeared (or replaced the previous one).
    fn show(&mut self, banner: &Banner);

    /// The current banner started fading.
    fn fade(&mut self, banner: &Banner);

    /// The current banner is gone.
    fn hide(&mut self);

    /// Persistent screen text, independent of banners.
    fn status(&mut self, text: &str);
}

#[derive(Debug)]
struct Shown {
    banner: Banner,
    shown_at: Instant,
    fading: bool,
}

/// Keeps at most one banner on screen and drives its fade-out.
pub struct Presenter {
    hold: Duration,
    fade: Duration,
    current: Option<Shown>,
    sink: Box<dyn BannerSink>,
}

impl std::fmt::Debug for Presenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Presenter")
            .field("hold", &self.hold)
            .field("fade", &self.fade)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl Presenter {
    /// Create a presenter rendering through `sink`.
    #[must_use]
    pub fn new(hold: Duration, fade: Duration, sink: Box<dyn BannerSink>) -> Self {
        Self {
            hold,
            fade,
            current: None,
            sink,
        }
    }

    /// Show `text`, replacing whatever is on screen.
    pub fn show(&mut self, text: impl Into<String>, kind: BannerKind, now: Instant) {
        let banner = Banner {
            text: text.into(),
            kind,
        };
        trace!(kind = %banner.kind, text = %banner.text, "banner shown");
        self.sink.show(&banner);
        self.current = Some(Shown {
            banner,
            shown_at: now,
            fading: false,
        });
    }

    /// Update the persistent status line.
    pub fn status(&mut self, text: &str) {
        self.sink.status(text);
    }

    /// Banner currently on screen, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Banner> {
        self.current.as_ref().map(|shown| &shown.banner)
    }

    /// Lifecycle phase at `now`.
    #[must_use]
    pub fn phase(&self, now: Instant) -> BannerPhase {
        let Some(shown) = &self.current else {
            return BannerPhase::Hidden;
        };
        let elapsed = now.saturating_duration_since(shown.shown_at);
        if elapsed < self.hold {
            BannerPhase::Visible
        } else if elapsed < self.hold + self.fade {
            BannerPhase::Fading
        } else {
            BannerPhase::Hidden
        }
    }

    /// Opacity at `now`, from 1.0 (visible) down to 0.0 (hidden).
    #[must_use]
    pub fn opacity(&self, now: Instant) -> f32 {
        let Some(shown) = &self.current else {
            return 0.0;
        };
        match self.phase(now) {
            BannerPhase::Visible => 1.0,
            BannerPhase::Hidden => 0.0,
            BannerPhase::Fading => {
                let into_fade = now.saturating_duration_since(shown.shown_at + self.hold);
                1.0 - into_fade.as_secs_f32() / self.fade.as_secs_f32()
            }
        }
    }

    /// Next instant at which [`Presenter::tick`] has something to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(|shown| {
            if shown.fading {
                shown.shown_at + self.hold + self.fade
            } else {
                shown.shown_at + self.hold
            }
        })
    }

    /// Advance the banner lifecycle to `now`, notifying the sink.
    pub fn tick(&mut self, now: Instant) {
        let phase = self.phase(now);
        let Some(shown) = self.current.as_mut() else {
            return;
        };
        match phase {
            BannerPhase::Visible => {}
            BannerPhase::Fading => {
                if !shown.fading {
                    shown.fading = true;
                    self.sink.fade(&shown.banner);
                }
            }
            BannerPhase::Hidden => {
                self.current = None;
                self.sink.hide();
            }
        }
    }
}

/// Prints banners to a terminal.
#[derive(Debug)]
pub struct ConsoleSink<W> {
    out: W,
}

impl<W: Write + Send> ConsoleSink<W> {
    /// Print to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write + Send> BannerSink for ConsoleSink<W> {
    fn show(&mut self, banner: &Banner) {
        let marker = match banner.kind {
            BannerKind::Success => "[ok]",
            BannerKind::Error => "[erro]",
        };
        let _ = writeln!(self.out, "{marker} {}", banner.text);
    }

    fn fade(&mut self, _banner: &Banner) {}

    fn hide(&mut self) {}

    fn status(&mut self, text: &str) {
        let _ = writeln!(self.out, "-- {text}");
    }
}
