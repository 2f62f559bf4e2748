//! Attendance session state machine.
//!
//! One session owns the whole capture-screen-authenticate loop:
//!
//! ```text
//!           ┌──────────────────────────────────────────────┐
//!           ▼                                              │
//! ┌──────┐ screen ┌───────────┐ resolve ┌──────────────┐   │ delay
//! │ Idle │───────►│ Screening │────────►│Authenticating│───┘
//! └──────┘        └───────────┘         └──────────────┘
//!    ▲ NotReady:      │ no face /           │ failure / not found /
//!    │ skip silently  │ not live            │ profile displayed
//!    └────────────────┴──────────────────────┘
//! ```
//!
//! Cycles run strictly one at a time: every stage is awaited in order
//! and the inter-cycle delay starts when a cycle *completes*, so two
//! in-flight authentications can never race to update the display. A
//! failing remote dependency just produces a failed display;
//! the kiosk never stops polling.

use crate::directory::{DirectoryError, EmployeeProfile};
use crate::engine::{EngineError, ScreenOutcome};
use crate::narrator::Narrator;
use crate::resolver::ResolveError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const MSG_IDLE: &str = "Please look at the camera";
const MSG_NO_FACE: &str = "No face detected. Please adjust your position.";
const MSG_NOT_LIVE: &str = "Liveness check failed. Blink to verify.";
const MSG_LIVE: &str = "Liveness check success.";
const MSG_AUTH_FAILED: &str = "Authentication failed. Please try again.";
const MSG_NOT_FOUND: &str = "Employee not found.";
const MSG_DIRECTORY_ERROR: &str = "Error fetching employee details.";

/// Local screening seam (the engine handle in production).
#[async_trait]
pub trait Screen: Send + Sync {
    async fn screen(&self) -> Result<ScreenOutcome, EngineError>;
}

/// Remote identity resolution seam.
#[async_trait]
pub trait ResolveIdentity: Send + Sync {
    async fn resolve(&self, jpeg: &[u8]) -> Result<String, ResolveError>;
}

/// Employee directory seam.
#[async_trait]
pub trait FetchProfile: Send + Sync {
    async fn fetch(&self, face_id: &str) -> Result<EmployeeProfile, DirectoryError>;
}

/// The only state surfaced to the UI. Replaced in full at each cycle
/// boundary; never merged with a prior value.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDisplay {
    pub authenticated: bool,
    pub message: String,
    pub profile: Option<EmployeeProfile>,
}

impl Default for SessionDisplay {
    fn default() -> Self {
        Self {
            authenticated: false,
            message: MSG_IDLE.to_string(),
            profile: None,
        }
    }
}

/// Tagged result of one cycle's pipeline, decided before any display
/// mutation so failure handling stays uniform.
#[derive(Debug)]
enum CycleOutcome {
    /// Camera not ready (or screening unavailable): display unchanged.
    Skipped,
    NoFace,
    NotLive,
    /// Upload, match, or no-match failure from the resolver.
    AuthFailed,
    NotFound,
    DirectoryDown,
    /// Full profile fetched; branch on its attendance status.
    Resolved(EmployeeProfile),
}

/// Timing knobs for the session.
pub struct SessionSettings {
    /// Delay between the end of one cycle and the start of the next.
    pub cycle_interval: Duration,
    /// How long `authenticated` stays true before the auto-reset.
    pub auth_hold: Duration,
}

/// One kiosk session with explicit lifecycle: construct, `run`, stop
/// via the shutdown channel.
pub struct Session<S, R, D, N> {
    screen: S,
    resolver: R,
    directory: D,
    narrator: N,
    settings: SessionSettings,
    display_tx: watch::Sender<SessionDisplay>,
    /// Pending authenticated auto-reset; replaced, never leaked.
    auth_reset: Option<JoinHandle<()>>,
}

impl<S, R, D, N> Session<S, R, D, N>
where
    S: Screen,
    R: ResolveIdentity,
    D: FetchProfile,
    N: Narrator,
{
    pub fn new(
        screen: S,
        resolver: R,
        directory: D,
        narrator: N,
        settings: SessionSettings,
    ) -> (Self, watch::Receiver<SessionDisplay>) {
        let (display_tx, display_rx) = watch::channel(SessionDisplay::default());
        (
            Self {
                screen,
                resolver,
                directory,
                narrator,
                settings,
                display_tx,
                auth_reset: None,
            },
            display_rx,
        )
    }

    /// Loop until `shutdown` flips to true.
    ///
    /// Shutdown is observed only between cycles, so an in-flight cycle
    /// always runs to completion; the pending auto-reset is cleared on
    /// the way out.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("session started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_cycle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.settings.cycle_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        if let Some(pending) = self.auth_reset.take() {
            pending.abort();
        }
        tracing::info!("session stopped");
    }

    /// One full capture-screen-authenticate attempt.
    async fn run_cycle(&mut self) {
        let outcome = self.evaluate().await;
        tracing::debug!(?outcome, "cycle complete");
        self.apply(outcome);
    }

    /// The sequential result-passing pipeline: each stage is awaited in
    /// order and any failure short-circuits to a tagged outcome.
    async fn evaluate(&self) -> CycleOutcome {
        let verdict = match self.screen.screen().await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "screening unavailable this cycle");
                return CycleOutcome::Skipped;
            }
        };

        let jpeg = match verdict {
            ScreenOutcome::NotReady => return CycleOutcome::Skipped,
            ScreenOutcome::NoFace => return CycleOutcome::NoFace,
            ScreenOutcome::NotLive => return CycleOutcome::NotLive,
            ScreenOutcome::Live { jpeg } => jpeg,
        };

        // Screening passed; say so while the round-trips run.
        self.display_tx.send_replace(SessionDisplay {
            authenticated: false,
            message: MSG_LIVE.to_string(),
            profile: None,
        });

        let face_id = match self.resolver.resolve(&jpeg).await {
            Ok(face_id) => face_id,
            Err(e) => {
                tracing::warn!(error = %e, "identity resolution failed");
                return CycleOutcome::AuthFailed;
            }
        };

        match self.directory.fetch(&face_id).await {
            Ok(profile) => CycleOutcome::Resolved(profile),
            Err(DirectoryError::NotFound) => CycleOutcome::NotFound,
            Err(e) => {
                tracing::warn!(error = %e, "directory lookup failed");
                CycleOutcome::DirectoryDown
            }
        }
    }

    /// Fold the outcome into the display at the cycle boundary.
    fn apply(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Skipped => {}
            CycleOutcome::NoFace => self.publish(false, MSG_NO_FACE.to_string(), None),
            CycleOutcome::NotLive => self.publish(false, MSG_NOT_LIVE.to_string(), None),
            CycleOutcome::AuthFailed => self.publish(false, MSG_AUTH_FAILED.to_string(), None),
            CycleOutcome::NotFound => self.publish(false, MSG_NOT_FOUND.to_string(), None),
            CycleOutcome::DirectoryDown => {
                self.publish(false, MSG_DIRECTORY_ERROR.to_string(), None)
            }
            CycleOutcome::Resolved(profile) => {
                if profile.attendance_status {
                    let message =
                        format!("Welcome {}, {}", profile.name, profile.attendance_message);
                    self.narrator.speak(&message);
                    self.publish(true, message, Some(profile));
                    self.schedule_auth_reset();
                } else {
                    let message = format!("Hi {}, {}", profile.name, profile.attendance_message);
                    self.narrator.speak(&message);
                    self.publish(false, message, Some(profile));
                }
            }
        }
    }

    fn publish(&self, authenticated: bool, message: String, profile: Option<EmployeeProfile>) {
        self.display_tx.send_replace(SessionDisplay {
            authenticated,
            message,
            profile,
        });
    }

    /// Schedule `authenticated -> false` after the hold. A newer
    /// authenticated result supersedes the previous pending reset so a
    /// stale timer cannot clobber fresher state.
    fn schedule_auth_reset(&mut self) {
        if let Some(prev) = self.auth_reset.take() {
            prev.abort();
        }
        let display_tx = self.display_tx.clone();
        let hold = self.settings.auth_hold;
        self.auth_reset = Some(tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            display_tx.send_modify(|display| display.authenticated = false);
        }));
    }
}
