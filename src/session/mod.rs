//! Session controller for the Stellar Skills login flow.
//!
//! One state machine owns the three axes of the login screen:
//! - wallet detection: `Checking -> Detected | NotInstalled`, re-entrant via
//!   an explicit recheck;
//! - connection: `Disconnected -> Connecting -> Connected`, falling back to
//!   `Disconnected` on any failure;
//! - username editing (Connected only): `Viewing -> Editing -> Saving`.
//!
//! The wallet agent, identity backend, durable store and clipboard are
//! injected capabilities, so the whole machine runs against fakes in tests.
//! Rendering is a pure function of [`SessionController::snapshot`].

pub mod error;

use std::cell::RefCell;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::identity::{
    UsernameError, canonicalize_username, decode_proof, sanitize_wallet_address,
};
use crate::models::{PersistedSession, UserRecord, WalletAuth};

pub use error::{SessionError, UsernameIssue};

/// Browser-extension-style signing identity, reachable through the local
/// wallet agent.
pub trait WalletProvider {
    /// Single availability probe; the bounded retry loop lives in
    /// [`SessionController::detect`].
    async fn is_available(&self) -> bool;
    async fn authenticate(&self) -> Result<WalletAuth, SessionError>;
}

/// Remote service of record for user accounts, keyed by wallet address.
pub trait IdentityBackend {
    async fn upsert_by_address(
        &self,
        address: &str,
        proof: &str,
    ) -> Result<(UserRecord, bool), SessionError>;
    async fn update_username(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<UserRecord, SessionError>;
}

/// Durable mirror of the session. The address/record pair is written and
/// cleared together; anything unreadable loads as `None`.
pub trait SessionStore {
    async fn load(&self) -> Option<PersistedSession>;
    async fn persist(&self, session: &PersistedSession) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

pub trait Clipboard {
    async fn write_text(&self, text: &str) -> Result<()>;
}

impl<T: WalletProvider> WalletProvider for &T {
    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }

    async fn authenticate(&self) -> Result<WalletAuth, SessionError> {
        (**self).authenticate().await
    }
}

impl<T: IdentityBackend> IdentityBackend for &T {
    async fn upsert_by_address(
        &self,
        address: &str,
        proof: &str,
    ) -> Result<(UserRecord, bool), SessionError> {
        (**self).upsert_by_address(address, proof).await
    }

    async fn update_username(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<UserRecord, SessionError> {
        (**self).update_username(user_id, username).await
    }
}

impl<T: SessionStore> SessionStore for &T {
    async fn load(&self) -> Option<PersistedSession> {
        (**self).load().await
    }

    async fn persist(&self, session: &PersistedSession) -> Result<()> {
        (**self).persist(session).await
    }

    async fn clear(&self) -> Result<()> {
        (**self).clear().await
    }
}

impl<T: Clipboard> Clipboard for &T {
    async fn write_text(&self, text: &str) -> Result<()> {
        (**self).write_text(text).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Checking,
    Detected,
    NotInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditState {
    Viewing,
    Editing {
        draft: String,
        error: Option<UsernameIssue>,
    },
    Saving {
        draft: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFeedback {
    Copied,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { is_new_user: bool },
    /// Ignored: an attempt is already in flight.
    Pending,
    /// Precondition not met (wallet not detected, or already connected).
    Refused,
    /// Failure recorded in the status message slot.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Invalid(UsernameError),
    Taken,
    Failed,
    /// Ignored: a save is already in flight.
    Pending,
    Refused,
}

/// Display windows for the transient indicators and the returning-user
/// redirect.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorTimers {
    pub welcome_window: Duration,
    pub redirect_delay: Duration,
    pub copy_feedback_window: Duration,
}

/// Everything a presentation layer needs to render the login screen.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub detection: DetectionState,
    pub phase: ConnectionPhase,
    pub wallet_address: Option<String>,
    pub user: Option<UserRecord>,
    pub edit: EditState,
    pub message: Option<String>,
    pub welcome_visible: bool,
    pub copy_feedback: Option<CopyFeedback>,
    pub redirect_armed: bool,
}

#[derive(Debug, Clone)]
struct Session {
    wallet_address: String,
    user: UserRecord,
}

struct ControllerState {
    detection: DetectionState,
    phase: ConnectionPhase,
    session: Option<Session>,
    edit: EditState,
    message: Option<String>,
    welcome_until: Option<Instant>,
    redirect_at: Option<Instant>,
    copy_feedback: Option<(CopyFeedback, Instant)>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            detection: DetectionState::Checking,
            phase: ConnectionPhase::Disconnected,
            session: None,
            edit: EditState::Viewing,
            message: None,
            welcome_until: None,
            redirect_at: None,
            copy_feedback: None,
        }
    }
}

pub struct SessionController<W, B, S, C> {
    wallet: W,
    backend: B,
    store: S,
    clipboard: C,
    detect_attempts: u32,
    detect_interval: Duration,
    timers: IndicatorTimers,
    // Single-threaded cooperative model: state is borrowed only between
    // awaits, never across one.
    state: RefCell<ControllerState>,
}

impl<W, B, S, C> SessionController<W, B, S, C>
where
    W: WalletProvider,
    B: IdentityBackend,
    S: SessionStore,
    C: Clipboard,
{
    pub fn new(
        wallet: W,
        backend: B,
        store: S,
        clipboard: C,
        detect_attempts: u32,
        detect_interval: Duration,
        timers: IndicatorTimers,
    ) -> Self {
        assert!(detect_attempts >= 1, "At least one probe is required");
        assert!(
            detect_attempts <= 20,
            "Detection attempts exceed defensive limit"
        );
        assert!(
            detect_interval >= Duration::from_millis(50),
            "Detection interval below 50ms is unsafe"
        );
        assert!(
            timers.copy_feedback_window >= Duration::from_millis(200),
            "Copy feedback window below 200ms is unreadable"
        );
        assert!(
            timers.welcome_window >= Duration::from_secs(1),
            "Welcome window below one second is unreadable"
        );
        Self {
            wallet,
            backend,
            store,
            clipboard,
            detect_attempts,
            detect_interval,
            timers,
            state: RefCell::new(ControllerState::default()),
        }
    }

    /// Probes for the wallet extension, waiting out late agent startup with
    /// a bounded retry loop. Returns the definite availability verdict.
    pub async fn detect(&self) -> bool {
        self.state.borrow_mut().detection = DetectionState::Checking;

        let mut available = false;
        for attempt in 0..self.detect_attempts {
            if attempt > 0 {
                sleep(self.detect_interval).await;
            }
            if self.wallet.is_available().await {
                available = true;
                break;
            }
        }

        let mut state = self.state.borrow_mut();
        if available {
            info!("Wallet extension detected");
            state.detection = DetectionState::Detected;
            state.message = None;
        } else {
            info!(
                "Wallet extension not found after {} probes",
                self.detect_attempts
            );
            state.detection = DetectionState::NotInstalled;
            state.message = Some(SessionError::DetectionFailed.user_message());
        }
        available
    }

    /// Runs the challenge/response handshake: wallet authentication, backend
    /// upsert, then durable persistence. At most one attempt is in flight;
    /// re-invocations while `Connecting` return [`ConnectOutcome::Pending`].
    pub async fn connect(&self) -> ConnectOutcome {
        {
            let mut state = self.state.borrow_mut();
            match state.phase {
                ConnectionPhase::Connecting => {
                    debug!("Ignoring connect while an attempt is in flight");
                    return ConnectOutcome::Pending;
                }
                ConnectionPhase::Connected => return ConnectOutcome::Refused,
                ConnectionPhase::Disconnected => {}
            }
            if state.detection != DetectionState::Detected {
                debug!("Connect refused: wallet not detected");
                return ConnectOutcome::Refused;
            }
            state.phase = ConnectionPhase::Connecting;
            state.message = None;
        }

        let auth = match self.wallet.authenticate().await {
            Ok(auth) => auth,
            Err(err) => return self.fail_connect(err).await,
        };

        let address = match sanitize_wallet_address(&auth.address) {
            Ok(address) => address,
            Err(err) => {
                return self
                    .fail_connect(SessionError::Provider(err.to_string()))
                    .await;
            }
        };
        if let Err(err) = decode_proof(&auth.proof) {
            return self
                .fail_connect(SessionError::Provider(err.to_string()))
                .await;
        }

        let (user, is_new_user) = match self.backend.upsert_by_address(&address, &auth.proof).await
        {
            Ok(result) => result,
            Err(err) => return self.fail_connect(err).await,
        };

        let persisted = PersistedSession {
            wallet_address: address.clone(),
            user: user.clone(),
        };
        if let Err(err) = self.store.persist(&persisted).await {
            return self
                .fail_connect(SessionError::Storage(format!("{err:#}")))
                .await;
        }

        info!(new_user = is_new_user, "Wallet connected: {address}");
        let now = Instant::now();
        let mut state = self.state.borrow_mut();
        state.phase = ConnectionPhase::Connected;
        state.session = Some(Session {
            wallet_address: address,
            user,
        });
        state.edit = EditState::Viewing;
        state.message = None;
        if is_new_user {
            state.welcome_until = Some(now + self.timers.welcome_window);
            state.redirect_at = None;
        } else {
            state.welcome_until = None;
            state.redirect_at = Some(now + self.timers.redirect_delay);
        }
        ConnectOutcome::Connected { is_new_user }
    }

    /// Drops the session and both storage keys together. Idempotent.
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.phase = ConnectionPhase::Disconnected;
            state.session = None;
            state.edit = EditState::Viewing;
            state.message = None;
            state.welcome_until = None;
            state.redirect_at = None;
            state.copy_feedback = None;
        }
        if let Err(err) = self.store.clear().await {
            warn!("Failed to clear session storage on disconnect: {err:#}");
        }
        info!("Session disconnected");
    }

    /// Restores a persisted session without re-authenticating. Malformed or
    /// inconsistent persisted data is treated as absent, never surfaced.
    pub async fn restore(&self) -> bool {
        if self.state.borrow().phase != ConnectionPhase::Disconnected {
            return self.state.borrow().phase == ConnectionPhase::Connected;
        }

        let Some(persisted) = self.store.load().await else {
            return false;
        };
        let address = match sanitize_wallet_address(&persisted.wallet_address) {
            Ok(address) => address,
            Err(err) => {
                warn!("Ignoring persisted session with invalid address: {err}");
                return false;
            }
        };
        if persisted.user.wallet_address != address {
            warn!("Ignoring persisted session: record address does not match stored address");
            return false;
        }

        info!("Session restored for {address}");
        let mut state = self.state.borrow_mut();
        state.phase = ConnectionPhase::Connected;
        state.session = Some(Session {
            wallet_address: address,
            user: persisted.user,
        });
        state.edit = EditState::Viewing;
        state.message = None;
        // Restored sessions proceed straight to the application.
        state.redirect_at = Some(Instant::now());
        true
    }

    /// Opens the username editor seeded with the current value.
    pub fn begin_edit(&self) -> bool {
        let mut state = self.state.borrow_mut();
        if state.phase != ConnectionPhase::Connected
            || !matches!(state.edit, EditState::Viewing)
        {
            return false;
        }
        let current = state
            .session
            .as_ref()
            .and_then(|session| session.user.username.clone())
            .unwrap_or_default();
        state.edit = EditState::Editing {
            draft: current,
            error: None,
        };
        true
    }

    pub fn update_draft(&self, value: &str) {
        let mut state = self.state.borrow_mut();
        if let EditState::Editing { draft, .. } = &mut state.edit {
            *draft = value.to_string();
        }
    }

    /// Discards the draft and any field error; the record keeps its current
    /// username.
    pub fn cancel_edit(&self) {
        let mut state = self.state.borrow_mut();
        if matches!(state.edit, EditState::Editing { .. }) {
            state.edit = EditState::Viewing;
        }
    }

    /// Validates the draft locally, then submits it. Invalid drafts never
    /// reach the backend; a uniqueness conflict keeps the typed value in the
    /// editor. On success the backend's record replaces the local and
    /// persisted copies wholesale.
    pub async fn save_username(&self) -> SaveOutcome {
        let (user_id, candidate) = {
            let mut state = self.state.borrow_mut();
            if state.phase != ConnectionPhase::Connected {
                return SaveOutcome::Refused;
            }
            let (draft, user_id) = match (&state.edit, &state.session) {
                (EditState::Saving { .. }, _) => {
                    debug!("Ignoring save while one is in flight");
                    return SaveOutcome::Pending;
                }
                (EditState::Editing { draft, .. }, Some(session)) => {
                    (draft.clone(), session.user.id.clone())
                }
                _ => return SaveOutcome::Refused,
            };
            match canonicalize_username(&draft) {
                Ok(candidate) => {
                    state.edit = EditState::Saving { draft };
                    (user_id, candidate)
                }
                Err(err) => {
                    state.edit = EditState::Editing {
                        draft,
                        error: Some(UsernameIssue::Invalid(err)),
                    };
                    return SaveOutcome::Invalid(err);
                }
            }
        };

        match self.backend.update_username(&user_id, &candidate).await {
            Ok(user) => {
                let persisted = {
                    let mut state = self.state.borrow_mut();
                    let Some(session) = state.session.as_mut() else {
                        // Disconnected while the save was in flight.
                        state.edit = EditState::Viewing;
                        return SaveOutcome::Refused;
                    };
                    session.user = user;
                    let persisted = PersistedSession {
                        wallet_address: session.wallet_address.clone(),
                        user: session.user.clone(),
                    };
                    state.edit = EditState::Viewing;
                    persisted
                };
                if let Err(err) = self.store.persist(&persisted).await {
                    warn!("Failed to refresh persisted session after username save: {err:#}");
                }
                info!("Username saved");
                SaveOutcome::Saved
            }
            Err(SessionError::UsernameTaken) => {
                self.keep_editing(UsernameIssue::Taken);
                SaveOutcome::Taken
            }
            Err(err) => {
                warn!("Username save failed: {err}");
                self.keep_editing(UsernameIssue::SaveFailed);
                SaveOutcome::Failed
            }
        }
    }

    /// Writes the full wallet address to the clipboard and arms the
    /// transient feedback indicator. Failure is soft: the indicator is the
    /// whole story.
    pub async fn copy_address(&self) -> bool {
        let Some(address) = self
            .state
            .borrow()
            .session
            .as_ref()
            .map(|session| session.wallet_address.clone())
        else {
            return false;
        };

        let feedback = match self.clipboard.write_text(&address).await {
            Ok(()) => CopyFeedback::Copied,
            Err(err) => {
                warn!("Clipboard copy failed: {err:#}");
                CopyFeedback::Failed
            }
        };

        let mut state = self.state.borrow_mut();
        state.copy_feedback = Some((feedback, Instant::now() + self.timers.copy_feedback_window));
        feedback == CopyFeedback::Copied
    }

    pub fn redirect_armed(&self) -> bool {
        self.state.borrow().redirect_at.is_some()
    }

    pub fn redirect_due(&self) -> bool {
        self.state
            .borrow()
            .redirect_at
            .is_some_and(|at| Instant::now() >= at)
    }

    /// Waits out the redirect delay if one is armed. Returns true when the
    /// caller should proceed to the main application.
    pub async fn await_redirect(&self) -> bool {
        let Some(at) = self.state.borrow().redirect_at else {
            return false;
        };
        sleep_until(at).await;
        self.state.borrow_mut().redirect_at = None;
        true
    }

    /// Current state for rendering. Expired transient indicators are pruned
    /// here, so observers never see a stale welcome or copy indicator.
    pub fn snapshot(&self) -> Snapshot {
        let now = Instant::now();
        let mut state = self.state.borrow_mut();
        if state.welcome_until.is_some_and(|until| now >= until) {
            state.welcome_until = None;
        }
        if state.copy_feedback.is_some_and(|(_, until)| now >= until) {
            state.copy_feedback = None;
        }
        Snapshot {
            detection: state.detection,
            phase: state.phase,
            wallet_address: state
                .session
                .as_ref()
                .map(|session| session.wallet_address.clone()),
            user: state.session.as_ref().map(|session| session.user.clone()),
            edit: state.edit.clone(),
            message: state.message.clone(),
            welcome_visible: state.welcome_until.is_some(),
            copy_feedback: state.copy_feedback.map(|(feedback, _)| feedback),
            redirect_armed: state.redirect_at.is_some(),
        }
    }

    async fn fail_connect(&self, err: SessionError) -> ConnectOutcome {
        warn!("Connect attempt failed: {err}");
        {
            let mut state = self.state.borrow_mut();
            state.phase = ConnectionPhase::Disconnected;
            state.session = None;
            state.edit = EditState::Viewing;
            state.welcome_until = None;
            state.redirect_at = None;
            // Replaces the previous attempt's message, never appends.
            state.message = Some(err.user_message());
        }
        if let Err(clear_err) = self.store.clear().await {
            warn!("Failed to clear session storage after aborted connect: {clear_err:#}");
        }
        ConnectOutcome::Failed
    }

    fn keep_editing(&self, issue: UsernameIssue) {
        let mut state = self.state.borrow_mut();
        if let EditState::Saving { draft } = std::mem::replace(&mut state.edit, EditState::Viewing)
        {
            state.edit = EditState::Editing {
                draft,
                error: Some(issue),
            };
        }
    }
}
