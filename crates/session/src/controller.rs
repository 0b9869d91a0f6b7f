//! Top-level lifecycle state machine for a tutoring voice session.
//!
//! One controller owns at most one live session at a time. `start()` is
//! coalesced behind an in-flight guard, disconnects inside the early
//! window trigger a single automatic fallback, and `end()` is safe to
//! call at any point, in any state.

use crate::{
    config::SessionConfig,
    error::SessionError,
    negotiator::TransportNegotiator,
    persistence::TranscriptSink,
    transport::{ChannelEvent, RealtimeChannel, SessionOverrides, TransportKind},
};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;
use viva_core::{
    exercise::SharedSnapshot,
    prompt::ContextBuilder,
    tools::{ToolName, ToolRouter},
    transcript::{Role, SharedTranscript},
};

/// Lifecycle states of the session owned by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Ended,
    Error,
}

/// Gatekeeper for microphone access on the host platform.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Requests capture access. Denial maps to
    /// [`SessionError::PermissionDenied`].
    async fn acquire(&self) -> Result<(), SessionError>;

    /// Releases capture access. Must tolerate being called when nothing
    /// was ever acquired.
    async fn release(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Connected,
    Failed,
    Abandoned,
}

/// One transport attempt within a session, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub kind: TransportKind,
    pub started: Instant,
    pub outcome: AttemptOutcome,
}

/// Mute/volume preference. Survives reconnects within a session and is
/// replayed after every successful connect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioPrefs {
    pub muted: bool,
    pub volume: f32,
}

impl Default for AudioPrefs {
    fn default() -> Self {
        Self {
            muted: false,
            volume: 1.0,
        }
    }
}

impl AudioPrefs {
    fn effective(&self) -> f32 {
        if self.muted { 0.0 } else { self.volume }
    }
}

/// Collaborators injected into the controller at construction.
pub struct SessionDeps {
    pub negotiator: Arc<TransportNegotiator>,
    pub router: Arc<ToolRouter>,
    pub snapshot: SharedSnapshot,
    pub transcript: SharedTranscript,
    pub microphone: Arc<dyn Microphone>,
    pub sink: Arc<dyn TranscriptSink>,
}

struct SessionState {
    status: SessionStatus,
    session_id: Option<Uuid>,
    fallback_used: bool,
    ended_by_user: bool,
    attempt_started: Option<Instant>,
    overrides: Option<SessionOverrides>,
    channel: Option<Arc<dyn RealtimeChannel>>,
    pump: Option<JoinHandle<()>>,
    attempts: Vec<ConnectionAttempt>,
    last_error: Option<SessionError>,
    // Bumped per connection attempt so a stale pump's disconnect cannot
    // affect a newer attempt.
    epoch: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            session_id: None,
            fallback_used: false,
            ended_by_user: false,
            attempt_started: None,
            overrides: None,
            channel: None,
            pump: None,
            attempts: Vec::new(),
            last_error: None,
            epoch: 0,
        }
    }
}

enum FallbackDecision {
    Ignore,
    Retry,
    Surface(SessionError),
}

pub struct SessionController {
    // Handed to spawned event pumps; set once in `new`.
    weak: Weak<SessionController>,
    config: SessionConfig,
    negotiator: Arc<TransportNegotiator>,
    builder: ContextBuilder,
    router: Arc<ToolRouter>,
    snapshot: SharedSnapshot,
    transcript: SharedTranscript,
    microphone: Arc<dyn Microphone>,
    sink: Arc<dyn TranscriptSink>,
    state: Mutex<SessionState>,
    prefs: Mutex<AudioPrefs>,
    start_in_flight: AtomicBool,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionController {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Arc<Self> {
        let builder = match config.greeting_seed {
            Some(seed) => ContextBuilder::with_seed(seed),
            None => ContextBuilder::new(),
        };
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            config,
            negotiator: deps.negotiator,
            builder,
            router: deps.router,
            snapshot: deps.snapshot,
            transcript: deps.transcript,
            microphone: deps.microphone,
            sink: deps.sink,
            state: Mutex::new(SessionState::default()),
            prefs: Mutex::new(AudioPrefs::default()),
            start_in_flight: AtomicBool::new(false),
            status_tx,
        })
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Watch handle for the host UI to observe lifecycle transitions.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub async fn last_error(&self) -> Option<SessionError> {
        self.state.lock().await.last_error.clone()
    }

    /// The attempt log of the current session, for diagnostics.
    pub async fn attempts(&self) -> Vec<ConnectionAttempt> {
        self.state.lock().await.attempts.clone()
    }

    pub async fn audio_prefs(&self) -> AudioPrefs {
        *self.prefs.lock().await
    }

    /// Starts a session. A second call while a start is in flight or a
    /// session is already active is a no-op.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self
            .start_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("start already in flight; ignoring");
            return Ok(());
        }
        let result = self.start_inner().await;
        self.start_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn start_inner(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().await;
            if matches!(state.status, SessionStatus::Connecting | SessionStatus::Connected) {
                debug!("session already active; start is a no-op");
                return Ok(());
            }
            let session_id = Uuid::new_v4();
            info!(%session_id, "starting voice session");
            state.session_id = Some(session_id);
            state.fallback_used = false;
            state.ended_by_user = false;
            state.attempt_started = None;
            state.overrides = None;
            state.attempts.clear();
            state.last_error = None;
        }
        self.transcript.lock().await.clear();

        if let Err(error) = self.microphone.acquire().await {
            warn!(error = %error, "microphone access denied; no transport attempted");
            let mut state = self.state.lock().await;
            state.last_error = Some(error.clone());
            self.set_status(&mut state, SessionStatus::Error);
            return Err(error);
        }

        let overrides = {
            let snapshot = self.snapshot.read().await;
            let bundle = self.builder.build(&snapshot);
            SessionOverrides {
                instructions: bundle.instructions,
                greeting: bundle.greeting,
                language: self.config.language.clone(),
            }
        };
        {
            let mut state = self.state.lock().await;
            if state.ended_by_user {
                // end() won the race while we were acquiring the mic.
                return Ok(());
            }
            state.overrides = Some(overrides);
            self.set_status(&mut state, SessionStatus::Connecting);
        }

        self.connect(TransportKind::Primary).await
    }

    fn connect(
        &self,
        kind: TransportKind,
    ) -> Pin<Box<dyn Future<Output = Result<(), SessionError>> + Send + '_>> {
        Box::pin(async move {
        let (overrides, epoch) = {
            let mut state = self.state.lock().await;
            if state.ended_by_user {
                return Ok(());
            }
            state.epoch += 1;
            let started = Instant::now();
            state.attempt_started = Some(started);
            state.attempts.push(ConnectionAttempt {
                kind,
                started,
                outcome: AttemptOutcome::Failed,
            });
            (state.overrides.clone().unwrap_or_default(), state.epoch)
        };

        match self.negotiator.establish(kind, &overrides).await {
            Ok(handle) => {
                let session_id = {
                    let mut state = self.state.lock().await;
                    if state.ended_by_user {
                        // The user ended while the handshake was in flight.
                        if let Some(attempt) = state.attempts.last_mut() {
                            attempt.outcome = AttemptOutcome::Abandoned;
                        }
                        drop(state);
                        handle.channel.close().await;
                        return Ok(());
                    }
                    if let Some(attempt) = state.attempts.last_mut() {
                        attempt.outcome = AttemptOutcome::Connected;
                    }
                    state.channel = Some(handle.channel.clone());
                    self.set_status(&mut state, SessionStatus::Connected);
                    state.session_id.unwrap_or_else(Uuid::nil)
                };

                let volume = self.prefs.lock().await.effective();
                if let Err(error) = handle.channel.set_volume(volume).await {
                    warn!(error = ?error, "failed to replay audio preference after connect");
                }

                self.spawn_pump(handle.events, epoch, session_id, kind).await;
                info!(transport = %kind, "session connected");
                Ok(())
            }
            Err(error) => {
                warn!(transport = %kind, error = %error, "transport establishment failed");
                match self.next_move(epoch, error).await {
                    FallbackDecision::Ignore => Ok(()),
                    FallbackDecision::Retry => {
                        info!("early failure; retrying over the fallback transport");
                        self.connect(TransportKind::Fallback).await
                    }
                    FallbackDecision::Surface(error) => Err(error),
                }
            }
        }
        })
    }

    async fn spawn_pump(
        &self,
        mut events: mpsc::Receiver<ChannelEvent>,
        epoch: u64,
        session_id: Uuid,
        kind: TransportKind,
    ) {
        let Some(controller) = self.weak.upgrade() else {
            return;
        };
        let span = info_span!("event_pump", %session_id, transport = %kind);
        let handle = tokio::spawn(
            async move {
                let mut drop_reason: Option<String> = None;
                while let Some(event) = events.recv().await {
                    match event {
                        ChannelEvent::Disconnected { reason } => {
                            drop_reason = reason;
                            break;
                        }
                        other => controller.handle_event(other).await,
                    }
                }
                controller.on_transport_drop(epoch, drop_reason).await;
            }
            .instrument(span),
        );
        self.state.lock().await.pump = Some(handle);
    }

    /// Processes one inbound event in arrival order.
    async fn handle_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                debug!("channel reported ready");
                let volume = self.prefs.lock().await.effective();
                self.apply_volume(volume).await;
            }
            ChannelEvent::UserTranscript(text) => {
                self.transcript.lock().await.append(Role::Student, text);
            }
            ChannelEvent::AgentResponse(text) => {
                self.transcript.lock().await.append(Role::Tutor, text);
            }
            ChannelEvent::AgentResponseCorrection(text) => {
                if !self.transcript.lock().await.correct_last(text) {
                    debug!("correction arrived before any tutor utterance; ignored");
                }
            }
            ChannelEvent::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                let spoken = match ToolName::parse(&name) {
                    Some(tool) => self.router.invoke(tool, &arguments).await,
                    None => {
                        warn!(tool = %name, "agent invoked an unknown tool");
                        "I can't do that from here, but let's keep going with the exercise."
                            .to_string()
                    }
                };
                let channel = self.state.lock().await.channel.clone();
                if let Some(channel) = channel {
                    if let Err(error) = channel.send_tool_result(&call_id, &spoken).await {
                        warn!(error = ?error, "failed to deliver tool result");
                    }
                }
            }
            ChannelEvent::Debug(message) => debug!(%message, "channel debug event"),
            ChannelEvent::Disconnected { .. } => {
                // Intercepted by the pump; nothing to do here.
            }
        }
    }

    /// Fallback heuristic shared by establish failures and live drops:
    /// retry exactly once over the fallback transport iff the current
    /// attempt is still inside the early-disconnect window and fallback
    /// has not been used this session.
    async fn next_move(&self, epoch: u64, cause: SessionError) -> FallbackDecision {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            debug!("stale attempt reported a failure; ignoring");
            return FallbackDecision::Ignore;
        }
        if state.ended_by_user || matches!(state.status, SessionStatus::Ended | SessionStatus::Idle) {
            if let Some(attempt) = state.attempts.last_mut() {
                if attempt.outcome != AttemptOutcome::Connected {
                    attempt.outcome = AttemptOutcome::Abandoned;
                }
            }
            return FallbackDecision::Ignore;
        }
        state.channel = None;

        let within_window = state
            .attempt_started
            .map(|started| started.elapsed() <= self.config.early_disconnect_window)
            .unwrap_or(false);
        if within_window && !state.fallback_used {
            state.fallback_used = true;
            self.set_status(&mut state, SessionStatus::Connecting);
            FallbackDecision::Retry
        } else {
            state.last_error = Some(cause.clone());
            self.set_status(&mut state, SessionStatus::Error);
            FallbackDecision::Surface(cause)
        }
    }

    async fn on_transport_drop(&self, epoch: u64, reason: Option<String>) {
        let cause = SessionError::Transport(reason.unwrap_or_else(|| "connection dropped".to_string()));
        match self.next_move(epoch, cause).await {
            FallbackDecision::Ignore => {}
            FallbackDecision::Retry => {
                info!("early disconnect; retrying over the fallback transport");
                if let Err(error) = self.connect(TransportKind::Fallback).await {
                    warn!(error = %error, "fallback attempt failed");
                }
            }
            FallbackDecision::Surface(error) => {
                warn!(error = %error, "transport dropped outside the early window");
            }
        }
    }

    /// Ends the session and releases every resource. Never panics, in
    /// any state, even if `start()` was never called.
    pub async fn end(&self) {
        let (pump, was_active) = {
            let mut state = self.state.lock().await;
            state.ended_by_user = true;
            let was_connecting = matches!(state.status, SessionStatus::Connecting);
            let was_active = !matches!(state.status, SessionStatus::Idle);
            if was_connecting {
                if let Some(attempt) = state.attempts.last_mut() {
                    if attempt.outcome != AttemptOutcome::Connected {
                        attempt.outcome = AttemptOutcome::Abandoned;
                    }
                }
            }
            if was_active {
                self.set_status(&mut state, SessionStatus::Ended);
            }
            state.channel = None;
            (state.pump.take(), was_active)
        };
        if let Some(handle) = pump {
            handle.abort();
        }

        self.negotiator.teardown().await;
        self.microphone.release().await;

        let transcript = {
            let mut transcript = self.transcript.lock().await;
            let exported = transcript.export();
            transcript.clear();
            exported
        };
        if !transcript.is_empty() {
            let label = self
                .snapshot
                .read()
                .await
                .exercise
                .as_ref()
                .map(|ex| ex.subtopic.clone())
                .unwrap_or_else(|| "general".to_string());
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                if let Err(error) = sink.persist(&label, transcript).await {
                    warn!(error = ?error, "transcript persistence failed");
                }
            });
        }
        if was_active {
            info!("session ended");
        }
    }

    /// Flips the mute preference and applies it immediately when a
    /// channel is live. Returns the new muted state.
    pub async fn toggle_mute(&self) -> bool {
        let (muted, volume) = {
            let mut prefs = self.prefs.lock().await;
            prefs.muted = !prefs.muted;
            (prefs.muted, prefs.effective())
        };
        self.apply_volume(volume).await;
        muted
    }

    pub async fn set_volume(&self, volume: f32) {
        let effective = {
            let mut prefs = self.prefs.lock().await;
            prefs.volume = volume.clamp(0.0, 1.0);
            prefs.effective()
        };
        self.apply_volume(effective).await;
    }

    async fn apply_volume(&self, volume: f32) {
        let channel = self.state.lock().await.channel.clone();
        if let Some(channel) = channel {
            if let Err(error) = channel.set_volume(volume).await {
                warn!(error = ?error, "failed to apply volume to live channel");
            }
        }
    }

    fn set_status(&self, state: &mut SessionState, status: SessionStatus) {
        state.status = status;
        self.status_tx.send_replace(status);
    }
}
