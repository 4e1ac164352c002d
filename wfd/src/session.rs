// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Public session API.
//!
//! A [`Session`] drives one Wi-Fi Display connection through its lifecycle.
//! Every command is validated against the session state machine while the
//! session's command lock is held, and its side effects on the pipeline run
//! synchronously on the caller's thread. Work that depends on what the peer
//! negotiates is handed to the session's pipeline worker.
//!
//! The application learns about completed transitions, errors and the end of
//! the stream through the message callback. State-changed notifications are
//! posted only when a command's target state is reached, never for the
//! intermediate hops of a multi-step transition.

use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, Weak},
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    Error, Result,
    config::SessionConfig,
    graph::MediaGraph,
    manager::{Job, JobHandler, PipelineManager},
    runtime::{PipelineMessage, PipelineRuntime, PipelineState, StateChange},
    state::{Command, CommitOutcome, Role, SessionState, StateRecord, Validation},
    stream::{StreamInfo, StreamKind},
};

/// Errors reported asynchronously through the message callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The pipeline worker could not build or link a chain. The session's
    /// media path is dead and the session should be destroyed.
    #[error("Construction failure: {0}")]
    Construction(String),

    /// An element of the pipeline posted an error.
    #[error("Pipeline error from {element}: {message}")]
    Pipeline { element: String, message: String },
}

/// Notifications delivered to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    /// A command reached its target state.
    StateChanged {
        previous: SessionState,
        current: SessionState,
    },
    Error(SessionError),
    EndOfStream,
}

/// What was playing when the session last started playing.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentInfo {
    pub stream: StreamInfo,
    /// When the snapshot was taken.
    pub updated_at: SystemTime,
}

type MessageCallback = Arc<dyn Fn(&SessionMessage) + Send + Sync + 'static>;

struct Control {
    record: StateRecord,
    destroyed: bool,
    content: Option<ContentInfo>,
}

struct Shared<R: PipelineRuntime> {
    id: Uuid,
    role: Role,
    config: Arc<SessionConfig>,
    /// The command lock. Guards the state record.
    control: Mutex<Control>,
    /// Notified on every commit.
    state_changed: Condvar,
    callback: RwLock<Option<MessageCallback>>,
    graph: MediaGraph<R>,
    manager: PipelineManager,
}

/// Notifications collected under the command lock and delivered after it is
/// released.
type Notices = Vec<SessionMessage>;

/// A Wi-Fi Display session.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use wfd::{PipelineRuntime, Role, Session, SessionConfig, SessionMessage};
/// # fn run<R: PipelineRuntime>(runtime: Arc<R>) -> Result<(), wfd::Error> {
/// let session = Session::new(runtime, Role::Sink, SessionConfig::default());
/// session.set_message_callback(|message| {
///     if let SessionMessage::StateChanged { current, .. } = message {
///         println!("session is now {current:?}");
///     }
/// });
///
/// session.create()?;
/// session.prepare()?;
/// session.connect()?;
/// session.start()?;
/// # Ok(())
/// # }
/// ```
pub struct Session<R: PipelineRuntime> {
    shared: Arc<Shared<R>>,
}

impl<R: PipelineRuntime> Session<R> {
    /// Creates a session in the [`SessionState::None`] state.
    ///
    /// # Arguments
    ///
    /// * `runtime` - The pipeline runtime the session builds its graph with.
    /// * `role` - Which end of the connection this session drives.
    /// * `config` - Read-only session configuration.
    pub fn new(runtime: Arc<R>, role: Role, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        let config = Arc::new(config);
        info!(session = %id, ?role, "session created");
        Session {
            shared: Arc::new(Shared {
                id,
                role,
                config: config.clone(),
                control: Mutex::new(Control {
                    record: StateRecord::default(),
                    destroyed: false,
                    content: None,
                }),
                state_changed: Condvar::new(),
                callback: RwLock::new(None),
                graph: MediaGraph::new(id, role, runtime, config),
                manager: PipelineManager::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.record().current
    }

    /// A snapshot of the full state record.
    pub fn record(&self) -> StateRecord {
        self.shared
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record
    }

    /// The stream parameters negotiated for the current connection.
    pub fn stream_info(&self) -> StreamInfo {
        self.shared.graph.stream_info()
    }

    /// Content metadata refreshed whenever the session starts playing.
    pub fn content_info(&self) -> Option<ContentInfo> {
        self.shared
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .content
            .clone()
    }

    /// Registers the application's notification sink, replacing any previous
    /// one.
    ///
    /// The callback runs on the thread that caused the notification and never
    /// while the command lock is held, so it may issue commands itself.
    pub fn set_message_callback<F>(&self, callback: F)
    where
        F: Fn(&SessionMessage) + Send + Sync + 'static,
    {
        match self.shared.callback.write() {
            Ok(mut slot) => *slot = Some(Arc::new(callback)),
            Err(e) => warn!(session = %self.shared.id, "callback lock poisoned: {e}"),
        }
    }

    pub fn clear_message_callback(&self) {
        if let Ok(mut slot) = self.shared.callback.write() {
            slot.take();
        }
    }

    /// Moves the session to [`SessionState::Null`] and starts its pipeline
    /// worker.
    pub fn create(&self) -> Result<()> {
        self.shared.run(Command::Create)
    }

    /// Builds the pipeline skeleton. A source rests in
    /// [`SessionState::Ready`] afterwards, a sink in
    /// [`SessionState::Prepared`].
    pub fn prepare(&self) -> Result<()> {
        self.shared.run(Command::Prepare)
    }

    /// Connects to the peer.
    ///
    /// A sink pre-rolls its pipeline against the configured server. A source
    /// enters [`SessionState::ConnectionWait`] and reaches
    /// [`SessionState::Connected`] once a sink has connected; the call itself
    /// returns immediately. Use [`Session::wait_for_state`] to bound the wait.
    pub fn connect(&self) -> Result<()> {
        self.shared.run(Command::Connect)
    }

    /// Starts streaming.
    pub fn start(&self) -> Result<()> {
        self.shared.run(Command::Start)
    }

    pub fn pause(&self) -> Result<()> {
        self.shared.run(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.shared.run(Command::Resume)
    }

    /// Ends the connection and returns to the prepared state with a fresh
    /// pipeline skeleton.
    pub fn stop(&self) -> Result<()> {
        self.shared.run(Command::Stop)
    }

    /// Ends the connection and releases the pipeline.
    pub fn disconnect(&self) -> Result<()> {
        self.shared.run(Command::Disconnect)
    }

    /// Releases the pipeline and returns to [`SessionState::Null`].
    pub fn unprepare(&self) -> Result<()> {
        self.shared.run(Command::Unprepare)
    }

    /// Stops the worker, releases the pipeline and returns to
    /// [`SessionState::None`]. Allowed from every state and never fails.
    ///
    /// Any later command returns [`Error::NotInitialized`].
    pub fn destroy(&self) {
        self.shared.destroy();
    }

    /// Blocks until the session is in `state` or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// * [`Error::Timeout`] if the state was not reached in time.
    /// * [`Error::NotInitialized`] if the session was destroyed meanwhile.
    pub fn wait_for_state(&self, state: SessionState, timeout: Duration) -> Result<()> {
        let control = self.shared.lock_control()?;
        let (control, _) = self
            .shared
            .state_changed
            .wait_timeout_while(control, timeout, |c| {
                c.record.current != state && !(c.destroyed && c.record.current == SessionState::None)
            })
            .map_err(|e| Error::poisoned("command", e))?;

        if control.record.current == state {
            Ok(())
        } else if control.destroyed {
            Err(Error::NotInitialized)
        } else {
            Err(Error::Timeout)
        }
    }
}

impl<R: PipelineRuntime> Drop for Session<R> {
    fn drop(&mut self) {
        self.shared.destroy();
    }
}

impl<R: PipelineRuntime> Shared<R> {
    fn lock_control(&self) -> Result<MutexGuard<'_, Control>> {
        self.control.lock().map_err(|e| Error::poisoned("command", e))
    }

    /// Delivers `notices` to the application.
    fn dispatch(&self, notices: Notices) {
        if notices.is_empty() {
            return;
        }
        let callback = match self.callback.read() {
            Ok(callback) => callback.clone(),
            Err(e) => {
                warn!(session = %self.id, "callback lock poisoned: {e}");
                return;
            }
        };
        let Some(callback) = callback else {
            return;
        };
        for notice in &notices {
            callback(notice);
        }
    }

    /// Validates and executes one lifecycle command.
    fn run(self: &Arc<Self>, command: Command) -> Result<()> {
        let mut notices = Notices::new();
        let result = self.run_locked(command, &mut notices);
        self.dispatch(notices);
        result
    }

    fn run_locked(self: &Arc<Self>, command: Command, notices: &mut Notices) -> Result<()> {
        let mut control = self.lock_control()?;
        if control.destroyed {
            return Err(Error::NotInitialized);
        }

        let target = match control.record.validate(self.role, command) {
            Validation::Invalid => {
                debug!(session = %self.id, ?command, state = ?control.record.current, "command rejected");
                return Err(Error::InvalidState {
                    command,
                    state: control.record.current,
                });
            }
            Validation::NoOp => {
                debug!(session = %self.id, ?command, "already in target state");
                return Ok(());
            }
            Validation::AlreadyGoing => {
                debug!(session = %self.id, ?command, "transition already in flight");
                return Ok(());
            }
            Validation::Proceed(target) => target,
        };

        debug!(session = %self.id, ?command, ?target, "executing command");
        control.record.begin(target);
        self.execute(command, &mut control, notices).inspect_err(|e| {
            warn!(session = %self.id, ?command, "command failed: {e}");
            control.record.abort();
        })
    }

    fn execute(
        self: &Arc<Self>,
        command: Command,
        control: &mut Control,
        notices: &mut Notices,
    ) -> Result<()> {
        match command {
            Command::Create => {
                let worker = WorkerContext {
                    shared: Arc::downgrade(self),
                };
                self.manager.start("wfd-worker", worker)?;
                self.commit(control, SessionState::Null, notices);
            }
            Command::Prepare => {
                self.build_pipeline()?;
                self.commit(control, self.role.prepared_state(), notices);
            }
            Command::Connect => match self.role {
                Role::Sink => {
                    self.request(control, PipelineState::Paused, SessionState::Connected, notices)?
                }
                // Completed by the peer-connected bus message.
                Role::Source => self.commit(control, SessionState::ConnectionWait, notices),
            },
            Command::Start | Command::Resume => {
                self.request(control, PipelineState::Playing, SessionState::Playing, notices)?
            }
            Command::Pause => {
                self.request(control, PipelineState::Paused, SessionState::Paused, notices)?
            }
            Command::Stop => {
                for &hop in command.hops(self.role) {
                    self.commit(control, hop, notices);
                }
                self.graph.teardown();
                if let Err(e) = self.build_pipeline() {
                    // The old pipeline is gone; do not pretend it still plays.
                    self.commit(control, SessionState::Null, notices);
                    return Err(e);
                }
                self.commit(control, self.role.prepared_state(), notices);
            }
            Command::Disconnect => {
                self.graph.teardown();
                self.commit(control, SessionState::Disconnected, notices);
            }
            Command::Unprepare => {
                self.graph.teardown();
                self.commit(control, SessionState::Null, notices);
            }
            Command::Destroy => {
                return Err(Error::Internal("destroy runs outside the command path".into()));
            }
        }
        Ok(())
    }

    /// Requests a root pipeline state change for a transition to `target`.
    /// The transition completes now if the runtime finished synchronously,
    /// or later from the bus otherwise.
    fn request(
        &self,
        control: &mut Control,
        pipeline: PipelineState,
        target: SessionState,
        notices: &mut Notices,
    ) -> Result<()> {
        match self.graph.set_root_state(pipeline)? {
            StateChange::Success => self.commit(control, target, notices),
            StateChange::Async => {
                debug!(session = %self.id, ?pipeline, "waiting for pipeline state change")
            }
        }
        Ok(())
    }

    fn build_pipeline(self: &Arc<Self>) -> Result<()> {
        let name = format!("wfd-{}-{}", self.role_label(), self.id);

        let weak = Arc::downgrade(self);
        let on_pad = Box::new(move |pad: R::Pad| {
            if let Some(shared) = weak.upgrade() {
                shared.on_pad_added(pad);
            }
        });

        let weak = Arc::downgrade(self);
        let on_message = Box::new(move |message: PipelineMessage| {
            if let Some(shared) = weak.upgrade() {
                shared.on_bus_message(message);
            }
        });

        self.graph.build(&name, on_pad, on_message)
    }

    fn role_label(&self) -> &'static str {
        match self.role {
            Role::Source => "source",
            Role::Sink => "sink",
        }
    }

    fn commit(&self, control: &mut Control, state: SessionState, notices: &mut Notices) {
        match control.record.commit(state) {
            CommitOutcome::Unchanged => {}
            CommitOutcome::Intermediate => {
                debug!(session = %self.id, ?state, target = ?control.record.target, "passing through state");
            }
            CommitOutcome::TargetReached { previous } => {
                info!(session = %self.id, ?previous, current = ?state, "state changed");
                notices.push(SessionMessage::StateChanged {
                    previous,
                    current: state,
                });
                self.on_target_reached(control, state);
            }
        }
        self.state_changed.notify_all();
    }

    fn on_target_reached(&self, control: &mut Control, state: SessionState) {
        let refresh = match state {
            SessionState::Playing => true,
            SessionState::Paused => control.content.is_none(),
            _ => false,
        };
        if refresh {
            control.content = Some(ContentInfo {
                stream: self.graph.stream_info(),
                updated_at: SystemTime::now(),
            });
        }
    }

    fn destroy(&self) {
        let mut notices = Notices::new();
        {
            let Ok(mut control) = self.lock_control() else {
                warn!(session = %self.id, "command lock poisoned, destroying anyway");
                self.manager.stop();
                self.graph.teardown();
                return;
            };
            if control.destroyed {
                return;
            }
            control.destroyed = true;
            control.record.validate(self.role, Command::Destroy);
            // Whatever was in flight is abandoned.
            control.record.pending = SessionState::None;
        }

        // The worker may be calling back into the session, so it is stopped
        // without the command lock held.
        self.manager.stop();
        self.graph.teardown();

        match self.lock_control() {
            Ok(mut control) => {
                control.content = None;
                self.commit(&mut control, SessionState::None, &mut notices);
            }
            Err(e) => warn!(session = %self.id, "failed to record destruction: {e}"),
        }
        info!(session = %self.id, "session destroyed");
        self.dispatch(notices);
    }

    fn on_pad_added(&self, pad: R::Pad) {
        let name = self.graph.runtime().pad_name(&pad);
        let Some(kind) = StreamKind::from_pad_name(&name) else {
            warn!(session = %self.id, pad = %name, "ignoring pad of unknown media type");
            return;
        };

        match self.graph.claim_stream(kind, pad) {
            Ok(true) => {}
            Ok(false) => {
                debug!(session = %self.id, pad = %name, "stream already linked");
                return;
            }
            Err(e) => {
                warn!(session = %self.id, pad = %name, "failed to record pad: {e}");
                return;
            }
        }

        debug!(session = %self.id, pad = %name, stream = kind.label(), "stream discovered");
        if let Err(e) = self
            .manager
            .enqueue(kind.link_job())
            .and_then(|()| self.manager.signal())
        {
            warn!(session = %self.id, pad = %name, "failed to schedule link: {e}");
        }
    }

    fn on_bus_message(&self, message: PipelineMessage) {
        let mut notices = Notices::new();
        match message {
            PipelineMessage::StateChanged(state) => self.on_pipeline_state(state, &mut notices),
            PipelineMessage::PeerConnected => self.on_peer_connected(&mut notices),
            PipelineMessage::PeerDisconnected => self.on_peer_disconnected(&mut notices),
            PipelineMessage::MediaInfo(info) => self.on_media_info(info),
            PipelineMessage::Eos => {
                info!(session = %self.id, "end of stream");
                notices.push(SessionMessage::EndOfStream);
            }
            PipelineMessage::Error { source, message } => {
                warn!(session = %self.id, %source, "pipeline error: {message}");
                notices.push(SessionMessage::Error(SessionError::Pipeline {
                    element: source,
                    message,
                }));
            }
        }
        self.dispatch(notices);
    }

    /// Completes the pending transition the root pipeline just finished.
    fn on_pipeline_state(&self, state: PipelineState, notices: &mut Notices) {
        let Ok(mut control) = self.lock_control() else {
            return;
        };
        if control.destroyed {
            return;
        }

        let reached = match (state, control.record.pending) {
            (PipelineState::Playing, SessionState::Playing) => SessionState::Playing,
            (PipelineState::Paused, SessionState::Paused) => SessionState::Paused,
            (PipelineState::Paused, SessionState::Connected) if self.role == Role::Sink => {
                SessionState::Connected
            }
            _ => return,
        };
        self.commit(&mut control, reached, notices);
    }

    fn on_peer_connected(&self, notices: &mut Notices) {
        let Ok(mut control) = self.lock_control() else {
            return;
        };
        if control.destroyed || self.role != Role::Source {
            return;
        }
        if control.record.pending == SessionState::Connected {
            info!(session = %self.id, "peer connected");
            self.commit(&mut control, SessionState::Connected, notices);
        }
    }

    fn on_peer_disconnected(&self, notices: &mut Notices) {
        let Ok(mut control) = self.lock_control() else {
            return;
        };
        if control.destroyed || self.role != Role::Sink {
            return;
        }
        if matches!(
            control.record.current,
            SessionState::Connected | SessionState::Playing | SessionState::Paused
        ) {
            info!(session = %self.id, "peer disconnected");
            control.record.pending = SessionState::None;
            control.record.target = SessionState::Disconnected;
            self.commit(&mut control, SessionState::Disconnected, notices);
        }
    }

    /// Stores the negotiated parameters and schedules the chains they call
    /// for.
    fn on_media_info(&self, info: StreamInfo) {
        debug!(session = %self.id, ?info, "stream parameters negotiated");
        match self.graph.set_stream_info(info) {
            Ok(true) => {}
            Ok(false) => {
                debug!(session = %self.id, "stream parameters already negotiated");
                return;
            }
            Err(e) => {
                warn!(session = %self.id, "failed to store stream parameters: {e}");
                return;
            }
        }

        let kinds = [
            info.video.map(|_| StreamKind::Video),
            info.audio.map(|_| StreamKind::Audio),
        ];
        let mut queued = false;
        for kind in kinds.into_iter().flatten() {
            match self.manager.enqueue(kind.prepare_job()) {
                Ok(()) => queued = true,
                Err(e) => warn!(session = %self.id, stream = kind.label(), "failed to schedule prepare: {e}"),
            }
        }
        if queued {
            if let Err(e) = self.manager.signal() {
                warn!(session = %self.id, "failed to wake pipeline worker: {e}");
            }
        }
    }
}

/// The pipeline worker's view of a session.
struct WorkerContext<R: PipelineRuntime> {
    shared: Weak<Shared<R>>,
}

impl<R: PipelineRuntime> JobHandler for WorkerContext<R> {
    fn handle(&self, job: Job) -> Result<()> {
        let Some(shared) = self.shared.upgrade() else {
            return Ok(());
        };
        match job {
            Job::LinkAudioDecodeChain => shared.graph.link_stream(StreamKind::Audio),
            Job::LinkVideoDecodeChain => shared.graph.link_stream(StreamKind::Video),
            Job::PrepareAudioPipeline => shared.graph.prepare_stream(StreamKind::Audio),
            Job::PrepareVideoPipeline => shared.graph.prepare_stream(StreamKind::Video),
            Job::Exit => Ok(()),
        }
    }

    fn failed(&self, job: Job, error: &Error) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        warn!(session = %shared.id, ?job, "media path failed: {error}");
        shared.dispatch(vec![SessionMessage::Error(SessionError::Construction(
            error.to_string(),
        ))]);
    }
}
