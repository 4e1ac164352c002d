// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! In-memory pipeline runtime shared by the integration tests.
//!
//! [`RecordingRuntime`] builds no media graph. It records every call the
//! session makes as an [`Event`], lets tests play the part of the media
//! framework ([`RecordingRuntime::emit_pad`], [`RecordingRuntime::post`]) and
//! can be scripted to fail element creation or to complete state changes
//! asynchronously.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use wfd::{
    BusCallback, Error, PadAddedCallback, PipelineMessage, PipelineRuntime, PipelineState, Result,
    Role, Session, SessionConfig, SessionMessage, StateChange,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Default bound for waits on the pipeline worker.
pub const WAIT: Duration = Duration::from_secs(5);

/// Factory name recorded for root pipelines.
pub const PIPELINE_FACTORY: &str = "pipeline";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MockElement {
    pub id: u64,
    pub name: String,
    pub factory: String,
}

#[derive(Debug)]
pub struct MockPad {
    pub name: String,
}

/// A call made by the session, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Created { factory: String, name: String },
    Added { bin: String, element: String },
    Removed { bin: String, element: String },
    Linked { src: String, dst: String },
    PadLinked { pad: String, dst: String },
    State { element: String, state: PipelineState },
    Synced { element: String },
    Locked { element: String, locked: bool },
    Property { element: String, name: String, value: String },
    BusWatched { pipeline: String },
    BusUnwatched { pipeline: String },
}

type SharedPadCallback = Arc<dyn Fn(MockPad) + Send + Sync + 'static>;
type SharedBusCallback = Arc<dyn Fn(PipelineMessage) + Send + Sync + 'static>;

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    next_id: u64,
    fail_factories: HashSet<String>,
    async_states: HashSet<PipelineState>,
    pad_callbacks: HashMap<String, SharedPadCallback>,
    bus: Option<(String, SharedBusCallback)>,
    children: HashMap<String, Vec<String>>,
}

impl Inner {
    fn record(&mut self, event: Event) {
        self.events.push(event);
    }
}

#[derive(Default)]
pub struct RecordingRuntime {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl RecordingRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn push(&self, event: Event) {
        self.lock().record(event);
        self.changed.notify_all();
    }

    /// Makes every later `make_element` for `factory` fail.
    pub fn fail_factory(&self, factory: &str) {
        self.lock().fail_factories.insert(factory.to_owned());
    }

    /// Makes root pipelines report `state` changes as asynchronous.
    pub fn complete_async(&self, state: PipelineState) {
        self.lock().async_states.insert(state);
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Number of elements created from `factory`.
    pub fn created(&self, factory: &str) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, Event::Created { factory: f, .. } if f == factory))
            .count()
    }

    /// Names of the elements currently inside `bin`.
    pub fn children(&self, bin: &str) -> Vec<String> {
        self.lock().children.get(bin).cloned().unwrap_or_default()
    }

    pub fn has_event(&self, event: &Event) -> bool {
        self.lock().events.contains(event)
    }

    /// Blocks until `predicate` holds for the recorded events. Returns
    /// `false` on timeout.
    pub fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[Event]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        while !predicate(&inner.events) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            inner = self.changed.wait_timeout(inner, deadline - now).unwrap().0;
        }
        true
    }

    /// Blocks until `event` has been recorded.
    pub fn wait_for(&self, event: &Event) -> bool {
        self.wait_until(WAIT, |events| events.contains(event))
    }

    /// Plays the demuxer: announces a new pad named `name`.
    pub fn emit_pad(&self, name: &str) {
        let callback = self
            .lock()
            .pad_callbacks
            .get("demuxer")
            .cloned()
            .expect("no pad-added subscription on the demuxer");
        callback(MockPad {
            name: name.to_owned(),
        });
    }

    /// Plays the bus: delivers `message` to the watching session.
    pub fn post(&self, message: PipelineMessage) {
        let callback = self
            .lock()
            .bus
            .as_ref()
            .map(|(_, callback)| callback.clone())
            .expect("no bus watch installed");
        callback(message);
    }

    pub fn is_watched(&self) -> bool {
        self.lock().bus.is_some()
    }
}

impl PipelineRuntime for RecordingRuntime {
    type Element = MockElement;
    type Pad = MockPad;

    fn create_pipeline(&self, name: &str) -> Result<MockElement> {
        self.make_element(PIPELINE_FACTORY, name)
    }

    fn make_element(&self, factory: &str, name: &str) -> Result<MockElement> {
        let element = {
            let mut inner = self.lock();
            if inner.fail_factories.contains(factory) {
                return Err(Error::ConstructionFailure(format!(
                    "no element factory \"{factory}\""
                )));
            }
            inner.next_id += 1;
            let element = MockElement {
                id: inner.next_id,
                name: name.to_owned(),
                factory: factory.to_owned(),
            };
            inner.record(Event::Created {
                factory: factory.to_owned(),
                name: name.to_owned(),
            });
            element
        };
        self.changed.notify_all();
        Ok(element)
    }

    fn add_to_bin(&self, bin: &MockElement, element: &MockElement) -> Result<()> {
        {
            let mut inner = self.lock();
            inner
                .children
                .entry(bin.name.clone())
                .or_default()
                .push(element.name.clone());
            inner.record(Event::Added {
                bin: bin.name.clone(),
                element: element.name.clone(),
            });
        }
        self.changed.notify_all();
        Ok(())
    }

    fn remove_from_bin(&self, bin: &MockElement, element: &MockElement) -> Result<()> {
        {
            let mut inner = self.lock();
            let children = inner.children.entry(bin.name.clone()).or_default();
            let Some(position) = children.iter().position(|c| *c == element.name) else {
                return Err(Error::Internal(format!(
                    "{} is not in {}",
                    element.name, bin.name
                )));
            };
            children.remove(position);
            inner.record(Event::Removed {
                bin: bin.name.clone(),
                element: element.name.clone(),
            });
        }
        self.changed.notify_all();
        Ok(())
    }

    fn link(&self, src: &MockElement, dst: &MockElement) -> Result<()> {
        self.push(Event::Linked {
            src: src.name.clone(),
            dst: dst.name.clone(),
        });
        Ok(())
    }

    fn link_pad(&self, pad: &MockPad, dst: &MockElement) -> Result<()> {
        self.push(Event::PadLinked {
            pad: pad.name.clone(),
            dst: dst.name.clone(),
        });
        Ok(())
    }

    fn pad_name(&self, pad: &MockPad) -> String {
        pad.name.clone()
    }

    fn set_state(&self, element: &MockElement, state: PipelineState) -> Result<StateChange> {
        let asynchronous = element.factory == PIPELINE_FACTORY
            && self.lock().async_states.contains(&state);
        self.push(Event::State {
            element: element.name.clone(),
            state,
        });
        Ok(if asynchronous {
            StateChange::Async
        } else {
            StateChange::Success
        })
    }

    fn sync_state_with_parent(&self, element: &MockElement) -> Result<()> {
        self.push(Event::Synced {
            element: element.name.clone(),
        });
        Ok(())
    }

    fn set_locked_state(&self, element: &MockElement, locked: bool) {
        self.push(Event::Locked {
            element: element.name.clone(),
            locked,
        });
    }

    fn set_string_property(&self, element: &MockElement, name: &str, value: &str) -> Result<()> {
        self.push(Event::Property {
            element: element.name.clone(),
            name: name.to_owned(),
            value: value.to_owned(),
        });
        Ok(())
    }

    fn connect_pad_added(
        &self,
        element: &MockElement,
        callback: PadAddedCallback<MockPad>,
    ) -> Result<()> {
        self.lock()
            .pad_callbacks
            .insert(element.name.clone(), Arc::from(callback));
        Ok(())
    }

    fn watch_bus(&self, pipeline: &MockElement, callback: BusCallback) -> Result<()> {
        self.lock().bus = Some((pipeline.name.clone(), Arc::from(callback)));
        self.push(Event::BusWatched {
            pipeline: pipeline.name.clone(),
        });
        Ok(())
    }

    fn unwatch_bus(&self, pipeline: &MockElement) {
        {
            let mut inner = self.lock();
            if inner
                .bus
                .as_ref()
                .is_some_and(|(name, _)| *name == pipeline.name)
            {
                inner.bus = None;
            }
            inner.pad_callbacks.clear();
        }
        self.push(Event::BusUnwatched {
            pipeline: pipeline.name.clone(),
        });
    }
}

/// Messages the session delivered to its callback.
#[derive(Clone, Default)]
pub struct Inbox {
    messages: Arc<Mutex<Vec<SessionMessage>>>,
    arrived: Arc<Condvar>,
}

impl Inbox {
    pub fn messages(&self) -> Vec<SessionMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn state_changes(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, SessionMessage::StateChanged { .. }))
            .count()
    }

    /// Blocks until a message matching `predicate` arrives.
    pub fn wait_for<F>(&self, predicate: F) -> Option<SessionMessage>
    where
        F: Fn(&SessionMessage) -> bool,
    {
        let deadline = Instant::now() + WAIT;
        let mut messages = self.messages.lock().unwrap();
        loop {
            if let Some(found) = messages.iter().find(|m| predicate(m)) {
                return Some(found.clone());
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            messages = self.arrived.wait_timeout(messages, deadline - now).unwrap().0;
        }
    }
}

/// Initializes logging and creates a session on a fresh runtime, with an
/// inbox collecting its notifications.
pub fn setup(role: Role) -> (Session<RecordingRuntime>, Arc<RecordingRuntime>, Inbox) {
    setup_with(role, SessionConfig::default())
}

pub fn setup_with(
    role: Role,
    config: SessionConfig,
) -> (Session<RecordingRuntime>, Arc<RecordingRuntime>, Inbox) {
    // Initialize logging once (respects RUST_LOG environment variable)
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });

    let runtime = RecordingRuntime::new();
    let session = Session::new(runtime.clone(), role, config);
    let inbox = Inbox::default();
    let sink = inbox.clone();
    session.set_message_callback(move |message| {
        sink.messages.lock().unwrap().push(message.clone());
        sink.arrived.notify_all();
    });
    (session, runtime, inbox)
}
