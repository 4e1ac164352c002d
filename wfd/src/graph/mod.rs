// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic graph assembly.
//!
//! A session's pipeline is built in two steps. `Prepare` creates a skeleton:
//!
//! ```text
//! sink:    [protocol-source] ─► [demuxer] ┄pad-added┄►  audio-bin { audio-placeholder }
//!                                                        video-bin { }
//! source:  [muxer] ─► [transport-sink]
//! ```
//!
//! The elementary-stream chains are added later, from the pipeline worker,
//! once negotiation tells which codecs are in use and the demuxer reports the
//! streams it found. Each media type is linked at most once per connection.

mod audio;
mod video;

use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    Error, Result,
    config::SessionConfig,
    runtime::{BusCallback, PadAddedCallback, PipelineRuntime, PipelineState, StateChange},
    state::Role,
    stream::{StreamInfo, StreamKind},
};

/// One element of a chain recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stage<'a> {
    pub factory: &'a str,
    pub name: &'static str,
}

impl<'a> Stage<'a> {
    pub(crate) fn new(factory: &'a str, name: &'static str) -> Self {
        Stage { factory, name }
    }
}

/// Elements of one built chain, in link order.
#[derive(Debug)]
struct Chain<E> {
    elements: Vec<E>,
}

impl<E> Chain<E> {
    fn head(&self) -> Option<&E> {
        self.elements.first()
    }

    fn tail(&self) -> Option<&E> {
        self.elements.last()
    }
}

/// Fixed elements created when a session is prepared.
#[derive(Debug)]
enum Skeleton<E> {
    Sink { audio_bin: E, video_bin: E },
    Source { muxer: E },
}

/// The root pipeline and its fixed elements.
#[derive(Debug)]
struct PipelineHandle<E> {
    root: E,
    skeleton: Skeleton<E>,
}

impl<E> PipelineHandle<E> {
    /// The bin a sink's chain for `kind` lives in.
    fn stream_bin(&self, kind: StreamKind) -> Option<&E> {
        match (&self.skeleton, kind) {
            (Skeleton::Sink { audio_bin, .. }, StreamKind::Audio) => Some(audio_bin),
            (Skeleton::Sink { video_bin, .. }, StreamKind::Video) => Some(video_bin),
            (Skeleton::Source { .. }, _) => None,
        }
    }
}

/// Per-media-type assembly state.
struct StreamSlot<R: PipelineRuntime> {
    /// Set by the first pad of this media type; later pads are ignored.
    linked: AtomicBool,
    /// The discovered pad, until the link job consumes it.
    pad: Mutex<Option<R::Pad>>,
    chain: Mutex<Option<Chain<R::Element>>>,
}

impl<R: PipelineRuntime> Default for StreamSlot<R> {
    fn default() -> Self {
        StreamSlot {
            linked: AtomicBool::new(false),
            pad: Mutex::new(None),
            chain: Mutex::new(None),
        }
    }
}

impl<R: PipelineRuntime> StreamSlot<R> {
    fn reset(&self) {
        self.linked.store(false, Ordering::SeqCst);
        if let Ok(mut pad) = self.pad.lock() {
            pad.take();
        }
        if let Ok(mut chain) = self.chain.lock() {
            chain.take();
        }
    }
}

/// The media graph of one session.
pub(crate) struct MediaGraph<R: PipelineRuntime> {
    session: Uuid,
    role: Role,
    runtime: Arc<R>,
    config: Arc<SessionConfig>,
    /// Parameters of the current connection, once negotiated.
    stream_info: RwLock<Option<StreamInfo>>,
    handle: RwLock<Option<PipelineHandle<R::Element>>>,
    placeholder: Mutex<Option<R::Element>>,
    audio: StreamSlot<R>,
    video: StreamSlot<R>,
}

impl<R: PipelineRuntime> MediaGraph<R> {
    pub(crate) fn new(
        session: Uuid,
        role: Role,
        runtime: Arc<R>,
        config: Arc<SessionConfig>,
    ) -> Self {
        MediaGraph {
            session,
            role,
            runtime,
            config,
            stream_info: RwLock::new(None),
            handle: RwLock::new(None),
            placeholder: Mutex::new(None),
            audio: StreamSlot::default(),
            video: StreamSlot::default(),
        }
    }

    fn slot(&self, kind: StreamKind) -> &StreamSlot<R> {
        match kind {
            StreamKind::Audio => &self.audio,
            StreamKind::Video => &self.video,
        }
    }

    pub(crate) fn runtime(&self) -> &R {
        &self.runtime
    }

    pub(crate) fn stream_info(&self) -> StreamInfo {
        self.stream_info
            .read()
            .ok()
            .and_then(|info| *info)
            .unwrap_or_default()
    }

    /// Records the parameters negotiated for the current connection.
    ///
    /// Only the first report of a connection is kept, since the chains are
    /// chosen from it. Returns `false` when parameters were already recorded.
    pub(crate) fn set_stream_info(&self, info: StreamInfo) -> Result<bool> {
        let mut current = self
            .stream_info
            .write()
            .map_err(|e| Error::poisoned("stream info", e))?;
        if let Some(kept) = *current {
            if kept != info {
                warn!(session = %self.session, ?kept, ignored = ?info, "stream parameters changed mid-connection");
            }
            return Ok(false);
        }
        *current = Some(info);
        Ok(true)
    }

    /// Builds the role's skeleton inside a new root pipeline named `name` and
    /// brings it to the ready state.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the root pipeline.
    /// * `on_pad` - Receives the demuxer's pads. Unused by a source.
    /// * `on_message` - Receives the root pipeline's bus messages.
    ///
    /// # Errors
    ///
    /// [`Error::ConstructionFailure`] if an element cannot be created, added
    /// or linked. Nothing is kept from a failed build.
    pub(crate) fn build(
        &self,
        name: &str,
        on_pad: PadAddedCallback<R::Pad>,
        on_message: BusCallback,
    ) -> Result<()> {
        let mut handle = self
            .handle
            .write()
            .map_err(|e| Error::poisoned("pipeline handle", e))?;
        if handle.is_some() {
            return Err(Error::Internal("pipeline already built".into()));
        }

        let root = self.runtime.create_pipeline(name)?;
        let (skeleton, placeholder) = match self.role {
            Role::Sink => self.build_sink(&root, on_pad)?,
            Role::Source => (self.build_source(&root)?, None),
        };

        self.runtime.watch_bus(&root, on_message)?;
        if let Err(e) = self.runtime.set_state(&root, PipelineState::Ready) {
            self.runtime.unwatch_bus(&root);
            if let Err(e) = self.runtime.set_state(&root, PipelineState::Null) {
                warn!(session = %self.session, "failed to reset half-built pipeline: {e}");
            }
            return Err(e);
        }

        if let Ok(mut slot) = self.placeholder.lock() {
            *slot = placeholder;
        }
        *handle = Some(PipelineHandle { root, skeleton });
        info!(session = %self.session, pipeline = name, "pipeline built");
        Ok(())
    }

    fn build_sink(
        &self,
        root: &R::Element,
        on_pad: PadAddedCallback<R::Pad>,
    ) -> Result<(Skeleton<R::Element>, Option<R::Element>)> {
        let f = &self.config.factories;

        let source = self.make(root, &f.protocol_source, "protocol-source")?;
        self.runtime
            .set_string_property(&source, "location", &self.config.server_uri())?;
        let demuxer = self.make(root, &f.demuxer, "demuxer")?;
        self.runtime.link(&source, &demuxer)?;

        let audio_bin = self.make(root, &f.bin, "audio-bin")?;
        let video_bin = self.make(root, &f.bin, "video-bin")?;
        let placeholder = self.make(&audio_bin, &f.placeholder_sink, "audio-placeholder")?;

        self.runtime.connect_pad_added(&demuxer, on_pad)?;

        Ok((
            Skeleton::Sink {
                audio_bin,
                video_bin,
            },
            Some(placeholder),
        ))
    }

    fn build_source(&self, root: &R::Element) -> Result<Skeleton<R::Element>> {
        let f = &self.config.factories;
        let muxer = self.make(root, &f.muxer, "muxer")?;
        let transport = self.make(root, &f.transport_sink, "transport-sink")?;
        self.runtime.link(&muxer, &transport)?;
        Ok(Skeleton::Source { muxer })
    }

    fn make(&self, bin: &R::Element, factory: &str, name: &str) -> Result<R::Element> {
        let element = self.runtime.make_element(factory, name)?;
        self.runtime.add_to_bin(bin, &element)?;
        Ok(element)
    }

    /// Creates the elements of `stages` inside `bin` and links them in order.
    fn assemble(&self, bin: &R::Element, stages: &[Stage<'_>]) -> Result<Chain<R::Element>> {
        let mut elements: Vec<R::Element> = Vec::with_capacity(stages.len());
        for stage in stages {
            let element = self.make(bin, stage.factory, stage.name)?;
            if let Some(previous) = elements.last() {
                self.runtime.link(previous, &element)?;
            }
            elements.push(element);
        }
        Ok(Chain { elements })
    }

    fn decode_stages(&self, kind: StreamKind) -> Result<Vec<Stage<'_>>> {
        let info = self.stream_info();
        match kind {
            StreamKind::Audio => {
                let audio = info.audio.ok_or_else(|| {
                    Error::ConstructionFailure("no audio codec negotiated".into())
                })?;
                Ok(audio::decode_stages(&self.config, audio.codec))
            }
            StreamKind::Video => {
                let codec = info.video.map(|v| v.codec).unwrap_or_default();
                Ok(video::decode_stages(&self.config, codec))
            }
        }
    }

    fn encode_stages(&self, kind: StreamKind) -> Result<Vec<Stage<'_>>> {
        let info = self.stream_info();
        match kind {
            StreamKind::Audio => {
                let audio = info.audio.ok_or_else(|| {
                    Error::ConstructionFailure("no audio codec negotiated".into())
                })?;
                Ok(audio::encode_stages(&self.config, audio.codec))
            }
            StreamKind::Video => {
                let codec = info.video.map(|v| v.codec).unwrap_or_default();
                Ok(video::encode_stages(&self.config, codec))
            }
        }
    }

    /// Records the first pad of a media type. Returns `false` for any later
    /// pad of the same type, which is dropped.
    pub(crate) fn claim_stream(&self, kind: StreamKind, pad: R::Pad) -> Result<bool> {
        let slot = self.slot(kind);
        if slot
            .linked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }
        let mut stored = slot.pad.lock().map_err(|e| Error::poisoned("pad", e))?;
        *stored = Some(pad);
        Ok(true)
    }

    /// Builds the chain for a negotiated media type ahead of its pad.
    ///
    /// Does nothing when `kind` was not negotiated for the current
    /// connection, which is also the case for a job that outlived the
    /// connection it was queued for.
    pub(crate) fn prepare_stream(&self, kind: StreamKind) -> Result<()> {
        let info = self.stream_info();
        let negotiated = match kind {
            StreamKind::Audio => info.audio.is_some(),
            StreamKind::Video => info.video.is_some(),
        };
        if !negotiated {
            debug!(session = %self.session, ?kind, "not negotiated, skipping prepare");
            return Ok(());
        }
        self.ensure_chain(kind)
    }

    /// Builds the chain for `kind` if needed, without linking its input.
    ///
    /// A sink builds its decode chain inside the media type's bin. A source
    /// builds its encode chain in the root pipeline and feeds it to the muxer.
    fn ensure_chain(&self, kind: StreamKind) -> Result<()> {
        let handle = self
            .handle
            .read()
            .map_err(|e| Error::poisoned("pipeline handle", e))?;
        let Some(handle) = handle.as_ref() else {
            debug!(session = %self.session, ?kind, "no pipeline, skipping chain");
            return Ok(());
        };

        let mut chain = self
            .slot(kind)
            .chain
            .lock()
            .map_err(|e| Error::poisoned("chain", e))?;
        if chain.is_some() {
            return Ok(());
        }

        match &handle.skeleton {
            Skeleton::Sink { .. } => {
                let Some(bin) = handle.stream_bin(kind) else {
                    return Ok(());
                };
                *chain = Some(self.assemble(bin, &self.decode_stages(kind)?)?);
            }
            Skeleton::Source { muxer } => {
                let built = self.assemble(&handle.root, &self.encode_stages(kind)?)?;
                if let Some(tail) = built.tail() {
                    self.runtime.link(tail, muxer)?;
                }
                for element in &built.elements {
                    self.runtime.sync_state_with_parent(element)?;
                }
                *chain = Some(built);
            }
        }
        debug!(session = %self.session, stream = kind.label(), "chain prepared");
        Ok(())
    }

    /// Links the claimed pad of `kind` to its decode chain and starts the
    /// chain's bin.
    ///
    /// A job left over from a torn-down pipeline finds no claimed pad and
    /// does nothing; in particular it builds no chain in the new pipeline.
    pub(crate) fn link_stream(&self, kind: StreamKind) -> Result<()> {
        let slot = self.slot(kind);
        let Some(pad) = slot.pad.lock().map_err(|e| Error::poisoned("pad", e))?.take() else {
            debug!(session = %self.session, ?kind, "no pad to link");
            return Ok(());
        };

        self.ensure_chain(kind)?;

        let handle = self
            .handle
            .read()
            .map_err(|e| Error::poisoned("pipeline handle", e))?;
        let Some(bin) = handle.as_ref().and_then(|h| h.stream_bin(kind)) else {
            debug!(session = %self.session, ?kind, "no pipeline, skipping link");
            return Ok(());
        };

        {
            let chain = slot.chain.lock().map_err(|e| Error::poisoned("chain", e))?;
            let queue = chain
                .as_ref()
                .and_then(Chain::head)
                .ok_or_else(|| Error::ConstructionFailure(format!("empty {} chain", kind.label())))?;
            self.runtime.link_pad(&pad, queue).map_err(|e| {
                Error::ConstructionFailure(format!(
                    "linking {} to the {} chain: {e}",
                    self.runtime.pad_name(&pad),
                    kind.label()
                ))
            })?;
        }

        if kind == StreamKind::Audio {
            self.remove_placeholder(bin);
        }

        if self.runtime.set_state(bin, PipelineState::Playing)? == StateChange::Async {
            debug!(session = %self.session, stream = kind.label(), "bin starting asynchronously");
        }
        info!(session = %self.session, stream = kind.label(), "stream linked");
        Ok(())
    }

    /// Takes the placeholder sink out of `bin` now that real audio flows.
    ///
    /// The element's state is locked while it is shut down so the bin cannot
    /// restart it. Failures are logged and otherwise ignored.
    fn remove_placeholder(&self, bin: &R::Element) {
        let placeholder = match self.placeholder.lock() {
            Ok(mut placeholder) => placeholder.take(),
            Err(e) => {
                warn!(session = %self.session, "placeholder mutex poisoned: {e}");
                return;
            }
        };
        let Some(placeholder) = placeholder else {
            return;
        };

        self.runtime.set_locked_state(&placeholder, true);
        match self.runtime.set_state(&placeholder, PipelineState::Null) {
            Ok(StateChange::Success) => {}
            // Null is expected to be reached synchronously.
            Ok(StateChange::Async) => {
                warn!(session = %self.session, "placeholder did not stop synchronously")
            }
            Err(e) => warn!(session = %self.session, "failed to stop placeholder: {e}"),
        }
        if let Err(e) = self.runtime.remove_from_bin(bin, &placeholder) {
            warn!(session = %self.session, "failed to remove placeholder: {e}");
        }
        self.runtime.set_locked_state(&placeholder, false);
        debug!(session = %self.session, "placeholder removed");
    }

    /// Requests a state change of the root pipeline.
    pub(crate) fn set_root_state(&self, state: PipelineState) -> Result<StateChange> {
        let handle = self
            .handle
            .read()
            .map_err(|e| Error::poisoned("pipeline handle", e))?;
        let root = handle
            .as_ref()
            .map(|h| &h.root)
            .ok_or_else(|| Error::Internal("no pipeline".into()))?;
        self.runtime.set_state(root, state)
    }

    /// Shuts the pipeline down and forgets everything learnt about the
    /// connection. Best-effort; never fails.
    pub(crate) fn teardown(&self) {
        let handle = match self.handle.write() {
            Ok(mut handle) => handle.take(),
            Err(e) => {
                warn!(session = %self.session, "pipeline handle poisoned: {e}");
                None
            }
        };

        if let Some(handle) = handle {
            self.runtime.unwatch_bus(&handle.root);
            match self.runtime.set_state(&handle.root, PipelineState::Null) {
                Ok(StateChange::Success) => {}
                Ok(StateChange::Async) => {
                    warn!(session = %self.session, "pipeline did not stop synchronously")
                }
                Err(e) => warn!(session = %self.session, "failed to stop pipeline: {e}"),
            }
            info!(session = %self.session, "pipeline torn down");
        }

        if let Ok(mut placeholder) = self.placeholder.lock() {
            placeholder.take();
        }
        self.audio.reset();
        self.video.reset();
        if let Ok(mut info) = self.stream_info.write() {
            info.take();
        }
    }
}
