// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Capability interface of the media-pipeline runtime.
//!
//! The session never talks to a media framework directly. It creates named
//! elements, links them, requests state changes and listens for pad and bus
//! notifications through [`PipelineRuntime`]. The `gst-wfd` crate implements
//! it on top of GStreamer.

use std::fmt;

use crate::{Result, stream::StreamInfo};

/// State of a pipeline element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// How a requested state change completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// The element is in the requested state.
    Success,
    /// The change continues in the background; completion is reported on the
    /// bus with [`PipelineMessage::StateChanged`].
    Async,
}

/// Bus notifications the runtime delivers for a root pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    /// The root pipeline reached a new state.
    StateChanged(PipelineState),
    /// The protocol element finished connecting to its peer.
    PeerConnected,
    /// The peer went away.
    PeerDisconnected,
    /// Capability negotiation produced the stream parameters.
    MediaInfo(StreamInfo),
    /// The stream ended.
    Eos,
    /// An element posted an error.
    Error {
        /// Path of the element that posted the error.
        source: String,
        message: String,
    },
}

/// Callback invoked for each pad appearing on an element.
pub type PadAddedCallback<P> = Box<dyn Fn(P) + Send + Sync + 'static>;

/// Callback invoked for each bus message of a pipeline.
pub type BusCallback = Box<dyn Fn(PipelineMessage) + Send + Sync + 'static>;

/// Operations the session needs from a media-pipeline runtime.
///
/// Implementations must be usable from several threads at once: commands run
/// on the caller's thread, graph assembly on the pipeline worker and
/// notifications on the runtime's own threads.
pub trait PipelineRuntime: Send + Sync + 'static {
    /// Reference to an element, bin or pipeline.
    type Element: Clone + Send + Sync + fmt::Debug + 'static;

    /// Reference to an element pad.
    type Pad: Send + fmt::Debug + 'static;

    /// Creates an empty root pipeline.
    fn create_pipeline(&self, name: &str) -> Result<Self::Element>;

    /// Creates an element from `factory`, named `name`.
    fn make_element(&self, factory: &str, name: &str) -> Result<Self::Element>;

    /// Adds `element` to `bin`.
    fn add_to_bin(&self, bin: &Self::Element, element: &Self::Element) -> Result<()>;

    /// Removes `element` from `bin`.
    fn remove_from_bin(&self, bin: &Self::Element, element: &Self::Element) -> Result<()>;

    /// Links the output of `src` to the input of `dst`.
    fn link(&self, src: &Self::Element, dst: &Self::Element) -> Result<()>;

    /// Links a pad to the input of `dst`, crossing bin boundaries if needed.
    fn link_pad(&self, pad: &Self::Pad, dst: &Self::Element) -> Result<()>;

    fn pad_name(&self, pad: &Self::Pad) -> String;

    /// Requests a state change of an element, bin or pipeline.
    fn set_state(&self, element: &Self::Element, state: PipelineState) -> Result<StateChange>;

    /// Brings an element added to a running bin to its parent's state.
    fn sync_state_with_parent(&self, element: &Self::Element) -> Result<()>;

    /// Prevents (or allows again) `element` from following its parent's
    /// state changes.
    fn set_locked_state(&self, element: &Self::Element, locked: bool);

    /// Sets a property from its string representation.
    fn set_string_property(&self, element: &Self::Element, name: &str, value: &str)
    -> Result<()>;

    /// Subscribes to pads appearing on `element`.
    fn connect_pad_added(
        &self,
        element: &Self::Element,
        callback: PadAddedCallback<Self::Pad>,
    ) -> Result<()>;

    /// Subscribes to the bus messages of `pipeline`.
    fn watch_bus(&self, pipeline: &Self::Element, callback: BusCallback) -> Result<()>;

    /// Drops the bus subscription of `pipeline`.
    fn unwatch_bus(&self, pipeline: &Self::Element);
}
