// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Translation of GStreamer bus messages into session messages.
//!
//! The protocol element reports the connection's progress with element
//! messages:
//!
//! | Structure name          | Fields                                                      |
//! |-------------------------|-------------------------------------------------------------|
//! | `wfd-peer-connected`    |                                                             |
//! | `wfd-peer-disconnected` |                                                             |
//! | `wfd-media-info`        | `audio-codec`, `audio-channels`, `audio-rate`, `audio-width`, `video-codec`, `video-width`, `video-height`, `video-framerate` |
//!
//! Codecs are strings (`aac`, `ac3`, `lpcm`, `h264`, `h265`); every other
//! field is an unsigned integer. Media types without a codec field were not
//! negotiated.

use gst::prelude::*;
use gstreamer as gst;

use wfd::{
    AudioCodec, AudioInfo, PipelineMessage, PipelineState, StreamInfo, VideoCodec, VideoInfo,
};

use crate::CAT;

/// Structure name of the application message that ends a bus watch.
pub(crate) const STOP_WATCH: &str = "wfd-stop-watch";

pub(crate) const PEER_CONNECTED: &str = "wfd-peer-connected";
pub(crate) const PEER_DISCONNECTED: &str = "wfd-peer-disconnected";
pub(crate) const MEDIA_INFO: &str = "wfd-media-info";

/// Whether `message` asks the watch thread to stop.
pub(crate) fn is_stop(message: &gst::MessageRef) -> bool {
    match message.view() {
        gst::MessageView::Application(app) => app
            .structure()
            .is_some_and(|s| s.name().as_str() == STOP_WATCH),
        _ => false,
    }
}

/// Converts a message posted on `pipeline`'s bus. Messages the session has
/// no use for yield `None`.
pub(crate) fn translate(
    message: &gst::MessageRef,
    pipeline: &gst::Element,
) -> Option<PipelineMessage> {
    match message.view() {
        gst::MessageView::StateChanged(changed) => {
            // Children report their own changes on the same bus.
            if message.src() != Some(pipeline.upcast_ref::<gst::Object>()) {
                return None;
            }
            from_gst_state(changed.current()).map(PipelineMessage::StateChanged)
        }
        gst::MessageView::Eos(_) => Some(PipelineMessage::Eos),
        gst::MessageView::Error(err) => Some(PipelineMessage::Error {
            source: message
                .src()
                .map(|src| src.path_string().to_string())
                .unwrap_or_default(),
            message: err.error().to_string(),
        }),
        gst::MessageView::Element(element) => element.structure().and_then(element_message),
        _ => None,
    }
}

fn element_message(structure: &gst::StructureRef) -> Option<PipelineMessage> {
    match structure.name().as_str() {
        PEER_CONNECTED => Some(PipelineMessage::PeerConnected),
        PEER_DISCONNECTED => Some(PipelineMessage::PeerDisconnected),
        MEDIA_INFO => Some(PipelineMessage::MediaInfo(media_info(structure))),
        _ => None,
    }
}

fn media_info(s: &gst::StructureRef) -> StreamInfo {
    let audio = codec::<AudioCodec>(s, "audio-codec").map(|codec| AudioInfo {
        codec,
        channels: uint(s, "audio-channels"),
        sample_rate: uint(s, "audio-rate"),
        bit_width: uint(s, "audio-width"),
    });
    let video = codec::<VideoCodec>(s, "video-codec").map(|codec| VideoInfo {
        codec,
        width: uint(s, "video-width"),
        height: uint(s, "video-height"),
        frame_rate: uint(s, "video-framerate"),
    });
    StreamInfo { audio, video }
}

fn codec<C>(s: &gst::StructureRef, field: &str) -> Option<C>
where
    C: std::str::FromStr,
    C::Err: std::fmt::Display,
{
    let name = s.get::<&str>(field).ok()?;
    match name.parse() {
        Ok(codec) => Some(codec),
        Err(err) => {
            gst::warning!(CAT, "Ignoring {field}: {err}");
            None
        }
    }
}

/// Reads an integer field, accepting both signed and unsigned values.
fn uint(s: &gst::StructureRef, field: &str) -> u32 {
    s.get::<u32>(field)
        .ok()
        .or_else(|| s.get::<i32>(field).ok().map(|v| v.max(0) as u32))
        .unwrap_or(0)
}

fn from_gst_state(state: gst::State) -> Option<PipelineState> {
    match state {
        gst::State::Null => Some(PipelineState::Null),
        gst::State::Ready => Some(PipelineState::Ready),
        gst::State::Paused => Some(PipelineState::Paused),
        gst::State::Playing => Some(PipelineState::Playing),
        _ => None,
    }
}

pub(crate) fn to_gst_state(state: PipelineState) -> gst::State {
    match state {
        PipelineState::Null => gst::State::Null,
        PipelineState::Ready => gst::State::Ready,
        PipelineState::Paused => gst::State::Paused,
        PipelineState::Playing => gst::State::Playing,
    }
}
