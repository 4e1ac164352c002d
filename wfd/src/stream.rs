// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Negotiated stream parameters.
//!
//! These are filled in once per connection, when the protocol element reports
//! the outcome of capability negotiation, and read by graph assembly to pick
//! element chains.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::manager::Job;

/// Audio codecs a Wi-Fi Display session can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Ac3,
    Lpcm,
}

/// Video codecs a Wi-Fi Display session can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
}

/// Error returned when a codec name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown codec \"{0}\"")]
pub struct UnknownCodec(pub String);

impl FromStr for AudioCodec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aac" => Ok(AudioCodec::Aac),
            "ac3" => Ok(AudioCodec::Ac3),
            "lpcm" => Ok(AudioCodec::Lpcm),
            _ => Err(UnknownCodec(s.to_string())),
        }
    }
}

impl FromStr for VideoCodec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" => Ok(VideoCodec::H264),
            "h265" | "hevc" => Ok(VideoCodec::H265),
            _ => Err(UnknownCodec(s.to_string())),
        }
    }
}

/// Negotiated audio parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codec: AudioCodec,
    pub channels: u32,
    pub sample_rate: u32,
    /// Bits per sample.
    pub bit_width: u32,
}

/// Negotiated video parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    /// Frames per second.
    pub frame_rate: u32,
}

/// Everything negotiated for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamInfo {
    pub audio: Option<AudioInfo>,
    pub video: Option<VideoInfo>,
}

/// The media type of one elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    /// Classifies a demuxer pad by the first letter of its name.
    pub fn from_pad_name(name: &str) -> Option<StreamKind> {
        match name.as_bytes().first() {
            Some(b'a') => Some(StreamKind::Audio),
            Some(b'v') => Some(StreamKind::Video),
            _ => None,
        }
    }

    pub(crate) fn link_job(self) -> Job {
        match self {
            StreamKind::Audio => Job::LinkAudioDecodeChain,
            StreamKind::Video => Job::LinkVideoDecodeChain,
        }
    }

    pub(crate) fn prepare_job(self) -> Job {
        match self {
            StreamKind::Audio => Job::PrepareAudioPipeline,
            StreamKind::Video => Job::PrepareVideoPipeline,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
        }
    }
}
