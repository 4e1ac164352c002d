// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Session configuration.
//!
//! Configuration is read-only for the library. It is usually loaded from a JSON
//! document; every field has a default so partial documents are accepted.
//!
//! # Examples
//!
//! ```
//! use wfd::config::{DisplaySurface, SessionConfig};
//!
//! # fn main() -> Result<(), wfd::Error> {
//! let config = SessionConfig::from_json(
//!     r#"{ "server_ip": "192.168.49.1", "display_surface": "null" }"#,
//! )?;
//! assert_eq!(config.server_port, 2022);
//! assert_eq!(config.display_surface, DisplaySurface::Null);
//! # Ok(())
//! # }
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Default RTSP port a sink connects to.
pub const DEFAULT_SERVER_PORT: u16 = 2022;

/// Default bound for [`crate::Session::wait_for_state`] callers.
pub const DEFAULT_STATE_CHANGE_TIMEOUT_MS: u64 = 5000;

/// Where decoded video is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplaySurface {
    /// A platform overlay window.
    #[default]
    Overlay,
    /// An EFL canvas image.
    Evas,
    /// Decode but discard the frames.
    Null,
}

/// Per-session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Address of the peer a sink connects to.
    pub server_ip: String,

    /// Port of the peer a sink connects to.
    pub server_port: u16,

    /// Target surface for the video renderer.
    pub display_surface: DisplaySurface,

    /// Factory of the content-protection stage inserted in the video chain,
    /// if any.
    pub content_protection: Option<String>,

    /// Suggested bound, in milliseconds, for waits on state changes.
    pub state_change_timeout_ms: u64,

    /// Element factory names used while assembling pipelines.
    pub factories: ElementFactories,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            server_ip: "127.0.0.1".to_owned(),
            server_port: DEFAULT_SERVER_PORT,
            display_surface: DisplaySurface::default(),
            content_protection: None,
            state_change_timeout_ms: DEFAULT_STATE_CHANGE_TIMEOUT_MS,
            factories: ElementFactories::default(),
        }
    }
}

impl SessionConfig {
    /// Parses a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The RTSP location a sink connects to.
    pub fn server_uri(&self) -> String {
        format!("rtsp://{}:{}/wfd1.0", self.server_ip, self.server_port)
    }

    pub fn state_change_timeout(&self) -> Duration {
        Duration::from_millis(self.state_change_timeout_ms)
    }

    /// Factory of the video renderer for the configured surface.
    pub fn video_sink_factory(&self) -> &str {
        match self.display_surface {
            DisplaySurface::Overlay => &self.factories.video_sink,
            DisplaySurface::Evas => &self.factories.evas_sink,
            DisplaySurface::Null => &self.factories.null_sink,
        }
    }
}

/// Element factory names.
///
/// Defaults name stock GStreamer elements, except for the protocol source,
/// which is provided by the platform's Wi-Fi Display plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementFactories {
    pub bin: String,
    pub queue: String,

    // Sink side
    pub protocol_source: String,
    pub demuxer: String,
    pub placeholder_sink: String,
    pub h264_parser: String,
    pub h264_decoder: String,
    pub h265_parser: String,
    pub h265_decoder: String,
    pub video_converter: String,
    pub video_sink: String,
    pub evas_sink: String,
    pub null_sink: String,
    pub aac_parser: String,
    pub aac_decoder: String,
    pub ac3_parser: String,
    pub ac3_decoder: String,
    pub lpcm_parser: String,
    pub lpcm_decoder: String,
    pub audio_resampler: String,
    pub audio_sink: String,

    // Source side
    pub video_capture: String,
    pub h264_encoder: String,
    pub h265_encoder: String,
    pub audio_capture: String,
    pub audio_converter: String,
    pub aac_encoder: String,
    pub ac3_encoder: String,
    pub muxer: String,
    pub transport_sink: String,
}

impl Default for ElementFactories {
    fn default() -> Self {
        ElementFactories {
            bin: "bin".into(),
            queue: "queue".into(),
            protocol_source: "wfdrtspsrc".into(),
            demuxer: "tsdemux".into(),
            placeholder_sink: "fakesink".into(),
            h264_parser: "h264parse".into(),
            h264_decoder: "avdec_h264".into(),
            h265_parser: "h265parse".into(),
            h265_decoder: "avdec_h265".into(),
            video_converter: "videoconvert".into(),
            video_sink: "autovideosink".into(),
            evas_sink: "evasimagesink".into(),
            null_sink: "fakesink".into(),
            aac_parser: "aacparse".into(),
            aac_decoder: "avdec_aac".into(),
            ac3_parser: "ac3parse".into(),
            ac3_decoder: "avdec_ac3".into(),
            lpcm_parser: "rawaudioparse".into(),
            lpcm_decoder: "audioconvert".into(),
            audio_resampler: "audioresample".into(),
            audio_sink: "autoaudiosink".into(),
            video_capture: "videotestsrc".into(),
            h264_encoder: "x264enc".into(),
            h265_encoder: "x265enc".into(),
            audio_capture: "audiotestsrc".into(),
            audio_converter: "audioconvert".into(),
            aac_encoder: "avenc_aac".into(),
            ac3_encoder: "avenc_ac3".into(),
            muxer: "mpegtsmux".into(),
            transport_sink: "appsink".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = SessionConfig::from_json("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.server_uri(), "rtsp://127.0.0.1:2022/wfd1.0");
    }

    #[test]
    fn nested_factories_merge_with_defaults() {
        let config = SessionConfig::from_json(
            r#"{ "factories": { "h264_decoder": "v4l2h264dec" }, "display_surface": "evas" }"#,
        )
        .unwrap();
        assert_eq!(config.factories.h264_decoder, "v4l2h264dec");
        assert_eq!(config.factories.h264_parser, "h264parse");
        assert_eq!(config.video_sink_factory(), "evasimagesink");
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = SessionConfig::from_json("{ \"server_port\": \"x\" }").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
