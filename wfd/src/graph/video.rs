// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Video chain recipes.

use super::Stage;
use crate::{config::SessionConfig, stream::VideoCodec};

/// Receive side: queue, optional content protection, parser, decoder,
/// converter and renderer.
pub(crate) fn decode_stages(config: &SessionConfig, codec: VideoCodec) -> Vec<Stage<'_>> {
    let f = &config.factories;
    let (parser, decoder) = match codec {
        VideoCodec::H264 => (&f.h264_parser, &f.h264_decoder),
        VideoCodec::H265 => (&f.h265_parser, &f.h265_decoder),
    };

    let mut stages = vec![Stage::new(&f.queue, "video-queue")];
    if let Some(protection) = &config.content_protection {
        stages.push(Stage::new(protection, "video-protection"));
    }
    stages.extend([
        Stage::new(parser, "video-parser"),
        Stage::new(decoder, "video-decoder"),
        Stage::new(&f.video_converter, "video-converter"),
        Stage::new(config.video_sink_factory(), "video-sink"),
    ]);
    stages
}

/// Send side: capture, queue, converter, encoder and parser. The last stage
/// feeds the muxer.
pub(crate) fn encode_stages(config: &SessionConfig, codec: VideoCodec) -> Vec<Stage<'_>> {
    let f = &config.factories;
    let (encoder, parser) = match codec {
        VideoCodec::H264 => (&f.h264_encoder, &f.h264_parser),
        VideoCodec::H265 => (&f.h265_encoder, &f.h265_parser),
    };

    vec![
        Stage::new(&f.video_capture, "video-capture"),
        Stage::new(&f.queue, "video-queue"),
        Stage::new(&f.video_converter, "video-converter"),
        Stage::new(encoder, "video-encoder"),
        Stage::new(parser, "video-parser"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplaySurface;

    fn factories(stages: &[Stage<'_>]) -> Vec<String> {
        stages.iter().map(|s| s.factory.to_owned()).collect()
    }

    #[test]
    fn h265_selects_hevc_parser_and_decoder() {
        let config = SessionConfig::default();
        assert_eq!(
            factories(&decode_stages(&config, VideoCodec::H265)),
            ["queue", "h265parse", "avdec_h265", "videoconvert", "autovideosink"]
        );
    }

    #[test]
    fn content_protection_follows_the_queue() {
        let config = SessionConfig {
            content_protection: Some("hdcpdecrypt".into()),
            display_surface: DisplaySurface::Null,
            ..SessionConfig::default()
        };
        let stages = decode_stages(&config, VideoCodec::H264);
        assert_eq!(
            factories(&stages),
            ["queue", "hdcpdecrypt", "h264parse", "avdec_h264", "videoconvert", "fakesink"]
        );
        assert_eq!(stages[1].name, "video-protection");
    }

    #[test]
    fn encoder_precedes_parser() {
        let config = SessionConfig::default();
        let stages = encode_stages(&config, VideoCodec::H264);
        assert_eq!(stages.last().map(|s| s.factory), Some("h264parse"));
        assert_eq!(stages[3].factory, "x264enc");
    }
}
