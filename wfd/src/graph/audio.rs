// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Audio chain recipes.
//!
//! Every negotiated codec maps to its own parser and decoder; only the chain
//! matching the codec is ever built.

use super::Stage;
use crate::{config::SessionConfig, stream::AudioCodec};

/// Receive side: queue, parser, decoder, resampler and renderer.
pub(crate) fn decode_stages(config: &SessionConfig, codec: AudioCodec) -> Vec<Stage<'_>> {
    let f = &config.factories;
    let (parser, decoder) = match codec {
        AudioCodec::Aac => (&f.aac_parser, &f.aac_decoder),
        AudioCodec::Ac3 => (&f.ac3_parser, &f.ac3_decoder),
        AudioCodec::Lpcm => (&f.lpcm_parser, &f.lpcm_decoder),
    };

    vec![
        Stage::new(&f.queue, "audio-queue"),
        Stage::new(parser, "audio-parser"),
        Stage::new(decoder, "audio-decoder"),
        Stage::new(&f.audio_resampler, "audio-resampler"),
        Stage::new(&f.audio_sink, "audio-sink"),
    ]
}

/// Send side: capture, queue, converter and encoder. LPCM is muxed raw, so
/// its chain ends at the converter.
pub(crate) fn encode_stages(config: &SessionConfig, codec: AudioCodec) -> Vec<Stage<'_>> {
    let f = &config.factories;
    let mut stages = vec![
        Stage::new(&f.audio_capture, "audio-capture"),
        Stage::new(&f.queue, "audio-queue"),
        Stage::new(&f.audio_converter, "audio-converter"),
    ];
    match codec {
        AudioCodec::Aac => stages.push(Stage::new(&f.aac_encoder, "audio-encoder")),
        AudioCodec::Ac3 => stages.push(Stage::new(&f.ac3_encoder, "audio-encoder")),
        AudioCodec::Lpcm => {}
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_codec_has_its_own_parser_and_decoder() {
        let config = SessionConfig::default();
        for (codec, parser, decoder) in [
            (AudioCodec::Aac, "aacparse", "avdec_aac"),
            (AudioCodec::Ac3, "ac3parse", "avdec_ac3"),
            (AudioCodec::Lpcm, "rawaudioparse", "audioconvert"),
        ] {
            let stages = decode_stages(&config, codec);
            assert_eq!(stages[0].factory, "queue");
            assert_eq!(stages[1].factory, parser, "{codec:?}");
            assert_eq!(stages[2].factory, decoder, "{codec:?}");
            assert_eq!(stages[4].name, "audio-sink");
        }
    }

    #[test]
    fn lpcm_is_not_encoded() {
        let config = SessionConfig::default();
        assert_eq!(encode_stages(&config, AudioCodec::Lpcm).len(), 3);
        assert_eq!(
            encode_stages(&config, AudioCodec::Ac3).last().map(|s| s.factory),
            Some("avenc_ac3")
        );
    }
}
