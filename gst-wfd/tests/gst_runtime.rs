// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! GStreamer runtime tests.
//!
//! Only core elements are used so the tests run against a bare GStreamer
//! installation.

use std::{
    sync::{Arc, mpsc},
    time::Duration,
};

use gst::prelude::*;
use gstreamer as gst;
use gstwfd::GstRuntime;
use wfd::{
    AudioCodec, Error, PipelineMessage, PipelineRuntime, PipelineState, Role, Session,
    SessionConfig, SessionState, StateChange,
};

static LOG_ONCE: std::sync::Once = std::sync::Once::new();

fn setup() -> GstRuntime {
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
    GstRuntime::new().unwrap()
}

#[test]
fn builds_links_and_readies_a_pipeline() {
    let runtime = setup();
    let pipeline = runtime.create_pipeline("basic").unwrap();
    let queue = runtime.make_element("queue", "q").unwrap();
    let sink = runtime.make_element("fakesink", "out").unwrap();
    runtime.add_to_bin(&pipeline, &queue).unwrap();
    runtime.add_to_bin(&pipeline, &sink).unwrap();
    runtime.link(&queue, &sink).unwrap();

    assert!(queue.static_pad("src").unwrap().is_linked());
    assert_eq!(
        runtime.set_state(&pipeline, PipelineState::Ready).unwrap(),
        StateChange::Success
    );
    runtime.set_state(&pipeline, PipelineState::Null).unwrap();
}

#[test]
fn unknown_factory_is_a_construction_failure() {
    let runtime = setup();
    let err = runtime
        .make_element("no-such-element-factory", "missing")
        .unwrap_err();
    assert!(
        matches!(err, Error::ConstructionFailure(ref reason) if reason.contains("no-such-element-factory"))
    );
}

#[test]
fn string_properties_are_checked() {
    let runtime = setup();
    let sink = runtime.make_element("fakesink", "out").unwrap();
    runtime.set_string_property(&sink, "sync", "false").unwrap();
    assert!(!sink.property::<bool>("sync"));
    assert!(runtime.set_string_property(&sink, "location", "x").is_err());
}

#[test]
fn locked_element_is_stopped_and_removed() {
    let runtime = setup();
    let pipeline = runtime.create_pipeline("placeholder").unwrap();
    let bin = runtime.make_element("bin", "audio-bin").unwrap();
    let placeholder = runtime.make_element("fakesink", "audio-placeholder").unwrap();
    runtime.add_to_bin(&pipeline, &bin).unwrap();
    runtime.add_to_bin(&bin, &placeholder).unwrap();
    runtime.set_state(&pipeline, PipelineState::Ready).unwrap();

    runtime.set_locked_state(&placeholder, true);
    assert_eq!(
        runtime.set_state(&placeholder, PipelineState::Null).unwrap(),
        StateChange::Success
    );
    runtime.remove_from_bin(&bin, &placeholder).unwrap();
    runtime.set_locked_state(&placeholder, false);

    assert!(placeholder.parent().is_none());
    assert!(runtime.add_to_bin(&placeholder, &bin).is_err());
    runtime.set_state(&pipeline, PipelineState::Null).unwrap();
}

#[test]
fn bus_watch_translates_element_messages() {
    let runtime = setup();
    let pipeline = runtime.create_pipeline("watched").unwrap();
    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    runtime
        .watch_bus(
            &pipeline,
            Box::new(move |message| {
                let _ = tx.lock().unwrap().send(message);
            }),
        )
        .unwrap();
    assert!(runtime.watch_bus(&pipeline, Box::new(|_| {})).is_err());

    let info = gst::Structure::builder("wfd-media-info")
        .field("audio-codec", "ac3")
        .field("audio-channels", 6u32)
        .build();
    pipeline
        .post_message(gst::message::Element::builder(info).src(&pipeline).build())
        .unwrap();

    let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let PipelineMessage::MediaInfo(info) = message else {
        panic!("unexpected message {message:?}");
    };
    let audio = info.audio.unwrap();
    assert_eq!(audio.codec, AudioCodec::Ac3);
    assert_eq!(audio.channels, 6);
    assert!(info.video.is_none());

    runtime.unwatch_bus(&pipeline);
    pipeline
        .post_message(
            gst::message::Element::builder(gst::Structure::new_empty("wfd-peer-connected"))
                .src(&pipeline)
                .build(),
        )
        .unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn pipeline_state_changes_reach_the_watch() {
    let runtime = setup();
    let pipeline = runtime.create_pipeline("states").unwrap();
    let sink = runtime.make_element("fakesink", "out").unwrap();
    runtime.add_to_bin(&pipeline, &sink).unwrap();
    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    runtime
        .watch_bus(
            &pipeline,
            Box::new(move |message| {
                let _ = tx.lock().unwrap().send(message);
            }),
        )
        .unwrap();

    runtime.set_state(&pipeline, PipelineState::Ready).unwrap();
    // The child's own change is filtered out; only the pipeline reports.
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        PipelineMessage::StateChanged(PipelineState::Ready)
    );
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    runtime.unwatch_bus(&pipeline);
    runtime.set_state(&pipeline, PipelineState::Null).unwrap();
}

#[test]
fn sink_session_prepares_with_core_elements() {
    let runtime = Arc::new(setup());
    let mut config = SessionConfig::default();
    config.factories.protocol_source = "filesrc".into();
    config.factories.demuxer = "identity".into();

    let session = Session::new(runtime, Role::Sink, config);
    session.create().unwrap();
    session.prepare().unwrap();
    assert_eq!(session.state(), SessionState::Prepared);

    session.unprepare().unwrap();
    assert_eq!(session.state(), SessionState::Null);
    session.destroy();
    assert_eq!(session.state(), SessionState::None);
}

#[test]
fn source_session_fails_to_prepare_without_its_muxer() {
    let runtime = Arc::new(setup());
    let mut config = SessionConfig::default();
    config.factories.muxer = "no-such-muxer".into();

    let session = Session::new(runtime, Role::Source, config);
    session.create().unwrap();
    assert!(matches!(session.prepare(), Err(Error::ConstructionFailure(_))));
    assert_eq!(session.state(), SessionState::Null);
}
