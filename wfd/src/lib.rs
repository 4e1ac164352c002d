// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! # WFD - Wi-Fi Display sessions
//!
//! Lifecycle management for Wi-Fi Display (Miracast) streaming sessions: a
//! state machine that decides which lifecycle commands are legal in which
//! state, and a pipeline worker that assembles the audio/video graph as
//! stream parameters become known at runtime.
//!
//! ## Overview
//!
//! The crate does not depend on a media framework. It drives one through the
//! [`PipelineRuntime`] trait; the `gst-wfd` crate implements it on top of
//! GStreamer.
//!
//! ### Key Concepts
//!
//! - **Session**: one Wi-Fi Display connection ([`Session`]), either the
//!   sending end ([`Role::Source`]) or the receiving end ([`Role::Sink`])
//! - **State record**: current, previous, pending and target state
//!   ([`StateRecord`]); commands are validated against it
//! - **Job**: a unit of pipeline work run by the session's worker ([`Job`])
//! - **Stream kind**: the media type of a discovered elementary stream
//!   ([`StreamKind`])
//!
//! ## Architecture
//!
//! ```text
//! application ──command──► Session ──validate/commit──► StateRecord
//!      ▲                     │  │
//!      │                     │  └──set_state/build──► PipelineRuntime
//!      │                     │                           │
//!      └──SessionMessage─────┤◄──bus messages────────────┤
//!                            │                           │
//!                            └──Job──► worker ◄──pad-added┘
//! ```
//!
//! ## Examples
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use wfd::{PipelineRuntime, Role, Session, SessionConfig, SessionState};
//!
//! # fn main_with<R: PipelineRuntime>(runtime: Arc<R>) -> Result<(), wfd::Error> {
//! let config = SessionConfig::from_file("/etc/wfd/source.json")?;
//! let timeout = config.state_change_timeout();
//! let session = Session::new(runtime, Role::Source, config);
//!
//! session.create()?;
//! session.prepare()?;
//!
//! // Returns at once; the session waits for a sink in ConnectionWait.
//! session.connect()?;
//! session.wait_for_state(SessionState::Connected, timeout)?;
//!
//! session.start()?;
//! std::thread::sleep(Duration::from_secs(10));
//! session.stop()?;
//! session.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - Commands on one session are mutually exclusive
//! - Pipeline jobs of one session run one at a time, in submission order, on
//!   the session's worker thread
//! - Notifications are delivered on the thread that caused them, outside the
//!   command lock

mod error;
mod graph;
mod manager;
mod session;

pub mod config;
pub mod runtime;
pub mod state;
pub mod stream;

pub use config::{DisplaySurface, ElementFactories, SessionConfig};
pub use error::{Error, Result};
pub use manager::{Job, JobHandler, PipelineManager};
pub use runtime::{
    BusCallback, PadAddedCallback, PipelineMessage, PipelineRuntime, PipelineState, StateChange,
};
pub use session::{ContentInfo, Session, SessionError, SessionMessage};
pub use state::{Command, CommitOutcome, Role, SessionState, StateRecord, Validation};
pub use stream::{AudioCodec, AudioInfo, StreamInfo, StreamKind, VideoCodec, VideoInfo};
