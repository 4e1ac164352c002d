// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for session operations.
//!
//! Validation outcomes that are not failures (a command that is already
//! satisfied or already in flight) are reported as success and never reach
//! this module.

use crate::state::{Command, SessionState};

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while driving a session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The command is not allowed in the session's current state.
    ///
    /// The session is left untouched; callers may branch on this to retry
    /// once the session has moved on.
    #[error("Invalid state: {command:?} is not allowed in state {state:?}")]
    InvalidState {
        /// The rejected command.
        command: Command,
        /// The session state at the time of the rejection.
        state: SessionState,
    },

    /// The session has been destroyed.
    #[error("Session is not initialized")]
    NotInitialized,

    /// An element could not be created or linked while assembling the graph.
    #[error("Construction failure: {0}")]
    ConstructionFailure(String),

    /// A pipeline runtime call failed unexpectedly.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The pipeline manager worker has exited and accepts no more jobs.
    #[error("Pipeline manager stopped")]
    ManagerStopped,

    /// A bounded wait elapsed before the session reached the requested state.
    #[error("Timeout")]
    Timeout,

    /// The configuration could not be parsed.
    #[error("Configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Reading configuration from disk failed.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if the error is a state validation rejection.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState { .. })
    }

    pub(crate) fn poisoned<T>(what: &str, err: std::sync::PoisonError<T>) -> Error {
        Error::Internal(format!("{what} mutex poisoned: {err}"))
    }
}
