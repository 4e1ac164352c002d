// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Session state machine.
//!
//! A session tracks four states: the `current` one, the `previous` one, the
//! `pending` state of a transition that has been started but not finished, and
//! the `target` state the last accepted command asked for. Every lifecycle
//! command is checked against the transition table before it may touch the
//! session.
//!
//! ```text
//! None ─► Null ─► Ready/Prepared ─► (ConnectionWait) ─► Connected ─► Playing ⇄ Paused
//!                      ▲                                                  │
//!                      └──────────── (Teardown) / Disconnected ◄──────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Which end of a Wi-Fi Display connection a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The sending side (captures, encodes and serves the stream).
    Source,
    /// The receiving side (demuxes, decodes and renders the stream).
    Sink,
}

impl Role {
    /// The state a prepared session of this role rests in.
    pub fn prepared_state(self) -> SessionState {
        match self {
            Role::Source => SessionState::Ready,
            Role::Sink => SessionState::Prepared,
        }
    }
}

/// Closed set of session states shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Before creation and after destruction.
    #[default]
    None,
    Null,
    /// Prepared source.
    Ready,
    /// Prepared sink.
    Prepared,
    /// Source waiting for a sink to connect.
    ConnectionWait,
    Connected,
    Playing,
    Paused,
    Disconnected,
    /// Source tearing down its connection.
    Teardown,
}

/// Lifecycle commands accepted by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Create,
    Prepare,
    Connect,
    Start,
    Pause,
    Resume,
    Stop,
    Disconnect,
    Unprepare,
    Destroy,
}

/// A set of states a command may start from.
#[derive(Debug, Clone, Copy)]
enum Precondition {
    /// Any state at all.
    Any,
    /// Exactly the listed states.
    States(&'static [SessionState]),
    /// The role's prepared state plus the listed states.
    PreparedOr(&'static [SessionState]),
}

impl Precondition {
    fn allows(self, role: Role, state: SessionState) -> bool {
        match self {
            Precondition::Any => true,
            Precondition::States(states) => states.contains(&state),
            Precondition::PreparedOr(states) => {
                state == role.prepared_state() || states.contains(&state)
            }
        }
    }
}

/// Where a command is heading.
#[derive(Debug, Clone, Copy)]
enum Target {
    State(SessionState),
    Prepared,
}

impl Target {
    fn resolve(self, role: Role) -> SessionState {
        match self {
            Target::State(state) => state,
            Target::Prepared => role.prepared_state(),
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy)]
struct Transition {
    command: Command,
    from: Precondition,
    to: Target,
}

use SessionState as S;

const TRANSITIONS: &[Transition] = &[
    Transition {
        command: Command::Create,
        from: Precondition::States(&[S::None]),
        to: Target::State(S::Null),
    },
    Transition {
        command: Command::Prepare,
        from: Precondition::States(&[S::Null]),
        to: Target::Prepared,
    },
    Transition {
        command: Command::Connect,
        from: Precondition::PreparedOr(&[]),
        to: Target::State(S::Connected),
    },
    Transition {
        command: Command::Start,
        from: Precondition::States(&[S::Connected]),
        to: Target::State(S::Playing),
    },
    Transition {
        command: Command::Pause,
        from: Precondition::States(&[S::Playing]),
        to: Target::State(S::Paused),
    },
    Transition {
        command: Command::Resume,
        from: Precondition::States(&[S::Paused]),
        to: Target::State(S::Playing),
    },
    Transition {
        command: Command::Stop,
        from: Precondition::States(&[S::Connected, S::Playing, S::Paused, S::Disconnected]),
        to: Target::Prepared,
    },
    Transition {
        command: Command::Disconnect,
        from: Precondition::States(&[S::Connected, S::Playing, S::Paused]),
        to: Target::State(S::Disconnected),
    },
    Transition {
        command: Command::Unprepare,
        from: Precondition::PreparedOr(&[S::Connected, S::Playing, S::Paused, S::Disconnected]),
        to: Target::State(S::Null),
    },
    Transition {
        command: Command::Destroy,
        from: Precondition::Any,
        to: Target::State(S::None),
    },
];

// Rows are laid out in `Command` declaration order.
fn transition(command: Command) -> &'static Transition {
    &TRANSITIONS[command as usize]
}

impl Command {
    /// The state this command drives a session of `role` to.
    pub fn target(self, role: Role) -> SessionState {
        transition(self).to.resolve(role)
    }

    /// Whether `state` is a legal starting point for this command.
    pub fn allowed_from(self, role: Role, state: SessionState) -> bool {
        transition(self).from.allows(role, state)
    }

    /// Intermediate states a session passes through while executing this
    /// command. Committing them never notifies the application.
    pub fn hops(self, role: Role) -> &'static [SessionState] {
        match (self, role) {
            (Command::Connect, Role::Source) => &[S::ConnectionWait],
            (Command::Stop, Role::Source) => &[S::Teardown],
            _ => &[],
        }
    }

    /// The opposite playback state a Start/Pause/Resume may override.
    fn overridable_pending(self) -> Option<SessionState> {
        match self {
            Command::Start | Command::Resume => Some(S::Paused),
            Command::Pause => Some(S::Playing),
            _ => None,
        }
    }
}

/// Outcome of validating a command against the state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The command may not run now. Nothing was changed.
    Invalid,
    /// The session already rests in the command's target state.
    NoOp,
    /// A transition to the command's target is already in flight.
    AlreadyGoing,
    /// The target has been recorded; the caller performs the transition.
    Proceed(SessionState),
}

/// Result of committing a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The session was already in the committed state.
    Unchanged,
    /// The state changed, but it is a hop towards another target.
    Intermediate,
    /// The state changed and it is the requested target.
    TargetReached {
        /// State the session left.
        previous: SessionState,
    },
}

/// The four-field state record of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateRecord {
    pub current: SessionState,
    pub previous: SessionState,
    /// `None` unless a transition is in flight.
    pub pending: SessionState,
    pub target: SessionState,
}

impl StateRecord {
    /// Validates `command` for a session of `role`.
    ///
    /// Only a [`Validation::Proceed`] outcome modifies the record, by setting
    /// `target`.
    pub fn validate(&mut self, role: Role, command: Command) -> Validation {
        if command == Command::Destroy {
            self.target = S::None;
            return Validation::Proceed(S::None);
        }

        let target = command.target(role);

        if self.pending != S::None {
            if self.pending == target {
                return Validation::AlreadyGoing;
            }
            // Pausing while a start is in flight (or the reverse): the last
            // request wins.
            if command.overridable_pending() == Some(self.pending) {
                self.target = target;
                return Validation::Proceed(target);
            }
            return Validation::Invalid;
        }

        if self.current == target {
            return Validation::NoOp;
        }
        if !command.allowed_from(role, self.current) {
            return Validation::Invalid;
        }

        self.target = target;
        Validation::Proceed(target)
    }

    /// Marks `state` as in flight.
    pub fn begin(&mut self, state: SessionState) {
        self.pending = state;
    }

    /// Drops an in-flight transition that failed before completing.
    pub fn abort(&mut self) {
        self.pending = S::None;
        self.target = self.current;
    }

    /// Moves the session into `state`.
    pub fn commit(&mut self, state: SessionState) -> CommitOutcome {
        if self.pending == state {
            self.pending = S::None;
        }
        if self.current == state {
            return CommitOutcome::Unchanged;
        }

        let previous = self.current;
        self.previous = previous;
        self.current = state;

        if self.target == state {
            CommitOutcome::TargetReached { previous }
        } else {
            CommitOutcome::Intermediate
        }
    }
}
