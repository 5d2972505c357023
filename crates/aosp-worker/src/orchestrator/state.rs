//! Build state machine
//!
//! START → SYNC → OVERLAY → COMPILE → COLLECT → SUCCEEDED, with the terminal
//! branches SYNC → SYNC_FAILED, COMPILE → BUILD_FAILED, COLLECT → NO_OUTPUT.

use serde::{Deserialize, Serialize};
use std::fmt;

use aosp_protocol::ops::Phase;

/// Build state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    Start,
    Sync,
    Overlay,
    Compile,
    Collect,
    Succeeded,
    SyncFailed,
    BuildFailed,
    NoOutput,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildState::Succeeded
                | BuildState::SyncFailed
                | BuildState::BuildFailed
                | BuildState::NoOutput
        )
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: BuildState) -> bool {
        match (self, target) {
            (BuildState::Start, BuildState::Sync) => true,

            (BuildState::Sync, BuildState::Overlay) => true,
            (BuildState::Sync, BuildState::SyncFailed) => true,

            // overlay problems degrade the build, they never end it
            (BuildState::Overlay, BuildState::Compile) => true,

            (BuildState::Compile, BuildState::Collect) => true,
            (BuildState::Compile, BuildState::BuildFailed) => true,

            (BuildState::Collect, BuildState::Succeeded) => true,
            (BuildState::Collect, BuildState::NoOutput) => true,

            _ => false,
        }
    }

    /// The phase running while in this state, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BuildState::Sync => Some(Phase::Sync),
            BuildState::Overlay => Some(Phase::Overlay),
            BuildState::Compile => Some(Phase::Compile),
            BuildState::Collect => Some(Phase::Collect),
            _ => None,
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Start => "START",
            BuildState::Sync => "SYNC",
            BuildState::Overlay => "OVERLAY",
            BuildState::Compile => "COMPILE",
            BuildState::Collect => "COLLECT",
            BuildState::Succeeded => "SUCCEEDED",
            BuildState::SyncFailed => "SYNC_FAILED",
            BuildState::BuildFailed => "BUILD_FAILED",
            BuildState::NoOutput => "NO_OUTPUT",
        };
        f.write_str(name)
    }
}

/// Errors for build state operations
#[derive(Debug, thiserror::Error)]
pub enum BuildStateError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: BuildState, to: BuildState },
}

/// Tracks the current state and every state visited.
#[derive(Debug, Clone)]
pub struct BuildMachine {
    state: BuildState,
    history: Vec<BuildState>,
}

impl Default for BuildMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildMachine {
    pub fn new() -> Self {
        Self {
            state: BuildState::Start,
            history: vec![BuildState::Start],
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    /// Transition to a new state
    pub fn transition(&mut self, next: BuildState) -> Result<(), BuildStateError> {
        if !self.state.can_transition_to(next) {
            return Err(BuildStateError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "build state transition");
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}
