//! Publish state machine
//!
//! PREPARED → VALIDATING → {VALID | INVALID}, then
//! VALID → PUBLISHING → {PUBLISHED | FAILED}.
//! A dry run goes from VALID straight to PUBLISHED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Publish state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishState {
    /// Store and requirements handed to the publisher
    Prepared,
    /// Validators are running
    Validating,
    /// No errors anywhere in the result tree
    Valid,
    /// At least one error recorded; publishing halts
    Invalid,
    /// Transfer in progress
    Publishing,
    /// Transferred (or, for a dry run, resolved)
    Published,
    /// Validation could not finish, target resolution or transfer failed
    Failed,
}

impl PublishState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishState::Invalid | PublishState::Published | PublishState::Failed)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: PublishState) -> bool {
        match (self, target) {
            (PublishState::Prepared, PublishState::Validating) => true,

            (PublishState::Validating, PublishState::Valid) => true,
            (PublishState::Validating, PublishState::Invalid) => true,
            (PublishState::Validating, PublishState::Failed) => true, // validator close failure

            (PublishState::Valid, PublishState::Publishing) => true,
            (PublishState::Valid, PublishState::Published) => true, // dry run
            (PublishState::Valid, PublishState::Failed) => true,    // target did not resolve

            (PublishState::Publishing, PublishState::Published) => true,
            (PublishState::Publishing, PublishState::Failed) => true,

            _ => false,
        }
    }
}

impl std::fmt::Display for PublishState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PublishState::Prepared => "PREPARED",
            PublishState::Validating => "VALIDATING",
            PublishState::Valid => "VALID",
            PublishState::Invalid => "INVALID",
            PublishState::Publishing => "PUBLISHING",
            PublishState::Published => "PUBLISHED",
            PublishState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One entry of a publish's state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTransition {
    pub state: PublishState,
    pub at: DateTime<Utc>,
}

/// Errors for publish state operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PublishStateError {
    #[error("invalid publish state transition from {from} to {to}")]
    InvalidTransition { from: PublishState, to: PublishState },
}
