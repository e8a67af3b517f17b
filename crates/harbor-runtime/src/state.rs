//! Per-request application lifecycle states

use harbor_core::{Error, Result};
use std::fmt;

/// State of one application instance
///
/// Normal order is `Init → BeforeRequest → HandlingRequest → AfterRequest →
/// SendingResponse → End`. Any state before `End` may jump straight to
/// `SendingResponse` (controlled early exit). `End` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Instance constructed from the request context
    Init,
    /// Pre-request hooks running
    BeforeRequest,
    /// Application dispatch running
    HandlingRequest,
    /// Post-request hooks running
    AfterRequest,
    /// Payload being flushed to the native response
    SendingResponse,
    /// Finished
    End,
}

impl LifecycleState {
    /// The state that follows in the normal order
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::BeforeRequest),
            Self::BeforeRequest => Some(Self::HandlingRequest),
            Self::HandlingRequest => Some(Self::AfterRequest),
            Self::AfterRequest => Some(Self::SendingResponse),
            Self::SendingResponse => Some(Self::End),
            Self::End => None,
        }
    }

    /// Whether `to` may follow `self`
    pub fn can_transition_to(self, to: Self) -> bool {
        if self == Self::End {
            return false;
        }
        (to == Self::SendingResponse && self != Self::SendingResponse) || self.next() == Some(to)
    }

    /// Validate a transition
    pub fn transition(self, to: Self) -> Result<Self> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(Error::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::BeforeRequest => "before_request",
            Self::HandlingRequest => "handling_request",
            Self::AfterRequest => "after_request",
            Self::SendingResponse => "sending_response",
            Self::End => "end",
        };
        f.write_str(name)
    }
}
