//! Per-user conversation state.
//!
//! Sessions live only in memory. A restart forgets them, which the machines
//! handle by treating a missing session as "never started".

use gatebot_core::AdminAction;

/// Where a user is in the onboarding conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingState {
    /// Shown the join gate, waiting for "I've joined".
    AwaitingJoin,
    /// Passed the join gate.
    MainMenu,
}

/// Pending admin action for one admin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdminSessionState {
    #[default]
    Idle,
    /// The next text message from this admin is input for the action.
    AwaitingInput(AdminAction),
}

impl AdminSessionState {
    pub fn pending_action(&self) -> Option<AdminAction> {
        match self {
            AdminSessionState::Idle => None,
            AdminSessionState::AwaitingInput(action) => Some(*action),
        }
    }
}

/// Everything remembered about one user between events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// `None` until the user sends /start in this process lifetime.
    pub onboarding: Option<OnboardingState>,
    pub admin: AdminSessionState,
}
