//! Events that drive the onboarding and admin machines.
//!
//! Events are what the chat platform told us happened. The webhook layer
//! builds them from raw updates; nothing below it sees platform payloads.

use gatebot_core::{AdminAction, UserId};

/// Main menu buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Points,
    Refer,
    Withdraw,
}

/// Admin panel buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminMenuAction {
    AddChannel,
    AddFolder,
    AddAdmin,
    Broadcast,
    DeleteChannel,
    DeleteFolder,
}

impl AdminMenuAction {
    /// The input-collecting action this button starts, if any.
    ///
    /// Delete buttons answer with a picker instead of waiting for text.
    pub fn pending_action(&self) -> Option<AdminAction> {
        match self {
            AdminMenuAction::AddChannel => Some(AdminAction::AddChannel),
            AdminMenuAction::AddFolder => Some(AdminAction::AddFolder),
            AdminMenuAction::AddAdmin => Some(AdminAction::AddAdmin),
            AdminMenuAction::Broadcast => Some(AdminAction::Broadcast),
            AdminMenuAction::DeleteChannel | AdminMenuAction::DeleteFolder => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // =========================================================================
    // Onboarding
    // =========================================================================
    /// `/start`, optionally carrying a referral argument.
    Start {
        user: UserId,
        display_name: Option<String>,
        referrer_arg: Option<String>,
    },

    /// The "I've joined" button.
    JoinCheckRequested { user: UserId },

    MenuSelected { user: UserId, choice: MenuChoice },

    // =========================================================================
    // Admin
    // =========================================================================
    /// `/admin`.
    AdminPanelRequested { user: UserId },

    AdminActionSelected {
        user: UserId,
        action: AdminMenuAction,
    },

    /// Any other text message. Only meaningful while an admin action is
    /// pending for this user.
    AdminTextSubmitted { user: UserId, text: String },

    /// A channel picked from the delete picker, by list position.
    DeleteChannelChosen { user: UserId, index: usize },

    DeleteFolderChosen { user: UserId, name: String },
}

impl Event {
    /// The user who caused the event.
    pub fn user(&self) -> UserId {
        match self {
            Event::Start { user, .. }
            | Event::JoinCheckRequested { user }
            | Event::MenuSelected { user, .. }
            | Event::AdminPanelRequested { user }
            | Event::AdminActionSelected { user, .. }
            | Event::AdminTextSubmitted { user, .. }
            | Event::DeleteChannelChosen { user, .. }
            | Event::DeleteFolderChosen { user, .. } => *user,
        }
    }

    /// Whether the admin machine handles this event.
    pub fn is_admin(&self) -> bool {
        !matches!(
            self,
            Event::Start { .. } | Event::JoinCheckRequested { .. } | Event::MenuSelected { .. }
        )
    }

    /// Short description for logs. Never includes free text a user typed.
    pub fn log_summary(&self) -> String {
        match self {
            Event::Start { referrer_arg, .. } => match referrer_arg {
                Some(arg) => format!("Start(ref={})", arg),
                None => "Start".to_string(),
            },
            Event::JoinCheckRequested { .. } => "JoinCheckRequested".to_string(),
            Event::MenuSelected { choice, .. } => format!("MenuSelected({:?})", choice),
            Event::AdminPanelRequested { .. } => "AdminPanelRequested".to_string(),
            Event::AdminActionSelected { action, .. } => {
                format!("AdminActionSelected({:?})", action)
            }
            Event::AdminTextSubmitted { text, .. } => {
                format!("AdminTextSubmitted({} chars)", text.chars().count())
            }
            Event::DeleteChannelChosen { index, .. } => format!("DeleteChannelChosen({})", index),
            Event::DeleteFolderChosen { name, .. } => format!("DeleteFolderChosen({})", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing() {
        let user = UserId(1);
        assert!(!Event::JoinCheckRequested { user }.is_admin());
        assert!(Event::AdminTextSubmitted {
            user,
            text: "x".into()
        }
        .is_admin());
        assert!(Event::DeleteFolderChosen {
            user,
            name: "F".into()
        }
        .is_admin());
    }

    #[test]
    fn test_log_summary_hides_text() {
        let event = Event::AdminTextSubmitted {
            user: UserId(1),
            text: "secret|stuff".into(),
        };
        assert_eq!(event.log_summary(), "AdminTextSubmitted(12 chars)");
    }

    #[test]
    fn test_delete_buttons_do_not_wait_for_input() {
        assert_eq!(AdminMenuAction::DeleteChannel.pending_action(), None);
        assert_eq!(
            AdminMenuAction::Broadcast.pending_action(),
            Some(AdminAction::Broadcast)
        );
    }
}
