//! Admin input parsing and authorization

use std::fmt;

use thiserror::Error;

use crate::model::{ChannelDescriptor, UserDocument, UserId};

/// An admin action that waits for one text message of structured input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminAction {
    AddChannel,
    AddFolder,
    AddAdmin,
    Broadcast,
}

impl AdminAction {
    /// The input format shown to the admin when the action is selected.
    pub fn format_hint(&self) -> &'static str {
        match self {
            AdminAction::AddChannel => "name|link|channel_id",
            AdminAction::AddFolder => "folder_name|folder_link",
            AdminAction::AddAdmin => "user_id",
            AdminAction::Broadcast => "any text",
        }
    }

    /// A filled-in example of [`format_hint`](Self::format_hint).
    pub fn example(&self) -> &'static str {
        match self {
            AdminAction::AddChannel => "My Channel|https://t.me/mychannel|-1001234567890",
            AdminAction::AddFolder => "My Folder|https://t.me/addlist/abcde",
            AdminAction::AddAdmin => "123456789",
            AdminAction::Broadcast => "New giveaway starts tomorrow!",
        }
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminAction::AddChannel => write!(f, "add-channel"),
            AdminAction::AddFolder => write!(f, "add-folder"),
            AdminAction::AddAdmin => write!(f, "add-admin"),
            AdminAction::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// A fully validated admin command, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    AddChannel(ChannelDescriptor),
    AddFolder { name: String, link: String },
    AddAdmin(UserId),
    Broadcast(String),
}

/// Malformed admin input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("expected {expected} field(s) separated by '|' but found {found}; use: {format}")]
    WrongFieldCount {
        expected: usize,
        found: usize,
        format: &'static str,
    },
    #[error("field '{field}' must not be empty; use: {format}")]
    EmptyField {
        field: &'static str,
        format: &'static str,
    },
    #[error("'{input}' is not a numeric user id")]
    InvalidUserId { input: String },
    #[error("broadcast message must not be empty")]
    EmptyMessage,
}

/// Parse the text an admin submitted for a pending `action`.
///
/// Pipe-delimited formats are split on every `|` after trimming the whole
/// message, and each field is trimmed again. The field count must match
/// exactly: a link containing `|` is rejected rather than silently truncated.
/// Broadcast text is passed through verbatim.
pub fn parse_admin_input(action: AdminAction, text: &str) -> Result<AdminCommand, ValidationError> {
    match action {
        AdminAction::AddChannel => {
            let [name, link, id] = split_fields::<3>(text, action, ["name", "link", "channel_id"])?;
            Ok(AdminCommand::AddChannel(ChannelDescriptor {
                name,
                link,
                external_chat_id: id,
            }))
        }
        AdminAction::AddFolder => {
            let [name, link] = split_fields::<2>(text, action, ["folder_name", "folder_link"])?;
            Ok(AdminCommand::AddFolder { name, link })
        }
        AdminAction::AddAdmin => {
            let [token] = split_fields::<1>(text, action, ["user_id"])?;
            token
                .parse::<UserId>()
                .map(AdminCommand::AddAdmin)
                .map_err(|_| ValidationError::InvalidUserId { input: token })
        }
        AdminAction::Broadcast => {
            if text.trim().is_empty() {
                Err(ValidationError::EmptyMessage)
            } else {
                Ok(AdminCommand::Broadcast(text.to_string()))
            }
        }
    }
}

fn split_fields<const N: usize>(
    text: &str,
    action: AdminAction,
    names: [&'static str; N],
) -> Result<[String; N], ValidationError> {
    let format = action.format_hint();
    let parts: Vec<&str> = text.trim().split('|').collect();
    if parts.len() != N {
        return Err(ValidationError::WrongFieldCount {
            expected: N,
            found: parts.len(),
            format,
        });
    }

    let mut fields: [String; N] = std::array::from_fn(|_| String::new());
    for (i, part) in parts.iter().enumerate() {
        let value = part.trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyField {
                field: names[i],
                format,
            });
        }
        fields[i] = value.to_string();
    }
    Ok(fields)
}

/// Proof that a caller passed the admin check.
///
/// This type can only be constructed via [`authorize`], so any function that
/// takes one cannot be reached by an unauthorized caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizedAdmin {
    user_id: UserId,
}

impl AuthorizedAdmin {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Check `caller` against the root admin and the delegated admin set.
pub fn authorize(caller: UserId, root_admin: UserId, doc: &UserDocument) -> Option<AuthorizedAdmin> {
    if caller == root_admin || doc.admins.contains(&caller) {
        Some(AuthorizedAdmin { user_id: caller })
    } else {
        None
    }
}
