//! Rendering of typed replies into chat messages.
//!
//! Button labels and callback payloads defined here are also what the webhook
//! parses incoming updates against, so both directions stay in sync.

use gatebot_core::{ValidationError, REFERRAL_QUOTA};

use crate::state_machine::effect::{ConfigList, Reply};
use crate::state_machine::event::{AdminMenuAction, MenuChoice};

pub const MENU_POINTS: &str = "📊 My Points";
pub const MENU_REFER: &str = "🔗 Refer Friends";
pub const MENU_WITHDRAW: &str = "💰 Withdraw Reward";

pub const CALLBACK_CHECK_JOIN: &str = "check_join";
pub const CALLBACK_DELETE_CHANNEL_PREFIX: &str = "del_channel_";
pub const CALLBACK_DELETE_FOLDER_PREFIX: &str = "del_folder_";

const ADMIN_BUTTONS: [(AdminMenuAction, &str, &str); 6] = [
    (AdminMenuAction::AddChannel, "Add Channel", "admin_add_channel"),
    (AdminMenuAction::DeleteChannel, "Delete Channel", "admin_delete_channel"),
    (AdminMenuAction::AddFolder, "Add Folder", "admin_add_folder"),
    (AdminMenuAction::DeleteFolder, "Delete Folder", "admin_delete_folder"),
    (AdminMenuAction::AddAdmin, "Add Admin", "admin_add_admin"),
    (AdminMenuAction::Broadcast, "Broadcast", "admin_broadcast"),
];

pub fn menu_choice_for_label(text: &str) -> Option<MenuChoice> {
    match text.trim() {
        MENU_POINTS => Some(MenuChoice::Points),
        MENU_REFER => Some(MenuChoice::Refer),
        MENU_WITHDRAW => Some(MenuChoice::Withdraw),
        _ => None,
    }
}

pub fn admin_action_for_callback(data: &str) -> Option<AdminMenuAction> {
    ADMIN_BUTTONS
        .iter()
        .find(|(_, _, callback)| *callback == data)
        .map(|(action, _, _)| *action)
}

/// A button under a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineButton {
    Url { text: String, url: String },
    Callback { text: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    None,
    Inline(Vec<Vec<InlineButton>>),
    /// Persistent reply keyboard replacing the user's text keyboard.
    Menu(Vec<Vec<String>>),
}

/// A message ready to hand to the chat API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    /// Whether `text` is Markdown. Only set for text that contains nothing a
    /// user or admin typed.
    pub markdown: bool,
    pub keyboard: Keyboard,
}

impl OutgoingMessage {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
            keyboard: Keyboard::None,
        }
    }

    fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
            keyboard: Keyboard::None,
        }
    }

    fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

fn callback(text: impl Into<String>, data: impl Into<String>) -> InlineButton {
    InlineButton::Callback {
        text: text.into(),
        data: data.into(),
    }
}

pub fn render(reply: &Reply) -> OutgoingMessage {
    match reply {
        Reply::ChannelGate {
            channels,
            folders,
            missing,
        } => {
            let mut rows: Vec<Vec<InlineButton>> = channels
                .iter()
                .map(|c| {
                    vec![InlineButton::Url {
                        text: format!("🔗 {}", c.name),
                        url: c.link.clone(),
                    }]
                })
                .collect();
            rows.extend(folders.iter().map(|(name, link)| {
                vec![InlineButton::Url {
                    text: format!("📁 {}", name),
                    url: link.clone(),
                }]
            }));
            rows.push(vec![callback("✅ I've Joined All Channels", CALLBACK_CHECK_JOIN)]);

            let message = if missing.is_empty() {
                OutgoingMessage::markdown(
                    "🔥 *Welcome!* 🔥\n\n\
                     Complete a few simple steps to unlock your reward.\n\n\
                     🚀 First, join all our required channels to continue.",
                )
            } else {
                let list: Vec<String> = missing.iter().map(|name| format!("- {}", name)).collect();
                OutgoingMessage::plain(format!(
                    "🔍 You haven't joined all required channels yet!\n\n\
                     Please join these channels:\n{}\n\n\
                     Then click the 'I've Joined All Channels' button again.",
                    list.join("\n")
                ))
            };
            message.with_keyboard(Keyboard::Inline(rows))
        }

        Reply::MainMenu => OutgoingMessage::markdown(format!(
            "⭐ *How to get your reward* ⭐\n\n\
             ✅ You've joined all required channels!\n\n\
             1️⃣ Refer {quota} friends to this bot using your referral link\n\
             2️⃣ Once you have {quota} referrals, tap 'Withdraw Reward'\n\
             3️⃣ You'll get access to the reward\n\n\
             🔥 Get started by tapping 'Refer Friends' below!",
            quota = REFERRAL_QUOTA
        ))
        .with_keyboard(Keyboard::Menu(vec![
            vec![MENU_POINTS.to_string(), MENU_REFER.to_string()],
            vec![MENU_WITHDRAW.to_string()],
        ])),

        Reply::PleaseStart => OutgoingMessage::plain("Please start the bot first by sending /start"),

        Reply::ReferralStatus { count, remaining } => OutgoingMessage::markdown(format!(
            "📊 *Your Referral Status* 📊\n\n\
             👤 You have referred: {} users\n\
             🔍 Remaining referrals needed: {}\n\n\
             ⭐ Refer {} friends to get the reward!",
            count, remaining, REFERRAL_QUOTA
        )),

        Reply::ReferralLink { link } => OutgoingMessage::plain(format!(
            "🔗 Your Referral Link 🔗\n\n{}\n\n\
             🚀 Share this link with your friends!\n\
             🎁 When {} friends join using your link, you unlock the reward!",
            link, REFERRAL_QUOTA
        )),

        Reply::Reward {
            link,
            first_unlock: true,
        } => OutgoingMessage::plain(format!(
            "🎁 Congratulations! 🎁\n\n\
             ✅ You've completed the requirements!\n\n\
             💎 Access your reward here:\n🔗 {}",
            link
        )),

        Reply::Reward {
            link,
            first_unlock: false,
        } => OutgoingMessage::plain(format!(
            "✅ You've already unlocked your reward!\n\n🔗 Access it here:\n{}",
            link
        )),

        Reply::NotEligible { remaining } => OutgoingMessage::plain(format!(
            "🔍 You need to refer {} more friends before you can withdraw your reward!\n\n\
             🔗 Use the 'Refer Friends' button to get your referral link.",
            remaining
        )),

        Reply::NewReferral { referral_count } => OutgoingMessage::plain(format!(
            "⭐ Great news! A new user has joined using your referral link! ({}/{})",
            (*referral_count).min(REFERRAL_QUOTA),
            REFERRAL_QUOTA
        )),

        Reply::QuotaReached => OutgoingMessage::plain(format!(
            "🎁 Congratulations! You've referred {} friends! You can now withdraw your reward.",
            REFERRAL_QUOTA
        )),

        Reply::PermissionDenied => {
            OutgoingMessage::plain("You don't have permission to use admin commands.")
        }

        Reply::AdminPanel => {
            let rows: Vec<Vec<InlineButton>> = ADMIN_BUTTONS
                .chunks(2)
                .map(|pair| {
                    pair.iter()
                        .map(|(_, label, data)| callback(*label, *data))
                        .collect()
                })
                .collect();
            OutgoingMessage::markdown("⭐ *Admin Panel* ⭐\n\nSelect an action below:")
                .with_keyboard(Keyboard::Inline(rows))
        }

        Reply::InputPrompt { action } => OutgoingMessage::plain(format!(
            "Please send the {} input in this format:\n{}\n\nExample: {}",
            action,
            action.format_hint(),
            action.example()
        )),

        Reply::ChannelPicker { channels } => {
            let rows: Vec<Vec<InlineButton>> = channels
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    vec![callback(
                        name.clone(),
                        format!("{}{}", CALLBACK_DELETE_CHANNEL_PREFIX, i),
                    )]
                })
                .collect();
            OutgoingMessage::plain("Select a channel to delete:")
                .with_keyboard(Keyboard::Inline(rows))
        }

        Reply::FolderPicker { folders } => {
            let rows: Vec<Vec<InlineButton>> = folders
                .iter()
                .map(|name| {
                    vec![callback(
                        name.clone(),
                        format!("{}{}", CALLBACK_DELETE_FOLDER_PREFIX, name),
                    )]
                })
                .collect();
            OutgoingMessage::plain("Select a folder to delete:")
                .with_keyboard(Keyboard::Inline(rows))
        }

        Reply::NothingToDelete {
            list: ConfigList::Channels,
        } => OutgoingMessage::plain("No channels found."),
        Reply::NothingToDelete {
            list: ConfigList::Folders,
        } => OutgoingMessage::plain("No folders found."),

        Reply::ChannelAdded { name } => {
            OutgoingMessage::plain(format!("Channel '{}' added successfully!", name))
        }
        Reply::FolderSaved { name } => {
            OutgoingMessage::plain(format!("Folder '{}' saved successfully!", name))
        }
        Reply::AdminAdded { id } => {
            OutgoingMessage::plain(format!("Admin added successfully with ID: {}", id))
        }
        Reply::AlreadyAdmin { id } => OutgoingMessage::plain(format!("{} is already an admin.", id)),
        Reply::ChannelDeleted { name } => {
            OutgoingMessage::plain(format!("Channel '{}' has been deleted.", name))
        }
        Reply::FolderDeleted { name } => {
            OutgoingMessage::plain(format!("Folder '{}' has been deleted.", name))
        }

        Reply::InvalidInput { error } => OutgoingMessage::plain(invalid_input_text(error)),

        Reply::NotFound { target } => OutgoingMessage::plain(format!(
            "The {} no longer exists. Open the picker again to see the current list.",
            target
        )),

        // Admin text goes out verbatim; Markdown would mangle or reject it.
        Reply::Announcement { text } => OutgoingMessage::plain(format!("📣 ANNOUNCEMENT 📣\n\n{}", text)),

        Reply::BroadcastStarted { recipients } => OutgoingMessage::plain(format!(
            "Broadcasting message to {} users...",
            recipients
        )),

        Reply::BroadcastFinished { report } => {
            let mut text = format!(
                "Broadcast completed!\n✅ Successfully sent: {}\n❌ Failed: {}",
                report.succeeded, report.failed
            );
            if report.cancelled > 0 {
                text.push_str(&format!("\n⏹ Cancelled: {}", report.cancelled));
            }
            OutgoingMessage::plain(text)
        }

        Reply::TemporaryFailure => OutgoingMessage::plain(
            "Something went wrong on our side and nothing was changed. Please try again.",
        ),
    }
}

fn invalid_input_text(error: &ValidationError) -> String {
    format!("Invalid input: {}", error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastReport;
    use crate::error::NotFoundTarget;
    use gatebot_core::{AdminAction, ChannelDescriptor};

    #[test]
    fn test_menu_labels_round_trip() {
        for choice in [MenuChoice::Points, MenuChoice::Refer, MenuChoice::Withdraw] {
            let Keyboard::Menu(rows) = render(&Reply::MainMenu).keyboard else {
                panic!("main menu has a reply keyboard");
            };
            let found = rows
                .iter()
                .flatten()
                .filter_map(|label| menu_choice_for_label(label))
                .any(|c| c == choice);
            assert!(found, "{:?} has no button", choice);
        }
        assert_eq!(menu_choice_for_label("hello"), None);
    }

    #[test]
    fn test_admin_panel_callbacks_parse_back() {
        let Keyboard::Inline(rows) = render(&Reply::AdminPanel).keyboard else {
            panic!("admin panel has inline buttons");
        };
        let actions: Vec<AdminMenuAction> = rows
            .iter()
            .flatten()
            .filter_map(|button| match button {
                InlineButton::Callback { data, .. } => admin_action_for_callback(data),
                InlineButton::Url { .. } => None,
            })
            .collect();
        assert_eq!(actions.len(), 6);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_gate_has_join_buttons_and_check() {
        let message = render(&Reply::ChannelGate {
            channels: vec![ChannelDescriptor {
                name: "Chan".into(),
                link: "https://t.me/chan".into(),
                external_chat_id: "-1".into(),
            }],
            folders: vec![("F".into(), "https://t.me/addlist/f".into())],
            missing: Vec::new(),
        });
        let Keyboard::Inline(rows) = message.keyboard else {
            panic!("gate has inline buttons");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[2],
            vec![InlineButton::Callback {
                text: "✅ I've Joined All Channels".into(),
                data: CALLBACK_CHECK_JOIN.into(),
            }]
        );
    }

    #[test]
    fn test_missing_channels_listed_without_markdown() {
        let message = render(&Reply::ChannelGate {
            channels: Vec::new(),
            folders: Vec::new(),
            missing: vec!["My_Chan".into()],
        });
        assert!(!message.markdown);
        assert!(message.text.contains("- My_Chan"));
    }

    #[test]
    fn test_announcement_is_plain_text() {
        let message = render(&Reply::Announcement {
            text: "*not bold* _x_".into(),
        });
        assert!(!message.markdown);
        assert!(message.text.ends_with("*not bold* _x_"));
    }

    #[test]
    fn test_channel_picker_uses_positions() {
        let Keyboard::Inline(rows) = render(&Reply::ChannelPicker {
            channels: vec!["A".into(), "B".into()],
        })
        .keyboard
        else {
            panic!("picker has buttons");
        };
        assert_eq!(
            rows[1][0],
            InlineButton::Callback {
                text: "B".into(),
                data: "del_channel_1".into()
            }
        );
    }

    #[test]
    fn test_texts() {
        assert!(render(&Reply::InputPrompt {
            action: AdminAction::AddChannel
        })
        .text
        .contains("name|link|channel_id"));
        assert!(render(&Reply::NotFound {
            target: NotFoundTarget::Folder("F1".into())
        })
        .text
        .contains("folder 'F1'"));
        let report = render(&Reply::BroadcastFinished {
            report: BroadcastReport {
                succeeded: 3,
                failed: 2,
                cancelled: 0,
            },
        });
        assert!(report.text.contains("Successfully sent: 3"));
        assert!(report.text.contains("Failed: 2"));
        assert!(!report.text.contains("Cancelled"));
    }
}
