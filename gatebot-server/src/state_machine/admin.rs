//! Admin session transitions.
//!
//! An admin picks an action from the panel, the session moves to
//! `AwaitingInput`, and the admin's next text message is parsed as input for
//! that action. Whatever happens to that message, the session returns to
//! `Idle` afterwards.

use gatebot_core::{
    authorize, parse_admin_input, AdminCommand, AuthorizedAdmin, FolderDescriptor, UserId,
};

use super::context::{BotContext, Transition};
use super::effect::{error_effects, ConfigList, Effect, LogLevel, Reply};
use super::event::{AdminMenuAction, Event};
use super::state::AdminSessionState;
use crate::error::{BotError, BotResult, NotFoundTarget};

type AdminTransition = Transition<AdminSessionState>;

/// Handle an admin event. Onboarding events leave the state untouched.
pub async fn handle(ctx: &BotContext, state: AdminSessionState, event: &Event) -> AdminTransition {
    let user = event.user();

    // Plain text from anyone without a pending action is chat, not input.
    if let Event::AdminTextSubmitted { .. } = event {
        if state == AdminSessionState::Idle {
            return Transition::stay(state);
        }
    }
    if !event.is_admin() {
        return Transition::stay(state);
    }

    let admin = match check_admin(ctx, user).await {
        Ok(admin) => admin,
        Err(e) => {
            // A failed attempt still consumes the pending action.
            let next = match (event, &e) {
                (Event::AdminTextSubmitted { .. }, BotError::Persistence(_)) => {
                    AdminSessionState::Idle
                }
                _ => state,
            };
            return Transition::new(next, error_effects(user, &e));
        }
    };

    match event {
        Event::AdminPanelRequested { .. } => {
            Transition::new(state, vec![Effect::deliver(user, Reply::AdminPanel)])
        }

        Event::AdminActionSelected { action, .. } => match action.pending_action() {
            Some(pending) => Transition::new(
                AdminSessionState::AwaitingInput(pending),
                vec![Effect::deliver(user, Reply::InputPrompt { action: pending })],
            ),
            None => {
                let effects = match delete_picker(ctx, *action).await {
                    Ok(reply) => vec![Effect::deliver(user, reply)],
                    Err(e) => error_effects(user, &e),
                };
                Transition::new(state, effects)
            }
        },

        Event::AdminTextSubmitted { text, .. } => {
            let Some(action) = state.pending_action() else {
                return Transition::stay(state);
            };
            let effects = match parse_admin_input(action, text) {
                Ok(command) => match apply(ctx, &admin, command).await {
                    Ok(effects) => effects,
                    Err(e) => error_effects(user, &e),
                },
                Err(e) => error_effects(user, &BotError::from(e)),
            };
            Transition::new(AdminSessionState::Idle, effects)
        }

        Event::DeleteChannelChosen { index, .. } => {
            let effects = match delete_channel(ctx, &admin, *index).await {
                Ok(effects) => effects,
                Err(e) => error_effects(user, &e),
            };
            Transition::new(state, effects)
        }

        Event::DeleteFolderChosen { name, .. } => {
            let effects = match delete_folder(ctx, &admin, name).await {
                Ok(effects) => effects,
                Err(e) => error_effects(user, &e),
            };
            Transition::new(state, effects)
        }

        _ => Transition::stay(state),
    }
}

async fn check_admin(ctx: &BotContext, user: UserId) -> BotResult<AuthorizedAdmin> {
    let doc = ctx.users.load().await?;
    authorize(user, ctx.settings.root_admin, &doc).ok_or(BotError::Unauthorized)
}

async fn delete_picker(ctx: &BotContext, action: AdminMenuAction) -> BotResult<Reply> {
    let config = ctx.config.load().await?;
    let reply = match action {
        AdminMenuAction::DeleteChannel if config.channels.is_empty() => Reply::NothingToDelete {
            list: ConfigList::Channels,
        },
        AdminMenuAction::DeleteChannel => Reply::ChannelPicker {
            channels: config.channels.iter().map(|c| c.name.clone()).collect(),
        },
        AdminMenuAction::DeleteFolder if config.folders.is_empty() => Reply::NothingToDelete {
            list: ConfigList::Folders,
        },
        _ => Reply::FolderPicker {
            folders: config.folders.keys().cloned().collect(),
        },
    };
    Ok(reply)
}

async fn apply(
    ctx: &BotContext,
    admin: &AuthorizedAdmin,
    command: AdminCommand,
) -> BotResult<Vec<Effect>> {
    let user = admin.user_id();
    let effects = match command {
        AdminCommand::AddChannel(channel) => {
            let name = channel.name.clone();
            ctx.config
                .update(|config| config.channels.push(channel.clone()))
                .await?;
            vec![
                Effect::log(
                    LogLevel::Info,
                    format!("Admin {} added channel {}", user, name),
                ),
                Effect::deliver(user, Reply::ChannelAdded { name }),
            ]
        }
        AdminCommand::AddFolder { name, link } => {
            ctx.config
                .update(|config| {
                    config
                        .folders
                        .insert(name.clone(), FolderDescriptor { link: link.clone() })
                })
                .await?;
            vec![
                Effect::log(
                    LogLevel::Info,
                    format!("Admin {} saved folder {}", user, name),
                ),
                Effect::deliver(user, Reply::FolderSaved { name }),
            ]
        }
        AdminCommand::AddAdmin(id) => {
            let added = ctx.users.update(|doc| doc.admins.insert(id)).await?;
            if added {
                vec![
                    Effect::log(LogLevel::Info, format!("Admin {} granted admin to {}", user, id)),
                    Effect::deliver(user, Reply::AdminAdded { id }),
                ]
            } else {
                vec![Effect::deliver(user, Reply::AlreadyAdmin { id })]
            }
        }
        AdminCommand::Broadcast(text) => vec![Effect::Broadcast {
            requested_by: user,
            text,
        }],
    };
    Ok(effects)
}

async fn delete_channel(
    ctx: &BotContext,
    admin: &AuthorizedAdmin,
    index: usize,
) -> BotResult<Vec<Effect>> {
    let removed = ctx
        .config
        .update(|config| {
            (index < config.channels.len()).then(|| config.channels.remove(index))
        })
        .await?;

    let channel = removed.ok_or(BotError::NotFound(NotFoundTarget::Channel(index)))?;
    Ok(vec![
        Effect::log(
            LogLevel::Info,
            format!("Admin {} deleted channel {}", admin.user_id(), channel.name),
        ),
        Effect::deliver(admin.user_id(), Reply::ChannelDeleted { name: channel.name }),
    ])
}

async fn delete_folder(
    ctx: &BotContext,
    admin: &AuthorizedAdmin,
    name: &str,
) -> BotResult<Vec<Effect>> {
    let removed = ctx
        .config
        .update(|config| config.folders.remove(name))
        .await?;

    if removed.is_none() {
        return Err(BotError::NotFound(NotFoundTarget::Folder(name.to_string())));
    }
    Ok(vec![
        Effect::log(
            LogLevel::Info,
            format!("Admin {} deleted folder {}", admin.user_id(), name),
        ),
        Effect::deliver(
            admin.user_id(),
            Reply::FolderDeleted {
                name: name.to_string(),
            },
        ),
    ])
}
