//! Onboarding transitions: /start, the join gate and the main menu.

use futures_util::future::join_all;
use gatebot_core::eligibility::{
    mark_withdrawn, quota_reached_notification, record_referral, referral_count, register_user,
    remaining_referrals,
};
use gatebot_core::{ConfigDocument, ReferralOutcome, UserId, WithdrawOutcome};
use tracing::warn;

use super::context::{BotContext, Transition};
use super::effect::{error_effects, Effect, LogLevel, Reply};
use super::event::{Event, MenuChoice};
use super::state::OnboardingState;
use crate::error::BotError;
use crate::transport::Membership;

type OnboardingTransition = Transition<Option<OnboardingState>>;

/// Handle an onboarding event.
///
/// `state` is `None` when the user has no live session. Admin events leave
/// the state untouched.
pub async fn handle(
    ctx: &BotContext,
    state: Option<OnboardingState>,
    event: &Event,
) -> OnboardingTransition {
    match event {
        Event::Start {
            user,
            display_name,
            referrer_arg,
        } => start(ctx, state, *user, display_name.as_deref(), referrer_arg.as_deref()).await,

        Event::JoinCheckRequested { user } => check_join(ctx, state, *user).await,

        Event::MenuSelected { user, choice } => match state {
            None => Transition::new(None, vec![Effect::deliver(*user, Reply::PleaseStart)]),
            Some(OnboardingState::AwaitingJoin) => {
                let effects = match ctx.config.load().await {
                    Ok(config) => vec![Effect::deliver(*user, gate(&config, Vec::new()))],
                    Err(e) => error_effects(*user, &BotError::from(e)),
                };
                Transition::new(state, effects)
            }
            Some(OnboardingState::MainMenu) => {
                let effects = match menu(ctx, *user, *choice).await {
                    Ok(effects) => effects,
                    Err(e) => error_effects(*user, &e),
                };
                Transition::new(state, effects)
            }
        },

        _ => Transition::stay(state),
    }
}

/// What a /start did to the user document.
struct Registration {
    created: bool,
    referral: Option<ReferralAttempt>,
}

struct ReferralAttempt {
    referrer: Option<UserId>,
    outcome: ReferralOutcome,
    quota_reached: bool,
}

async fn start(
    ctx: &BotContext,
    state: Option<OnboardingState>,
    user: UserId,
    display_name: Option<&str>,
    referrer_arg: Option<&str>,
) -> OnboardingTransition {
    let registration = ctx
        .users
        .update(|doc| {
            let created = register_user(doc, user, display_name);
            // `referred_by` is write-once, so returning users can still be
            // credited the first time they arrive with a referral argument.
            let referral = referrer_arg.map(|arg| match arg.parse::<UserId>() {
                Ok(referrer) => {
                    let outcome = record_referral(doc, referrer, user);
                    ReferralAttempt {
                        referrer: Some(referrer),
                        outcome,
                        quota_reached: outcome.is_applied()
                            && quota_reached_notification(doc, referrer),
                    }
                }
                Err(_) => ReferralAttempt {
                    referrer: None,
                    outcome: ReferralOutcome::ReferrerUnknown,
                    quota_reached: false,
                },
            });
            Registration { created, referral }
        })
        .await;

    let registration = match registration {
        Ok(registration) => registration,
        Err(e) => return Transition::new(state, error_effects(user, &BotError::from(e))),
    };

    let mut effects = Vec::new();
    if registration.created {
        effects.push(Effect::log(LogLevel::Info, format!("Registered user {}", user)));
    }

    match registration.referral {
        Some(ReferralAttempt {
            referrer: Some(referrer),
            outcome: ReferralOutcome::Applied { referral_count },
            quota_reached,
        }) => {
            effects.push(Effect::log(
                LogLevel::Info,
                format!(
                    "User {} referred by {} ({} referrals)",
                    user, referrer, referral_count
                ),
            ));
            effects.push(Effect::deliver(referrer, Reply::NewReferral { referral_count }));
            if quota_reached {
                effects.push(Effect::deliver(referrer, Reply::QuotaReached));
            }
        }
        Some(attempt) => {
            effects.push(Effect::log(
                LogLevel::Debug,
                format!(
                    "Referral of {} not recorded ({:?}, referrer {:?})",
                    user, attempt.outcome, attempt.referrer
                ),
            ));
        }
        None => {}
    }

    match ctx.config.load().await {
        Ok(config) => {
            effects.push(Effect::deliver(user, gate(&config, Vec::new())));
            Transition::new(Some(OnboardingState::AwaitingJoin), effects)
        }
        Err(e) => {
            effects.extend(error_effects(user, &BotError::from(e)));
            Transition::new(state, effects)
        }
    }
}

async fn check_join(
    ctx: &BotContext,
    state: Option<OnboardingState>,
    user: UserId,
) -> OnboardingTransition {
    let config = match ctx.config.load().await {
        Ok(config) => config,
        Err(e) => return Transition::new(state, error_effects(user, &BotError::from(e))),
    };

    let answers = join_all(
        config
            .channels
            .iter()
            .map(|channel| ctx.oracle.is_member(&channel.external_chat_id, user)),
    )
    .await;

    let mut missing = Vec::new();
    for (channel, answer) in config.channels.iter().zip(answers) {
        match answer {
            Ok(Membership::Joined) => {}
            Ok(Membership::NotJoined) => missing.push(channel.name.clone()),
            Ok(Membership::Unknown) => {
                warn!(
                    "Membership of {} in {} is unknown; treating as not joined",
                    user, channel.external_chat_id
                );
                missing.push(channel.name.clone());
            }
            Err(e) => {
                warn!(
                    "Membership check of {} in {} failed: {}; treating as not joined",
                    user, channel.external_chat_id, e
                );
                missing.push(channel.name.clone());
            }
        }
    }

    if missing.is_empty() {
        Transition::new(
            Some(OnboardingState::MainMenu),
            vec![Effect::deliver(user, Reply::MainMenu)],
        )
    } else {
        Transition::new(
            Some(OnboardingState::AwaitingJoin),
            vec![Effect::deliver(user, gate(&config, missing))],
        )
    }
}

async fn menu(ctx: &BotContext, user: UserId, choice: MenuChoice) -> Result<Vec<Effect>, BotError> {
    let mut effects = Vec::new();
    let reply = match choice {
        MenuChoice::Points => {
            let doc = ctx.users.load().await?;
            if !doc.contains(user) {
                Reply::PleaseStart
            } else {
                Reply::ReferralStatus {
                    count: referral_count(&doc, user),
                    remaining: remaining_referrals(&doc, user),
                }
            }
        }
        MenuChoice::Refer => {
            let doc = ctx.users.load().await?;
            if !doc.contains(user) {
                Reply::PleaseStart
            } else {
                Reply::ReferralLink {
                    link: ctx.settings.referral_link(user),
                }
            }
        }
        MenuChoice::Withdraw => {
            let outcome = ctx.users.update(|doc| mark_withdrawn(doc, user)).await?;
            if outcome == WithdrawOutcome::Unlocked {
                effects.push(Effect::log(LogLevel::Info, format!("Reward unlocked for {}", user)));
            }
            match outcome {
                WithdrawOutcome::Unlocked | WithdrawOutcome::AlreadyUnlocked => Reply::Reward {
                    link: ctx.settings.reward_link.clone(),
                    first_unlock: outcome == WithdrawOutcome::Unlocked,
                },
                WithdrawOutcome::NotEligible { remaining } => Reply::NotEligible { remaining },
                WithdrawOutcome::UnknownUser => Reply::PleaseStart,
            }
        }
    };

    effects.push(Effect::deliver(user, reply));
    Ok(effects)
}

fn gate(config: &ConfigDocument, missing: Vec<String>) -> Reply {
    Reply::ChannelGate {
        channels: config.channels.clone(),
        folders: config
            .folders
            .iter()
            .map(|(name, folder)| (name.clone(), folder.link.clone()))
            .collect(),
        missing,
    }
}
