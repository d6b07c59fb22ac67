use axum::{
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use gatebot_core::UserId;

use crate::render::{
    admin_action_for_callback, menu_choice_for_label, CALLBACK_CHECK_JOIN,
    CALLBACK_DELETE_CHANNEL_PREFIX, CALLBACK_DELETE_FOLDER_PREFIX,
};
use crate::state_machine::Event;
use crate::{constant_time_eq, AppState};

pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

impl WebhookResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Translate an update into an event, or `None` if the bot does not react to it.
pub fn event_from_update(update: &Update) -> Option<Event> {
    if let Some(query) = &update.callback_query {
        let data = query.data.as_deref()?;
        return parse_callback_data(UserId(query.from.id), data);
    }

    let message = update.message.as_ref()?;
    let from = message.from.as_ref()?;
    let text = message.text.as_deref()?;
    let user = UserId(from.id);

    if let Some(command) = text.strip_prefix('/') {
        return parse_command(user, from, command);
    }

    Some(match menu_choice_for_label(text) {
        Some(choice) => Event::MenuSelected { user, choice },
        None => Event::AdminTextSubmitted {
            user,
            text: text.to_string(),
        },
    })
}

/// `command` is the message text without its leading slash.
fn parse_command(user: UserId, from: &User, command: &str) -> Option<Event> {
    let mut parts = command.split_whitespace();
    // Group chats address commands as `/start@bot_name`.
    let name = parts.next()?.split('@').next()?;

    match name {
        "start" => Some(Event::Start {
            user,
            display_name: from.username.clone(),
            referrer_arg: parts.next().map(str::to_string),
        }),
        "admin" => Some(Event::AdminPanelRequested { user }),
        _ => {
            debug!("Ignoring unknown command /{} from {}", name, user);
            None
        }
    }
}

pub fn parse_callback_data(user: UserId, data: &str) -> Option<Event> {
    if data == CALLBACK_CHECK_JOIN {
        return Some(Event::JoinCheckRequested { user });
    }
    if let Some(action) = admin_action_for_callback(data) {
        return Some(Event::AdminActionSelected { user, action });
    }
    if let Some(index) = data.strip_prefix(CALLBACK_DELETE_CHANNEL_PREFIX) {
        return match index.parse::<usize>() {
            Ok(index) => Some(Event::DeleteChannelChosen { user, index }),
            Err(_) => {
                warn!("Malformed channel delete callback from {}: {}", user, data);
                None
            }
        };
    }
    if let Some(name) = data.strip_prefix(CALLBACK_DELETE_FOLDER_PREFIX) {
        return Some(Event::DeleteFolderChosen {
            user,
            name: name.to_string(),
        });
    }

    warn!("Unrecognized callback data from {}: {}", user, data);
    None
}

async fn verify_secret_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let provided = request
            .headers()
            .get(SECRET_TOKEN_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            warn!("Rejected webhook call with invalid secret token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(next.run(request).await)
}

pub async fn telegram_webhook_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let update: Update = serde_json::from_slice(&body).map_err(|e| {
        warn!("Failed to parse update: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    debug!("Received update {}", update.update_id);

    if let Some(query) = &update.callback_query {
        let messenger = state.messenger.clone();
        let callback_id = query.id.clone();
        tokio::spawn(async move {
            if let Err(e) = messenger.acknowledge_callback(&callback_id).await {
                debug!("Failed to acknowledge callback {}: {}", callback_id, e);
            }
        });
    }

    let Some(event) = event_from_update(&update) else {
        debug!("Ignoring update {}", update.update_id);
        return Ok(WebhookResponse::new("Update ignored"));
    };

    info!(
        "Update {} from {}: {}",
        update.update_id,
        event.user(),
        event.log_summary()
    );

    tokio::spawn(async move {
        state
            .sessions
            .process_event(&state.bot, &state.interpreter, event)
            .await;
    });

    Ok(WebhookResponse::new("Update accepted"))
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/telegram/webhook", post(telegram_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_secret_token,
        ))
}
