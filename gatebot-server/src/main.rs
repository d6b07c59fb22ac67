use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};

use gatebot_server::broadcast::BroadcastDispatcher;
use gatebot_server::config::Config;
use gatebot_server::repository::{DocumentRepository, SqliteRepository};
use gatebot_server::status::{check_bearer, StatusData};
use gatebot_server::telegram::TelegramClient;
use gatebot_server::webhook::webhook_router;
use gatebot_server::{
    AppState, BotContext, BotSettings, DocumentStore, Interpreter, SessionStore,
};

async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "gatebot",
        "version": gatebot_server::get_bot_version()
    })))
}

async fn status_handler(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    if let Err(status) = check_bearer(&headers, state.status_auth_token.as_deref()) {
        return status.into_response();
    }

    let users = state.bot.users.load().await;
    let config = state.bot.config.load().await;
    match (users, config) {
        (Ok(users), Ok(config)) => {
            let version = gatebot_server::get_bot_version();
            Json(StatusData::from_documents(&users, &config, version)).into_response()
        }
        (Err(e), _) | (_, Err(e)) => {
            error!("Failed to load documents for status: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, serve until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting gatebot");

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let telegram = TelegramClient::new(&config.bot_token, config.delivery_timeout)?;
    let bot_username = match config.bot_username.clone() {
        Some(name) => name,
        None => telegram
            .get_me()
            .await?
            .username
            .context("Bot account has no username; set BOT_USERNAME")?,
    };
    info!("Referral links will use @{}", bot_username);

    let db_path = config.state_dir.join("gatebot-state.db");
    info!("Using state database: {}", db_path.display());
    let repo: Arc<dyn DocumentRepository> = Arc::new(
        SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?,
    );

    let telegram = Arc::new(telegram);
    let users = DocumentStore::new(repo.clone());
    let bot = BotContext {
        users: users.clone(),
        config: DocumentStore::new(repo),
        oracle: telegram.clone(),
        settings: BotSettings {
            root_admin: config.root_admin,
            reward_link: config.reward_link.clone(),
            bot_username,
        },
    };

    // Fail fast on an unreadable database rather than on the first update.
    let known_users = bot
        .users
        .load()
        .await
        .context("Failed to load user document")?;
    bot.config
        .load()
        .await
        .context("Failed to load config document")?;
    info!("Loaded {} users", known_users.users.len());

    let dispatcher = BroadcastDispatcher::new(
        telegram.clone(),
        config.broadcast_concurrency,
        config.delivery_timeout,
    );

    if config.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET is not set; webhook calls are not authenticated");
    }

    let app_state = Arc::new(AppState {
        bot,
        sessions: SessionStore::new(),
        interpreter: Interpreter::new(telegram.clone(), dispatcher, users),
        messenger: telegram,
        webhook_secret: config.webhook_secret.clone(),
        status_auth_token: config.status_auth_token.clone(),
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status_handler))
        .merge(webhook_router(app_state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state.clone());

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.interpreter.cancel_broadcasts();
    for report in app_state.interpreter.wait_for_broadcasts().await {
        info!(
            "Broadcast stopped at shutdown: {} delivered, {} failed, {} cancelled",
            report.succeeded, report.failed, report.cancelled
        );
    }

    info!("Shutdown complete");
    Ok(())
}
