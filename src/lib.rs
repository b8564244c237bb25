pub mod appresult;
pub mod auth;
pub mod chat;
pub mod companies;
pub mod config;
pub mod db;
pub mod mail;
pub mod users;

use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};

use crate::{auth::TokenKeys, chat::{ChatService, Registry}, config::Config, mail::Outbox};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<Config>,
    pub keys: Arc<TokenKeys>,
    pub outbox: Outbox,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config, outbox: Outbox) -> Self {
        let chat = ChatService::new(db_pool.clone(), Registry::new(), config.chat_deletion_delay);
        Self {
            keys: Arc::new(TokenKeys::from_config(&config)),
            config: Arc::new(config),
            db_pool,
            outbox,
            chat,
        }
    }
}

async fn mail_health(State(outbox): State<Outbox>) -> Json<Value> {
    let stats = outbox.stats();
    Json(json!({ "delivered": stats.delivered(), "failed": stats.failed() }))
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/health/mail", get(mail_health))
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/chat", chat::router())
        .merge(companies::router())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
