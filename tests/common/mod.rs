#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use hirechat::{
    app,
    auth::{tokens, TokenPair},
    config::Config,
    db,
    mail::{OutboundMail, Outbox},
    users::{self, NewUser, Role},
    AppState,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mail: mpsc::Receiver<OutboundMail>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let db_pool = db::memory_pool().await.unwrap();
        let mut config = Config::with_secrets("access-test-secret", "refresh-test-secret");
        config.bcrypt_cost = 4;
        adjust(&mut config);
        let (outbox, mail) = Outbox::channel(16);
        let state = AppState::new(db_pool, config, outbox);

        Self { router: app(state.clone()), state, mail }
    }

    pub async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = match bytes.is_empty() {
            true => Value::Null,
            false => serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        };
        (status, value)
    }

    /// A confirmed user with a fresh token pair, bypassing the signup flow.
    pub async fn user(&self, name: &str, role: Role) -> (Uuid, TokenPair) {
        let email = format!("{}@example.com", name.to_lowercase());
        let id = users::create_user(
            &self.state.db_pool,
            NewUser { name, email: &email, password_hash: "unused", role },
        )
        .await
        .unwrap();
        users::confirm_email(&self.state.db_pool, id).await.unwrap();

        (id, tokens::issue_pair(self.state.keys.as_ref(), id).unwrap())
    }

    /// Pulls the 6-digit code out of the next queued mail.
    pub async fn next_otp(&mut self) -> String {
        let mail = self.mail.recv().await.unwrap();
        mail.body
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| part.len() == 6)
            .unwrap()
            .to_owned()
    }
}
