use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{ws::{Message, WebSocket}, Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{auth::{bearer_token, TokenKeys}, AppResult, AppState};

use super::{
    protocol::{ClientEvent, ServerEvent},
    session::{ChatService, Session},
};

#[derive(Deserialize)]
pub(crate) struct HandshakeQuery {
    token: Option<String>,
}

/// The access token comes from the `Authorization` header, or the `token`
/// query parameter for clients that cannot set headers on an upgrade.
fn handshake_token(headers: &HeaderMap, query_token: Option<String>) -> Option<String> {
    bearer_token(headers)
        .map(str::to_owned)
        .or_else(|| query_token.filter(|token| !token.is_empty()))
}

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    Query(HandshakeQuery { token }): Query<HandshakeQuery>,
    State(chat): State<ChatService>,
    State(keys): State<Arc<TokenKeys>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let token = handshake_token(&headers, token);

    let (tx, rx) = mpsc::unbounded_channel();
    let mut session = Session::new(chat, tx);
    let identity = session.handshake(keys.as_ref(), token.as_deref()).await?;
    tracing::info!(user_id = %identity.id, connection_id = %session.connection_id(), "chat connected");

    Ok(ws.on_upgrade(move |socket| run_socket(socket, session, rx)))
}

async fn run_socket(socket: WebSocket, mut session: Session, mut rx: mpsc::UnboundedReceiver<ServerEvent>) {
    let (mut sender, mut receiver) = socket.split();

    let mut forward_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unserializable event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        session.dispatch(event).await;
                    }
                    Err(err) => session.reply(ServerEvent::Error { message: format!("malformed event: {err}") }),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut forward_task => break,
        }
    }

    session.disconnect();
    forward_task.abort();
}
