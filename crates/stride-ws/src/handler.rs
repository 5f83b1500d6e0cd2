use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::OnceLock;
use stride_core::{auth, messaging, notify, AppState};
use stride_models::gateway::*;
use stride_models::user::Identity;
use tokio::time::Duration;

use crate::registry::{ConnectionGuard, ConnectionRegistry};
use crate::session::Session;

const AUTH_TIMEOUT: Duration = Duration::from_secs(30);
const WS_PING_INTERVAL: Duration = Duration::from_secs(20);
const MAX_EVENTS_PER_MINUTE_DEFAULT: u32 = 240;

static EVENT_RATE_LIMITER: OnceLock<DefaultKeyedRateLimiter<i64>> = OnceLock::new();

fn event_rate_limiter() -> &'static DefaultKeyedRateLimiter<i64> {
    EVENT_RATE_LIMITER.get_or_init(|| {
        let per_minute = std::env::var("STRIDE_WS_MAX_EVENTS_PER_MINUTE")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(MAX_EVENTS_PER_MINUTE_DEFAULT);
        RateLimiter::keyed(Quota::per_minute(NonZeroU32::new(per_minute).unwrap()))
    })
}

#[derive(Deserialize)]
struct AuthData {
    token: String,
}

#[derive(Deserialize)]
struct SendMessageData {
    thread_id: i64,
    #[serde(flatten)]
    message: messaging::SendMessage,
}

#[derive(Deserialize)]
struct ThreadReadData {
    thread_id: i64,
    last_message_id: Option<i64>,
}

fn default_read() -> bool {
    true
}

#[derive(Deserialize)]
struct NotificationReadData {
    ids: Vec<i64>,
    #[serde(default = "default_read")]
    read: bool,
}

async fn send_frame(
    sender: &mut (impl SinkExt<Message> + Unpin),
    frame: &GatewayFrame,
) -> Result<(), ()> {
    let payload = serde_json::to_string(frame).map_err(|_| ())?;
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_close(sender: &mut (impl SinkExt<Message> + Unpin), code: u16, reason: &str) {
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await;
}

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let mut guard = ConnectionGuard::new(ConnectionRegistry::shared());
    let (mut sender, mut receiver) = socket.split();

    if !guard.acquire_global() {
        send_close(&mut sender, 1013, "gateway is at connection capacity").await;
        return;
    }

    // Nothing flows until the first frame authenticates.
    let (identity, auth_frame_id) =
        match tokio::time::timeout(AUTH_TIMEOUT, wait_for_auth(&mut receiver, &state)).await {
            Ok(Ok(result)) => result,
            Ok(Err(reason)) => {
                let _ = send_frame(
                    &mut sender,
                    &GatewayFrame::event(EVENT_AUTH_ERROR, json!({ "reason": reason })),
                )
                .await;
                send_close(&mut sender, 1008, &reason).await;
                return;
            }
            Err(_) => {
                let _ = send_frame(
                    &mut sender,
                    &GatewayFrame::event(
                        EVENT_AUTH_ERROR,
                        json!({ "reason": "authentication timed out" }),
                    ),
                )
                .await;
                send_close(&mut sender, 1008, "authentication timed out").await;
                return;
            }
        };

    if !guard.acquire_user(identity.id) {
        let _ = send_frame(
            &mut sender,
            &GatewayFrame::event(
                EVENT_AUTH_ERROR,
                json!({ "reason": "too many concurrent sessions" }),
            ),
        )
        .await;
        send_close(&mut sender, 1008, "too many concurrent sessions").await;
        return;
    }

    let session = Session::new(identity);
    if send_frame(
        &mut sender,
        &GatewayFrame::ack(
            CLIENT_AUTH,
            auth_frame_id,
            json!({ "status": "ok", "user_id": session.user_id() }),
        ),
    )
    .await
    .is_err()
    {
        return;
    }
    tracing::info!(
        user_id = session.user_id(),
        connection_id = %session.connection_id,
        "gateway session established"
    );

    run_session(sender, receiver, session, state, &mut guard).await;
}

async fn wait_for_auth(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    state: &AppState,
) -> Result<(Identity, Option<u64>), String> {
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        let frame: GatewayFrame =
            serde_json::from_str(&text).map_err(|_| "malformed frame".to_string())?;
        if frame.event != CLIENT_AUTH {
            return Err(format!("expected '{CLIENT_AUTH}' as the first frame"));
        }
        let data: AuthData = frame
            .data
            .and_then(|d| serde_json::from_value(d).ok())
            .ok_or_else(|| "auth frame is missing a token".to_string())?;
        return auth::verify_token(&data.token, &state.config.jwt_secret)
            .map(|identity| (identity, frame.id))
            .map_err(|_| "invalid or expired token".to_string());
    }
    Err("connection closed before authentication".to_string())
}

enum Flow {
    Continue,
    Close,
}

async fn run_session(
    mut sender: impl SinkExt<Message> + Unpin,
    mut receiver: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
    mut session: Session,
    state: AppState,
    guard: &mut ConnectionGuard,
) {
    let mut events = state.event_bus.subscribe();
    let limiter = event_rate_limiter();
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let frame: GatewayFrame = match serde_json::from_str(&text) {
                            Ok(frame) => frame,
                            Err(_) => {
                                let _ = send_frame(
                                    &mut sender,
                                    &GatewayFrame::event("error", json!({ "reason": "malformed frame" })),
                                )
                                .await;
                                continue;
                            }
                        };
                        // Liveness pings are never rate limited.
                        if frame.event != CLIENT_PING {
                            if let Err(not_until) = limiter.check_key(&session.user_id()) {
                                let retry_after_ms = not_until
                                    .wait_time_from(DefaultClock::default().now())
                                    .as_millis()
                                    .max(1) as u64;
                                let _ = send_frame(
                                    &mut sender,
                                    &GatewayFrame::ack(&frame.event, frame.id, json!({
                                        "status": "error",
                                        "reason": "rate limited",
                                        "retry_after_ms": retry_after_ms,
                                    })),
                                )
                                .await;
                                continue;
                            }
                        }
                        match handle_client_frame(frame, &mut sender, &mut session, &state, guard).await {
                            Flow::Continue => {}
                            Flow::Close => break "session closed by protocol".to_string(),
                        }
                    }
                    Some(Ok(Message::Close(_))) => break "client close frame".to_string(),
                    Some(Err(err)) => break format!("websocket receive error: {err}"),
                    None => break "websocket stream ended".to_string(),
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !session.should_receive(&event) {
                            continue;
                        }
                        let frame = GatewayFrame::event(&event.event, event.payload);
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break "websocket send error".to_string();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            user_id = session.user_id(),
                            skipped,
                            "event stream lagged, forcing reconnect"
                        );
                        send_close(&mut sender, 1013, "gateway fell behind; reconnect required").await;
                        break format!("event stream lagged by {skipped} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break "event stream closed".to_string();
                    }
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break "websocket ping send error".to_string();
                }
            }
        }
    };

    tracing::info!(
        user_id = session.user_id(),
        connection_id = %session.connection_id,
        reason,
        "gateway session closed"
    );
}

async fn handle_client_frame(
    frame: GatewayFrame,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
    guard: &mut ConnectionGuard,
) -> Flow {
    match frame.event.as_str() {
        CLIENT_PING => {
            let _ = send_frame(
                sender,
                &GatewayFrame {
                    event: "pong".to_string(),
                    data: None,
                    id: frame.id,
                },
            )
            .await;
            Flow::Continue
        }
        CLIENT_AUTH => {
            let _ = send_frame(
                sender,
                &GatewayFrame::ack(
                    CLIENT_AUTH,
                    frame.id,
                    json!({ "status": "error", "reason": "already authenticated" }),
                ),
            )
            .await;
            Flow::Continue
        }
        CLIENT_AUTH_REFRESH => handle_auth_refresh(frame, sender, session, state, guard).await,
        CLIENT_MESSAGE_SEND => {
            let data: Option<SendMessageData> =
                frame.data.and_then(|d| serde_json::from_value(d).ok());
            let result = match data {
                Some(data) => {
                    messaging::send_message(state, session.identity(), data.thread_id, data.message)
                        .await
                        .map(|message| json!({ "status": "ok", "message": message }))
                }
                None => Err(stride_core::CoreError::InvalidArgument(
                    "message:send needs thread_id and content".into(),
                )),
            };
            ack_result(sender, CLIENT_MESSAGE_SEND, frame.id, result).await;
            Flow::Continue
        }
        CLIENT_THREAD_READ => {
            let data: Option<ThreadReadData> =
                frame.data.and_then(|d| serde_json::from_value(d).ok());
            let result = match data {
                Some(data) => messaging::mark_thread_read(
                    state,
                    session.identity(),
                    data.thread_id,
                    data.last_message_id,
                )
                .await
                .map(|()| json!({ "status": "ok" })),
                None => Err(stride_core::CoreError::InvalidArgument(
                    "thread:read needs a thread_id".into(),
                )),
            };
            ack_result(sender, CLIENT_THREAD_READ, frame.id, result).await;
            Flow::Continue
        }
        CLIENT_NOTIFICATION_READ => {
            let data: Option<NotificationReadData> =
                frame.data.and_then(|d| serde_json::from_value(d).ok());
            let result = match data {
                Some(data) => notify::mark_read(state, session.identity(), &data.ids, data.read)
                    .await
                    .map(|updated| json!({ "status": "ok", "updated": updated })),
                None => Err(stride_core::CoreError::InvalidArgument(
                    "notification:read needs an id list".into(),
                )),
            };
            ack_result(sender, CLIENT_NOTIFICATION_READ, frame.id, result).await;
            Flow::Continue
        }
        other => {
            let _ = send_frame(
                sender,
                &GatewayFrame::ack(
                    other,
                    frame.id,
                    json!({ "status": "error", "reason": "unknown event" }),
                ),
            )
            .await;
            Flow::Continue
        }
    }
}

/// Live re-authentication. On success the session's binding and the
/// registry slot move to the new user before the ack goes out; on failure
/// the session is told why and then closed.
async fn handle_auth_refresh(
    frame: GatewayFrame,
    sender: &mut (impl SinkExt<Message> + Unpin),
    session: &mut Session,
    state: &AppState,
    guard: &mut ConnectionGuard,
) -> Flow {
    let token = frame
        .data
        .and_then(|d| serde_json::from_value::<AuthData>(d).ok())
        .map(|d| d.token);
    let verified = match token {
        Some(token) => auth::verify_token(&token, &state.config.jwt_secret),
        None => Err(stride_core::CoreError::Unauthenticated),
    };

    match verified {
        Ok(identity) => {
            if !guard.rebind(identity.id) {
                let _ = send_frame(
                    sender,
                    &GatewayFrame::ack(
                        CLIENT_AUTH_REFRESH,
                        frame.id,
                        json!({ "status": "error", "reason": "too many concurrent sessions" }),
                    ),
                )
                .await;
                send_close(sender, 1008, "too many concurrent sessions").await;
                return Flow::Close;
            }
            let previous = session.rebind(identity);
            if previous != session.user_id() {
                tracing::info!(
                    connection_id = %session.connection_id,
                    previous_user_id = previous,
                    user_id = session.user_id(),
                    "session rebound to a new identity"
                );
            }
            let _ = send_frame(
                sender,
                &GatewayFrame::ack(
                    CLIENT_AUTH_REFRESH,
                    frame.id,
                    json!({ "status": "ok", "user_id": session.user_id() }),
                ),
            )
            .await;
            Flow::Continue
        }
        Err(_) => {
            let _ = send_frame(
                sender,
                &GatewayFrame::ack(
                    CLIENT_AUTH_REFRESH,
                    frame.id,
                    json!({ "status": "error", "reason": "invalid or expired token" }),
                ),
            )
            .await;
            let _ = send_frame(
                sender,
                &GatewayFrame::event(
                    EVENT_AUTH_ERROR,
                    json!({ "reason": "invalid or expired token" }),
                ),
            )
            .await;
            send_close(sender, 1008, "invalid or expired token").await;
            Flow::Close
        }
    }
}

async fn ack_result(
    sender: &mut (impl SinkExt<Message> + Unpin),
    event: &str,
    id: Option<u64>,
    result: Result<serde_json::Value, stride_core::CoreError>,
) {
    let data = match result {
        Ok(data) => data,
        Err(err) => json!({ "status": "error", "reason": err.to_string() }),
    };
    let _ = send_frame(sender, &GatewayFrame::ack(event, id, data)).await;
}
