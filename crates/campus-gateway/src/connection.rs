use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use campus_types::events::{GatewayCommand, GatewayEvent};
use campus_types::models::Role;

use crate::dispatcher::Dispatcher;
use crate::storage::RealtimeStore;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer, so we go straight to Ready and the
/// event loop.
pub async fn handle_connection(
    socket: WebSocket,
    hub: Dispatcher,
    store: Arc<dyn RealtimeStore>,
    user_id: Uuid,
    user_name: String,
    role: Role,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", user_name, user_id);

    let ready = GatewayEvent::Ready { user_id, role };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, hub, store, user_id, user_name, role).await;
}

async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    hub: Dispatcher,
    store: Arc<dyn RealtimeStore>,
    user_id: Uuid,
    user_name: String,
    role: Role,
) {
    let (session_id, mut user_rx) = hub.register_session(user_id, role).await;
    let mut broadcast_rx = hub.subscribe();
    let hub_recv = hub.clone();

    // Per-connection channel subscriptions, shared between send and recv
    // tasks. The send task filters channel-scoped broadcasts against it.
    let subscribed_channels: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed_channels.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if let Some(channel_id) = event.channel_id() {
                        let subs = send_subscriptions
                            .read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&channel_id) {
                            continue;
                        }
                    }

                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                event = user_rx.recv() => {
                    let event = match event {
                        Some(event) => event,
                        None => break,
                    };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(
                                "Heartbeat timeout (missed {} pongs), dropping connection",
                                missed_heartbeats
                            );
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let user_name_recv = user_name.clone();
    let recv_subscriptions = subscribed_channels.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &hub_recv,
                            &store,
                            user_id,
                            &user_name_recv,
                            cmd,
                            &recv_subscriptions,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            user_name_recv,
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister_session(user_id, session_id).await;
    info!("{} ({}) disconnected from gateway", user_name, user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(WsMessage::Text(text.into())).await
}

async fn handle_command(
    hub: &Dispatcher,
    store: &Arc<dyn RealtimeStore>,
    user_id: Uuid,
    user_name: &str,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        // Authentication happens at the HTTP upgrade; a late Identify is noise
        GatewayCommand::Identify { .. } => {}

        GatewayCommand::Subscribe { channel_id } => {
            info!("{} ({}) subscribed to {}", user_name, user_id, channel_id);
            subscriptions
                .write()
                .expect("subscription lock poisoned")
                .insert(channel_id);
            hub.set_viewing(user_id, channel_id, true).await;
        }

        GatewayCommand::Unsubscribe { channel_id } => {
            info!("{} ({}) unsubscribed from {}", user_name, user_id, channel_id);
            subscriptions
                .write()
                .expect("subscription lock poisoned")
                .remove(&channel_id);
            hub.set_viewing(user_id, channel_id, false).await;
        }

        GatewayCommand::MarkNotificationRead { notification_id } => {
            let store = store.clone();
            let result =
                tokio::task::spawn_blocking(move || store.mark_notification_read(notification_id))
                    .await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("Mark-read for {} failed: {}", notification_id, e);
                }
                Err(e) => {
                    warn!("Mark-read task for {} failed: {}", notification_id, e);
                }
            }
        }
    }
}
