use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use concourse_types::collaborators::UserDirectory;
use concourse_types::events::{GatewayCommand, GatewayEvent};
use concourse_types::models::ContainerRef;

use crate::dispatcher::Dispatcher;
use crate::typing::TypingTracker;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection gets to identify before being closed.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: Identify handshake, Ready reply,
/// then the event loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    typing: TypingTracker,
    directory: Arc<dyn UserDirectory>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: wait for an Identify command naming a directory-known user
    let user_id = match wait_for_identify(&mut receiver, directory.as_ref()).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    // Step 2: confirm with Ready
    let ready = GatewayEvent::Ready { user_id };
    if sender
        .send(Message::Text(serde_json::to_string(&ready).unwrap().into()))
        .await
        .is_err()
    {
        return;
    }

    // Register the targeted channel for this user
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(user_id).await;

    // Subscribe to the broadcast stream
    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_recv = dispatcher.clone();
    let typing_recv = typing.clone();

    // Per-connection container subscriptions, shared between tasks
    let subscriptions: Arc<std::sync::RwLock<HashSet<ContainerRef>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    // Shared flag for heartbeat
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

                    // Container-scoped events only go to subscribed containers
                    if let Some(container) = event.container() {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&container) {
                            continue;
                        }
                    }

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client
    let recv_subscriptions = subscriptions.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(
                            &dispatcher_recv,
                            &typing_recv,
                            user_id,
                            cmd,
                            &recv_subscriptions,
                        )
                        .await;
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Best-effort cleanup: a disconnect ends any live typing indicator
    if let Some(container) = typing.stop(user_id).await {
        dispatcher.publish(GatewayEvent::TypingStopped { container, user_id });
    }

    dispatcher.unregister_user_channel(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    directory: &dyn UserDirectory,
) -> Option<Uuid> {
    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { user_id }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    // Session issuance lives outside the core; the gateway
                    // only checks the id against the directory.
                    if directory.get(user_id).await.is_some() {
                        return Some(user_id);
                    }
                    warn!("Identify for unknown user {}", user_id);
                    return None;
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    typing: &TypingTracker,
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<ContainerRef>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { containers } => {
            info!("{} subscribing to {} containers", user_id, containers.len());
            let mut subs = subscriptions.write().expect("subscription lock poisoned");
            *subs = containers.into_iter().collect();
        }

        // Typing is best-effort: nothing on this path returns an error to
        // the client.
        GatewayCommand::StartTyping { container } => {
            let indicator = typing.start(user_id, container).await;
            dispatcher.publish(GatewayEvent::TypingStarted {
                container,
                user_id,
                expires_at: indicator.expires_at,
            });
        }

        GatewayCommand::StopTyping => {
            if let Some(container) = typing.stop(user_id).await {
                dispatcher.publish(GatewayEvent::TypingStopped { container, user_id });
            }
        }
    }
}
