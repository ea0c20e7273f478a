//! WebSocket Handler
//!
//! One task per connection: a writer draining the outbound queue (plus the
//! heartbeat ping) and a reader feeding frames to the [`EventRouter`].

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::metrics::RelayMetrics;

use super::protocol::{ErrorNotice, ServerEvent};
use super::router::EventRouter;

/// Serve one accepted WebSocket until it closes, goes idle, or the server
/// shuts down.
pub async fn handle_connection(
    socket: WebSocket,
    router: Arc<EventRouter>,
    metrics: Arc<RelayMetrics>,
    config: RelayConfig,
    shutdown: CancellationToken,
) {
    metrics.connection_opened();

    let (tx, mut rx) = mpsc::channel::<ServerEvent>(config.send_queue_capacity);
    let conn_id = router.connect(tx.clone());
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let heartbeat = config.heartbeat_interval;
    // Period is irrelevant when the heartbeat is off: the branch is disabled.
    let period = heartbeat.unwrap_or(Duration::from_secs(3600));
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    // Task to send events (and pings) to the WebSocket
    let sender_task = async move {
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let json = match serde_json::to_string(&event) {
                        Ok(j) => j,
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick(), if heartbeat.is_some() => {
                    if ws_sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_sender.close().await;
    };

    // Task to handle incoming frames
    let input_router = router.clone();
    let input_metrics = metrics.clone();
    let idle_timeout = config.idle_timeout;
    let input_task = async move {
        loop {
            let next = if heartbeat.is_some() {
                match tokio::time::timeout(idle_timeout, ws_receiver.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            conn_id = %conn_id,
                            "No frames within idle timeout, dropping connection"
                        );
                        input_metrics.idle_disconnect();
                        break;
                    }
                }
            } else {
                ws_receiver.next().await
            };

            match next {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = input_router.dispatch_text(conn_id, text.as_str()) {
                        if e.is_protocol_error() {
                            warn!(
                                conn_id = %conn_id,
                                code = e.error_code(),
                                "Rejected frame: {}",
                                e
                            );
                        } else {
                            error!(conn_id = %conn_id, "Failed to handle frame: {}", e);
                        }
                        // Only the offending connection hears about it
                        if tx.try_send(ServerEvent::Error(ErrorNotice::from(&e))).is_err() {
                            debug!(conn_id = %conn_id, "Could not queue error notice");
                        }
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    debug!(conn_id = %conn_id, "Ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(conn_id = %conn_id, "Client sent close");
                    break;
                }
                // Ping/pong only refresh the idle timer
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, "WebSocket error: {}", e);
                    break;
                }
                None => break,
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %conn_id, "Sender task ended"),
        _ = input_task => debug!(conn_id = %conn_id, "Input task ended"),
        _ = shutdown.cancelled() => debug!(conn_id = %conn_id, "Server shutting down"),
    }

    let room = router.disconnect(conn_id).map(|outcome| outcome.user_id);
    metrics.connection_closed();
    info!(
        conn_id = %conn_id,
        room = room.as_deref().unwrap_or("-"),
        "WebSocket connection closed"
    );
}
