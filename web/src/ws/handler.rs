use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::*;
use relay::connection::{ConnectionHandle, Outbound};
use relay::lifecycle::State as LifecycleState;
use relay::Manager;
use service::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant, Interval};

/// Upper bound on waiting for the writer to flush a close frame after the
/// reader side has finished.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket handler that upgrades the request and hands the socket to the
/// relay. The identity comes from the `userId` query parameter, which the
/// lifecycle reads from the raw query after the upgrade.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(app_state): State<AppState>,
) -> Response {
    let relay = app_state.relay.clone();
    let keep_alive = app_state.config.keep_alive();

    ws.on_upgrade(move |socket| serve_connection(socket, query, relay, keep_alive))
}

/// Drive one upgraded socket: a writer task drains the connection's outbound
/// channel while this task reads inbound frames until either side ends.
async fn serve_connection(
    socket: WebSocket,
    query: Option<String>,
    relay: Arc<Manager>,
    keep_alive: Option<Duration>,
) {
    let (sink, mut stream) = socket.split();
    let (handle, outbound) = ConnectionHandle::channel();
    let mut writer = tokio::spawn(write_frames(sink, outbound, keep_alive));

    let lifecycle = relay.accept(handle);
    if lifecycle.identify(query.as_deref()) == LifecycleState::Closed {
        // The writer sends the policy-violation close frame and exits
        drop(lifecycle);
        let _ = time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await;
        return;
    }

    let mut writer_finished = false;
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    lifecycle.on_frame(&text);
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Peer closed connection {}", lifecycle.handle().id());
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Read error on connection {}: {e}", lifecycle.handle().id());
                    break;
                }
            },
            _ = &mut writer => {
                writer_finished = true;
                debug!("Writer for connection {} finished", lifecycle.handle().id());
                break;
            }
        }
    }

    lifecycle.close();
    drop(lifecycle);

    if !writer_finished {
        let _ = time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await;
    }
}

/// Forward queued frames to the socket, interleaving keep-alive pings.
/// Ends after a close frame, a failed write, or once every handle is dropped.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: UnboundedReceiver<Outbound>,
    keep_alive: Option<Duration>,
) {
    let mut ping = keep_alive.map(|period| time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        debug!("Write failed, stopping writer: {e}");
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },
            _ = next_ping(&mut ping) => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
