//! WebSocket session lifecycle: one accepted client from upgrade through
//! disconnect.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use switchboard_core::{ChannelTransport, Dispatcher, Envelope, Frame, Transport};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handler::handle_text;
use super::protocol::SessionContext;
use crate::config::ServerConfig;
use crate::metrics::WS_CONNECTION_DURATION_SECONDS;

const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

/// Run a session for an upgraded socket.
///
/// The registry owns the only strong reference to the connection's
/// transport. The session keeps a weak one, so an eviction by the
/// dispatcher or the reaper drops the send queue and the writer closes the
/// socket on its own.
#[instrument(skip_all, fields(conn_id = %ctx.connection_id))]
pub async fn run_session(
    socket: WebSocket,
    ctx: SessionContext,
    dispatcher: Dispatcher,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let (sink, stream) = socket.split();

    let (transport, queue) =
        ChannelTransport::channel(config.send_queue_capacity, config.send_timeout);
    let handle: Arc<dyn Transport> = Arc::new(transport);
    let weak: Weak<dyn Transport> = Arc::downgrade(&handle);

    let registry = Arc::clone(dispatcher.registry());
    registry.connect(
        ctx.connection_id.clone(),
        handle,
        ctx.user_id.as_deref(),
        ctx.room_id.as_deref(),
    );

    let welcome = Envelope::connected(
        &ctx.connection_id,
        ctx.user_id.as_deref(),
        ctx.room_id.as_deref(),
    )
    .stamped();
    let _ = dispatcher.send_to_connection(&ctx.connection_id, &welcome).await;

    let mut writer = tokio::spawn(write_loop(sink, queue, config.ping_interval, cancel));
    let mut reader = tokio::spawn(read_loop(stream, dispatcher, ctx.clone()));

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    if let Some(handle) = weak.upgrade() {
        let _ = registry.release(&ctx.connection_id, &handle);
    }
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(
        user_id = ctx.user_id.as_deref().unwrap_or_default(),
        room_id = ctx.room_id.as_deref().unwrap_or_default(),
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "client disconnected"
    );
}

/// Drain the send queue into the socket, with periodic transport pings.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Frame>,
    ping_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ping = tokio::time::interval(ping_interval.max(MIN_PING_INTERVAL));
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(close_message(close_code::AWAY, "server shutting down")).await;
                break;
            }
            frame = queue.recv() => {
                let Some(frame) = frame else {
                    debug!("send queue closed, closing socket");
                    let _ = sink.send(close_message(close_code::NORMAL, "connection removed")).await;
                    break;
                };
                if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                    debug!("socket write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Handle inbound frames until the client goes away.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    ctx: SessionContext,
) {
    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "socket read failed");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let _ = handle_text(&dispatcher, &ctx, text.as_str()).await;
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = handle_text(&dispatcher, &ctx, text).await;
                }
                Err(_) => warn!(len = data.len(), "dropping non-UTF-8 binary frame"),
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_message_carries_code_and_reason() {
        let Message::Close(Some(frame)) = close_message(close_code::AWAY, "bye") else {
            panic!("expected a close frame");
        };
        assert_eq!(frame.code, close_code::AWAY);
        assert_eq!(frame.reason.as_str(), "bye");
    }

    #[test]
    fn weak_handle_dies_with_registry_entry() {
        let registry = switchboard_core::Registry::new();
        let (transport, _queue) = ChannelTransport::channel(4, Duration::from_secs(1));
        let handle: Arc<dyn Transport> = Arc::new(transport);
        let weak = Arc::downgrade(&handle);

        registry.connect("c1", handle, None, None);
        assert!(weak.upgrade().is_some());

        assert!(registry.disconnect("c1"));
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn dropped_transport_closes_queue() {
        let (transport, mut queue) = ChannelTransport::channel(4, Duration::from_secs(1));
        drop(transport);
        assert!(queue.recv().await.is_none());
    }
}
