//! Inbound message handling.
//!
//! Every inbound text frame is decoded as JSON and routed by its `type`.
//! Replies go back through the [`Dispatcher`] like any other delivery, so
//! they refresh `last_activity` and evict the sender if its queue is dead.

use metrics::counter;
use serde_json::{Value, json};
use switchboard_core::{DeliveryReport, Dispatcher, Envelope};
use tracing::{debug, warn};

use super::protocol::{ClientMessage, SessionContext, non_empty_str};
use crate::metrics::{WS_INBOUND_INVALID_TOTAL, WS_INBOUND_MESSAGES_TOTAL};

/// Handle one inbound text frame from `ctx`'s connection.
pub async fn handle_text(
    dispatcher: &Dispatcher,
    ctx: &SessionContext,
    text: &str,
) -> DeliveryReport {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            counter!(WS_INBOUND_INVALID_TOTAL).increment(1);
            warn!(conn_id = %ctx.connection_id, error = %e, "invalid JSON received");
            return reply(
                dispatcher,
                ctx,
                Envelope::error("invalid_json", "Invalid JSON format"),
            )
            .await;
        }
    };

    let Some(message) = ClientMessage::from_value(&value) else {
        counter!(WS_INBOUND_INVALID_TOTAL).increment(1);
        warn!(conn_id = %ctx.connection_id, "inbound message is not a JSON object");
        return reply(
            dispatcher,
            ctx,
            Envelope::error("processing_error", "Message must be a JSON object"),
        )
        .await;
    };

    let kind = message.kind.as_deref().unwrap_or_default();
    counter!(WS_INBOUND_MESSAGES_TOTAL, "type" => metric_label(kind)).increment(1);
    debug!(
        conn_id = %ctx.connection_id,
        message_type = kind,
        event = message.event.as_deref().unwrap_or_default(),
        "processing inbound message"
    );

    match kind {
        "ping" => reply(dispatcher, ctx, Envelope::pong()).await,
        "chat" => handle_chat(dispatcher, ctx, &message).await,
        "status" => {
            let stats = serde_json::to_value(dispatcher.registry().stats()).unwrap_or_default();
            reply(dispatcher, ctx, Envelope::new("status", "response", stats)).await
        }
        "subscribe" => {
            let subscribed_to = message
                .data
                .get("subscribe_to")
                .cloned()
                .unwrap_or_else(|| json!([]));
            let env = Envelope::new(
                "subscription",
                "confirmed",
                json!({
                    "subscribed_to": subscribed_to,
                    "user_id": ctx.user_id,
                    "chat_id": ctx.room_id,
                    "message": "Subscription processed",
                }),
            );
            reply(dispatcher, ctx, env).await
        }
        other => {
            warn!(conn_id = %ctx.connection_id, message_type = other, "unknown message type, echoing");
            reply(dispatcher, ctx, Envelope::new("echo", "unknown_message", value)).await
        }
    }
}

/// Route a chat message.
///
/// Precedence: `target_user_id`, then `target_chat_id` (the sender's own
/// room when the key is absent), then everyone except the sender.
async fn handle_chat(
    dispatcher: &Dispatcher,
    ctx: &SessionContext,
    message: &ClientMessage,
) -> DeliveryReport {
    let data = &message.data;
    let text = data
        .get("message")
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()));
    let env = Envelope::new(
        "chat",
        "message_received",
        json!({
            "from_connection": ctx.connection_id,
            "from_user": ctx.user_id,
            "from_chat": ctx.room_id,
            "message": text,
        }),
    )
    .stamped();

    let target_room = if data.contains_key("target_chat_id") {
        non_empty_str(data, "target_chat_id")
    } else {
        ctx.room_id.as_deref()
    };

    if let Some(user) = non_empty_str(data, "target_user_id") {
        dispatcher.send_to_user(user, &env).await
    } else if let Some(room) = target_room {
        dispatcher.send_to_room(room, &env).await
    } else {
        dispatcher
            .broadcast(&env, std::slice::from_ref(&ctx.connection_id))
            .await
    }
}

async fn reply(dispatcher: &Dispatcher, ctx: &SessionContext, env: Envelope) -> DeliveryReport {
    dispatcher
        .send_to_connection(&ctx.connection_id, &env.stamped())
        .await
}

fn metric_label(kind: &str) -> &'static str {
    match kind {
        "ping" => "ping",
        "chat" => "chat",
        "status" => "status",
        "subscribe" => "subscribe",
        _ => "other",
    }
}
