//! WebSocket transport adapter between a connection and its [`Session`]

use async_tungstenite::WebSocketStream;
use futures::io::{AsyncRead, AsyncWrite};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tungstenite::Message;
use tungstenite::protocol::Role;

use super::ServerState;
use crate::error::ProtocolError;
use crate::protocol::ServerFrame;
use crate::session::{Flow, Session};

/// Run a session over an already upgraded connection.
///
/// `leftover` holds bytes read past the HTTP head. Returns once the client
/// leaves or the session asks to close; the follower is reaped by then.
pub async fn serve<S>(stream: S, leftover: Vec<u8>, peer: String, state: Arc<ServerState>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws = WebSocketStream::from_partially_read(stream, leftover, Role::Server, None).await;
    let (mut sink, mut source) = ws.split();

    let (outbound, frames) = async_channel::bounded::<ServerFrame>(state.config.output_queue);
    let mut session = Session::new(
        state.registry.clone(),
        state.launcher.clone(),
        state.settings.clone(),
        state.limit.clone(),
        outbound,
    );
    let session_id = session.id();
    info!(session = %session_id, %peer, "Session opened");

    let writer = smol::spawn(async move {
        while let Ok(frame) = frames.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    warn!(session = %session_id, frame = frame.name(), error = %e, "Failed to encode frame");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::text(text)).await {
                debug!(session = %session_id, error = %e, "Client stopped reading");
                break;
            }
        }
        let _ = sink.close(None).await;
    });

    'frames: while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(session = %session_id, frame = %text.as_str(), "Received frame");
                for frame in unwrap_envelope(text.as_str()) {
                    let flow = match frame {
                        Ok(value) => session.handle_value(value).await,
                        Err(e) => session.report(Err(e.into())).await,
                    };
                    if flow == Flow::Close {
                        break 'frames;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    session.close().await;
    // Dropping the session closes the outbound queue; the writer drains it
    // and finishes.
    drop(session);
    writer.await;

    info!(session = %session_id, %peer, "Session closed");
}

/// Split a text frame into command frames.
///
/// A JSON array of strings is an envelope holding several frames, each
/// either JSON text or a bare command name. Anything else is one frame.
pub fn unwrap_envelope(text: &str) -> Vec<Result<Value, ProtocolError>> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return vec![Err(e.into())],
    };

    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .map(unwrap_inner)
            .collect(),
        other => vec![Ok(other)],
    }
}

fn unwrap_inner(inner: &str) -> Result<Value, ProtocolError> {
    match serde_json::from_str(inner) {
        Ok(value) => Ok(value),
        Err(_) if is_bare_word(inner) => Ok(Value::String(inner.to_string())),
        Err(e) => Err(e.into()),
    }
}

fn is_bare_word(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
