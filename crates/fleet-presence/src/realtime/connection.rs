//! Background task driving one channel session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::handler::{translate_message, Inbound};
use super::types::{wire_topic, PhoenixMessage, SessionCommand};
use crate::error::TransportError;
use crate::transport::TransportEvent;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Ref Counter
// ---------------------------------------------------------------------------

/// Monotonically increasing ref counter for Phoenix messages.
static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// Everything a session needs besides the socket.
pub(crate) struct SessionParams {
    /// Correlation id tying this session's log lines together.
    pub conn_id: String,
    pub topic: String,
    pub presence_key: String,
    pub access_token: Option<String>,
    pub heartbeat: Duration,
}

async fn send_frame<S>(write: &Mutex<S>, frame: &PhoenixMessage) -> Result<(), TransportError>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(frame).map_err(|e| TransportError::Send(e.to_string()))?;
    let mut writer = write.lock().await;
    writer
        .send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| TransportError::Send(e.to_string()))
}

// ---------------------------------------------------------------------------
// Session Loop
// ---------------------------------------------------------------------------

/// Join the channel, then pump frames both ways until the socket dies or
/// the handle asks to close. `joined` resolves once the server answers the
/// join; events only flow after that.
pub(crate) async fn session_loop(
    ws: WsStream,
    params: SessionParams,
    joined: oneshot::Sender<Result<(), TransportError>>,
    event_tx: mpsc::Sender<TransportEvent>,
    mut command_rx: mpsc::Receiver<SessionCommand>,
) {
    let (write, mut read) = ws.split();
    let write = Arc::new(Mutex::new(write));
    let topic = wire_topic(&params.topic);

    let join_ref = next_ref();
    let join = PhoenixMessage::join(
        &params.topic,
        &params.presence_key,
        params.access_token.as_deref(),
        join_ref.clone(),
    );
    if let Err(e) = send_frame(&write, &join).await {
        let _ = joined.send(Err(e));
        return;
    }

    let heartbeat = tokio::spawn(heartbeat_task(Arc::clone(&write), params.heartbeat));
    let mut joined = Some(joined);

    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(SessionCommand::Send { frame, done }) => {
                    let _ = done.send(send_frame(&write, &frame).await);
                }
                Some(SessionCommand::Close) | None => {
                    let _ = send_frame(&write, &PhoenixMessage::leave(&params.topic, next_ref())).await;
                    let _ = write.lock().await.send(WsMessage::Close(None)).await;
                    debug!(conn = %params.conn_id, topic = %topic, "session closed locally");
                    break;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let Ok(msg) = serde_json::from_str::<PhoenixMessage>(&text) else {
                        debug!(text = %text.as_str(), "unrecognized frame");
                        continue;
                    };
                    match translate_message(&msg, &topic, &join_ref) {
                        Inbound::JoinReply(Ok(())) => {
                            info!(conn = %params.conn_id, topic = %topic, "channel joined");
                            if let Some(tx) = joined.take() {
                                let _ = tx.send(Ok(()));
                            }
                        }
                        Inbound::JoinReply(Err(reason)) => {
                            warn!(conn = %params.conn_id, topic = %topic, reason = %reason, "channel join rejected");
                            match joined.take() {
                                Some(tx) => {
                                    let _ = tx.send(Err(TransportError::Connect(reason)));
                                }
                                None => {
                                    let _ = event_tx.send(TransportEvent::Error(reason)).await;
                                }
                            }
                            break;
                        }
                        Inbound::Event(event) => {
                            let fatal = matches!(event, TransportEvent::Closed | TransportEvent::Error(_));
                            let _ = event_tx.send(event).await;
                            if fatal {
                                break;
                            }
                        }
                        Inbound::Ignore => {}
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!(conn = %params.conn_id, topic = %topic, "socket closed by server");
                    let _ = event_tx.send(TransportEvent::Closed).await;
                    break;
                }
                Some(Err(e)) => {
                    warn!(conn = %params.conn_id, topic = %topic, error = %e, "socket error");
                    let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    heartbeat.abort();
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(write: Arc<Mutex<S>>, period: Duration)
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        if send_frame(&write, &PhoenixMessage::heartbeat(next_ref()))
            .await
            .is_err()
        {
            break;
        }
    }
}
