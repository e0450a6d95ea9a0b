use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RoomManagerHandle;
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnectionId, OutboundMessage, SignalingError};
use crate::translation::TranslationClient;

pub const DEFAULT_SIGNALING_PORT: u16 = 3001;
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SignalingServer {
    handle: RoomManagerHandle,
    translator: TranslationClient,
    ping_interval: Duration,
}

impl SignalingServer {
    pub fn new(translator: TranslationClient) -> Self {
        Self {
            handle: RoomManagerHandle::spawn(),
            translator,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn handle(&self) -> RoomManagerHandle {
        self.handle.clone()
    }

    pub async fn run(&self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!("Signaling server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            let ctx = ConnectionContext {
                handle: self.handle.clone(),
                translator: self.translator.clone(),
                ping_interval: self.ping_interval,
            };

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, ctx).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

struct ConnectionContext {
    handle: RoomManagerHandle,
    translator: TranslationClient,
    ping_interval: Duration,
}

/// Ping/pong liveness for one connection.
struct Keepalive {
    ticker: Interval,
    pong_timeout: Duration,
    /// Set while a ping is outstanding.
    pong_deadline: Option<Instant>,
}

#[derive(Debug, PartialEq, Eq)]
enum Liveness {
    SendPing,
    Expired,
}

impl Keepalive {
    fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ticker: tokio::time::interval(ping_interval),
            pong_timeout,
            pong_deadline: None,
        }
    }

    /// Resolves when a ping is due, or when the peer missed its pong either
    /// by the deadline or by the next tick. Cancel safe.
    async fn next(&mut self) -> Liveness {
        let ticked = tokio::select! {
            _ = self.ticker.tick() => true,
            _ = pong_wait(self.pong_deadline) => false,
        };
        if !ticked || self.pong_deadline.is_some() {
            return Liveness::Expired;
        }
        self.pong_deadline = Some(Instant::now() + self.pong_timeout);
        Liveness::SendPing
    }

    fn pong_received(&mut self) {
        self.pong_deadline = None;
    }
}

async fn pong_wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drains relay frames and control frames into the socket until either side
/// closes.
fn spawn_writer<S>(
    mut sink: S,
    mut frames: mpsc::UnboundedReceiver<OutboundMessage>,
    mut control: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                Some(frame) = frames.recv() => Message::Text(frame.into_inner()),
                Some(ctrl) = control.recv() => ctrl,
                else => break,
            };
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ConnectionContext,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<Message>();
    let writer = spawn_writer(ws_tx, rx, ctrl_rx);

    let connection_id = match ctx.handle.connect(tx.clone()).await {
        Ok(id) => id,
        Err(e) => {
            writer.abort();
            return Err(e.into());
        }
    };
    info!("WebSocket connection {} from {}", connection_id, addr);

    let mut keepalive = Keepalive::new(ctx.ping_interval, PONG_TIMEOUT);

    loop {
        tokio::select! {
            liveness = keepalive.next() => match liveness {
                Liveness::SendPing => {
                    if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                        break;
                    }
                    debug!("Ping sent to {}", connection_id);
                }
                Liveness::Expired => {
                    warn!("Missed pong, dropping {}", connection_id);
                    break;
                }
            },

            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_text_message(&text, &tx, &ctx, connection_id).await;
                }
                Some(Ok(Message::Pong(_))) => keepalive.pong_received(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error from {}: {}", connection_id, e);
                    break;
                }
            },
        }
    }

    ctx.handle.disconnect(connection_id).await;
    writer.abort();
    info!("WebSocket closed: {} ({})", connection_id, addr);

    Ok(())
}

fn reply(tx: &mpsc::UnboundedSender<OutboundMessage>, msg: &ServerMessage) {
    match msg.encode() {
        Ok(frame) => {
            let _ = tx.send(frame);
        }
        Err(e) => warn!("Reply dropped: {}", e),
    }
}

async fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    ctx: &ConnectionContext,
    connection_id: ConnectionId,
) {
    let client_msg = match ClientMessage::parse(text) {
        Ok(m) => m,
        Err(e) => {
            debug!("Rejected frame from {}: {}", connection_id, e);
            reply(tx, &ServerMessage::error(&e));
            return;
        }
    };

    let handle = &ctx.handle;
    let result = match client_msg {
        ClientMessage::CreateRoom { room_id, name } => handle
            .create_room(connection_id, room_id, name)
            .await
            .map(drop),

        ClientMessage::JoinRoom {
            room_id,
            signal_data,
            from,
        } => handle
            .join_room(connection_id, room_id, signal_data, from)
            .await
            .map(drop),

        ClientMessage::AnswerCall {
            signal,
            to,
            room_id,
        } => match to.parse() {
            Ok(target) => handle.answer_call(connection_id, target, room_id, signal).await,
            Err(_) => Err(SignalingError::ConnectionNotFound(to)),
        },

        ClientMessage::EndCall { room_id } => {
            handle.end_call(connection_id, room_id).await;
            Ok(())
        }

        ClientMessage::LeaveRoom { room_id } => {
            handle.leave_room(connection_id, room_id).await;
            Ok(())
        }

        ClientMessage::TranslateText {
            text,
            from,
            to,
            room_id,
        } => {
            if text.trim().is_empty() {
                reply(
                    tx,
                    &ServerMessage::Error {
                        message: "Text is required".to_string(),
                    },
                );
                return;
            }

            let handle = handle.clone();
            let translator = ctx.translator.clone();
            tokio::spawn(async move {
                let translation = translator.translate_or_annotate(&text, &from, &to).await;
                handle
                    .relay_translation(connection_id, room_id, translation)
                    .await;
            });
            Ok(())
        }
    };

    match result {
        Ok(()) => {}
        // Already reported to the client by the relay.
        Err(SignalingError::RoomNotFound(room_id)) => {
            debug!("{} targeted unknown room {}", connection_id, room_id);
        }
        Err(SignalingError::ConnectionNotFound(target)) => {
            debug!("Dropping message from {} for gone connection {}", connection_id, target);
        }
        Err(e) => warn!("Message handling error: {}", e),
    }
}
