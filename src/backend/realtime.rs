//! Realtime change channel
//!
//! Speaks the Phoenix channel protocol used by the hosted realtime service:
//! join a `postgres_changes` topic for one table, keep the socket alive with
//! heartbeats, and forward every change event. The payload is not
//! interpreted beyond its kind; consumers always refetch.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{BackendClient, BackendError};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
const RECONNECT_BACKOFF: [Duration; 4] = [
  Duration::from_secs(1),
  Duration::from_secs(2),
  Duration::from_secs(5),
  Duration::from_secs(10),
];
const CHANGE_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
  Other,
  /// The socket was rejoined after a drop; changes may have been missed.
  Resync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
  pub kind: ChangeKind,
  pub table: Option<String>,
}

impl ChangeNotification {
  pub fn new(kind: ChangeKind, table: impl Into<String>) -> Self {
    Self {
      kind,
      table: Some(table.into()),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
  pub topic: String,
  pub event: String,
  pub payload: Value,
  #[serde(rename = "ref", default)]
  pub reference: Option<String>,
}

impl PhoenixMessage {
  pub fn join(channel: &str, table: &str, access_token: Option<&str>, reference: u64) -> Self {
    let mut payload = json!({
      "config": {
        "broadcast": { "self": false },
        "presence": { "key": "" },
        "postgres_changes": [
          { "event": "*", "schema": "public", "table": table }
        ]
      }
    });
    if let Some(token) = access_token {
      payload["access_token"] = Value::String(token.to_string());
    }

    Self {
      topic: topic_for(channel),
      event: "phx_join".to_string(),
      payload,
      reference: Some(reference.to_string()),
    }
  }

  /// Re-authorizes an already joined topic after sign-in or a refresh.
  pub fn access_token(topic: &str, token: &str, reference: u64) -> Self {
    Self {
      topic: topic.to_string(),
      event: "access_token".to_string(),
      payload: json!({ "access_token": token }),
      reference: Some(reference.to_string()),
    }
  }

  pub fn heartbeat(reference: u64) -> Self {
    Self {
      topic: "phoenix".to_string(),
      event: "heartbeat".to_string(),
      payload: json!({}),
      reference: Some(reference.to_string()),
    }
  }
}

pub fn topic_for(channel: &str) -> String {
  format!("realtime:{}", channel)
}

/// Extracts a change notification from a raw frame. Replies, heartbeats
/// and presence traffic yield `None`.
pub fn parse_notification(text: &str) -> Option<ChangeNotification> {
  let message: PhoenixMessage = serde_json::from_str(text).ok()?;
  if message.event != "postgres_changes" {
    return None;
  }

  let data = message.payload.get("data").unwrap_or(&message.payload);
  let kind = match data
    .get("type")
    .or_else(|| data.get("eventType"))
    .and_then(Value::as_str)
  {
    Some("INSERT") => ChangeKind::Insert,
    Some("UPDATE") => ChangeKind::Update,
    Some("DELETE") => ChangeKind::Delete,
    _ => ChangeKind::Other,
  };
  let table = data.get("table").and_then(Value::as_str).map(str::to_string);

  Some(ChangeNotification { kind, table })
}

/// Handle to one or more background tasks feeding a change stream.
/// `unsubscribe` tears them down once; later calls and drop are no-ops.
#[derive(Debug)]
pub struct Subscription {
  tasks: Vec<AbortHandle>,
  active: AtomicBool,
  link: Arc<AtomicBool>,
}

impl Subscription {
  pub fn new(tasks: Vec<AbortHandle>) -> Self {
    Self {
      tasks,
      active: AtomicBool::new(true),
      link: Arc::new(AtomicBool::new(true)),
    }
  }

  pub fn detached() -> Self {
    Self::new(Vec::new())
  }

  pub fn with_task(mut self, task: AbortHandle) -> Self {
    self.tasks.push(task);
    self
  }

  /// Ties `is_connected` to a flag owned by the socket task.
  pub fn with_link(mut self, link: Arc<AtomicBool>) -> Self {
    self.link = link;
    self
  }

  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::SeqCst)
  }

  /// Active and currently joined. False while the socket is reconnecting.
  pub fn is_connected(&self) -> bool {
    self.is_active() && self.link.load(Ordering::SeqCst)
  }

  /// Returns `true` only for the call that actually tore the tasks down.
  pub fn unsubscribe(&self) -> bool {
    if !self.active.swap(false, Ordering::SeqCst) {
      return false;
    }
    for task in &self.tasks {
      task.abort();
    }
    true
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

pub struct ChangeStream {
  pub changes: mpsc::Receiver<ChangeNotification>,
  pub subscription: Subscription,
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a joined socket stopped pumping.
enum SocketEnd {
  Dropped,
  ConsumerGone,
}

pub fn reconnect_delay(attempt: usize) -> Duration {
  RECONNECT_BACKOFF[attempt.min(RECONNECT_BACKOFF.len() - 1)]
}

#[derive(Clone)]
pub struct RealtimeClient {
  backend: BackendClient,
}

impl RealtimeClient {
  pub fn new(backend: BackendClient) -> Self {
    Self { backend }
  }

  /// Joins the change topic for `table`. The first connection must succeed;
  /// after that a dropped socket is reconnected with backoff and every
  /// rejoin is announced on the stream as [`ChangeKind::Resync`].
  pub async fn subscribe(&self, channel: &str, table: &str) -> Result<ChangeStream, BackendError> {
    let socket = self.join(channel, table).await?;
    tracing::info!(channel, table, "realtime channel joined");

    let (tx, changes) = mpsc::channel(CHANGE_BUFFER);
    let link = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(self.clone().run(
      channel.to_string(),
      table.to_string(),
      socket,
      tx,
      link.clone(),
    ));

    Ok(ChangeStream {
      changes,
      subscription: Subscription::new(vec![task.abort_handle()]).with_link(link),
    })
  }

  async fn join(&self, channel: &str, table: &str) -> Result<Socket, BackendError> {
    let url = self.backend.realtime_url()?;
    let (mut socket, _) = connect_async(url.as_str())
      .await
      .map_err(|e| BackendError::Transport(format!("realtime connect failed: {}", e)))?;

    let join = PhoenixMessage::join(channel, table, self.backend.access_token().as_deref(), 1);
    let frame = serde_json::to_string(&join).map_err(|e| BackendError::Decode(e.to_string()))?;
    socket
      .send(Message::Text(frame))
      .await
      .map_err(|e| BackendError::Transport(format!("realtime join failed: {}", e)))?;

    Ok(socket)
  }

  async fn run(
    self,
    channel: String,
    table: String,
    mut socket: Socket,
    tx: mpsc::Sender<ChangeNotification>,
    link: Arc<AtomicBool>,
  ) {
    let topic = topic_for(&channel);
    let mut tokens = self.backend.watch_access_token();
    tokens.borrow_and_update();

    loop {
      if let SocketEnd::ConsumerGone = self.pump(&mut socket, &topic, &tx, &mut tokens).await {
        break;
      }
      link.store(false, Ordering::SeqCst);

      let mut attempt = 0;
      socket = loop {
        let delay = reconnect_delay(attempt);
        tokio::select! {
          _ = tokio::time::sleep(delay) => {}
          _ = tx.closed() => return,
        }
        match self.join(&channel, &table).await {
          Ok(socket) => break socket,
          Err(e) => {
            attempt += 1;
            tracing::warn!(%topic, attempt, "realtime reconnect failed: {}", e);
          }
        }
      };

      // the join frame already carried the current token
      tokens.borrow_and_update();
      link.store(true, Ordering::SeqCst);
      tracing::info!(%topic, "realtime channel rejoined");

      let resync = ChangeNotification {
        kind: ChangeKind::Resync,
        table: Some(table.clone()),
      };
      if tx.send(resync).await.is_err() {
        break;
      }
    }

    link.store(false, Ordering::SeqCst);
  }

  async fn pump(
    &self,
    socket: &mut Socket,
    topic: &str,
    tx: &mpsc::Sender<ChangeNotification>,
    tokens: &mut watch::Receiver<Option<String>>,
  ) -> SocketEnd {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut reference: u64 = 1;

    loop {
      tokio::select! {
        _ = heartbeat.tick() => {
          reference += 1;
          if let Err(e) = send_frame(socket, &PhoenixMessage::heartbeat(reference)).await {
            tracing::warn!(%topic, "realtime heartbeat failed: {}", e);
            return SocketEnd::Dropped;
          }
        }
        Ok(()) = tokens.changed() => {
          let token = tokens
            .borrow_and_update()
            .clone()
            .unwrap_or_else(|| self.backend.anon_key().to_string());
          reference += 1;
          if let Err(e) = send_frame(socket, &PhoenixMessage::access_token(topic, &token, reference)).await {
            tracing::warn!(%topic, "realtime token update failed: {}", e);
            return SocketEnd::Dropped;
          }
          tracing::debug!(%topic, "realtime access token updated");
        }
        _ = tx.closed() => {
          tracing::debug!(%topic, "change stream dropped, closing socket");
          let _ = socket.close(None).await;
          return SocketEnd::ConsumerGone;
        }
        incoming = socket.next() => match incoming {
          Some(Ok(Message::Text(text))) => {
            if let Some(notification) = parse_notification(&text) {
              tracing::debug!(%topic, kind = ?notification.kind, "realtime change");
              if tx.send(notification).await.is_err() {
                return SocketEnd::ConsumerGone;
              }
            } else if text.contains("\"status\":\"error\"") {
              tracing::warn!(%topic, "realtime reply error: {}", text);
            }
          }
          Some(Ok(Message::Close(_))) | None => {
            tracing::warn!(%topic, "realtime socket closed");
            return SocketEnd::Dropped;
          }
          Some(Ok(_)) => {}
          Some(Err(e)) => {
            tracing::warn!(%topic, "realtime socket error: {}", e);
            return SocketEnd::Dropped;
          }
        }
      }
    }
  }
}

async fn send_frame(socket: &mut Socket, message: &PhoenixMessage) -> Result<(), BackendError> {
  let frame = serde_json::to_string(message).map_err(|e| BackendError::Decode(e.to_string()))?;
  socket
    .send(Message::Text(frame))
    .await
    .map_err(|e| BackendError::Transport(e.to_string()))
}
