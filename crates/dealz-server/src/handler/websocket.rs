//! WebSocket handler for the real-time market channel via NATS.
//!
//! Authentication happens exactly once per connection: the first frame must
//! be a `connect` frame whose `authorization` field carries the same bearer
//! token the HTTP surface uses. The transport has already upgraded, so
//! header-based extraction is unavailable here. A failed or absent token
//! logs a warning and leaves the connection unauthenticated rather than
//! closing it; anonymous connections may subscribe to topics, but
//! publishing checks the bound principal. Subsequent frames are never
//! re-authenticated.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use dealz_nats::NatsClient;
use dealz_nats::stream::{MarketEvent, MarketEventKind, Topic};
use dealz_postgres::PgClient;
use dealz_postgres::query::{AccountRepository, CredentialRepository};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::extract::SessionClaims;
use crate::service::{ServiceState, SessionKeys};

/// Tracing target for market websocket operations.
const TRACING_TARGET: &str = "dealz_server::handler::websocket";

/// Maximum size of an accepted frame in bytes (64 KiB).
const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Time allowed for the client to send its connect frame.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum concurrent topic subscriptions per connection.
const MAX_SUBSCRIPTIONS: usize = 32;

/// Outbound frame buffer per connection.
const SEND_BUFFER: usize = 64;

/// Frames accepted from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
enum ClientFrame {
    /// Connection establishment; the only frame carrying credentials.
    Connect {
        /// `Bearer <token>`, mirroring the HTTP Authorization header.
        #[serde(default)]
        authorization: Option<String>,
    },
    /// Start receiving events for a topic.
    Subscribe { topic: String },
    /// Stop receiving events for a topic.
    Unsubscribe { topic: String },
    /// Publish a message to a topic. Requires a bound principal.
    Publish { topic: String, body: String },
}

/// Frames sent to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
enum ServerFrame {
    /// Acknowledges the connect frame and reports the bound identity.
    Connected {
        #[serde(skip_serializing_if = "Option::is_none")]
        account_id: Option<Uuid>,
    },
    /// An event observed on a subscribed topic.
    Event {
        topic: String,
        kind: MarketEventKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_id: Option<Uuid>,
        #[serde(skip_serializing_if = "String::is_empty")]
        body: String,
        timestamp: Timestamp,
    },
    /// A dropped or rejected frame.
    Error { reason: String },
}

/// Identity bound to a connection by the connect-frame interceptor.
#[derive(Debug, Clone)]
struct Principal {
    account_id: Uuid,
    email: String,
}

/// Metrics for a WebSocket connection.
#[derive(Debug, Default)]
struct ConnectionMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    events_published: AtomicU64,
    frames_dropped: AtomicU64,
    errors: AtomicU64,
}

impl ConnectionMetrics {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Extracts the token from a `Bearer <token>` authorization value.
fn parse_bearer(value: &str) -> Option<&str> {
    value.strip_prefix("Bearer ").map(str::trim).filter(|token| !token.is_empty())
}

/// The connect-frame authentication interceptor.
///
/// Runs the same verification chain as the HTTP gate: codec, kind, ledger
/// activity, account standing. Every failure path returns `None`; the
/// connection stays open unauthenticated.
async fn authenticate_connect_frame(
    connection_id: Uuid,
    authorization: Option<&str>,
    session_keys: &SessionKeys,
    pg_client: &PgClient,
) -> Option<Principal> {
    let Some(token) = authorization.and_then(parse_bearer) else {
        tracing::debug!(
            target: TRACING_TARGET,
            connection_id = %connection_id,
            "connect frame without bearer token, continuing unauthenticated"
        );
        return None;
    };

    let claims = match SessionClaims::decode(token, session_keys) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                error = %e,
                "connect frame token failed verification, continuing unauthenticated"
            );
            return None;
        }
    };

    if claims.require_access().is_err() {
        tracing::warn!(
            target: TRACING_TARGET,
            connection_id = %connection_id,
            subject = %claims.subject,
            "connect frame presented a non-access token, continuing unauthenticated"
        );
        return None;
    }

    let mut conn = match pg_client.get_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                error = %e,
                "database unavailable during connect authentication"
            );
            return None;
        }
    };

    match conn.is_access_token_active(token).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                subject = %claims.subject,
                "connect frame token revoked, continuing unauthenticated"
            );
            return None;
        }
        Err(e) => {
            tracing::error!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                error = %e,
                "ledger lookup failed during connect authentication"
            );
            return None;
        }
    }

    let account = match conn.find_account_by_email(&claims.subject).await {
        Ok(Some(account)) if account.can_login() => account,
        Ok(_) => {
            tracing::warn!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                subject = %claims.subject,
                "connect frame subject unusable, continuing unauthenticated"
            );
            return None;
        }
        Err(e) => {
            tracing::error!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                error = %e,
                "account lookup failed during connect authentication"
            );
            return None;
        }
    };

    tracing::info!(
        target: TRACING_TARGET,
        connection_id = %connection_id,
        account_id = %account.id,
        "identity bound to streaming connection"
    );

    Some(Principal {
        account_id: account.id,
        email: account.email_address,
    })
}

/// Per-connection subscription set.
struct Subscriptions {
    forward_tasks: HashMap<Topic, JoinHandle<()>>,
}

impl Subscriptions {
    fn new() -> Self {
        Self {
            forward_tasks: HashMap::new(),
        }
    }

    fn contains(&self, topic: &Topic) -> bool {
        self.forward_tasks.contains_key(topic)
    }

    fn len(&self) -> usize {
        self.forward_tasks.len()
    }

    fn insert(&mut self, topic: Topic, handle: JoinHandle<()>) {
        self.forward_tasks.insert(topic, handle);
    }

    fn remove(&mut self, topic: &Topic) -> bool {
        if let Some(handle) = self.forward_tasks.remove(topic) {
            handle.abort();
            true
        } else {
            false
        }
    }

    fn topics(&self) -> Vec<Topic> {
        self.forward_tasks.keys().cloned().collect()
    }

    fn abort_all(&mut self) {
        for (_, handle) in self.forward_tasks.drain() {
            handle.abort();
        }
    }
}

/// Forwards outbound frames from the channel onto the socket.
async fn run_send_task(
    connection_id: Uuid,
    mut outbound: mpsc::Receiver<ServerFrame>,
    mut sink: SplitSink<WebSocket, Message>,
    metrics: Arc<ConnectionMetrics>,
) {
    while let Some(frame) = outbound.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    error = %e,
                    "failed to serialize outbound frame"
                );
                metrics.increment_errors();
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(Utf8Bytes::from(text))).await {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                error = %e,
                "failed to send frame, client disconnected"
            );
            break;
        }
        metrics.increment_sent();
    }
}

/// Spawns a task forwarding events for one topic to the outbound channel.
fn spawn_forward_task(
    connection_id: Uuid,
    topic: Topic,
    mut subscriber: dealz_nats::stream::MarketEventSubscriber,
    principal_id: Option<Uuid>,
    outbound: mpsc::Sender<ServerFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = subscriber.next_event().await {
            // Echo prevention: don't reflect a sender's own events.
            if principal_id.is_some() && event.sender_id == principal_id {
                continue;
            }

            let frame = ServerFrame::Event {
                topic: topic.as_str().to_owned(),
                kind: event.kind,
                sender_id: event.sender_id,
                body: event.body,
                timestamp: event.timestamp,
            };

            if outbound.send(frame).await.is_err() {
                tracing::trace!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    topic = %topic,
                    "outbound channel closed, stopping forward task"
                );
                break;
            }
        }
    })
}

/// Handles one client frame after connection establishment.
async fn process_client_frame(
    connection_id: Uuid,
    frame: ClientFrame,
    principal: Option<&Principal>,
    nats_client: &NatsClient,
    subscriptions: &mut Subscriptions,
    outbound: &mpsc::Sender<ServerFrame>,
    metrics: &Arc<ConnectionMetrics>,
) {
    let publisher = nats_client.market_event_publisher();

    match frame {
        ClientFrame::Connect { .. } => {
            // Credentials are only read at establishment; repeated connect
            // frames are dropped, not re-authenticated.
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                "duplicate connect frame dropped"
            );
            metrics.increment_dropped();
        }
        ClientFrame::Subscribe { topic } => {
            let topic: Topic = match topic.parse() {
                Ok(topic) => topic,
                Err(e) => {
                    metrics.increment_dropped();
                    let _ = outbound
                        .send(ServerFrame::Error {
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            if subscriptions.contains(&topic) {
                metrics.increment_dropped();
                return;
            }

            if subscriptions.len() >= MAX_SUBSCRIPTIONS {
                metrics.increment_dropped();
                let _ = outbound
                    .send(ServerFrame::Error {
                        reason: format!("subscription limit of {} reached", MAX_SUBSCRIPTIONS),
                    })
                    .await;
                return;
            }

            let subscriber = match nats_client.market_event_subscriber(&topic).await {
                Ok(subscriber) => subscriber,
                Err(e) => {
                    tracing::error!(
                        target: TRACING_TARGET,
                        connection_id = %connection_id,
                        topic = %topic,
                        error = %e,
                        "failed to subscribe to topic"
                    );
                    metrics.increment_errors();
                    let _ = outbound
                        .send(ServerFrame::Error {
                            reason: "subscription failed".to_string(),
                        })
                        .await;
                    return;
                }
            };

            let handle = spawn_forward_task(
                connection_id,
                topic.clone(),
                subscriber,
                principal.map(|p| p.account_id),
                outbound.clone(),
            );
            subscriptions.insert(topic.clone(), handle);

            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                topic = %topic,
                "subscribed to topic"
            );

            if let Some(principal) = principal {
                if let Err(e) = publisher
                    .publish(&topic, MarketEvent::joined(principal.account_id))
                    .await
                {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        connection_id = %connection_id,
                        error = %e,
                        "failed to publish join event"
                    );
                    metrics.increment_errors();
                } else {
                    metrics.increment_published();
                }
            }
        }
        ClientFrame::Unsubscribe { topic } => {
            let Ok(topic) = topic.parse::<Topic>() else {
                metrics.increment_dropped();
                return;
            };

            if subscriptions.remove(&topic) {
                tracing::debug!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    topic = %topic,
                    "unsubscribed from topic"
                );

                if let Some(principal) = principal
                    && let Err(e) = publisher
                        .publish(&topic, MarketEvent::left(principal.account_id))
                        .await
                {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        connection_id = %connection_id,
                        error = %e,
                        "failed to publish leave event"
                    );
                    metrics.increment_errors();
                }
            }
        }
        ClientFrame::Publish { topic, body } => {
            // Downstream authorization: publishing requires the principal
            // bound at establishment.
            let Some(principal) = principal else {
                tracing::debug!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    "unauthenticated publish dropped"
                );
                metrics.increment_dropped();
                let _ = outbound
                    .send(ServerFrame::Error {
                        reason: "authentication required to publish".to_string(),
                    })
                    .await;
                return;
            };

            let topic: Topic = match topic.parse() {
                Ok(topic) => topic,
                Err(e) => {
                    metrics.increment_dropped();
                    let _ = outbound
                        .send(ServerFrame::Error {
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            let event = MarketEvent::message(Some(principal.account_id), body);
            if let Err(e) = publisher.publish(&topic, event).await {
                tracing::warn!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    topic = %topic,
                    error = %e,
                    "failed to publish message event"
                );
                metrics.increment_errors();
            } else {
                metrics.increment_published();
            }
        }
    }
}

/// Reads the connection-establishment frame.
///
/// Returns `None` when the client closes, times out, or sends something
/// other than a parseable text frame first.
async fn read_connect_frame(
    connection_id: Uuid,
    stream: &mut SplitStream<WebSocket>,
) -> Option<ClientFrame> {
    let first = tokio::time::timeout(CONNECT_TIMEOUT, stream.next()).await;

    let message = match first {
        Ok(Some(Ok(message))) => message,
        Ok(_) => {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                "connection closed before connect frame"
            );
            return None;
        }
        Err(_) => {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                "timed out waiting for connect frame"
            );
            return None;
        }
    };

    let Message::Text(text) = message else {
        tracing::debug!(
            target: TRACING_TARGET,
            connection_id = %connection_id,
            "non-text frame before connect frame"
        );
        return None;
    };

    match serde_json::from_str::<ClientFrame>(&text) {
        Ok(frame @ ClientFrame::Connect { .. }) => Some(frame),
        Ok(_) => {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                "first frame was not a connect frame"
            );
            None
        }
        Err(e) => {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection_id,
                error = %e,
                "unparseable connect frame"
            );
            None
        }
    }
}

/// Handles the connection lifecycle after the HTTP upgrade.
async fn handle_market_socket(
    socket: WebSocket,
    session_keys: SessionKeys,
    pg_client: PgClient,
    nats_client: NatsClient,
) {
    let connection_id = Uuid::new_v4();
    let start_time = std::time::Instant::now();
    let metrics = ConnectionMetrics::new();

    let (sink, mut stream) = socket.split();

    let Some(ClientFrame::Connect { authorization }) =
        read_connect_frame(connection_id, &mut stream).await
    else {
        return;
    };

    // The interceptor fires exactly once per connection.
    let principal = authenticate_connect_frame(
        connection_id,
        authorization.as_deref(),
        &session_keys,
        &pg_client,
    )
    .await;

    let (outbound, outbound_rx) = mpsc::channel::<ServerFrame>(SEND_BUFFER);
    let send_task = tokio::spawn(run_send_task(
        connection_id,
        outbound_rx,
        sink,
        Arc::clone(&metrics),
    ));

    let _ = outbound
        .send(ServerFrame::Connected {
            account_id: principal.as_ref().map(|p| p.account_id),
        })
        .await;

    tracing::info!(
        target: TRACING_TARGET,
        connection_id = %connection_id,
        account = principal.as_ref().map(|p| p.email.as_str()).unwrap_or("<anonymous>"),
        "market channel connection established"
    );

    let mut subscriptions = Subscriptions::new();

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    connection_id = %connection_id,
                    error = %e,
                    "error receiving from websocket"
                );
                metrics.increment_errors();
                break;
            }
        };

        match message {
            Message::Text(text) => {
                metrics.increment_received();

                if text.len() > MAX_FRAME_SIZE {
                    tracing::warn!(
                        target: TRACING_TARGET,
                        connection_id = %connection_id,
                        frame_size = text.len(),
                        "frame exceeds maximum size, dropping"
                    );
                    metrics.increment_dropped();
                    continue;
                }

                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => {
                        process_client_frame(
                            connection_id,
                            frame,
                            principal.as_ref(),
                            &nats_client,
                            &mut subscriptions,
                            &outbound,
                            &metrics,
                        )
                        .await;
                    }
                    Err(e) => {
                        tracing::debug!(
                            target: TRACING_TARGET,
                            connection_id = %connection_id,
                            error = %e,
                            "unparseable frame dropped"
                        );
                        metrics.increment_dropped();
                    }
                }
            }
            Message::Binary(_) => {
                metrics.increment_received();
                metrics.increment_dropped();
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Leave events for every topic the principal was visible on.
    if let Some(principal) = &principal {
        let publisher = nats_client.market_event_publisher();
        for topic in subscriptions.topics() {
            let _ = publisher
                .publish(&topic, MarketEvent::left(principal.account_id))
                .await;
        }
    }

    subscriptions.abort_all();
    send_task.abort();

    tracing::info!(
        target: TRACING_TARGET,
        connection_id = %connection_id,
        duration_ms = start_time.elapsed().as_millis(),
        frames_sent = metrics.frames_sent.load(Ordering::Relaxed),
        frames_received = metrics.frames_received.load(Ordering::Relaxed),
        events_published = metrics.events_published.load(Ordering::Relaxed),
        frames_dropped = metrics.frames_dropped.load(Ordering::Relaxed),
        errors = metrics.errors.load(Ordering::Relaxed),
        "market channel connection closed"
    );
}

/// Upgrades to the market channel.
///
/// The upgrade itself is public; identity is bound by the connect frame.
#[tracing::instrument(skip_all)]
async fn market_websocket_handler(
    State(session_keys): State<SessionKeys>,
    State(pg_client): State<PgClient>,
    State(nats_client): State<NatsClient>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        handle_market_socket(socket, session_keys, pg_client, nats_client)
    })
}

/// Returns a [`Router`] with the market channel route.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> OpenApiRouter<ServiceState> {
    OpenApiRouter::new().route("/ws", axum::routing::get(market_websocket_handler))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_bearer_accepts_exact_scheme() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(parse_bearer("bearer abc"), None);
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
    }

    #[test]
    fn connect_frame_parses_with_and_without_authorization() {
        let with: ClientFrame = serde_json::from_str(
            r#"{"frame":"connect","authorization":"Bearer token-value"}"#,
        )
        .unwrap();
        assert_eq!(
            with,
            ClientFrame::Connect {
                authorization: Some("Bearer token-value".to_string())
            }
        );

        let without: ClientFrame = serde_json::from_str(r#"{"frame":"connect"}"#).unwrap();
        assert_eq!(without, ClientFrame::Connect { authorization: None });
    }

    #[test]
    fn publish_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"frame":"publish","topic":"deals-cs101","body":"textbook for sale"}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Publish {
                topic: "deals-cs101".to_string(),
                body: "textbook for sale".to_string()
            }
        );
    }

    #[test]
    fn unknown_frame_is_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"frame":"disconnect"}"#).is_err());
    }

    #[test]
    fn connected_frame_omits_anonymous_account() {
        let anonymous = serde_json::to_string(&ServerFrame::Connected { account_id: None }).unwrap();
        assert_eq!(anonymous, r#"{"frame":"connected"}"#);

        let bound = serde_json::to_string(&ServerFrame::Connected {
            account_id: Some(Uuid::nil()),
        })
        .unwrap();
        assert!(bound.contains("account_id"));
    }
}
