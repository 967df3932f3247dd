use std::{
    future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures_util::{Sink, SinkExt, StreamExt};
use minesduel_common::{
    models::Game,
    protocol::{Command, Frame, HeartBeat, NegotiatedHeartBeat, game_topic},
};
use tokio::{
    sync::watch,
    time::{self, Instant, Interval},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{ClientConfig, Error, Result};

/// Lifecycle of the realtime subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Subscribed,
    /// Waiting out the fixed delay before the next connection attempt
    Reconnecting,
    Closed,
}

type SnapshotSink = Box<dyn FnMut(Game) + Send>;

/// Upper bound on the UNSUBSCRIBE/DISCONNECT exchange when closing
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared between the manager and the background task of one
/// subscription. Once the sink is cut the task can neither deliver snapshots
/// nor report status.
struct Link {
    sink: Mutex<Option<SnapshotSink>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl Link {
    fn lock(&self) -> MutexGuard<'_, Option<SnapshotSink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, game: Game) -> bool {
        match self.lock().as_mut() {
            Some(sink) => {
                sink(game);
                true
            }
            None => false,
        }
    }

    fn set_status(&self, status: ConnectionStatus) -> bool {
        let sink = self.lock();
        if sink.is_some() {
            self.status.send_replace(status);
        }
        sink.is_some()
    }

    fn is_live(&self) -> bool {
        self.lock().is_some()
    }

    fn cut(&self) {
        self.lock().take();
    }
}

struct ActiveSubscription {
    game_id: String,
    link: Arc<Link>,
    stop: watch::Sender<bool>,
}

/// How a single connection came to an end without an error
enum Ended {
    Dropped,
    Stopped,
}

/// Keeps one live subscription to one game's snapshot topic.
///
/// The connection is re-established after a fixed delay whenever it drops,
/// until [`close`](Self::close) is called or the manager is dropped.
pub struct SubscriptionManager {
    ws_url: String,
    reconnect_delay: Duration,
    heartbeat: Duration,
    status: Arc<watch::Sender<ConnectionStatus>>,
    active: Option<ActiveSubscription>,
}

impl SubscriptionManager {
    pub fn new(ws_url: impl Into<String>, config: &ClientConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            ws_url: ws_url.into(),
            reconnect_delay: config.reconnect_delay,
            heartbeat: config.heartbeat,
            status: Arc::new(status),
            active: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status change.
    ///
    /// Do not hold a `borrow()` of it across [`close`](Self::close): closing
    /// publishes a new status and waits for readers to release the value.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Game of the current subscription
    pub fn game_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.game_id.as_str())
    }

    /// Subscribe to `game_id`, handing every pushed snapshot to
    /// `on_snapshot` in arrival order.
    ///
    /// Any previous subscription is closed first and its callback is never
    /// invoked again. Must be called from within a Tokio runtime.
    pub fn open<F>(&mut self, game_id: &str, on_snapshot: F)
    where
        F: FnMut(Game) + Send + 'static,
    {
        self.close();

        let link = Arc::new(Link {
            sink: Mutex::new(Some(Box::new(on_snapshot))),
            status: self.status.clone(),
        });
        link.set_status(ConnectionStatus::Connecting);
        info!("Opening realtime subscription for game {}", game_id);

        let (stop, stop_rx) = watch::channel(false);
        tokio::spawn(run_subscription(
            self.ws_url.clone(),
            game_id.to_string(),
            self.reconnect_delay,
            self.heartbeat,
            link.clone(),
            stop_rx,
        ));

        self.active = Some(ActiveSubscription {
            game_id: game_id.to_string(),
            link,
            stop,
        });
    }

    /// Stop delivery and leave the topic. No callback runs after this
    /// returns; the background task then unsubscribes, disconnects and closes
    /// the socket. Closing twice, or without ever opening, does nothing.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.link.cut();
            let _ = active.stop.send(true);
            self.status.send_replace(ConnectionStatus::Closed);
            info!("Closed realtime subscription for game {}", active.game_id);
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connect, stream, and reconnect until the link is cut
async fn run_subscription(
    url: String,
    game_id: String,
    reconnect_delay: Duration,
    heartbeat: Duration,
    link: Arc<Link>,
    mut stop: watch::Receiver<bool>,
) {
    let topic = game_topic(&game_id);

    loop {
        match stream_snapshots(&url, &topic, heartbeat, &link, &mut stop).await {
            Ok(Ended::Stopped) => break,
            Ok(Ended::Dropped) => info!("Realtime connection for game {} ended", game_id),
            Err(e) => warn!("Realtime connection for game {} failed: {}", game_id, e),
        }

        if !link.set_status(ConnectionStatus::Reconnecting) {
            break;
        }
        debug!("Reconnecting to {} in {:?}", url, reconnect_delay);
        tokio::select! {
            _ = time::sleep(reconnect_delay) => {}
            _ = stop_requested(&mut stop) => break,
        }

        if !link.set_status(ConnectionStatus::Connecting) {
            break;
        }
    }

    debug!("Subscription task for game {} stopped", game_id);
}

/// Resolves once `close` has been called or the manager is gone
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await.map(|_| ());
}

/// Text carried by a frame-bearing WebSocket message. Binary messages that
/// are not valid UTF-8 are dropped.
fn frame_text(message: &Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_string()),
        Message::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Some(text.to_string()),
            Err(e) => {
                warn!("Dropping binary message that is not UTF-8: {}", e);
                None
            }
        },
        _ => None,
    }
}

/// Leave the STOMP session cleanly: UNSUBSCRIBE (once subscribed),
/// DISCONNECT, then the WebSocket close handshake
async fn shut_down<S>(writer: &mut S, subscription_id: Option<&str>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let goodbye = async {
        if let Some(id) = subscription_id {
            writer
                .send(Message::Text(Frame::unsubscribe(id).encode().into()))
                .await?;
        }
        writer
            .send(Message::Text(Frame::disconnect().encode().into()))
            .await?;
        writer.close().await
    };

    match time::timeout(SHUTDOWN_TIMEOUT, goodbye).await {
        Ok(Ok(())) => debug!("Realtime session closed"),
        Ok(Err(e)) => debug!("Realtime session closed uncleanly: {}", e),
        Err(_) => debug!("Realtime session close timed out"),
    }
}

/// One connection: handshake, subscribe, then deliver snapshots until the
/// server goes away or stops heart-beating
async fn stream_snapshots(
    url: &str,
    topic: &str,
    heartbeat: Duration,
    link: &Link,
    stop: &mut watch::Receiver<bool>,
) -> Result<Ended> {
    let (ws_stream, _) = tokio::select! {
        connected = connect_async(url) => connected?,
        _ = stop_requested(stop) => return Ok(Ended::Stopped),
    };
    debug!("WebSocket connected to {}", url);
    let (mut writer, mut reader) = ws_stream.split();

    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());
    let offered = HeartBeat::symmetric(heartbeat);
    writer
        .send(Message::Text(Frame::connect(&host, offered).encode().into()))
        .await?;

    let negotiated: NegotiatedHeartBeat = 'handshake: loop {
        let message = tokio::select! {
            message = reader.next() => message,
            _ = stop_requested(stop) => {
                shut_down(&mut writer, None).await;
                return Ok(Ended::Stopped);
            }
        };
        let Some(message) = message else {
            return Err(Error::HandshakeClosed);
        };
        let message = message?;
        if let Message::Close(_) = message {
            return Err(Error::HandshakeClosed);
        }
        let Some(text) = frame_text(&message) else {
            continue;
        };

        for frame in Frame::decode_all(&text)? {
            match frame.command {
                Command::Connected => break 'handshake offered.negotiate(frame.heart_beat()?),
                Command::Error => {
                    let reason = frame.get("message").unwrap_or(frame.body.as_str()).to_string();
                    return Err(Error::Broker(reason));
                }
                other => debug!("Ignoring {} frame before CONNECTED", other),
            }
        }
    };
    debug!("STOMP session established, heart-beat {:?}", negotiated);

    let subscription_id = format!("sub-{}", Uuid::new_v4());
    writer
        .send(Message::Text(
            Frame::subscribe(&subscription_id, topic).encode().into(),
        ))
        .await?;
    if !link.set_status(ConnectionStatus::Subscribed) {
        shut_down(&mut writer, Some(&subscription_id)).await;
        return Ok(Ended::Stopped);
    }
    info!("Subscribed to {}", topic);

    let mut send_tick = negotiated
        .send_every
        .map(|every| time::interval_at(Instant::now() + every, every));
    let window = negotiated.liveness_window();
    let mut deadline = window.map(|w| Instant::now() + w);

    loop {
        tokio::select! {
            message = reader.next() => {
                let Some(message) = message else {
                    return Ok(Ended::Dropped);
                };
                let message = message?;
                if let Some(window) = window {
                    deadline = Some(Instant::now() + window);
                }

                if let Message::Close(close) = &message {
                    debug!("Server closed the connection: {:?}", close);
                    return Ok(Ended::Dropped);
                }
                if let Some(text) = frame_text(&message) {
                    handle_frames(&text, topic, link);
                }
                if !link.is_live() {
                    shut_down(&mut writer, Some(&subscription_id)).await;
                    return Ok(Ended::Stopped);
                }
            }
            _ = stop_requested(stop) => {
                shut_down(&mut writer, Some(&subscription_id)).await;
                return Ok(Ended::Stopped);
            }
            _ = next_tick(&mut send_tick) => {
                writer.send(Message::Text(String::from("\n").into())).await?;
            }
            _ = expire(deadline) => {
                return Err(Error::HeartbeatTimeout(window.unwrap_or_default()));
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

/// Deliver every snapshot in a transport message addressed to `topic`. Bad
/// frames, bad snapshots and messages without a destination are logged and
/// dropped.
fn handle_frames(text: &str, topic: &str, link: &Link) {
    let frames = match Frame::decode_all(text) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Dropping malformed frame: {}", e);
            return;
        }
    };

    for frame in frames {
        match frame.command {
            Command::Message => {
                let destination = frame.get("destination");
                if destination != Some(topic) {
                    debug!("Ignoring message for {:?}", destination);
                    continue;
                }
                match serde_json::from_str::<Game>(&frame.body) {
                    Ok(game) => {
                        debug!("Snapshot for game {} received", game.id);
                        link.deliver(game);
                    }
                    Err(e) => warn!("Dropping malformed snapshot on {}: {}", topic, e),
                }
            }
            Command::Error => error!(
                "Broker error: {} {}",
                frame.get("message").unwrap_or_default(),
                frame.body
            ),
            other => debug!("Ignoring {} frame", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_frame(topic: &str, body: &str) -> String {
        Frame::new(Command::Message)
            .header("destination", topic)
            .header("subscription", "sub-1")
            .with_body(body)
            .encode()
    }

    fn recording_link() -> (Arc<Link>, Arc<Mutex<Vec<Game>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        let link = Arc::new(Link {
            sink: Mutex::new(Some(Box::new(move |game: Game| {
                sink_seen.lock().unwrap().push(game)
            }))),
            status: Arc::new(status),
        });
        (link, seen)
    }

    const GAME: &str = r#"{"id":"g1","rows":4,"columns":4,"mineCount":2,"gameOver":false,"currentTurn":"p1","players":[],"board":[]}"#;

    #[test]
    fn delivers_snapshot_for_topic() {
        let (link, seen) = recording_link();
        handle_frames(&snapshot_frame("/topic/games/g1", GAME), "/topic/games/g1", &link);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].id, "g1");
    }

    #[test]
    fn drops_other_topics_and_bad_payloads() {
        let (link, seen) = recording_link();
        let topic = "/topic/games/g1";
        handle_frames(&snapshot_frame("/topic/games/g2", GAME), topic, &link);
        handle_frames(&snapshot_frame(topic, "{\"id\":"), topic, &link);
        handle_frames("GARBAGE\n\n\0", topic, &link);
        handle_frames(
            &Frame::new(Command::Error)
                .header("message", "nope")
                .encode(),
            topic,
            &link,
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn drops_messages_without_destination() {
        let (link, seen) = recording_link();
        let undirected = Frame::new(Command::Message)
            .header("subscription", "sub-1")
            .with_body(GAME)
            .encode();
        handle_frames(&undirected, "/topic/games/g1", &link);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn binary_frames_must_be_utf8() {
        let frame = snapshot_frame("/topic/games/g1", GAME);
        let valid = frame.clone().into_bytes();
        assert_eq!(
            frame_text(&Message::Binary(valid.into())).as_deref(),
            Some(frame.as_str())
        );

        // A single invalid byte inside the turn holder's id
        let mut corrupted = frame.into_bytes();
        let at = corrupted.windows(2).position(|w| w == b"p1").unwrap();
        corrupted[at + 1] = 0xFF;
        assert!(frame_text(&Message::Binary(corrupted.into())).is_none());
    }

    #[test]
    fn cut_link_stops_delivery_and_status() {
        let (link, seen) = recording_link();
        assert!(link.set_status(ConnectionStatus::Subscribed));
        assert_eq!(*link.status.borrow(), ConnectionStatus::Subscribed);

        link.cut();
        assert!(!link.is_live());
        assert!(!link.set_status(ConnectionStatus::Reconnecting));
        assert_eq!(*link.status.borrow(), ConnectionStatus::Subscribed);

        handle_frames(&snapshot_frame("/topic/games/g1", GAME), "/topic/games/g1", &link);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn close_without_open_is_noop() {
        let mut manager = SubscriptionManager::new("ws://127.0.0.1:9/ws", &ClientConfig::default());
        manager.close();
        manager.close();
        assert_eq!(manager.status(), ConnectionStatus::Idle);
        assert!(manager.game_id().is_none());
    }

    #[tokio::test]
    async fn unreachable_server_keeps_retrying_until_closed() {
        let config = ClientConfig::default().with_reconnect_delay(Duration::from_millis(20));
        // Port 9 (discard) is not expected to accept connections
        let mut manager = SubscriptionManager::new("ws://127.0.0.1:9/ws", &config);
        let mut status = manager.watch_status();

        manager.open("g1", |_| {});
        assert_eq!(manager.game_id(), Some("g1"));

        // The watch guard must be released before close publishes again
        let reconnecting = time::timeout(Duration::from_secs(5), async {
            status
                .wait_for(|s| *s == ConnectionStatus::Reconnecting)
                .await
                .map(|_| ())
        })
        .await;
        assert!(matches!(reconnecting, Ok(Ok(()))));

        manager.close();
        assert_eq!(manager.status(), ConnectionStatus::Closed);
        time::sleep(Duration::from_millis(60)).await;
        assert_eq!(manager.status(), ConnectionStatus::Closed);
    }
}
