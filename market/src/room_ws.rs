use crate::{config::RealtimeConfig, push_parser::parse_push_bytes};
use anyhow::Result;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use market_core::{model::ChatEvent, ports::RoomStream};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Live subscriber over the push store. Two keys exist: the room index
/// (keyed by user id) and the currently open room (keyed by room id);
/// each key owns one background connection task, and re-subscribing a key
/// replaces its task, so at most one subscription per key is ever live.
#[derive(Clone)]
pub struct RoomWs {
    url: Arc<Url>,
    cfg: RealtimeConfig,
    tx: mpsc::Sender<ChatEvent>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ChatEvent>>>,
    index_task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
    room_task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
    user_id: Arc<RwLock<Option<String>>>,
    room_id: Arc<RwLock<Option<String>>>,
}

impl RoomWs {
    pub fn new(cfg: &RealtimeConfig) -> Result<Self> {
        let (tx, rx) = mpsc::channel(10_000);
        Ok(Self {
            url: Arc::new(Url::parse(&cfg.ws_url)?),
            cfg: cfg.clone(),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            index_task: Arc::new(tokio::sync::Mutex::new(None)),
            room_task: Arc::new(tokio::sync::Mutex::new(None)),
            user_id: Arc::new(RwLock::new(None)),
            room_id: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn close(&self) -> Result<()> {
        if let Some(h) = self.index_task.lock().await.take() {
            h.abort();
        }
        if let Some(h) = self.room_task.lock().await.take() {
            h.abort();
        }
        Ok(())
    }

    fn spawn_topic_task(
        &self,
        prefix: &'static str,
        key: Arc<RwLock<Option<String>>>,
    ) -> JoinHandle<()> {
        let url = self.url.clone();
        let tx = self.tx.clone();
        let heartbeat = Duration::from_secs(self.cfg.heartbeat_secs.max(1));
        let pong_timeout = Duration::from_secs(self.cfg.pong_timeout_secs.max(1));
        let max_backoff = Duration::from_secs(self.cfg.max_backoff_secs.max(1));
        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                // snapshot the current key; re-read on every reconnect
                let topic = match key.read().await.clone() {
                    Some(k) => format!("{}/{}", prefix, k),
                    None => {
                        sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                };
                tracing::info!(target: "room_ws", topic = %topic, "connecting to {}", url);
                match connect_async(url.as_str()).await {
                    Ok((mut stream, _)) => {
                        tracing::info!(target: "room_ws", topic = %topic, "connected");
                        let sub_body = serde_json::json!({
                            "action": "subscribe",
                            "topic": topic,
                        });
                        if let Ok(sub_text) = serde_json::to_string(&sub_body) {
                            if let Err(e) = stream.send(Message::Text(sub_text)).await {
                                tracing::warn!(target: "room_ws", "send subscribe failed: {}", e);
                            } else {
                                tracing::info!(target: "room_ws", topic = %topic, "subscribed");
                            }
                        }
                        backoff = Duration::from_secs(1); // reset backoff on success
                        let mut hb = tokio::time::interval(heartbeat);
                        let mut last_pong = std::time::Instant::now();
                        loop {
                            tokio::select! {
                                _ = hb.tick() => {
                                    if let Err(e) = stream.send(Message::Ping(Vec::new())).await {
                                        tracing::warn!(target: "room_ws", "ping send failed: {}", e);
                                        break;
                                    }
                                    if last_pong.elapsed() > pong_timeout {
                                        tracing::warn!(target: "room_ws", "pong timeout, reconnecting");
                                        break;
                                    }
                                }
                                msg = stream.next() => {
                                    match msg {
                                        Some(Ok(Message::Text(text))) => {
                                            if let Some(events) = parse_push_bytes(text.as_bytes()) {
                                                // try_send: a receiver torn down mid-flight just drops the frame
                                                for e in events { let _ = tx.try_send(e); }
                                            } else {
                                                let sample = if text.len() > 300 { &text[..300] } else { &text };
                                                tracing::debug!(target: "room_ws", "unparsed text msg: {}", sample);
                                            }
                                        }
                                        Some(Ok(Message::Binary(bin))) => {
                                            if let Some(events) = parse_push_bytes(&bin) {
                                                for e in events { let _ = tx.try_send(e); }
                                            } else {
                                                tracing::debug!(target: "room_ws", "unparsed binary msg: {} bytes", bin.len());
                                            }
                                        }
                                        Some(Ok(Message::Ping(payload))) => { let _ = stream.send(Message::Pong(payload)).await; }
                                        Some(Ok(Message::Pong(_))) => { last_pong = std::time::Instant::now(); }
                                        Some(Ok(Message::Close(_))) => { tracing::warn!(target: "room_ws", "server closed"); break; }
                                        Some(Err(e)) => { tracing::warn!(target: "room_ws", "recv error: {}", e); break; }
                                        Some(Ok(_)) => {}
                                        None => { tracing::warn!(target: "room_ws", "stream ended"); break; }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target: "room_ws", "connect failed: {}", e);
                    }
                }
                tracing::info!(target: "room_ws", topic = %topic, "reconnecting in {:?}", backoff);
                sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        })
    }
}

#[async_trait]
impl RoomStream for RoomWs {
    async fn subscribe_rooms(&self, user_id: String) -> Result<()> {
        {
            let mut w = self.user_id.write().await;
            *w = Some(user_id);
        }
        // replace any previous index subscription
        if let Some(h) = self.index_task.lock().await.take() {
            h.abort();
        }
        let handle = self.spawn_topic_task("userChatRooms", self.user_id.clone());
        *self.index_task.lock().await = Some(handle);
        Ok(())
    }

    async fn open_room(&self, room_id: Option<String>) -> Result<()> {
        let has_room = room_id.is_some();
        {
            let mut w = self.room_id.write().await;
            *w = room_id;
        }
        // key change or unmount tears the previous subscription down
        if let Some(h) = self.room_task.lock().await.take() {
            h.abort();
        }
        if has_room {
            let handle = self.spawn_topic_task("chatRooms", self.room_id.clone());
            *self.room_task.lock().await = Some(handle);
        }
        Ok(())
    }

    async fn next(&self) -> Result<Option<ChatEvent>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }
}
