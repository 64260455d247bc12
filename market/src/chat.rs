use dashmap::DashMap;
use market_core::{
    model::{ChatMessage, RoomSnapshot, RoomSummary},
    ordering::{sort_messages, sort_rooms},
    ports::{ChatApi, ProfileApi},
};
use parking_lot::RwLock;
use std::sync::Arc;

/// Client-side view of the user's rooms plus the open room's messages.
/// Fed by index snapshots (room-id sets) and per-room snapshots; all
/// applications are idempotent, so replaying an unchanged snapshot yields
/// an identical ordered result.
#[derive(Default)]
pub struct RoomDirectory {
    rooms: DashMap<String, RoomSummary>,
    name_cache: DashMap<String, String>,
    selected: RwLock<Option<String>>,
    messages: RwLock<Vec<ChatMessage>>,
}

impl RoomDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Resolve an index snapshot into displayable summaries: fetch room
    /// metadata, resolve the peer's display name (cached per user id),
    /// drop rooms missing required fields, and sort by recency.
    pub async fn resolve_room_ids<C, P>(
        &self,
        chat: &C,
        profiles: &P,
        user_id: &str,
        room_ids: &[String],
    ) -> Vec<RoomSummary>
    where
        C: ChatApi + ?Sized,
        P: ProfileApi + ?Sized,
    {
        for room_id in room_ids {
            let snapshot = match chat.fetch_room(room_id).await {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(target: "chat", room = %room_id, ?err, "room metadata fetch failed");
                    continue;
                }
            };
            let mut summary = RoomSummary {
                room_id: room_id.clone(),
                participants: snapshot.participants.clone(),
                peer_name: None,
                last_message_text: snapshot.last_message_text.clone(),
                last_message_ts: snapshot.last_message_ts,
            };
            // a room is renderable only with both participants present
            let peer = match summary.peer_of(user_id) {
                Some(p) if summary.participants.len() == 2 => p.to_string(),
                _ => {
                    tracing::debug!(target: "chat", room = %room_id, "dropping room with incomplete participants");
                    continue;
                }
            };
            summary.peer_name = Some(self.resolve_peer_name(profiles, &peer).await);
            self.rooms.insert(room_id.clone(), summary);
        }
        self.sorted_rooms()
    }

    async fn resolve_peer_name<P: ProfileApi + ?Sized>(&self, profiles: &P, peer_id: &str) -> String {
        if let Some(name) = self.name_cache.get(peer_id) {
            return name.clone();
        }
        match profiles.fetch_display_name(peer_id).await {
            Ok(name) => {
                self.name_cache.insert(peer_id.to_string(), name.clone());
                name
            }
            Err(err) => {
                tracing::warn!(target: "chat", peer = %peer_id, ?err, "display name lookup failed");
                peer_id.to_string()
            }
        }
    }

    /// Apply a full room snapshot. Updates sidebar metadata; when the room
    /// is the open one, returns the fresh chronological message list.
    pub fn apply_room_snapshot(
        &self,
        room_id: &str,
        snapshot: RoomSnapshot,
    ) -> Option<Vec<ChatMessage>> {
        if let Some(mut entry) = self.rooms.get_mut(room_id) {
            entry.last_message_text = snapshot.last_message_text.clone();
            entry.last_message_ts = snapshot.last_message_ts;
            if !snapshot.participants.is_empty() {
                entry.participants = snapshot.participants.clone();
            }
        }
        if self.selected.read().as_deref() != Some(room_id) {
            return None;
        }
        let mut messages = snapshot.messages;
        sort_messages(&mut messages);
        *self.messages.write() = messages.clone();
        Some(messages)
    }

    pub fn sorted_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self.rooms.iter().map(|e| e.value().clone()).collect();
        sort_rooms(&mut rooms);
        rooms
    }

    pub fn upsert_room(&self, room: RoomSummary) {
        self.rooms.insert(room.room_id.clone(), room);
    }

    /// Insert a freshly created room (first contact) and select it.
    pub fn insert_and_select(&self, room: RoomSummary) {
        let room_id = room.room_id.clone();
        self.upsert_room(room);
        self.select(Some(room_id));
    }

    pub fn select(&self, room_id: Option<String>) {
        *self.selected.write() = room_id;
        self.messages.write().clear();
    }

    pub fn selected(&self) -> Option<String> {
        self.selected.read().clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    pub fn cached_name(&self, user_id: &str) -> Option<String> {
        self.name_cache.get(user_id).map(|n| n.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use market_core::model::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockBackend {
        rooms: DashMap<String, RoomSnapshot>,
        name_lookups: AtomicUsize,
    }

    #[async_trait]
    impl ChatApi for MockBackend {
        async fn fetch_rooms(&self) -> Result<Vec<RoomSummary>> {
            Ok(vec![])
        }

        async fn fetch_room(&self, room_id: &str) -> Result<RoomSnapshot> {
            self.rooms
                .get(room_id)
                .map(|s| s.clone())
                .ok_or_else(|| anyhow::anyhow!("no room {}", room_id))
        }

        async fn ensure_room(&self, peer_id: &str) -> Result<RoomSummary> {
            // server stamps last activity at creation time
            Ok(RoomSummary {
                room_id: format!("room-{}", peer_id),
                participants: vec!["me".to_string(), peer_id.to_string()],
                peer_name: None,
                last_message_text: None,
                last_message_ts: Some(9_999),
            })
        }

        async fn send_message(&self, _room_id: &str, _text: &str) -> Result<ChatMessage> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl ProfileApi for MockBackend {
        async fn fetch_display_name(&self, user_id: &str) -> Result<String> {
            self.name_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(format!("name-of-{}", user_id))
        }
    }

    fn snapshot(peer: &str, ts: Option<i64>) -> RoomSnapshot {
        RoomSnapshot {
            participants: vec!["me".to_string(), peer.to_string()],
            last_message_text: ts.map(|_| "hey".to_string()),
            last_message_ts: ts,
            messages: vec![],
        }
    }

    fn msg(id: &str, ts: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: "me".to_string(),
            text: "x".to_string(),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn resolves_and_sorts_rooms_most_recent_first() {
        let backend = MockBackend::default();
        backend.rooms.insert("r1".into(), snapshot("u2", Some(100)));
        backend.rooms.insert("r2".into(), snapshot("u3", Some(300)));
        backend.rooms.insert("r3".into(), snapshot("u4", None));

        let dir = RoomDirectory::new();
        let rooms = dir
            .resolve_room_ids(
                &backend,
                &backend,
                "me",
                &["r1".into(), "r2".into(), "r3".into()],
            )
            .await;
        let ids: Vec<_> = rooms.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(ids, ["r2", "r1", "r3"], "missing timestamp sorts last");
        assert_eq!(rooms[0].peer_name.as_deref(), Some("name-of-u3"));
    }

    #[tokio::test]
    async fn malformed_rooms_are_filtered_out() {
        let backend = MockBackend::default();
        backend.rooms.insert(
            "solo".into(),
            RoomSnapshot {
                participants: vec!["me".to_string()],
                ..RoomSnapshot::default()
            },
        );
        backend.rooms.insert("ok".into(), snapshot("u2", Some(5)));

        let dir = RoomDirectory::new();
        let rooms = dir
            .resolve_room_ids(&backend, &backend, "me", &["solo".into(), "ok".into()])
            .await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, "ok");
    }

    #[tokio::test]
    async fn display_names_are_cached_per_user() {
        let backend = MockBackend::default();
        backend.rooms.insert("r1".into(), snapshot("u2", Some(1)));

        let dir = RoomDirectory::new();
        dir.resolve_room_ids(&backend, &backend, "me", &["r1".into()])
            .await;
        dir.resolve_room_ids(&backend, &backend, "me", &["r1".into()])
            .await;
        assert_eq!(backend.name_lookups.load(Ordering::SeqCst), 1);
        assert_eq!(dir.cached_name("u2").as_deref(), Some("name-of-u2"));
    }

    #[tokio::test]
    async fn snapshot_application_sorts_and_is_idempotent() {
        let dir = RoomDirectory::new();
        dir.select(Some("r1".to_string()));

        let snap = RoomSnapshot {
            participants: vec!["me".into(), "u2".into()],
            last_message_text: Some("late".into()),
            last_message_ts: Some(300),
            messages: vec![msg("m3", 300), msg("m1", 100), msg("m2", 200)],
        };
        let first = dir.apply_room_snapshot("r1", snap.clone()).unwrap();
        let ids: Vec<_> = first.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);

        let second = dir.apply_room_snapshot("r1", snap).unwrap();
        assert_eq!(first, second, "re-applying an unchanged snapshot is a no-op");
    }

    #[tokio::test]
    async fn snapshots_for_unselected_rooms_update_sidebar_only() {
        let dir = RoomDirectory::new();
        dir.select(Some("other".to_string()));
        let out = dir.apply_room_snapshot(
            "r1",
            RoomSnapshot {
                messages: vec![msg("m1", 1)],
                ..RoomSnapshot::default()
            },
        );
        assert!(out.is_none());
        assert!(dir.messages().is_empty());
    }

    #[tokio::test]
    async fn first_contact_creates_selects_and_sorts_first() {
        let backend = MockBackend::default();
        backend.rooms.insert("r1".into(), snapshot("u2", Some(100)));

        let dir = RoomDirectory::new();
        dir.resolve_room_ids(&backend, &backend, "me", &["r1".into()])
            .await;

        // no room with u9 yet; initiating contact creates one
        let room = backend.ensure_room("u9").await.unwrap();
        dir.insert_and_select(room.clone());

        let rooms = dir.sorted_rooms();
        assert_eq!(rooms[0].room_id, room.room_id, "new room sorts first");
        assert_eq!(dir.selected().as_deref(), Some(room.room_id.as_str()));
        assert!(dir.messages().is_empty(), "empty list until first message");
    }
}
