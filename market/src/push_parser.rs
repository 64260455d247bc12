use market_core::model::{ChatEvent, ChatMessage, RoomSnapshot};
use serde_json::Value;

/// Frames from the push store are full-state snapshots addressed by path:
/// `userChatRooms/{userId}` carries the room-id set, `chatRooms/{roomId}`
/// carries one room. Frames may arrive singly or batched in an array;
/// anything unparseable is dropped by the caller.
pub fn parse_push_bytes(bytes: &[u8]) -> Option<Vec<ChatEvent>> {
    if bytes.is_empty() {
        return None;
    }
    match bytes[0] {
        b'{' => parse_one(bytes).map(|e| vec![e]),
        b'[' => parse_many(bytes),
        _ => None,
    }
}

fn parse_many(bytes: &[u8]) -> Option<Vec<ChatEvent>> {
    let vals: Value = serde_json::from_slice(bytes).ok()?;
    let arr = vals.as_array()?;
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        if let Some(obj) = v.as_object() {
            if let Some(ev) = parse_frame(obj) {
                out.push(ev);
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn parse_one(bytes: &[u8]) -> Option<ChatEvent> {
    let val: Value = serde_json::from_slice(bytes).ok()?;
    let obj = val.as_object()?;
    parse_frame(obj)
}

fn parse_frame(obj: &serde_json::Map<String, Value>) -> Option<ChatEvent> {
    let path = obj.get("path")?.as_str()?;
    let data = obj.get("data")?;
    let (prefix, key) = path.split_once('/')?;
    match prefix {
        "userChatRooms" => Some(ChatEvent::RoomIds {
            user_id: key.to_string(),
            room_ids: parse_id_set(data),
        }),
        "chatRooms" => {
            let snapshot = room_snapshot_from_value(data)?;
            Some(ChatEvent::Room {
                room_id: key.to_string(),
                snapshot,
            })
        }
        _ => None,
    }
}

/// Id sets come as `{id: true, ...}` maps or plain arrays.
fn parse_id_set(data: &Value) -> Vec<String> {
    match data {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !matches!(v, Value::Bool(false) | Value::Null))
            .map(|(k, _)| k.clone())
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Shared with the REST room endpoint, which returns the same store shape.
pub fn room_snapshot_from_value(data: &Value) -> Option<RoomSnapshot> {
    let obj = data.as_object()?;
    let participants = match obj.get("participants") {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    };
    let last_message_text = obj
        .get("lastMessageText")
        .and_then(Value::as_str)
        .map(|s| s.to_string());
    let last_message_ts = obj.get("lastMessageTimestamp").and_then(opt_i64);
    let messages = match obj.get("messages") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(id, m)| message_from_value(id, m))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|m| {
                let id = m.get("id").and_then(Value::as_str)?;
                message_from_value(id, m)
            })
            .collect(),
        _ => Vec::new(),
    };
    Some(RoomSnapshot {
        participants,
        last_message_text,
        last_message_ts,
        messages,
    })
}

fn message_from_value(id: &str, value: &Value) -> Option<ChatMessage> {
    let obj = value.as_object()?;
    let sender_id = obj.get("senderId").and_then(Value::as_str)?.to_string();
    let text = obj.get("text").and_then(Value::as_str)?.to_string();
    // timestamp falls back to creation time when the store has not yet
    // stamped the message
    let timestamp = obj
        .get("timestamp")
        .and_then(opt_i64)
        .or_else(|| obj.get("createdAt").and_then(opt_i64))
        .unwrap_or(0);
    Some(ChatMessage {
        id: id.to_string(),
        sender_id,
        text,
        timestamp,
    })
}

fn opt_i64(v: &Value) -> Option<i64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_room_id_set_from_map_and_array() {
        let frame = json!({
            "path": "userChatRooms/u1",
            "data": { "r1": true, "r2": true, "r3": false }
        });
        let events = parse_push_bytes(frame.to_string().as_bytes()).unwrap();
        match &events[0] {
            ChatEvent::RoomIds { user_id, room_ids } => {
                assert_eq!(user_id, "u1");
                let mut ids = room_ids.clone();
                ids.sort();
                assert_eq!(ids, ["r1", "r2"]);
            }
            other => panic!("unexpected event {:?}", other),
        }

        let frame = json!({ "path": "userChatRooms/u2", "data": ["r9"] });
        let events = parse_push_bytes(frame.to_string().as_bytes()).unwrap();
        match &events[0] {
            ChatEvent::RoomIds { room_ids, .. } => assert_eq!(room_ids, &["r9"]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn parses_room_snapshot_with_message_map() {
        let frame = json!({
            "path": "chatRooms/r1",
            "data": {
                "participants": { "u1": true, "u2": true },
                "lastMessageText": "see you there",
                "lastMessageTimestamp": 1000,
                "messages": {
                    "m1": { "senderId": "u1", "text": "hi", "timestamp": 500 },
                    "m2": { "senderId": "u2", "text": "see you there", "createdAt": 1000 }
                }
            }
        });
        let events = parse_push_bytes(frame.to_string().as_bytes()).unwrap();
        match &events[0] {
            ChatEvent::Room { room_id, snapshot } => {
                assert_eq!(room_id, "r1");
                assert_eq!(snapshot.participants.len(), 2);
                assert_eq!(snapshot.last_message_ts, Some(1000));
                assert_eq!(snapshot.messages.len(), 2);
                let m2 = snapshot.messages.iter().find(|m| m.id == "m2").unwrap();
                assert_eq!(m2.timestamp, 1000, "createdAt fallback");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn batched_frames_yield_multiple_events() {
        let frames = json!([
            { "path": "userChatRooms/u1", "data": { "r1": true } },
            { "path": "chatRooms/r1", "data": { "participants": { "u1": true, "u2": true } } }
        ]);
        let events = parse_push_bytes(frames.to_string().as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn messages_missing_required_fields_are_dropped() {
        let data = json!({
            "participants": { "u1": true, "u2": true },
            "messages": {
                "ok": { "senderId": "u1", "text": "hello", "timestamp": 1 },
                "no_sender": { "text": "??", "timestamp": 2 }
            }
        });
        let snapshot = room_snapshot_from_value(&data).unwrap();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].id, "ok");
    }

    #[test]
    fn junk_frames_are_rejected() {
        assert!(parse_push_bytes(b"").is_none());
        assert!(parse_push_bytes(b"ping").is_none());
        assert!(parse_push_bytes(br#"{"path": "presence/u1", "data": {}}"#).is_none());
    }
}
