use std::cmp::Ordering;

use crate::model::{Amount, ChatMessage, RoomSummary};

/// Sidebar order: most recent message first; rooms that have never seen a
/// message (no timestamp) sort after every room that has one.
pub fn sort_rooms(rooms: &mut [RoomSummary]) {
    rooms.sort_by(|a, b| match (a.last_message_ts, b.last_message_ts) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Chronological order for the message pane. The sort is stable, so equal
/// timestamps keep the snapshot's insertion order.
pub fn sort_messages(messages: &mut [ChatMessage]) {
    messages.sort_by_key(|m| m.timestamp);
}

/// Suggested quick-bid: one increment over the current price.
pub fn quick_bid_amount(current_price: Amount, min_increment: Amount) -> Amount {
    current_price + min_increment
}

/// Client-side gate applied before any network call.
pub fn bid_meets_increment(amount: Amount, current_price: Amount, min_increment: Amount) -> bool {
    amount >= current_price + min_increment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str, ts: Option<i64>) -> RoomSummary {
        RoomSummary {
            room_id: id.to_string(),
            participants: vec!["a".into(), "b".into()],
            peer_name: None,
            last_message_text: None,
            last_message_ts: ts,
        }
    }

    fn msg(id: &str, ts: i64) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            sender_id: "a".to_string(),
            text: String::new(),
            timestamp: ts,
        }
    }

    #[test]
    fn rooms_sort_most_recent_first() {
        let mut rooms = vec![room("r1", Some(10)), room("r2", Some(30)), room("r3", Some(20))];
        sort_rooms(&mut rooms);
        let ids: Vec<_> = rooms.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(ids, ["r2", "r3", "r1"]);
    }

    #[test]
    fn rooms_without_timestamp_sort_last() {
        let mut rooms = vec![room("fresh", None), room("old", Some(1)), room("new", Some(2))];
        sort_rooms(&mut rooms);
        let ids: Vec<_> = rooms.iter().map(|r| r.room_id.as_str()).collect();
        assert_eq!(ids, ["new", "old", "fresh"]);
    }

    #[test]
    fn messages_sort_ascending_regardless_of_key_order() {
        let mut messages = vec![msg("m3", 300), msg("m1", 100), msg("m2", 200)];
        sort_messages(&mut messages);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let mut messages = vec![msg("first", 100), msg("second", 100), msg("third", 100)];
        sort_messages(&mut messages);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    #[test]
    fn message_sort_is_idempotent() {
        let mut once = vec![msg("b", 2), msg("a", 1), msg("c", 2)];
        sort_messages(&mut once);
        let mut twice = once.clone();
        sort_messages(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn quick_bid_is_one_increment_over() {
        assert_eq!(quick_bid_amount(1_000_000, 100_000), 1_100_000);
    }

    #[test]
    fn increment_gate() {
        assert!(!bid_meets_increment(1_050_000, 1_000_000, 100_000));
        assert!(bid_meets_increment(1_100_000, 1_000_000, 100_000));
        assert!(bid_meets_increment(1_200_000, 1_000_000, 100_000));
    }
}
