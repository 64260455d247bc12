use market_core::countdown::Countdown;
use market_core::model::{Amount, Auction, ChatMessage, RoomSummary};
use market_core::ordering::quick_bid_amount;

#[derive(Clone, Default)]
pub struct RoomListState {
    pub rooms: Vec<RoomSummary>,
    pub selected: usize,
}

impl RoomListState {
    /// Replace the sidebar contents, keeping the cursor on the same room
    /// when it is still present.
    pub fn apply(&mut self, rooms: Vec<RoomSummary>) {
        let keep = self
            .rooms
            .get(self.selected)
            .map(|r| r.room_id.clone())
            .and_then(|id| rooms.iter().position(|r| r.room_id == id));
        self.rooms = rooms;
        self.selected = keep.unwrap_or(0).min(self.rooms.len().saturating_sub(1));
    }

    pub fn selected_room(&self) -> Option<&RoomSummary> {
        self.rooms.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.rooms.is_empty() && self.selected + 1 < self.rooms.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

#[derive(Clone, Default)]
pub struct MessagePaneState {
    pub room_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl MessagePaneState {
    pub fn open(&mut self, room_id: String) {
        if self.room_id.as_deref() != Some(room_id.as_str()) {
            self.room_id = Some(room_id);
            self.messages.clear();
        }
    }

    pub fn apply(&mut self, room_id: &str, messages: Vec<ChatMessage>) {
        if self.room_id.as_deref() == Some(room_id) {
            self.messages = messages;
        }
    }

    /// Shown for an open room with no history yet.
    pub fn placeholder(&self) -> Option<&'static str> {
        match (&self.room_id, self.messages.is_empty()) {
            (Some(_), true) => Some("Start the conversation"),
            _ => None,
        }
    }
}

#[derive(Clone, Default)]
pub struct AuctionPanelState {
    pub auction: Option<Auction>,
    pub countdown: Countdown,
}

impl AuctionPanelState {
    pub fn apply_auction(&mut self, auction: Auction) {
        self.auction = Some(auction);
    }

    pub fn apply_countdown(&mut self, auction_id: &str, countdown: &Countdown) {
        if self
            .auction
            .as_ref()
            .map(|a| a.id == auction_id)
            .unwrap_or(false)
        {
            self.countdown = *countdown;
        }
    }

    /// The countdown freezes at zero on its own, but the auction is only
    /// truly over when the server says so; until then the clock-derived
    /// flag renders as "ending".
    pub fn display_ended(&self) -> bool {
        self.countdown.ended
            || self
                .auction
                .as_ref()
                .map(|a| a.status.is_terminal())
                .unwrap_or(false)
    }

    pub fn awaiting_server_close(&self) -> bool {
        self.countdown.ended
            && self
                .auction
                .as_ref()
                .map(|a| !a.status.is_terminal())
                .unwrap_or(false)
    }

    pub fn quick_bid(&self) -> Option<Amount> {
        self.auction
            .as_ref()
            .map(|a| quick_bid_amount(a.current_price, a.min_bid_increment))
    }
}

#[derive(Clone, Default)]
pub struct WalletPanelState {
    pub balance: Option<Amount>,
    pub toast: Option<String>,
}

impl WalletPanelState {
    /// Balance updates land unconditionally; the toast only accompanies
    /// the edge the poller reported.
    pub fn apply_increase(&mut self, previous: Amount, next: Amount) {
        self.balance = Some(next);
        self.toast = Some(format!("Balance increased: {} → {}", previous, next));
    }

    pub fn dismiss_toast(&mut self) {
        self.toast = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::model::AuctionStatus;

    fn auction(status: AuctionStatus) -> Auction {
        Auction {
            id: "a1".to_string(),
            listing_id: "l1".to_string(),
            status,
            starting_price: 1_000_000,
            current_price: 1_000_000,
            min_bid_increment: 100_000,
            buy_now_price: None,
            end_time: 0,
            bid_count: 0,
        }
    }

    #[test]
    fn clock_end_does_not_override_server_status() {
        let mut panel = AuctionPanelState::default();
        panel.apply_auction(auction(AuctionStatus::Active));
        panel.apply_countdown("a1", &Countdown {
            ended: true,
            ..Countdown::default()
        });
        assert!(panel.display_ended());
        assert!(panel.awaiting_server_close(), "server still says active");

        panel.apply_auction(auction(AuctionStatus::Ended));
        assert!(panel.display_ended());
        assert!(!panel.awaiting_server_close());
    }

    #[test]
    fn countdown_for_other_auctions_is_ignored() {
        let mut panel = AuctionPanelState::default();
        panel.apply_auction(auction(AuctionStatus::Active));
        panel.apply_countdown("other", &Countdown {
            ended: true,
            ..Countdown::default()
        });
        assert!(!panel.countdown.ended);
    }

    #[test]
    fn quick_bid_tracks_current_price() {
        let mut panel = AuctionPanelState::default();
        assert_eq!(panel.quick_bid(), None);
        panel.apply_auction(auction(AuctionStatus::Active));
        assert_eq!(panel.quick_bid(), Some(1_100_000));
    }

    #[test]
    fn placeholder_only_for_open_empty_rooms() {
        let mut pane = MessagePaneState::default();
        assert_eq!(pane.placeholder(), None, "no room open");
        pane.open("r1".to_string());
        assert_eq!(pane.placeholder(), Some("Start the conversation"));
        pane.apply(
            "r1",
            vec![ChatMessage {
                id: "m1".to_string(),
                sender_id: "u1".to_string(),
                text: "hi".to_string(),
                timestamp: 1,
            }],
        );
        assert_eq!(pane.placeholder(), None);
    }

    #[test]
    fn sidebar_keeps_cursor_on_selected_room() {
        let room = |id: &str, ts: i64| RoomSummary {
            room_id: id.to_string(),
            participants: vec![],
            peer_name: None,
            last_message_text: None,
            last_message_ts: Some(ts),
        };
        let mut list = RoomListState::default();
        list.apply(vec![room("r1", 3), room("r2", 2)]);
        list.select_next();
        assert_eq!(list.selected_room().unwrap().room_id, "r2");

        // a newer room arrives on top; the cursor follows r2
        list.apply(vec![room("r9", 9), room("r1", 3), room("r2", 2)]);
        assert_eq!(list.selected_room().unwrap().room_id, "r2");
    }
}
