use anyhow::Result;
use async_trait::async_trait;
use market_core::{
    countdown::Countdown,
    model::{Auction, ChatMessage, PaymentState, RoomSummary},
    view::{PrimingRequest, StartAction, View, ViewConfig, ViewContext},
};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub watch_auctions: Vec<String>,
    #[serde(default)]
    pub watch_orders: Vec<String>,
    #[serde(default = "default_watch_balance")]
    pub watch_balance: bool,
}

fn default_watch_balance() -> bool {
    true
}

/// Headless view: logs every observed transition. Useful for soaking the
/// engine against a live backend without a terminal front end.
pub struct MonitorView {
    cfg: MonitorConfig,
    rooms_seen: usize,
}

#[async_trait]
impl View for MonitorView {
    fn new(config: ViewConfig) -> Result<Self> {
        let cfg: MonitorConfig = config.deserialize().unwrap_or_default();
        Ok(Self {
            cfg,
            rooms_seen: 0,
        })
    }

    async fn on_start(&mut self, _ctx: &ViewContext) -> Result<StartAction> {
        info!(
            target: "monitor",
            auctions = %self.cfg.watch_auctions.len(),
            orders = %self.cfg.watch_orders.len(),
            balance = %self.cfg.watch_balance,
            "monitor starting"
        );
        Ok(StartAction {
            subscribe_rooms: true,
            watch_balance: self.cfg.watch_balance,
            watch_auctions: self.cfg.watch_auctions.clone(),
            watch_orders: self.cfg.watch_orders.clone(),
            priming_requests: vec![PrimingRequest::SyncRooms, PrimingRequest::SyncBalance],
        })
    }

    fn on_room_index(&mut self, rooms: &[RoomSummary]) {
        if rooms.len() != self.rooms_seen {
            self.rooms_seen = rooms.len();
            info!(target: "monitor", rooms = %rooms.len(), "room index updated");
        }
    }

    fn on_room_messages(&mut self, room_id: &str, messages: &[ChatMessage]) {
        info!(target: "monitor", room = %room_id, count = %messages.len(), "room messages");
    }

    fn on_balance_change(&mut self, previous: i64, next: i64) {
        info!(target: "monitor", previous = %previous, next = %next, "balance increased");
    }

    fn on_payment_settled(&mut self, payment: &PaymentState) {
        info!(target: "monitor", order = %payment.order_id, amount = %payment.amount, "payment settled");
    }

    fn on_auction_update(&mut self, auction: &Auction) {
        info!(
            target: "monitor",
            auction = %auction.id,
            price = %auction.current_price,
            bids = %auction.bid_count,
            status = ?auction.status,
            "auction moved"
        );
    }

    fn on_countdown(&mut self, auction_id: &str, remaining: &Countdown) {
        if remaining.ended {
            info!(target: "monitor", auction = %auction_id, "countdown reached zero");
        }
    }

    fn on_session_ended(&mut self) {
        warn!(target: "monitor", "session ended; shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::view::NullActions;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn start_action_mirrors_config() {
        let config = ViewConfig::new(json!({
            "watch_auctions": ["a1", "a2"],
            "watch_orders": ["o1"],
        }));
        let mut view = MonitorView::new(config).unwrap();
        let ctx = ViewContext::new(Arc::new(NullActions));
        let start = view.on_start(&ctx).await.unwrap();
        assert!(start.subscribe_rooms);
        assert!(start.watch_balance);
        assert_eq!(start.watch_auctions, ["a1", "a2"]);
        assert_eq!(start.watch_orders, ["o1"]);
    }

    #[test]
    fn empty_config_defaults_to_balance_only() {
        let view = MonitorView::new(ViewConfig::new(json!({}))).unwrap();
        assert!(view.cfg.watch_balance);
        assert!(view.cfg.watch_auctions.is_empty());
    }
}
