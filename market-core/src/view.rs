use crate::countdown::Countdown;
use crate::model::{
    Auction, AuctionStatus, Bid, BidAck, ChatMessage, PaymentState, RoomSummary, TimestampMs,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Raw configuration payload passed to views.
#[derive(Clone, Debug)]
pub struct ViewConfig {
    raw: Value,
}

impl ViewConfig {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.raw.clone())?)
    }
}

/// `ViewContext` exposes engine services to views during runtime.
#[derive(Clone)]
pub struct ViewContext {
    actions: Arc<dyn Actions>,
}

impl ViewContext {
    pub fn new(actions: Arc<dyn Actions>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> Arc<dyn Actions> {
        self.actions.clone()
    }
}

/// Subscription / initialisation directives emitted by `View::on_start`.
#[derive(Clone, Debug, Default)]
pub struct StartAction {
    pub subscribe_rooms: bool,
    pub watch_balance: bool,
    pub watch_auctions: Vec<String>,
    pub watch_orders: Vec<String>,
    pub priming_requests: Vec<PrimingRequest>,
}

#[derive(Clone, Debug)]
pub enum PrimingRequest {
    SyncRooms,
    SyncBalance,
    Custom(String),
}

pub type BidResult = Result<BidAck>;

pub type BidCallback = Arc<dyn Fn(BidResult) + Send + Sync + 'static>;

pub type SendResult = Result<ChatMessage>;

pub type SendCallback = Arc<dyn Fn(SendResult) + Send + Sync + 'static>;

pub type RoomResult = Result<RoomSummary>;

pub type RoomCallback = Arc<dyn Fn(RoomResult) + Send + Sync + 'static>;

#[derive(Clone, Debug)]
pub struct PlaceBidRequest {
    pub auction_id: String,
    pub amount: i64,
    pub client_ref: Option<String>,
}

impl PlaceBidRequest {
    pub fn new<S: Into<String>>(auction_id: S, amount: i64) -> Self {
        Self {
            auction_id: auction_id.into(),
            amount,
            client_ref: None,
        }
    }

    pub fn with_client_ref<S: Into<String>>(mut self, client_ref: S) -> Self {
        self.client_ref = Some(client_ref.into());
        self
    }
}

/// View trait with synchronous data callbacks.
#[async_trait]
pub trait View: Send + Sync {
    fn new(config: ViewConfig) -> Result<Self>
    where
        Self: Sized;

    async fn on_start(&mut self, ctx: &ViewContext) -> Result<StartAction>;

    fn on_room_index(&mut self, _rooms: &[RoomSummary]) {}

    fn on_room_messages(&mut self, _room_id: &str, _messages: &[ChatMessage]) {}

    fn on_balance_change(&mut self, _previous: i64, _next: i64) {}

    fn on_payment_settled(&mut self, _payment: &PaymentState) {}

    fn on_auction_update(&mut self, _auction: &Auction) {}

    fn on_countdown(&mut self, _auction_id: &str, _remaining: &Countdown) {}

    fn on_session_ended(&mut self) {}

    fn on_timer(&mut self, _now_ms: TimestampMs) {}
}

/// Action interface exposed to views; submissions are callback-style so a
/// view never blocks its own event loop.
#[async_trait]
pub trait Actions: Send + Sync {
    async fn fetch_auction(&self, auction_id: &str) -> Result<Auction>;

    async fn fetch_bids(&self, auction_id: &str) -> Result<Vec<Bid>>;

    fn place_bid(&self, request: PlaceBidRequest, callback: BidCallback) -> Result<()>;

    fn buy_now(&self, auction_id: &str, callback: BidCallback) -> Result<()>;

    fn send_message(&self, room_id: &str, text: &str, callback: SendCallback) -> Result<()>;

    fn start_conversation(&self, peer_id: &str, callback: RoomCallback) -> Result<()>;

    async fn open_room(&self, room_id: Option<String>) -> Result<()>;

    fn now_ms(&self) -> TimestampMs;
}

/// Convenience actions implementation that panics on use.
#[derive(Clone, Default)]
pub struct NullActions;

#[async_trait]
impl Actions for NullActions {
    async fn fetch_auction(&self, _auction_id: &str) -> Result<Auction> {
        panic!("NullActions should not be used");
    }

    async fn fetch_bids(&self, _auction_id: &str) -> Result<Vec<Bid>> {
        panic!("NullActions should not be used");
    }

    fn place_bid(&self, _request: PlaceBidRequest, _callback: BidCallback) -> Result<()> {
        panic!("NullActions should not be used");
    }

    fn buy_now(&self, _auction_id: &str, _callback: BidCallback) -> Result<()> {
        panic!("NullActions should not be used");
    }

    fn send_message(&self, _room_id: &str, _text: &str, _callback: SendCallback) -> Result<()> {
        panic!("NullActions should not be used");
    }

    fn start_conversation(&self, _peer_id: &str, _callback: RoomCallback) -> Result<()> {
        panic!("NullActions should not be used");
    }

    async fn open_room(&self, _room_id: Option<String>) -> Result<()> {
        panic!("NullActions should not be used");
    }

    fn now_ms(&self) -> TimestampMs {
        panic!("NullActions should not be used");
    }
}

/// Helper for translating wire status strings into the enum.
pub fn parse_auction_status(status: &str) -> AuctionStatus {
    match status.to_lowercase().as_str() {
        "scheduled" => AuctionStatus::Scheduled,
        "active" => AuctionStatus::Active,
        "ended" => AuctionStatus::Ended,
        "cancelled" | "canceled" => AuctionStatus::Cancelled,
        "settled" => AuctionStatus::Settled,
        _ => AuctionStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_accepts_both_spellings() {
        assert_eq!(parse_auction_status("CANCELLED"), AuctionStatus::Cancelled);
        assert_eq!(parse_auction_status("canceled"), AuctionStatus::Cancelled);
        assert_eq!(parse_auction_status("Settled"), AuctionStatus::Settled);
        assert_eq!(parse_auction_status("unknown"), AuctionStatus::Active);
    }
}
