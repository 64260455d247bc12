use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TimestampMs = i64;

/// Money is integer minor units; the marketplace quotes whole-unit prices
/// and never fractions them.
pub type Amount = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub role: UserRole,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// The unit of login/logout: a bearer token plus the cached profile it
/// belongs to. Cleared as one piece on logout or 401.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Active,
    Sold,
    Hidden,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: Amount,
    pub seller_id: String,
    pub status: ListingStatus,
    #[serde(default)]
    pub created_at: TimestampMs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingQuery {
    pub keyword: Option<String>,
    pub seller_id: Option<String>,
    pub status: Option<ListingStatus>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
    Settled,
}

impl AuctionStatus {
    /// Terminal states never transition again; the backend owns all
    /// transitions and the client only observes them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuctionStatus::Ended | AuctionStatus::Cancelled | AuctionStatus::Settled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: String,
    pub listing_id: String,
    pub status: AuctionStatus,
    pub starting_price: Amount,
    pub current_price: Amount,
    pub min_bid_increment: Amount,
    #[serde(default)]
    pub buy_now_price: Option<Amount>,
    pub end_time: TimestampMs,
    #[serde(default)]
    pub bid_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: Amount,
    #[serde(default)]
    pub created_at: TimestampMs,
}

/// Ack for bid / buy-now submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidAck {
    pub success: bool,
    pub error_message: Option<String>,
    pub bid_id: Option<String>,
    pub new_price: Option<Amount>,
}

impl BidAck {
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            bid_id: None,
            new_price: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: TimestampMs,
}

/// Room entry as shown in the sidebar: two participants, the display name
/// of the other one once resolved, and last-message metadata for ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub peer_name: Option<String>,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default, alias = "lastMessageTimestamp")]
    pub last_message_ts: Option<TimestampMs>,
}

impl RoomSummary {
    /// The participant that is not `user_id`, if the room is well formed.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != user_id)
    }
}

/// Full-state push of one room; `messages` arrive in the store's native
/// key order, not necessarily chronological.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub participants: Vec<String>,
    #[serde(default)]
    pub last_message_text: Option<String>,
    #[serde(default, alias = "lastMessageTimestamp")]
    pub last_message_ts: Option<TimestampMs>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Events yielded by the realtime room stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ChatEvent {
    RoomIds {
        user_id: String,
        room_ids: Vec<String>,
    },
    Room {
        room_id: String,
        snapshot: RoomSnapshot,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentState {
    pub order_id: String,
    pub paid: bool,
    #[serde(default)]
    pub amount: Amount,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Purchase,
    Sale,
    Fee,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub kind: TransactionKind,
    pub amount: Amount,
    pub status: TransactionStatus,
    #[serde(default)]
    pub created_at: TimestampMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSchedule {
    pub sale_fee_bps: u32,
    pub withdrawal_fee: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub listing_id: String,
    pub reviewer_id: String,
    pub rating: u8,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub created_at: TimestampMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub target_listing_id: String,
    pub reporter_id: String,
    pub reason: String,
    #[serde(default)]
    pub created_at: TimestampMs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    pub listing_id: String,
    #[serde(default)]
    pub added_at: TimestampMs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub user_count: u64,
    pub listing_count: u64,
    pub auction_count: u64,
    pub settled_volume: Amount,
    pub open_reports: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientStats {
    pub polls_run: u64,
    pub poll_failures: u64,
    pub ws_events: u64,
    pub notifications_fired: u64,
}

pub fn new_client_ref() -> String {
    Uuid::new_v4().to_string()
}
