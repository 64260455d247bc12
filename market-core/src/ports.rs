use crate::model::*;
use async_trait::async_trait;

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> anyhow::Result<Session>;
    async fn register(&self, username: &str, password: &str) -> anyhow::Result<UserProfile>;
    async fn fetch_me(&self) -> anyhow::Result<UserProfile>;
}

/// Secondary lookup used by the room directory; implementations sit behind
/// a per-user-id cache so repeated resolutions do not refetch.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn fetch_display_name(&self, user_id: &str) -> anyhow::Result<String>;
}

#[async_trait]
pub trait WalletApi: Send + Sync {
    async fn fetch_balance(&self) -> anyhow::Result<Amount>;
    async fn request_deposit(&self, amount: Amount) -> anyhow::Result<Transaction>;
    async fn request_withdrawal(&self, amount: Amount) -> anyhow::Result<Transaction>;
    async fn fetch_transactions(&self) -> anyhow::Result<Vec<Transaction>>;
    async fn fetch_fee_schedule(&self) -> anyhow::Result<FeeSchedule>;
    async fn fetch_order(&self, order_id: &str) -> anyhow::Result<PaymentState>;
}

#[async_trait]
pub trait ListingApi: Send + Sync {
    async fn list_listings(&self, query: &ListingQuery) -> anyhow::Result<Vec<Listing>>;
    async fn fetch_listing(&self, listing_id: &str) -> anyhow::Result<Listing>;
    async fn create_listing(&self, listing: &Listing) -> anyhow::Result<Listing>;
    async fn update_listing(&self, listing: &Listing) -> anyhow::Result<Listing>;
    async fn delete_listing(&self, listing_id: &str) -> anyhow::Result<()>;
    async fn fetch_wishlist(&self) -> anyhow::Result<Vec<WishlistItem>>;
    async fn add_to_wishlist(&self, listing_id: &str) -> anyhow::Result<()>;
    async fn remove_from_wishlist(&self, listing_id: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AuctionApi: Send + Sync {
    async fn list_auctions(&self) -> anyhow::Result<Vec<Auction>>;
    async fn fetch_auction(&self, auction_id: &str) -> anyhow::Result<Auction>;
    async fn fetch_bids(&self, auction_id: &str) -> anyhow::Result<Vec<Bid>>;
    async fn place_bid(&self, auction_id: &str, amount: Amount) -> anyhow::Result<BidAck>;
    async fn buy_now(&self, auction_id: &str) -> anyhow::Result<BidAck>;
    async fn cancel_auction(&self, auction_id: &str) -> anyhow::Result<()>;
    async fn settle_auction(&self, auction_id: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CommunityApi: Send + Sync {
    async fn list_reviews(&self, listing_id: &str) -> anyhow::Result<Vec<Review>>;
    async fn submit_review(&self, listing_id: &str, rating: u8, body: &str)
        -> anyhow::Result<Review>;
    async fn submit_report(&self, listing_id: &str, reason: &str) -> anyhow::Result<Report>;
}

#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_users(&self) -> anyhow::Result<Vec<UserProfile>>;
    async fn set_user_active(&self, user_id: &str, active: bool) -> anyhow::Result<UserProfile>;
    async fn list_reports(&self) -> anyhow::Result<Vec<Report>>;
    async fn fetch_summary(&self) -> anyhow::Result<AnalyticsSummary>;
}

/// Chat writes go through REST; the push store is read-only to the client.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_rooms(&self) -> anyhow::Result<Vec<RoomSummary>>;
    async fn fetch_room(&self, room_id: &str) -> anyhow::Result<RoomSnapshot>;
    async fn ensure_room(&self, peer_id: &str) -> anyhow::Result<RoomSummary>;
    async fn send_message(&self, room_id: &str, text: &str) -> anyhow::Result<ChatMessage>;
}

/// Live view over the push store. Re-subscribing a key replaces the
/// previous subscription, so at most one is live per key at any time.
#[async_trait]
pub trait RoomStream: Send + Sync {
    async fn subscribe_rooms(&self, user_id: String) -> anyhow::Result<()>;
    async fn open_room(&self, room_id: Option<String>) -> anyhow::Result<()>;
    async fn next(&self) -> anyhow::Result<Option<ChatEvent>>;
}

// Snapshot ports consumed by the pollers.
#[async_trait]
pub trait BalanceSnapshot: Send + Sync {
    async fn snapshot_balance(&self) -> anyhow::Result<Amount>;
}

#[async_trait]
impl<T: WalletApi + ?Sized> BalanceSnapshot for T {
    async fn snapshot_balance(&self) -> anyhow::Result<Amount> {
        self.fetch_balance().await
    }
}

#[async_trait]
pub trait PaymentSnapshot: Send + Sync {
    async fn snapshot_payment(&self, order_id: &str) -> anyhow::Result<PaymentState>;
}

#[async_trait]
impl<T: WalletApi + ?Sized> PaymentSnapshot for T {
    async fn snapshot_payment(&self, order_id: &str) -> anyhow::Result<PaymentState> {
        self.fetch_order(order_id).await
    }
}

#[async_trait]
pub trait AuctionSnapshot: Send + Sync {
    async fn snapshot_auction(&self, auction_id: &str) -> anyhow::Result<Auction>;
}

#[async_trait]
impl<T: AuctionApi + ?Sized> AuctionSnapshot for T {
    async fn snapshot_auction(&self, auction_id: &str) -> anyhow::Result<Auction> {
        self.fetch_auction(auction_id).await
    }
}
