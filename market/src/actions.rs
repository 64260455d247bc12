use crate::chat::RoomDirectory;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use market_core::{
    metrics::Metrics,
    model::{Auction, Bid, BidAck, TimestampMs},
    ordering::bid_meets_increment,
    ports::{AuctionApi, ChatApi, RoomStream},
    view::{Actions, BidCallback, PlaceBidRequest, RoomCallback, SendCallback},
};
use std::sync::Arc;

pub fn now_ms() -> TimestampMs {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Action dispatch behind the `Actions` seam: submissions are spawned and
/// reported through callbacks so the calling view never blocks.
pub struct ViewActions<A, S>
where
    A: AuctionApi + ChatApi + Send + Sync + 'static,
    S: RoomStream + 'static,
{
    api: Arc<A>,
    stream: Arc<S>,
    directory: Arc<RoomDirectory>,
    watched_auctions: Arc<DashMap<String, Auction>>,
    metrics: Arc<Metrics>,
}

impl<A, S> ViewActions<A, S>
where
    A: AuctionApi + ChatApi + Send + Sync + 'static,
    S: RoomStream + 'static,
{
    pub fn new(
        api: Arc<A>,
        stream: Arc<S>,
        directory: Arc<RoomDirectory>,
        watched_auctions: Arc<DashMap<String, Auction>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            api,
            stream,
            directory,
            watched_auctions,
            metrics,
        }
    }
}

impl<A, S> Clone for ViewActions<A, S>
where
    A: AuctionApi + ChatApi + Send + Sync + 'static,
    S: RoomStream + 'static,
{
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            stream: self.stream.clone(),
            directory: self.directory.clone(),
            watched_auctions: self.watched_auctions.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[async_trait]
impl<A, S> Actions for ViewActions<A, S>
where
    A: AuctionApi + ChatApi + Send + Sync + 'static,
    S: RoomStream + 'static,
{
    async fn fetch_auction(&self, auction_id: &str) -> Result<Auction> {
        let auction = self.api.fetch_auction(auction_id).await?;
        self.watched_auctions
            .insert(auction.id.clone(), auction.clone());
        Ok(auction)
    }

    async fn fetch_bids(&self, auction_id: &str) -> Result<Vec<Bid>> {
        self.api.fetch_bids(auction_id).await
    }

    fn place_bid(&self, request: PlaceBidRequest, callback: BidCallback) -> Result<()> {
        // the increment gate runs against the last observed auction state,
        // before any network call
        let gate = self
            .watched_auctions
            .get(&request.auction_id)
            .map(|known| (known.current_price, known.min_bid_increment));
        if let Some((current_price, min_increment)) = gate {
            if !bid_meets_increment(request.amount, current_price, min_increment) {
                self.metrics.bids_rejected.inc();
                (callback)(Ok(BidAck::rejected(format!(
                    "bid must be at least {}",
                    current_price + min_increment
                ))));
                return Ok(());
            }
        }
        self.metrics.bids_sent.inc();
        let api = self.api.clone();
        let watched = self.watched_auctions.clone();
        tokio::spawn(async move {
            tracing::debug!(
                target: "actions",
                auction = %request.auction_id,
                amount = %request.amount,
                client_ref = ?request.client_ref,
                "submitting bid"
            );
            let result = api.place_bid(&request.auction_id, request.amount).await;
            if let Ok(ack) = &result {
                if ack.success {
                    if let Some(new_price) = ack.new_price {
                        if let Some(mut entry) = watched.get_mut(&request.auction_id) {
                            entry.current_price = new_price;
                            entry.bid_count += 1;
                        }
                    }
                }
            }
            (callback)(result);
        });
        Ok(())
    }

    fn buy_now(&self, auction_id: &str, callback: BidCallback) -> Result<()> {
        let api = self.api.clone();
        let auction_id = auction_id.to_string();
        tokio::spawn(async move {
            (callback)(api.buy_now(&auction_id).await);
        });
        Ok(())
    }

    fn send_message(&self, room_id: &str, text: &str, callback: SendCallback) -> Result<()> {
        let api = self.api.clone();
        let room_id = room_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            (callback)(api.send_message(&room_id, &text).await);
        });
        Ok(())
    }

    fn start_conversation(&self, peer_id: &str, callback: RoomCallback) -> Result<()> {
        let api = self.api.clone();
        let stream = self.stream.clone();
        let directory = self.directory.clone();
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            let result = api.ensure_room(&peer_id).await;
            if let Ok(room) = &result {
                directory.insert_and_select(room.clone());
                if let Err(err) = stream.open_room(Some(room.room_id.clone())).await {
                    tracing::warn!(target: "actions", ?err, "open_room after create failed");
                }
            }
            (callback)(result);
        });
        Ok(())
    }

    async fn open_room(&self, room_id: Option<String>) -> Result<()> {
        self.directory.select(room_id.clone());
        self.stream.open_room(room_id).await
    }

    fn now_ms(&self) -> TimestampMs {
        now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::model::*;
    use prometheus::Registry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MockApi {
        bids_received: AtomicUsize,
    }

    #[async_trait]
    impl AuctionApi for MockApi {
        async fn list_auctions(&self) -> Result<Vec<Auction>> {
            Ok(vec![])
        }
        async fn fetch_auction(&self, _auction_id: &str) -> Result<Auction> {
            unimplemented!()
        }
        async fn fetch_bids(&self, _auction_id: &str) -> Result<Vec<Bid>> {
            Ok(vec![])
        }
        async fn place_bid(&self, _auction_id: &str, amount: Amount) -> Result<BidAck> {
            self.bids_received.fetch_add(1, Ordering::SeqCst);
            Ok(BidAck {
                success: true,
                error_message: None,
                bid_id: Some("b1".to_string()),
                new_price: Some(amount),
            })
        }
        async fn buy_now(&self, _auction_id: &str) -> Result<BidAck> {
            Ok(BidAck {
                success: true,
                error_message: None,
                bid_id: None,
                new_price: None,
            })
        }
        async fn cancel_auction(&self, _auction_id: &str) -> Result<()> {
            Ok(())
        }
        async fn settle_auction(&self, _auction_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ChatApi for MockApi {
        async fn fetch_rooms(&self) -> Result<Vec<RoomSummary>> {
            Ok(vec![])
        }
        async fn fetch_room(&self, _room_id: &str) -> Result<RoomSnapshot> {
            Ok(RoomSnapshot::default())
        }
        async fn ensure_room(&self, peer_id: &str) -> Result<RoomSummary> {
            Ok(RoomSummary {
                room_id: format!("room-{}", peer_id),
                participants: vec!["me".to_string(), peer_id.to_string()],
                peer_name: None,
                last_message_text: None,
                last_message_ts: Some(1),
            })
        }
        async fn send_message(&self, room_id: &str, text: &str) -> Result<ChatMessage> {
            Ok(ChatMessage {
                id: "m1".to_string(),
                sender_id: "me".to_string(),
                text: format!("{}:{}", room_id, text),
                timestamp: 1,
            })
        }
    }

    #[derive(Default)]
    struct MockStream;

    #[async_trait]
    impl RoomStream for MockStream {
        async fn subscribe_rooms(&self, _user_id: String) -> Result<()> {
            Ok(())
        }
        async fn open_room(&self, _room_id: Option<String>) -> Result<()> {
            Ok(())
        }
        async fn next(&self) -> Result<Option<ChatEvent>> {
            Ok(None)
        }
    }

    fn sample_auction() -> Auction {
        Auction {
            id: "a1".to_string(),
            listing_id: "l1".to_string(),
            status: AuctionStatus::Active,
            starting_price: 1_000_000,
            current_price: 1_000_000,
            min_bid_increment: 100_000,
            buy_now_price: None,
            end_time: i64::MAX,
            bid_count: 0,
        }
    }

    fn actions(api: Arc<MockApi>) -> ViewActions<MockApi, MockStream> {
        let watched = Arc::new(DashMap::new());
        watched.insert("a1".to_string(), sample_auction());
        ViewActions::new(
            api,
            Arc::new(MockStream),
            RoomDirectory::new(),
            watched,
            Metrics::new(&Registry::new()),
        )
    }

    #[tokio::test]
    async fn low_bid_is_rejected_before_any_network_call() {
        let api = Arc::new(MockApi::default());
        let actions = actions(api.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cb: BidCallback = Arc::new(move |res| {
            tx.send(res).unwrap();
        });

        actions
            .place_bid(PlaceBidRequest::new("a1", 1_050_000), cb)
            .unwrap();
        let ack = rx.recv().await.unwrap().unwrap();
        assert!(!ack.success);
        assert_eq!(
            ack.error_message.as_deref(),
            Some("bid must be at least 1100000")
        );
        assert_eq!(api.bids_received.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sufficient_bid_goes_out_and_updates_the_watched_price() {
        let api = Arc::new(MockApi::default());
        let actions = actions(api.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cb: BidCallback = Arc::new(move |res| {
            tx.send(res).unwrap();
        });

        actions
            .place_bid(PlaceBidRequest::new("a1", 1_100_000), cb)
            .unwrap();
        let ack = rx.recv().await.unwrap().unwrap();
        assert!(ack.success);
        assert_eq!(api.bids_received.load(Ordering::SeqCst), 1);
        assert_eq!(
            actions.watched_auctions.get("a1").unwrap().current_price,
            1_100_000
        );
    }

    #[tokio::test]
    async fn start_conversation_selects_the_new_room() {
        let api = Arc::new(MockApi::default());
        let actions = actions(api.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cb: RoomCallback = Arc::new(move |res| {
            tx.send(res).unwrap();
        });

        actions.start_conversation("u9", cb).unwrap();
        let room = rx.recv().await.unwrap().unwrap();
        assert_eq!(room.room_id, "room-u9");
        assert_eq!(actions.directory.selected().as_deref(), Some("room-u9"));
    }
}
