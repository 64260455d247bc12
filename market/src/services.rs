use crate::{
    envelope::{self, collection, unwrap_data},
    http_pool::{HttpPool, HttpResponse},
    push_parser::room_snapshot_from_value,
    session::SessionStore,
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use market_core::{model::*, ports::*};
use serde_json::{json, Value};
use std::sync::Arc;
use urlencoding::encode;

fn parse_i64_field(value: Option<&Value>) -> Result<i64> {
    let val = value.ok_or_else(|| anyhow!("missing number field"))?;
    match val {
        Value::String(s) => s
            .parse::<i64>()
            .with_context(|| format!("parse i64 from string '{}'", s)),
        Value::Number(n) => n.as_i64().ok_or_else(|| anyhow!("invalid integer")),
        _ => Err(anyhow!("unexpected type for number field")),
    }
}

/// Success → json body; failure → error carrying the server message when
/// one is present. Callers surface these unmodified.
fn json_body(resp: HttpResponse) -> Result<Value> {
    if !resp.is_success() {
        let msg = resp
            .json
            .as_ref()
            .and_then(envelope::error_message)
            .or(resp.text)
            .unwrap_or_default();
        bail!("http {}: {}", resp.status, msg);
    }
    resp.json.ok_or_else(|| anyhow!("no json body"))
}

fn expect_success(resp: HttpResponse) -> Result<()> {
    if resp.is_success() {
        return Ok(());
    }
    let msg = resp
        .json
        .as_ref()
        .and_then(envelope::error_message)
        .or(resp.text)
        .unwrap_or_default();
    bail!("http {}: {}", resp.status, msg);
}

fn decode<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(serde_json::from_value(unwrap_data(value).clone())?)
}

fn decode_collection<T: serde::de::DeserializeOwned>(value: &Value, name: &str) -> Result<Vec<T>> {
    Ok(serde_json::from_value(collection(value, name).clone())?)
}

fn parse_balance(value: &Value) -> Result<Amount> {
    let data = unwrap_data(value);
    if let Some(balance) = data.get("balance") {
        return parse_i64_field(Some(balance));
    }
    parse_i64_field(Some(data))
}

/// Bid/buy-now submissions come back as an ack; a 4xx other than 401 is a
/// rejected ack (surfaced inline by the caller), not a transport error.
fn parse_bid_ack(resp: HttpResponse) -> Result<BidAck> {
    if (400..500).contains(&resp.status) && resp.status != 401 {
        let msg = resp
            .json
            .as_ref()
            .and_then(envelope::error_message)
            .or(resp.text)
            .unwrap_or_else(|| "bid rejected".to_string());
        return Ok(BidAck::rejected(msg));
    }
    let body = json_body(resp)?;
    let data = unwrap_data(&body);
    Ok(BidAck {
        success: true,
        error_message: None,
        bid_id: data
            .get("bidId")
            .or_else(|| data.get("id"))
            .and_then(Value::as_str)
            .map(|s| s.to_string()),
        new_price: data
            .get("newPrice")
            .or_else(|| data.get("currentPrice"))
            .and_then(|v| parse_i64_field(Some(v)).ok()),
    })
}

#[derive(Clone)]
pub struct HttpMarketplace {
    pool: Arc<HttpPool>,
    session: SessionStore,
}

impl HttpMarketplace {
    pub fn new(pool: Arc<HttpPool>, session: SessionStore) -> Self {
        Self { pool, session }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn listing_path(query: &ListingQuery) -> String {
        let mut params = Vec::new();
        if let Some(keyword) = query.keyword.as_deref() {
            params.push(format!("keyword={}", encode(keyword)));
        }
        if let Some(seller) = query.seller_id.as_deref() {
            params.push(format!("sellerId={}", encode(seller)));
        }
        if let Some(status) = query.status {
            let status = serde_json::to_value(status)
                .ok()
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .unwrap_or_default();
            params.push(format!("status={}", status));
        }
        if let Some(page) = query.page {
            params.push(format!("page={}", page));
        }
        if let Some(size) = query.page_size {
            params.push(format!("pageSize={}", size));
        }
        if params.is_empty() {
            "/listings".to_string()
        } else {
            format!("/listings?{}", params.join("&"))
        }
    }
}

#[async_trait]
impl AuthApi for HttpMarketplace {
    async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let body = json!({ "username": username, "password": password });
        let resp = self.pool.post("/auth/login", None, Some(&body)).await?;
        let body = json_body(resp)?;
        let session: Session = decode(&body)?;
        // subsequent calls carry the bearer token
        self.session.install(session.clone());
        Ok(session)
    }

    async fn register(&self, username: &str, password: &str) -> Result<UserProfile> {
        let body = json!({ "username": username, "password": password });
        let resp = self.pool.post("/auth/register", None, Some(&body)).await?;
        decode(&json_body(resp)?)
    }

    async fn fetch_me(&self) -> Result<UserProfile> {
        let resp = self.pool.get("/auth/me", None).await?;
        decode(&json_body(resp)?)
    }
}

#[async_trait]
impl ProfileApi for HttpMarketplace {
    async fn fetch_display_name(&self, user_id: &str) -> Result<String> {
        let resp = self
            .pool
            .get(&format!("/auth/users/{}", user_id), None)
            .await?;
        let body = json_body(resp)?;
        let profile: UserProfile = decode(&body)?;
        Ok(profile.username)
    }
}

#[async_trait]
impl WalletApi for HttpMarketplace {
    async fn fetch_balance(&self) -> Result<Amount> {
        let resp = self.pool.get("/auth/wallet/balance", None).await?;
        parse_balance(&json_body(resp)?)
    }

    async fn request_deposit(&self, amount: Amount) -> Result<Transaction> {
        let body = json!({ "amount": amount });
        let resp = self
            .pool
            .post("/transactions/deposits", None, Some(&body))
            .await?;
        decode(&json_body(resp)?)
    }

    async fn request_withdrawal(&self, amount: Amount) -> Result<Transaction> {
        let body = json!({ "amount": amount });
        let resp = self
            .pool
            .post("/transactions/withdrawals", None, Some(&body))
            .await?;
        decode(&json_body(resp)?)
    }

    async fn fetch_transactions(&self) -> Result<Vec<Transaction>> {
        let resp = self.pool.get("/transactions", None).await?;
        decode_collection(&json_body(resp)?, "transactions")
    }

    async fn fetch_fee_schedule(&self) -> Result<FeeSchedule> {
        let resp = self.pool.get("/transactions/fees", None).await?;
        decode(&json_body(resp)?)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<PaymentState> {
        let resp = self
            .pool
            .get(&format!("/transactions/orders/{}", order_id), None)
            .await?;
        decode(&json_body(resp)?)
    }
}

#[async_trait]
impl ListingApi for HttpMarketplace {
    async fn list_listings(&self, query: &ListingQuery) -> Result<Vec<Listing>> {
        let resp = self.pool.get(&Self::listing_path(query), None).await?;
        decode_collection(&json_body(resp)?, "listings")
    }

    async fn fetch_listing(&self, listing_id: &str) -> Result<Listing> {
        let resp = self
            .pool
            .get(&format!("/listings/{}", listing_id), None)
            .await?;
        decode(&json_body(resp)?)
    }

    async fn create_listing(&self, listing: &Listing) -> Result<Listing> {
        let body = serde_json::to_value(listing)?;
        let resp = self.pool.post("/listings", None, Some(&body)).await?;
        decode(&json_body(resp)?)
    }

    async fn update_listing(&self, listing: &Listing) -> Result<Listing> {
        let body = serde_json::to_value(listing)?;
        let resp = self
            .pool
            .put(&format!("/listings/{}", listing.id), None, Some(&body))
            .await?;
        decode(&json_body(resp)?)
    }

    async fn delete_listing(&self, listing_id: &str) -> Result<()> {
        let resp = self
            .pool
            .delete(&format!("/listings/{}", listing_id), None, None)
            .await?;
        expect_success(resp)
    }

    async fn fetch_wishlist(&self) -> Result<Vec<WishlistItem>> {
        let resp = self.pool.get("/wishlist", None).await?;
        decode_collection(&json_body(resp)?, "wishlist")
    }

    async fn add_to_wishlist(&self, listing_id: &str) -> Result<()> {
        let body = json!({ "listingId": listing_id });
        let resp = self.pool.post("/wishlist", None, Some(&body)).await?;
        expect_success(resp)
    }

    async fn remove_from_wishlist(&self, listing_id: &str) -> Result<()> {
        let resp = self
            .pool
            .delete(&format!("/wishlist/{}", listing_id), None, None)
            .await?;
        expect_success(resp)
    }
}

#[async_trait]
impl AuctionApi for HttpMarketplace {
    async fn list_auctions(&self) -> Result<Vec<Auction>> {
        let resp = self.pool.get("/auctions", None).await?;
        decode_collection(&json_body(resp)?, "auctions")
    }

    async fn fetch_auction(&self, auction_id: &str) -> Result<Auction> {
        let resp = self
            .pool
            .get(&format!("/auctions/{}", auction_id), None)
            .await?;
        decode(&json_body(resp)?)
    }

    async fn fetch_bids(&self, auction_id: &str) -> Result<Vec<Bid>> {
        let resp = self
            .pool
            .get(&format!("/auctions/{}/bids", auction_id), None)
            .await?;
        decode_collection(&json_body(resp)?, "bids")
    }

    async fn place_bid(&self, auction_id: &str, amount: Amount) -> Result<BidAck> {
        let body = json!({ "amount": amount });
        let resp = self
            .pool
            .post(&format!("/auctions/{}/bids", auction_id), None, Some(&body))
            .await?;
        parse_bid_ack(resp)
    }

    async fn buy_now(&self, auction_id: &str) -> Result<BidAck> {
        let resp = self
            .pool
            .post(&format!("/auctions/{}/buy-now", auction_id), None, None)
            .await?;
        parse_bid_ack(resp)
    }

    async fn cancel_auction(&self, auction_id: &str) -> Result<()> {
        let resp = self
            .pool
            .post(&format!("/auctions/{}/cancel", auction_id), None, None)
            .await?;
        expect_success(resp)
    }

    async fn settle_auction(&self, auction_id: &str) -> Result<()> {
        let resp = self
            .pool
            .post(&format!("/auctions/{}/settle", auction_id), None, None)
            .await?;
        expect_success(resp)
    }
}

#[async_trait]
impl CommunityApi for HttpMarketplace {
    async fn list_reviews(&self, listing_id: &str) -> Result<Vec<Review>> {
        let resp = self
            .pool
            .get(&format!("/reviews?listingId={}", encode(listing_id)), None)
            .await?;
        decode_collection(&json_body(resp)?, "reviews")
    }

    async fn submit_review(&self, listing_id: &str, rating: u8, body: &str) -> Result<Review> {
        let payload = json!({ "listingId": listing_id, "rating": rating, "body": body });
        let resp = self.pool.post("/reviews", None, Some(&payload)).await?;
        decode(&json_body(resp)?)
    }

    async fn submit_report(&self, listing_id: &str, reason: &str) -> Result<Report> {
        let payload = json!({ "listingId": listing_id, "reason": reason });
        let resp = self.pool.post("/reports", None, Some(&payload)).await?;
        decode(&json_body(resp)?)
    }
}

#[async_trait]
impl AdminApi for HttpMarketplace {
    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let resp = self.pool.get("/auth/users", None).await?;
        decode_collection(&json_body(resp)?, "users")
    }

    async fn set_user_active(&self, user_id: &str, active: bool) -> Result<UserProfile> {
        let body = json!({ "isActive": active });
        let resp = self
            .pool
            .patch(&format!("/auth/users/{}", user_id), None, Some(&body))
            .await?;
        decode(&json_body(resp)?)
    }

    async fn list_reports(&self) -> Result<Vec<Report>> {
        let resp = self.pool.get("/reports", None).await?;
        decode_collection(&json_body(resp)?, "reports")
    }

    async fn fetch_summary(&self) -> Result<AnalyticsSummary> {
        let resp = self.pool.get("/analytics/summary", None).await?;
        decode(&json_body(resp)?)
    }
}

#[async_trait]
impl ChatApi for HttpMarketplace {
    async fn fetch_rooms(&self) -> Result<Vec<RoomSummary>> {
        let resp = self.pool.get("/chat/rooms", None).await?;
        decode_collection(&json_body(resp)?, "rooms")
    }

    async fn fetch_room(&self, room_id: &str) -> Result<RoomSnapshot> {
        let resp = self
            .pool
            .get(&format!("/chat/rooms/{}", room_id), None)
            .await?;
        let body = json_body(resp)?;
        room_snapshot_from_value(unwrap_data(&body))
            .ok_or_else(|| anyhow!("malformed room payload for {}", room_id))
    }

    async fn ensure_room(&self, peer_id: &str) -> Result<RoomSummary> {
        let body = json!({ "peerId": peer_id });
        let resp = self.pool.post("/chat/rooms", None, Some(&body)).await?;
        decode(&json_body(resp)?)
    }

    async fn send_message(&self, room_id: &str, text: &str) -> Result<ChatMessage> {
        let body = json!({ "text": text });
        let resp = self
            .pool
            .post(&format!("/chat/rooms/{}/messages", room_id), None, Some(&body))
            .await?;
        decode(&json_body(resp)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_resp(json: Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            json: Some(json),
            text: None,
            bytes: vec![],
        }
    }

    #[test]
    fn balance_parses_wrapped_and_bare_shapes() {
        assert_eq!(parse_balance(&json!({"data": {"balance": 42}})).unwrap(), 42);
        assert_eq!(parse_balance(&json!({"balance": "77"})).unwrap(), 77);
        assert_eq!(parse_balance(&json!(1_000_000)).unwrap(), 1_000_000);
    }

    #[test]
    fn bid_ack_success_carries_id_and_price() {
        let ack = parse_bid_ack(ok_resp(json!({
            "data": { "bidId": "b-9", "newPrice": 1_100_000 }
        })))
        .unwrap();
        assert!(ack.success);
        assert_eq!(ack.bid_id.as_deref(), Some("b-9"));
        assert_eq!(ack.new_price, Some(1_100_000));
    }

    #[test]
    fn bid_ack_maps_client_errors_to_rejection() {
        let resp = HttpResponse {
            status: 400,
            json: Some(json!({"message": "bid below current price"})),
            text: None,
            bytes: vec![],
        };
        let ack = parse_bid_ack(resp).unwrap();
        assert!(!ack.success);
        assert_eq!(ack.error_message.as_deref(), Some("bid below current price"));
    }

    #[test]
    fn server_errors_propagate_with_message() {
        let resp = HttpResponse {
            status: 500,
            json: Some(json!({"error": "boom"})),
            text: None,
            bytes: vec![],
        };
        let err = json_body(resp).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn listing_path_encodes_query() {
        let query = ListingQuery {
            keyword: Some("mid century chair".to_string()),
            page: Some(2),
            ..Default::default()
        };
        assert_eq!(
            HttpMarketplace::listing_path(&query),
            "/listings?keyword=mid%20century%20chair&page=2"
        );
        assert_eq!(
            HttpMarketplace::listing_path(&ListingQuery::default()),
            "/listings"
        );
    }

    #[test]
    fn collections_decode_from_any_envelope_depth() {
        let body = json!({"data": {"reviews": [
            {"id": "r1", "listingId": "l1", "reviewerId": "u1", "rating": 5}
        ]}});
        let reviews: Vec<Review> = decode_collection(&body, "reviews").unwrap();
        assert_eq!(reviews[0].rating, 5);

        let body = json!([
            {"id": "t1", "kind": "deposit", "amount": 10_000, "status": "pending"}
        ]);
        let txs: Vec<Transaction> = decode_collection(&body, "transactions").unwrap();
        assert_eq!(txs[0].kind, TransactionKind::Deposit);
        assert_eq!(txs[0].status, TransactionStatus::Pending);
    }

    #[test]
    fn summary_decodes_for_the_admin_dashboard() {
        let body = json!({"data": {
            "userCount": 10,
            "listingCount": 4,
            "auctionCount": 2,
            "settledVolume": 5_000_000,
            "openReports": 1
        }});
        let summary: AnalyticsSummary = decode(&body).unwrap();
        assert_eq!(summary.user_count, 10);
        assert_eq!(summary.settled_volume, 5_000_000);
        assert_eq!(summary.open_reports, 1);
    }

    #[test]
    fn auction_decodes_camel_case_wire_shape() {
        let body = json!({"data": {
            "id": "a1",
            "listingId": "l1",
            "status": "active",
            "startingPrice": 1_000_000,
            "currentPrice": 1_200_000,
            "minBidIncrement": 100_000,
            "endTime": 1_700_000_000_000_i64,
            "bidCount": 3
        }});
        let auction: Auction = decode(&body).unwrap();
        assert_eq!(auction.current_price, 1_200_000);
        assert_eq!(auction.status, AuctionStatus::Active);
        assert_eq!(auction.buy_now_price, None);
    }
}
