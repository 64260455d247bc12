use crate::{
    actions::{now_ms, ViewActions},
    chat::RoomDirectory,
    config::ClientConfig,
    poller::{self, PollHandle},
    session::SessionStore,
};
use anyhow::Result;
use dashmap::DashMap;
use market_core::{
    countdown::remaining,
    metrics::Metrics,
    model::{Amount, Auction, ChatEvent, PaymentState},
    ports::{
        AuctionApi, AuctionSnapshot, BalanceSnapshot, ChatApi, PaymentSnapshot, ProfileApi,
        RoomStream, WalletApi,
    },
    view::{PrimingRequest, View, ViewConfig, ViewContext},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

/// Edge-triggered poller outcomes routed back into the view loop.
enum Notice {
    Balance { previous: Amount, next: Amount },
    Payment(PaymentState),
    Auction(Auction),
}

/// Wires one view to the engine: realtime room events, pollers per the
/// view's start action, the 1 s countdown tick and the session lifecycle.
/// Everything acquired here is released when the loop exits, including on
/// error paths — pollers abort on drop and the stream pump is aborted
/// explicitly.
pub struct Runner<A, S>
where
    A: AuctionApi + ChatApi + ProfileApi + WalletApi + Send + Sync + 'static,
    S: RoomStream + 'static,
{
    cfg: ClientConfig,
    api: Arc<A>,
    stream: Arc<S>,
    session: SessionStore,
    metrics: Arc<Metrics>,
    directory: Arc<RoomDirectory>,
    watched_auctions: Arc<DashMap<String, Auction>>,
}

impl<A, S> Runner<A, S>
where
    A: AuctionApi + ChatApi + ProfileApi + WalletApi + Send + Sync + 'static,
    S: RoomStream + 'static,
{
    pub fn new(
        cfg: ClientConfig,
        api: Arc<A>,
        stream: Arc<S>,
        session: SessionStore,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cfg,
            api,
            stream,
            session,
            metrics,
            directory: RoomDirectory::new(),
            watched_auctions: Arc::new(DashMap::new()),
        }
    }

    pub fn directory(&self) -> Arc<RoomDirectory> {
        self.directory.clone()
    }

    pub fn watched_auctions(&self) -> Arc<DashMap<String, Auction>> {
        self.watched_auctions.clone()
    }

    pub async fn run<V>(&self, config: ViewConfig) -> Result<()>
    where
        V: View,
    {
        let view = V::new(config)?;
        self.run_view(view).await
    }

    /// Drive an already-constructed view (interactive front ends build
    /// theirs around channels that `ViewConfig` cannot carry).
    pub async fn run_view<V>(&self, mut view: V) -> Result<()>
    where
        V: View,
    {
        let actions = Arc::new(ViewActions::new(
            self.api.clone(),
            self.stream.clone(),
            self.directory.clone(),
            self.watched_auctions.clone(),
            self.metrics.clone(),
        ));
        let ctx = ViewContext::new(actions);
        let start = view.on_start(&ctx).await?;

        self.apply_priming(&mut view, &start.priming_requests).await;

        let user_id = self.session.user().map(|u| u.id);
        if start.subscribe_rooms {
            match user_id.as_ref() {
                Some(id) => self.stream.subscribe_rooms(id.clone()).await?,
                None => warn!(target: "runner", "no session user; skipping room subscription"),
            }
        }

        let (ev_tx, mut ev_rx) = mpsc::channel::<ChatEvent>(10_000);
        let stream = self.stream.clone();
        let metrics = self.metrics.clone();
        let pump: JoinHandle<Result<()>> = tokio::spawn(async move {
            info!(target: "runner", "room stream started");
            loop {
                match stream.next().await? {
                    Some(ev) => {
                        metrics.ws_events.inc();
                        let _ = ev_tx.send(ev).await;
                    }
                    None => tokio::time::sleep(Duration::from_millis(50)).await,
                }
            }
        });

        let (note_tx, mut note_rx) = mpsc::channel::<Notice>(1_000);

        let _balance_watch: Option<PollHandle<Amount>> = if start.watch_balance {
            let api = self.api.clone();
            let tx = note_tx.clone();
            Some(poller::spawn(
                "wallet_balance",
                Duration::from_millis(self.cfg.poll.balance_interval_ms),
                self.metrics.clone(),
                move || {
                    let api = api.clone();
                    async move { api.snapshot_balance().await }
                },
                poller::balance_increased,
                move |previous, next| {
                    let _ = tx.try_send(Notice::Balance {
                        previous: previous.copied().unwrap_or(0),
                        next: *next,
                    });
                },
            ))
        } else {
            None
        };

        let _payment_watches: Vec<PollHandle<PaymentState>> = start
            .watch_orders
            .iter()
            .map(|order_id| {
                let api = self.api.clone();
                let tx = note_tx.clone();
                let order_id = order_id.clone();
                poller::spawn(
                    format!("payment:{}", order_id),
                    Duration::from_millis(self.cfg.poll.payment_interval_ms),
                    self.metrics.clone(),
                    move || {
                        let api = api.clone();
                        let order_id = order_id.clone();
                        async move { api.snapshot_payment(&order_id).await }
                    },
                    poller::payment_settled,
                    move |_previous, next| {
                        let _ = tx.try_send(Notice::Payment(next.clone()));
                    },
                )
            })
            .collect();

        let _auction_watches: Vec<PollHandle<Auction>> = start
            .watch_auctions
            .iter()
            .map(|auction_id| {
                let api = self.api.clone();
                let watched = self.watched_auctions.clone();
                let tx = note_tx.clone();
                let auction_id = auction_id.clone();
                poller::spawn(
                    format!("auction:{}", auction_id),
                    Duration::from_millis(self.cfg.poll.auction_interval_ms),
                    self.metrics.clone(),
                    move || {
                        let api = api.clone();
                        let watched = watched.clone();
                        let auction_id = auction_id.clone();
                        async move {
                            let auction = api.snapshot_auction(&auction_id).await?;
                            // the bid gate compares against this cache
                            watched.insert(auction.id.clone(), auction.clone());
                            Ok(auction)
                        }
                    },
                    poller::auction_changed,
                    move |_previous, next| {
                        let _ = tx.try_send(Notice::Auction(next.clone()));
                    },
                )
            })
            .collect();

        let mut countdown_iv = tokio::time::interval(Duration::from_secs(1));
        let mut stats_iv = tokio::time::interval(Duration::from_secs(10));
        let mut stat_indexes = 0u64;
        let mut stat_snapshots = 0u64;
        let mut stat_notices = 0u64;

        let mut ended = self.session.ended();
        ended.borrow_and_update();

        let mut running = true;
        while running {
            tokio::select! {
                result = ev_rx.recv() => {
                    match result {
                        Some(ChatEvent::RoomIds { user_id, room_ids }) => {
                            stat_indexes += 1;
                            let rooms = self
                                .directory
                                .resolve_room_ids(
                                    self.api.as_ref(),
                                    self.api.as_ref(),
                                    &user_id,
                                    &room_ids,
                                )
                                .await;
                            view.on_room_index(&rooms);
                        }
                        Some(ChatEvent::Room { room_id, snapshot }) => {
                            stat_snapshots += 1;
                            if let Some(messages) =
                                self.directory.apply_room_snapshot(&room_id, snapshot)
                            {
                                view.on_room_messages(&room_id, &messages);
                            }
                            view.on_room_index(&self.directory.sorted_rooms());
                        }
                        None => running = false,
                    }
                }
                result = note_rx.recv() => {
                    match result {
                        Some(notice) => {
                            stat_notices += 1;
                            match notice {
                                Notice::Balance { previous, next } => {
                                    view.on_balance_change(previous, next)
                                }
                                Notice::Payment(payment) => view.on_payment_settled(&payment),
                                Notice::Auction(auction) => view.on_auction_update(&auction),
                            }
                        }
                        None => running = false,
                    }
                }
                _ = countdown_iv.tick() => {
                    let now = now_ms();
                    view.on_timer(now);
                    for entry in self.watched_auctions.iter() {
                        view.on_countdown(entry.key(), &remaining(entry.value().end_time, now));
                    }
                }
                _ = stats_iv.tick() => {
                    info!(
                        target: "runner",
                        indexes = %stat_indexes,
                        snapshots = %stat_snapshots,
                        notices = %stat_notices,
                        polls = %self.metrics.polls_run.get(),
                        poll_failures = %self.metrics.poll_failures.get(),
                        "client stats (10s)"
                    );
                    stat_indexes = 0;
                    stat_snapshots = 0;
                    stat_notices = 0;
                }
                _ = ended.changed() => {
                    view.on_session_ended();
                    running = false;
                }
            }
        }

        pump.abort();
        let _ = self.stream.open_room(None).await;

        Ok(())
    }

    async fn apply_priming<V: View>(&self, view: &mut V, requests: &[PrimingRequest]) {
        for request in requests {
            match request {
                PrimingRequest::SyncRooms => match self.api.fetch_rooms().await {
                    Ok(rooms) => {
                        for room in rooms {
                            self.directory.upsert_room(room);
                        }
                        view.on_room_index(&self.directory.sorted_rooms());
                    }
                    Err(err) => {
                        warn!(target: "runner", ?err, "failed to sync rooms during start")
                    }
                },
                PrimingRequest::SyncBalance => match self.api.fetch_balance().await {
                    Ok(balance) => {
                        info!(target: "runner", balance = %balance, "initial balance")
                    }
                    Err(err) => {
                        warn!(target: "runner", ?err, "failed to sync balance during start")
                    }
                },
                PrimingRequest::Custom(name) => {
                    warn!(target: "runner", request = %name, "custom priming request unhandled")
                }
            }
        }
    }
}
