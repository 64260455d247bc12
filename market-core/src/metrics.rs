use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub polls_run: IntCounter,
    pub poll_failures: IntCounter,
    pub polls_skipped: IntCounter,
    pub ws_events: IntCounter,
    pub notifications_fired: IntCounter,
    pub bids_sent: IntCounter,
    pub bids_rejected: IntCounter,
    pub inflight_polls: IntGauge,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Arc<Self> {
        let polls_run =
            IntCounter::with_opts(Opts::new("polls_run", "Poll ticks executed")).unwrap();
        let poll_failures =
            IntCounter::with_opts(Opts::new("poll_failures", "Poll fetches failed")).unwrap();
        let polls_skipped = IntCounter::with_opts(Opts::new(
            "polls_skipped",
            "Poll ticks skipped while a fetch was in flight",
        ))
        .unwrap();
        let ws_events =
            IntCounter::with_opts(Opts::new("ws_events", "Realtime events received")).unwrap();
        let notifications_fired = IntCounter::with_opts(Opts::new(
            "notifications_fired",
            "Edge-triggered notifications fired",
        ))
        .unwrap();
        let bids_sent = IntCounter::with_opts(Opts::new("bids_sent", "Bids submitted")).unwrap();
        let bids_rejected = IntCounter::with_opts(Opts::new(
            "bids_rejected",
            "Bids rejected client-side before any network call",
        ))
        .unwrap();
        let inflight_polls =
            IntGauge::with_opts(Opts::new("inflight_polls", "Poll fetches in flight")).unwrap();
        registry.register(Box::new(polls_run.clone())).ok();
        registry.register(Box::new(poll_failures.clone())).ok();
        registry.register(Box::new(polls_skipped.clone())).ok();
        registry.register(Box::new(ws_events.clone())).ok();
        registry
            .register(Box::new(notifications_fired.clone()))
            .ok();
        registry.register(Box::new(bids_sent.clone())).ok();
        registry.register(Box::new(bids_rejected.clone())).ok();
        registry.register(Box::new(inflight_polls.clone())).ok();
        Arc::new(Self {
            polls_run,
            poll_failures,
            polls_skipped,
            ws_events,
            notifications_fired,
            bids_sent,
            bids_rejected,
            inflight_polls,
        })
    }
}
