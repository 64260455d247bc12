use market_core::{
    metrics::Metrics,
    model::{Amount, Auction, PaymentState},
};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};

/// Handle for one polled resource. The timer task is aborted on `close`
/// and on drop, so a poller never outlives the view that owns it.
pub struct PollHandle<T> {
    last: Arc<RwLock<Option<T>>>,
    in_flight: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl<T: Clone> PollHandle<T> {
    /// Last successfully observed value; failures never clear it.
    pub fn last(&self) -> Option<T> {
        self.last.read().clone()
    }

    pub fn close(&self) {
        self.task.abort();
    }

    /// True while a fetch is outstanding; ticks landing now are skipped.
    pub fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Poll-until-change: re-fetch on a fixed interval, retain the last good
/// value, and fire `on_change` only on transitions `trigger` accepts.
///
/// - at most one fetch is in flight per resource; a tick landing while
///   one is running is skipped (and counted), never queued
/// - the retained value updates unconditionally after every success,
///   whether or not the trigger fired
/// - a failed fetch keeps the previous value and the next tick stays on
///   schedule; the interval is not error-aware
pub fn spawn<T, F, Fut, Trig, Change>(
    name: impl Into<String>,
    interval: Duration,
    metrics: Arc<Metrics>,
    fetch: F,
    trigger: Trig,
    on_change: Change,
) -> PollHandle<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    Trig: Fn(Option<&T>, &T) -> bool + Send + Sync + 'static,
    Change: Fn(Option<&T>, &T) + Send + Sync + 'static,
{
    let name: Arc<str> = Arc::from(name.into());
    let last: Arc<RwLock<Option<T>>> = Arc::new(RwLock::new(None));
    let in_flight = Arc::new(AtomicBool::new(false));
    let trigger = Arc::new(trigger);
    let on_change = Arc::new(on_change);

    let task = {
        let last = last.clone();
        let in_flight = in_flight.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    metrics.polls_skipped.inc();
                    tracing::debug!(target: "poller", name = %name, "tick skipped; fetch in flight");
                    continue;
                }
                metrics.polls_run.inc();
                metrics.inflight_polls.inc();
                let fut = fetch();
                let last = last.clone();
                let in_flight = in_flight.clone();
                let metrics = metrics.clone();
                let trigger = trigger.clone();
                let on_change = on_change.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    match fut.await {
                        Ok(value) => {
                            let previous = {
                                let mut guard = last.write();
                                let prev = guard.clone();
                                *guard = Some(value.clone());
                                prev
                            };
                            if trigger(previous.as_ref(), &value) {
                                metrics.notifications_fired.inc();
                                on_change(previous.as_ref(), &value);
                            }
                        }
                        Err(err) => {
                            metrics.poll_failures.inc();
                            tracing::warn!(target: "poller", name = %name, ?err, "poll failed; keeping previous value");
                        }
                    }
                    metrics.inflight_polls.dec();
                    in_flight.store(false, Ordering::SeqCst);
                });
            }
        })
    };

    PollHandle {
        last,
        in_flight,
        task,
    }
}

/// Notify on strict increases over a non-empty baseline; the first
/// observation after (re)login never fires, and decreases never fire.
pub fn balance_increased(prev: Option<&Amount>, next: &Amount) -> bool {
    matches!(prev, Some(p) if next > p)
}

/// Edge trigger for payment outcomes: fires once when `paid` flips from
/// false to true.
pub fn payment_settled(prev: Option<&PaymentState>, next: &PaymentState) -> bool {
    prev.map_or(false, |p| !p.paid) && next.paid
}

/// Any observable movement on a watched auction.
pub fn auction_changed(prev: Option<&Auction>, next: &Auction) -> bool {
    prev.map_or(false, |p| {
        p.current_price != next.current_price
            || p.status != next.status
            || p.bid_count != next.bid_count
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::model::AuctionStatus;
    use prometheus::Registry;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn metrics() -> Arc<Metrics> {
        Metrics::new(&Registry::new())
    }

    /// Scripted fetch: yields entries in order, repeating the final entry
    /// forever; `None` entries are failures.
    fn scripted_fetch(
        script: Vec<Option<i64>>,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = anyhow::Result<i64>> + Send>>
           + Send
           + Sync
           + 'static {
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        move || {
            let script = script.clone();
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let entry = {
                    let mut s = script.lock().unwrap();
                    if s.len() > 1 {
                        s.pop_front().unwrap()
                    } else {
                        *s.front().unwrap()
                    }
                };
                entry.ok_or_else(|| anyhow::anyhow!("scripted failure"))
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn notifies_once_per_strict_increase() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notified: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = notified.clone();
        let handle = spawn(
            "balance",
            Duration::from_millis(20),
            metrics(),
            scripted_fetch(
                vec![Some(100), Some(100), Some(150), Some(120), Some(200), Some(200)],
                calls,
            ),
            balance_increased,
            move |_prev, next| sink.lock().unwrap().push(*next),
        );
        tokio::time::sleep(Duration::from_millis(400)).await;
        handle.close();
        assert_eq!(*notified.lock().unwrap(), vec![150, 200]);
        assert_eq!(handle.last(), Some(200));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn first_observation_never_notifies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let notified: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = notified.clone();
        let handle = spawn(
            "balance",
            Duration::from_millis(20),
            metrics(),
            scripted_fetch(vec![Some(500)], calls),
            balance_increased,
            move |_prev, next| sink.lock().unwrap().push(*next),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.close();
        assert!(notified.lock().unwrap().is_empty());
        assert_eq!(handle.last(), Some(500));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failure_retains_value_and_keeps_schedule() {
        let calls = Arc::new(AtomicUsize::new(0));
        let m = metrics();
        let notified: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = notified.clone();
        let handle = spawn(
            "balance",
            Duration::from_millis(20),
            m.clone(),
            scripted_fetch(vec![Some(5), None, Some(5)], calls.clone()),
            balance_increased,
            move |_prev, next| sink.lock().unwrap().push(*next),
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.close();
        assert!(calls.load(Ordering::SeqCst) >= 4, "polling continued after the failure");
        assert!(m.poll_failures.get() >= 1);
        assert_eq!(handle.last(), Some(5), "failed tick kept the previous value");
        assert!(notified.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn at_most_one_fetch_in_flight() {
        let m = metrics();
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let current = current.clone();
            let peak = peak.clone();
            move || {
                let current = current.clone();
                let peak = peak.clone();
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(1i64)
                }
            }
        };
        let handle = spawn(
            "slow",
            Duration::from_millis(10),
            m.clone(),
            fetch,
            |_, _| false,
            |_, _| {},
        );
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.close();
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(m.polls_skipped.get() > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drop_cancels_the_timer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = spawn(
            "dropped",
            Duration::from_millis(10),
            metrics(),
            scripted_fetch(vec![Some(1)], calls.clone()),
            |_, _| false,
            |_: Option<&i64>, _: &i64| {},
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(handle);
        let after_drop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn payment_trigger_fires_only_on_flip() {
        let unpaid = PaymentState {
            order_id: "o1".into(),
            paid: false,
            amount: 10,
            method: None,
        };
        let paid = PaymentState {
            paid: true,
            ..unpaid.clone()
        };
        assert!(!payment_settled(None, &paid), "no baseline, no flip");
        assert!(!payment_settled(Some(&unpaid), &unpaid));
        assert!(payment_settled(Some(&unpaid), &paid));
        assert!(!payment_settled(Some(&paid), &paid));
    }

    #[test]
    fn auction_trigger_tracks_price_status_and_count() {
        let base = Auction {
            id: "a1".into(),
            listing_id: "l1".into(),
            status: AuctionStatus::Active,
            starting_price: 1_000_000,
            current_price: 1_000_000,
            min_bid_increment: 100_000,
            buy_now_price: None,
            end_time: 0,
            bid_count: 0,
        };
        assert!(!auction_changed(None, &base));
        assert!(!auction_changed(Some(&base), &base));
        let raised = Auction {
            current_price: 1_100_000,
            bid_count: 1,
            ..base.clone()
        };
        assert!(auction_changed(Some(&base), &raised));
        let ended = Auction {
            status: AuctionStatus::Ended,
            ..base.clone()
        };
        assert!(auction_changed(Some(&base), &ended));
    }
}
