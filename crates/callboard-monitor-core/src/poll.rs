use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Latest result of a polled upstream. A failed cycle keeps the last good
/// value and records the error next to it.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<T> {
    pub value: T,
    pub last_success_unix: Option<i64>,
    pub last_checked_unix: Option<i64>,
    pub last_error: Option<String>,
}

pub type SharedSnapshot<T> = Arc<RwLock<Snapshot<T>>>;

impl<T> Snapshot<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: initial,
            last_success_unix: None,
            last_checked_unix: None,
            last_error: None,
        }
    }

    pub fn shared(initial: T) -> SharedSnapshot<T> {
        Arc::new(RwLock::new(Self::new(initial)))
    }

    pub fn record_success(&mut self, value: T, now_unix: i64) {
        self.value = value;
        self.last_success_unix = Some(now_unix);
        self.last_checked_unix = Some(now_unix);
        self.last_error = None;
    }

    /// The upstream answered but had nothing new; the current value stays.
    pub fn record_unchanged(&mut self, now_unix: i64) {
        self.last_checked_unix = Some(now_unix);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: String, now_unix: i64) {
        self.last_checked_unix = Some(now_unix);
        self.last_error = Some(error);
    }

    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Runs `tick` immediately and then every `period`. Ticks never overlap;
/// a slow cycle delays the next one instead of queueing a burst.
pub fn spawn_poller<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_millis(100)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            debug!("{name} poll tick");
            tick().await;
        }
    })
}
