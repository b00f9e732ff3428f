use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use optimistic_store::Clock;

/// Browser wall clock and `setTimeout` timers
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserClock;

impl Clock for BrowserClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        Box::pin(gloo_timers::future::sleep(duration))
    }
}
