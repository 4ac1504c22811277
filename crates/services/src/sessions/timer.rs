use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{MissedTickBehavior, interval};
use tracing::trace;

/// Owns a running ticker. Dropping the handle stops it.
#[derive(Debug)]
pub struct TimerHandle {
    stop: Option<oneshot::Sender<()>>,
}

impl TimerHandle {
    /// Stop the ticker. Any tick already in flight still completes.
    pub fn stop(mut self) {
        self.signal();
    }

    fn signal(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.signal();
    }
}

/// Call `on_tick` every `period` until it returns `Break` or the handle is
/// stopped. The first call happens one full period after spawning.
///
/// Must be called from within a tokio runtime.
pub fn spawn_ticker<F, Fut>(period: Duration, mut on_tick: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send,
{
    let (tx, mut rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        ticks.tick().await;
        loop {
            tokio::select! {
                _ = &mut rx => break,
                _ = ticks.tick() => {
                    if on_tick().await.is_break() {
                        break;
                    }
                }
            }
        }
        trace!("ticker stopped");
    });
    TimerHandle { stop: Some(tx) }
}
