use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, info_span, Instrument};
use crate::state::AppState;

/// Skip-if-busy guard: a run that starts while another is in flight is dropped, not queued.
#[derive(Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fut` unless a previous run is still going. Returns None when skipped.
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return None;
        }
        let _reset = Reset(&self.running);
        Some(fut.await)
    }
}

struct Reset<'a>(&'a AtomicBool);

impl Drop for Reset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub async fn start_background_workers(state: Arc<AppState>) {
    info!("Starting background workers...");

    let enforcement = state.clone();
    spawn_ticker("open_play_enforcement", state.config.enforcement_interval_secs, move || {
        let state = enforcement.clone();
        async move { run_enforcement(&state).await }
    });

    let sweep = state.clone();
    spawn_ticker("waitlist_offer_sweep", state.config.waitlist_sweep_interval_secs, move || {
        let state = sweep.clone();
        async move { run_waitlist_sweep(&state).await }
    });

    let cleanup = state.clone();
    spawn_ticker("cleanup", state.config.cleanup_interval_secs, move || {
        let state = cleanup.clone();
        async move { run_cleanup(&state).await }
    });
}

/// Each tick spawns the job so a slow pass never blocks the ticker; overlapping ticks are skipped.
fn spawn_ticker<F, Fut>(name: &'static str, every_secs: u64, job: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let guard = Arc::new(SingleFlight::new());
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(every_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let guard = guard.clone();
            let fut = job();
            tokio::spawn(async move {
                let span = info_span!("background_pass", worker = name);
                if guard.run(fut.instrument(span)).await.is_none() {
                    warn!("{} pass still running, skipping tick", name);
                }
            });
        }
    });
}

pub async fn run_enforcement(state: &AppState) {
    let now = state.clock.now();
    match state.open_play.run_pass(now).await {
        Ok(report) if report.evaluated > 0 => info!(
            evaluated = report.evaluated,
            cancelled = report.cancelled,
            scaled = report.scaled,
            failed = report.failed,
            "Open play enforcement pass finished"
        ),
        Ok(_) => debug!("No open play sessions at cutoff"),
        Err(e) => error!("Open play enforcement pass failed: {}", e),
    }
}

pub async fn run_waitlist_sweep(state: &AppState) {
    match state.waitlist.sweep_expired_offers().await {
        Ok(report) if report.expired > 0 || report.failed > 0 => info!(
            expired = report.expired,
            advanced = report.advanced,
            failed = report.failed,
            "Waitlist offer sweep finished"
        ),
        Ok(_) => debug!("No expired waitlist offers"),
        Err(e) => error!("Waitlist offer sweep failed: {}", e),
    }
}

pub async fn run_cleanup(state: &AppState) {
    if let Err(e) = state.waitlist.purge_past_entries().await {
        error!("Waitlist purge failed: {}", e);
    }
    match state.ledger.expire_packages().await {
        Ok(n) if n > 0 => info!("Expired {} packages", n),
        Ok(_) => {}
        Err(e) => error!("Package expiry failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_single_flight_skips_overlapping_runs() {
        let guard = Arc::new(SingleFlight::new());
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel::<()>();

        let first = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard.run(async move {
                    let _ = started_tx.send(());
                    let _ = release_rx.await;
                    1
                }).await
            })
        };

        started_rx.await.unwrap();
        assert_eq!(guard.run(async { 2 }).await, None);

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), Some(1));
        assert_eq!(guard.run(async { 3 }).await, Some(3));
    }
}
