use std::future::Future;

use chrono::Utc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::flights::FlightSummarizer;
use crate::sessions::SessionManager;
use crate::{log_error, log_info};

const ENABLE_LOGS: bool = true;

/// Runs `sweep` every `period` until cancelled. The first tick fires
/// immediately, so work left over from a previous run is picked up at start.
pub async fn sweep_loop<F, Fut, T>(
    name: &'static str,
    period: Duration,
    cancel_token: CancellationToken,
    mut sweep: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    T: std::fmt::Debug,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep().await {
                    Ok(report) => log_info!("{name} sweep finished: {report:?}"),
                    Err(err) => log_error!("{name} sweep failed: {err}"),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("{name} sweep loop shutting down");
                break;
            }
        }
    }
}

pub async fn controller_sweep_loop(
    sessions: SessionManager,
    period: Duration,
    cancel_token: CancellationToken,
) {
    sweep_loop("controller", period, cancel_token, || {
        let sessions = sessions.clone();
        async move { sessions.run_sweep(Utc::now()).await }
    })
    .await
}

pub async fn flight_sweep_loop(
    flights: FlightSummarizer,
    period: Duration,
    cancel_token: CancellationToken,
) {
    sweep_loop("flight", period, cancel_token, || {
        let flights = flights.clone();
        async move { flights.run_sweep(Utc::now()).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[tokio::test(start_paused = true)]
    async fn ticks_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let handle = tokio::spawn({
            let runs = Arc::clone(&runs);
            let token = token.clone();
            async move {
                sweep_loop("test", Duration::from_secs(60), token, || {
                    let runs = Arc::clone(&runs);
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, crate::errors::EngineError>(())
                    }
                })
                .await
            }
        });

        tokio::time::sleep(Duration::from_secs(150)).await;
        token.cancel();
        handle.await.unwrap();

        // immediate first tick, then at 60s and 120s
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
