use crate::application::flow::ConversationEngine;
use crate::error::Result;
use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Guard timestamps older than this can no longer reject anything.
const GUARD_RETENTION_MINUTES: i64 = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub progress: usize,
    pub rates: usize,
    pub guard: usize,
}

impl ConversationEngine {
    /// Purges expired sessions, stale progress entries, expired rate cache
    /// entries and old guard timestamps.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let report = SweepReport {
            sessions: self
                .sessions
                .purge_inactive(now - self.settings.session_ttl)
                .await?,
            progress: self
                .progress
                .purge_stale(now - self.settings.progress_retention)
                .await?,
            rates: self.rates.purge_expired().await?,
            guard: self
                .guard
                .purge_older_than(now - Duration::minutes(GUARD_RETENTION_MINUTES)),
        };
        tracing::debug!(?report, "sweep finished");
        Ok(report)
    }
}

/// Runs [`ConversationEngine::sweep`] every `every` until `shutdown` fires.
pub fn spawn_sweeper(
    engine: Arc<ConversationEngine>,
    every: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!("sweeper stopped");
                    return;
                }
                _ = interval.tick() => {
                    if let Err(e) = engine.sweep().await {
                        tracing::warn!(error = %e, "sweep failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::flow::{EngineSettings, Stores};
    use crate::application::guard::InMemoryInputGuard;
    use crate::application::rates::{RateEngine, RatePolicy};
    use crate::domain::message::Inbound;
    use crate::domain::ports::RateSource;
    use crate::domain::rate::{CanonicalShape, RateFetch};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryRateCache;
    use async_trait::async_trait;

    struct NoRates;

    #[async_trait]
    impl RateSource for NoRates {
        async fn fetch_rates(&self, _shape: &CanonicalShape) -> RateFetch {
            RateFetch::ok(Vec::new())
        }
    }

    fn engine(clock: &ManualClock) -> ConversationEngine {
        let settings = EngineSettings::default();
        let clock: crate::domain::ports::ClockRef = Arc::new(clock.clone());
        let rates = RateEngine::new(
            Box::new(NoRates),
            Box::new(InMemoryRateCache::new()),
            clock.clone(),
            RatePolicy::default(),
        );
        let guard = InMemoryInputGuard::new(clock.clone(), Duration::milliseconds(300), 3);
        ConversationEngine::new(
            Stores::in_memory(settings.progress_retention),
            rates,
            Box::new(guard),
            clock,
            settings,
        )
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_conversations() {
        let clock = ManualClock::default();
        let engine = engine(&clock);
        engine.handle(Inbound::text(1, 10, "/start")).await;

        let report = engine.sweep().await.unwrap();
        assert_eq!(report.sessions, 0);
        assert_eq!(report.progress, 0);

        clock.advance(Duration::hours(2));
        let report = engine.sweep().await.unwrap();
        assert_eq!(report.sessions, 1);
        assert_eq!(report.progress, 1);
        assert_eq!(report.guard, 1);
        assert!(engine.session(1).await.unwrap().is_none());
        assert!(engine.current_state(10, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let clock = ManualClock::default();
        let engine = Arc::new(engine(&clock));
        let token = CancellationToken::new();
        let handle = spawn_sweeper(engine, std::time::Duration::from_millis(10), token.clone());

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
