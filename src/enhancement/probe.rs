//! Engine availability with an optional short-lived cache.

use super::engine::{AudioEngine, EngineAvailability};
use crate::server::metrics;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Re-checks the engine on every call unless a non-zero TTL is configured.
pub struct EngineProbe {
    engine: Arc<dyn AudioEngine>,
    ttl: Duration,
    cached: Mutex<Option<(EngineAvailability, Instant)>>,
}

impl EngineProbe {
    pub fn new(engine: Arc<dyn AudioEngine>, ttl: Duration) -> Self {
        Self {
            engine,
            ttl,
            cached: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn uncached(engine: Arc<dyn AudioEngine>) -> Self {
        Self::new(engine, Duration::ZERO)
    }

    pub async fn check(&self) -> EngineAvailability {
        if let Some(availability) = self.cached_availability() {
            debug!("Using cached engine availability: {:?}", availability);
            return availability;
        }

        let availability = self.engine.probe().await;
        metrics::set_engine_available(availability.is_available());

        if !self.ttl.is_zero() {
            let mut cached = self.cached.lock().unwrap();
            let changed = cached.map(|(previous, _)| previous) != Some(availability);
            if changed {
                info!("Audio engine is now {:?}", availability);
            }
            *cached = Some((availability, Instant::now()));
        }
        availability
    }

    /// Drops the cached result so the next check queries the engine again.
    pub fn invalidate(&self) {
        if self.cached.lock().unwrap().take().is_some() {
            debug!("Engine availability cache invalidated");
        }
    }

    fn cached_availability(&self) -> Option<EngineAvailability> {
        if self.ttl.is_zero() {
            return None;
        }
        let cached = self.cached.lock().unwrap();
        match *cached {
            Some((availability, checked_at)) if checked_at.elapsed() < self.ttl => {
                Some(availability)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enhancement::engine::{EngineObserver, ProcessingError};
    use crate::enhancement::filter_chain::FilterChain;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingEngine {
        available: AtomicBool,
        probes: AtomicUsize,
    }

    impl CountingEngine {
        fn new(available: bool) -> Arc<Self> {
            Arc::new(Self {
                available: AtomicBool::new(available),
                probes: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AudioEngine for CountingEngine {
        async fn probe(&self) -> EngineAvailability {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.available.load(Ordering::SeqCst) {
                EngineAvailability::Available
            } else {
                EngineAvailability::Unavailable
            }
        }

        async fn process(
            &self,
            _input: &Path,
            output: &Path,
            _chain: &FilterChain,
            _observer: &dyn EngineObserver,
        ) -> Result<PathBuf, ProcessingError> {
            Ok(output.to_path_buf())
        }
    }

    #[tokio::test]
    async fn zero_ttl_checks_every_time() {
        let engine = CountingEngine::new(true);
        let probe = EngineProbe::uncached(engine.clone());

        for _ in 0..3 {
            assert_eq!(probe.check().await, EngineAvailability::Available);
        }
        assert_eq!(engine.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn ttl_reuses_last_result() {
        let engine = CountingEngine::new(false);
        let probe = EngineProbe::new(engine.clone(), Duration::from_secs(60));

        assert_eq!(probe.check().await, EngineAvailability::Unavailable);
        engine.available.store(true, Ordering::SeqCst);
        assert_eq!(probe.check().await, EngineAvailability::Unavailable);
        assert_eq!(engine.probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_check() {
        let engine = CountingEngine::new(true);
        let probe = EngineProbe::new(engine.clone(), Duration::from_secs(60));

        assert_eq!(probe.check().await, EngineAvailability::Available);
        engine.available.store(false, Ordering::SeqCst);
        probe.invalidate();
        assert_eq!(probe.check().await, EngineAvailability::Unavailable);
        assert_eq!(engine.probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_refreshed() {
        let engine = CountingEngine::new(true);
        let probe = EngineProbe::new(engine.clone(), Duration::from_millis(20));

        probe.check().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        probe.check().await;
        assert_eq!(engine.probes.load(Ordering::SeqCst), 2);
    }
}
