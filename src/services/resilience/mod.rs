//! Batching, request deduplication and circuit breaking for bulk and
//! background recommendation workloads.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::stores::{JobRequest, WorkQueue};

/// Shares one in-flight computation between concurrent identical requests.
/// The entry is dropped once the owning call completes; the TTL bounds how
/// long a stuck computation stays joinable.
pub struct RequestDeduplicator<T: Clone + Send + Sync + 'static> {
    ttl: Duration,
    in_flight: DashMap<String, (Shared<BoxFuture<'static, T>>, Instant)>,
}

impl<T: Clone + Send + Sync + 'static> RequestDeduplicator<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            in_flight: DashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_millis(config.resilience.dedup_ttl_ms))
    }

    pub async fn run<F>(&self, key: &str, f: F) -> T
    where
        F: Future<Output = T> + Send + 'static,
    {
        if let Some(entry) = self.in_flight.get(key) {
            let (shared, created) = entry.value();
            if created.elapsed() < self.ttl {
                let shared = shared.clone();
                drop(entry);
                return shared.await;
            }
        }

        let shared = f.boxed().shared();
        self.in_flight
            .insert(key.to_string(), (shared.clone(), Instant::now()));
        let result = shared.clone().await;
        self.in_flight.remove_if(key, |_, v| v.0.ptr_eq(&shared));
        result
    }

    /// Drops expired entries; called opportunistically by owners.
    pub fn sweep(&self) {
        self.in_flight.retain(|_, (_, created)| created.elapsed() < self.ttl);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-operation circuit breaker: closed -> open after the failure
/// threshold, open -> half-open after the reset timeout, half-open -> closed
/// on a successful probe (or straight back to open on failure). Operations
/// race against the configured timeout.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    operation_timeout: Duration,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.resilience.failure_threshold,
            operation_timeout: Duration::from_millis(config.resilience.operation_timeout_ms),
            reset_timeout: Duration::from_millis(config.resilience.reset_timeout_ms),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    fn check_admission(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.reset_timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit '{}' transitioned to half-open", self.name);
                    Ok(())
                } else {
                    Err(EngineError::CircuitOpen(self.name.clone()))
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!("Circuit '{}' closed", self.name);
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        let tripped = inner.state == CircuitState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if tripped {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            warn!(
                "Circuit '{}' opened after {} consecutive failures",
                self.name, inner.consecutive_failures
            );
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.check_admission()?;

        match tokio::time::timeout(self.operation_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure();
                Err(e)
            }
            Err(_) => {
                self.on_failure();
                Err(EngineError::Timeout(
                    self.name.clone(),
                    self.operation_timeout.as_millis() as u64,
                ))
            }
        }
    }
}

/// Splits bulk workloads into bounded batches and offloads them to the
/// external work queue with priority, retries and exponential backoff.
pub struct BatchScheduler {
    queue: Arc<dyn WorkQueue>,
    config: Arc<Config>,
}

impl BatchScheduler {
    pub fn new(queue: Arc<dyn WorkQueue>, config: Arc<Config>) -> Self {
        Self { queue, config }
    }

    pub async fn schedule_bulk_generation(&self, user_ids: &[Uuid], priority: u8) -> Result<usize> {
        self.schedule("generate_recommendations_batch", user_ids, priority)
            .await
    }

    pub async fn schedule_similarity_precompute(&self, user_ids: &[Uuid]) -> Result<usize> {
        self.schedule("precompute_similarities", user_ids, 3).await
    }

    async fn schedule(&self, job_name: &str, user_ids: &[Uuid], priority: u8) -> Result<usize> {
        let batch_size = self.config.resilience.batch_size.max(1);
        let mut batches = 0;

        for chunk in user_ids.chunks(batch_size) {
            let job = JobRequest {
                name: job_name.to_string(),
                payload: serde_json::json!({ "user_ids": chunk }),
                priority,
                attempts: self.config.resilience.job_attempts,
                backoff_base_ms: self.config.resilience.backoff_base_ms,
                delay_ms: 0,
            };
            self.queue.enqueue(job).await?;
            batches += 1;
        }

        info!(
            "Scheduled {} '{}' batches for {} users",
            batches,
            job_name,
            user_ids.len()
        );
        Ok(batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryWorkQueue;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_deduplicator_shares_in_flight_computation() {
        let dedup: RequestDeduplicator<u32> = RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));

        let compute = |calls: Arc<AtomicU32>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            42u32
        };

        let (a, b, c) = tokio::join!(
            dedup.run("user:limit=10", compute(calls.clone())),
            dedup.run("user:limit=10", compute(calls.clone())),
            dedup.run("user:limit=10", compute(calls.clone())),
        );
        assert_eq!((a, b, c), (42, 42, 42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deduplicator_recomputes_after_completion() {
        let dedup: RequestDeduplicator<u32> = RequestDeduplicator::new(Duration::from_secs(5));
        let calls = Arc::new(AtomicU32::new(0));

        let c = calls.clone();
        dedup.run("k", async move { c.fetch_add(1, Ordering::SeqCst) }).await;

        // The finished entry is dropped, so the next call computes fresh.
        assert_eq!(dedup.in_flight_count(), 0);

        let c = calls.clone();
        dedup.run("k", async move { c.fetch_add(1, Ordering::SeqCst) }).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deduplicator_ttl_from_config() {
        let mut config = Config::default();
        config.resilience.dedup_ttl_ms = 1234;
        let dedup: RequestDeduplicator<u32> = RequestDeduplicator::from_config(&config);
        assert_eq!(dedup.ttl, Duration::from_millis(1234));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_threshold_and_recovers() {
        let mut config = Config::default();
        config.resilience.failure_threshold = 2;
        config.resilience.reset_timeout_ms = 50;
        let breaker = CircuitBreaker::new("test-op", &config);

        for _ in 0..2 {
            let result: Result<()> = breaker
                .call(|| async { Err(EngineError::Upstream("boom".to_string())) })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        // While open, calls are rejected with the distinct error.
        let rejected: Result<()> = breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(rejected, Err(EngineError::CircuitOpen(_))));

        // After the reset timeout a successful probe closes the circuit.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let probed: Result<u32> = breaker.call(|| async { Ok(7) }).await;
        assert_eq!(probed.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_batch_scheduler_chunks_users() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let mut config = Config::default();
        config.resilience.batch_size = 25;

        let scheduler = BatchScheduler::new(queue.clone(), Arc::new(config));
        let users: Vec<Uuid> = (0..60).map(|_| Uuid::new_v4()).collect();

        let batches = scheduler.schedule_bulk_generation(&users, 7).await.unwrap();
        assert_eq!(batches, 3);

        let jobs = queue.jobs().await;
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|j| j.attempts == 3));
        assert!(jobs.iter().all(|j| j.backoff_base_ms == 2000));
        assert!(jobs.iter().all(|j| j.priority == 7));
    }
}
