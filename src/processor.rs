//! The processing step run for every valid order event.

use crate::error::WorkerError;
use crate::event::OrderCreatedEvent;
use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;

/// Business logic applied to a validated event.
///
/// Returning `Err` sends the delivery down the retry path.
#[async_trait]
pub trait OrderProcessor: Send + Sync {
    async fn process(&self, event: &OrderCreatedEvent) -> Result<(), WorkerError>;

    /// A name for the processor, used for logging.
    fn processor_name(&self) -> &str;
}

/// Stands in for real work with a fixed delay.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    delay: Duration,
}

impl SimulatedWork {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}

#[async_trait]
impl OrderProcessor for SimulatedWork {
    async fn process(&self, _event: &OrderCreatedEvent) -> Result<(), WorkerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }

    fn processor_name(&self) -> &str {
        "SimulatedWork"
    }
}

/// Wraps another processor and randomly fails large orders, so the retry path
/// can be watched in action.
#[derive(Debug, Clone)]
pub struct FaultInjection<P> {
    inner: P,
    threshold: Decimal,
    probability: f64,
}

impl<P: OrderProcessor> FaultInjection<P> {
    /// Fails orders above 100 roughly one time in three.
    pub fn new(inner: P) -> Self {
        Self::with_settings(inner, Decimal::new(100, 0), 1.0 / 3.0)
    }

    /// `probability` is clamped to `0.0..=1.0`; NaN disables injection.
    pub fn with_settings(inner: P, threshold: Decimal, probability: f64) -> Self {
        let probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
        Self {
            inner,
            threshold,
            probability,
        }
    }

    fn should_fail(&self, event: &OrderCreatedEvent) -> bool {
        event.total_amount > self.threshold && rand::thread_rng().gen_bool(self.probability)
    }
}

#[async_trait]
impl<P: OrderProcessor> OrderProcessor for FaultInjection<P> {
    async fn process(&self, event: &OrderCreatedEvent) -> Result<(), WorkerError> {
        if self.should_fail(event) {
            log::warn!(
                "Injecting failure for OrderId={} Total={}",
                event.order_id,
                event.total_amount
            );
            return Err(WorkerError::HandlerError(
                format!("simulated failure for order {}", event.order_id).into(),
            ));
        }
        self.inner.process(event).await
    }

    fn processor_name(&self) -> &str {
        "FaultInjection"
    }
}
