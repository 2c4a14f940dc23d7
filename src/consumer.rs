//! The order consumer, its configuration and the per-delivery state machine.

use crate::error::WorkerError;
use crate::event::OrderCreatedEvent;
use crate::processor::OrderProcessor;
use crate::retry::{self, RetryPolicy};
use crate::topology::Topology;
use async_trait::async_trait;
use futures_util::{TryStream, TryStreamExt};
use lapin::{
    acker::Acker,
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions},
    types::FieldTable,
    BasicProperties, Channel,
};
use std::sync::Arc;

/// Configuration for an `OrderConsumer`.
///
/// Use the `ConsumerConfig::builder()` method to construct this struct.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Broker layout; the consumer reads from `topology.main_queue`.
    pub topology: Topology,
    /// A unique identifier for the consumer on this queue.
    pub consumer_tag: String,
    /// Maximum number of unacknowledged deliveries (QoS prefetch count).
    pub prefetch_count: u16,
    pub retry_policy: RetryPolicy,
}

impl ConsumerConfig {
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::default()
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A builder for creating `ConsumerConfig` instances.
#[derive(Default)]
pub struct ConsumerConfigBuilder {
    topology: Option<Topology>,
    consumer_tag: Option<String>,
    prefetch_count: Option<u16>,
    retry_policy: Option<RetryPolicy>,
}

impl ConsumerConfigBuilder {
    /// Defaults to `Topology::default()`.
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Defaults to `{main_queue}.consumer`.
    pub fn consumer_tag(mut self, consumer_tag: String) -> Self {
        self.consumer_tag = Some(consumer_tag);
        self
    }

    /// Defaults to 5. Up to this many deliveries are processed concurrently.
    pub fn prefetch_count(mut self, count: u16) -> Self {
        self.prefetch_count = Some(count);
        self
    }

    /// Defaults to an unbounded policy.
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    pub fn build(self) -> ConsumerConfig {
        let topology = self.topology.unwrap_or_default();
        ConsumerConfig {
            consumer_tag: self
                .consumer_tag
                .unwrap_or_else(|| format!("{}.consumer", topology.main_queue)),
            prefetch_count: self.prefetch_count.unwrap_or(5).max(1),
            retry_policy: self.retry_policy.unwrap_or_default(),
            topology,
        }
    }
}

/// Final outcome for a single delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Processed successfully and acknowledged.
    Ack,
    /// Republished to the retry queue, then acknowledged.
    Retry { reason: String },
    /// Retry budget exhausted; rejected without requeue so the broker routes it to the DLQ.
    DeadLetter { reason: String },
}

/// Broker-side effects of settling a delivery.
#[async_trait]
pub trait DeliveryActions: Send + Sync {
    async fn ack(&self) -> Result<(), WorkerError>;

    /// Publishes `body` with `properties` unchanged to `retry_queue` through the
    /// default exchange.
    async fn republish_to_retry(
        &self,
        retry_queue: &str,
        body: &[u8],
        properties: &BasicProperties,
    ) -> Result<(), WorkerError>;

    /// Negative acknowledgement without requeue.
    async fn reject(&self) -> Result<(), WorkerError>;
}

/// `DeliveryActions` for a live lapin delivery.
pub struct AmqpDeliveryActions {
    channel: Channel,
    acker: Acker,
}

impl AmqpDeliveryActions {
    pub fn new(channel: Channel, acker: Acker) -> Self {
        Self { channel, acker }
    }
}

#[async_trait]
impl DeliveryActions for AmqpDeliveryActions {
    async fn ack(&self) -> Result<(), WorkerError> {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn republish_to_retry(
        &self,
        retry_queue: &str,
        body: &[u8],
        properties: &BasicProperties,
    ) -> Result<(), WorkerError> {
        self.channel
            .basic_publish("", retry_queue, BasicPublishOptions::default(), body, properties.clone())
            .await?;
        Ok(())
    }

    async fn reject(&self) -> Result<(), WorkerError> {
        self.acker
            .nack(BasicNackOptions { requeue: false, ..Default::default() })
            .await?;
        Ok(())
    }
}

/// A delivery waiting to be handled, together with the means to settle it.
pub struct Incoming<A> {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub properties: BasicProperties,
    pub actions: A,
}

/// Consumes `OrderCreatedEvent`s from the main queue with manual acknowledgement.
pub struct OrderConsumer<P: OrderProcessor> {
    processor: Arc<P>,
    config: ConsumerConfig,
}

impl<P: OrderProcessor + 'static> OrderConsumer<P> {
    pub fn new(processor: Arc<P>, config: ConsumerConfig) -> Self {
        Self { processor, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Applies QoS, starts consuming and handles deliveries until the consumer
    /// stream ends or fails.
    ///
    /// The topology must already be declared on `channel`.
    pub async fn run(self: Arc<Self>, channel: Channel) -> Result<(), WorkerError> {
        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await?;
        log::info!("QoS prefetch count set to {}", self.config.prefetch_count);

        let consumer = channel
            .basic_consume(
                &self.config.topology.main_queue,
                &self.config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        log::info!(
            "Consumer '{}' listening on '{}' using {}",
            consumer.tag().as_str(),
            self.config.topology.main_queue,
            self.processor.processor_name()
        );

        let acks = channel.clone();
        let deliveries = consumer.map_ok(move |delivery| Incoming {
            delivery_tag: delivery.delivery_tag,
            body: delivery.data,
            properties: delivery.properties,
            actions: AmqpDeliveryActions::new(acks.clone(), delivery.acker),
        });
        self.clone().dispatch(deliveries).await?;

        log::warn!("Consumer stream for '{}' ended", self.config.topology.main_queue);
        Ok(())
    }

    /// Handles deliveries from `deliveries`, at most `prefetch_count` at a time,
    /// until the stream ends or yields an error.
    pub async fn dispatch<S, A>(self: Arc<Self>, deliveries: S) -> Result<(), WorkerError>
    where
        S: TryStream<Ok = Incoming<A>, Error = lapin::Error>,
        A: DeliveryActions,
    {
        let concurrency = usize::from(self.config.prefetch_count);
        deliveries
            .try_for_each_concurrent(concurrency, |incoming| {
                let this = self.clone();
                async move {
                    if let Err(e) = this
                        .handle(&incoming.body, &incoming.properties, &incoming.actions)
                        .await
                    {
                        log::error!(
                            "Failed to settle delivery {}: {}",
                            incoming.delivery_tag,
                            e
                        );
                    }
                    Ok(())
                }
            })
            .await?;
        Ok(())
    }

    /// Handles one delivery end to end and reports what was done with it.
    ///
    /// Parse, validation and processing failures never surface here; they are
    /// routed to the retry queue (or the DLQ once a retry cap is reached). Only
    /// failures to settle the delivery with the broker are returned.
    pub async fn handle<A: DeliveryActions>(
        &self,
        body: &[u8],
        properties: &BasicProperties,
        actions: &A,
    ) -> Result<Disposition, WorkerError> {
        let raw = String::from_utf8_lossy(body);
        log::info!("Received payload: {}", raw);

        match self.evaluate(body).await {
            Ok(event) => {
                actions.ack().await?;
                log::info!("Processed OK OrderId={}", event.order_id);
                Ok(Disposition::Ack)
            }
            Err(e) => {
                let reason = e.to_string();
                log::error!("Failed: {}. Payload: {}", reason, raw);

                let topology = &self.config.topology;
                let retries = retry::retry_count(properties, &topology.retry_queue);
                if !self.config.retry_policy.should_retry(retries) {
                    actions.reject().await?;
                    log::warn!(
                        "Giving up after {} retries; dead-lettering to '{}'",
                        retries,
                        topology.dead_letter_queue
                    );
                    return Ok(Disposition::DeadLetter { reason });
                }

                actions
                    .republish_to_retry(&topology.retry_queue, body, properties)
                    .await?;
                actions.ack().await?;
                log::info!(
                    "Scheduled retry {} via '{}' in {:?}",
                    retries.saturating_add(1),
                    topology.retry_queue,
                    topology.retry_delay
                );
                Ok(Disposition::Retry { reason })
            }
        }
    }

    async fn evaluate(&self, body: &[u8]) -> Result<OrderCreatedEvent, WorkerError> {
        let event = OrderCreatedEvent::from_json_slice(body)?;
        event.validate()?;
        log::info!(
            "Processing OrderId={} Total={}",
            event.order_id,
            event.total_amount
        );
        self.processor.process(&event).await?;
        Ok(event)
    }
}
