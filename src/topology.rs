//! Exchange and queue layout shared by the publisher and the processor.

use crate::error::WorkerError;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    Channel, ExchangeKind,
};
use std::time::Duration;

/// Names and retry delay making up the broker topology.
///
/// `Topology::default()` is the layout existing deployments already use; its
/// names and arguments must not drift or redeclaration fails with
/// `PRECONDITION_FAILED`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub dead_letter_exchange: String,
    pub main_queue: String,
    pub retry_queue: String,
    pub dead_letter_queue: String,
    pub routing_key: String,
    pub dead_letter_routing_key: String,
    pub retry_delay: Duration,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: "orders.exchange".into(),
            dead_letter_exchange: "orders.dlx".into(),
            main_queue: "orders.created.q".into(),
            retry_queue: "orders.retry".into(),
            dead_letter_queue: "orders.dlq".into(),
            routing_key: "orders.created".into(),
            dead_letter_routing_key: "orders.dead".into(),
            retry_delay: Duration::from_millis(10_000),
        }
    }
}

impl Topology {
    /// Overrides how long a failed message waits in the retry queue.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Arguments of the retry queue: expire after the delay, then dead-letter
    /// back onto the main exchange with the main routing key.
    ///
    /// Fails if the delay does not fit the broker's signed 32-bit TTL.
    pub fn retry_queue_arguments(&self) -> Result<FieldTable, WorkerError> {
        let ttl = i32::try_from(self.retry_delay.as_millis()).map_err(|_| {
            WorkerError::from(format!(
                "retry delay of {}ms exceeds the maximum message TTL of {}ms",
                self.retry_delay.as_millis(),
                i32::MAX
            ))
        })?;
        let mut args = FieldTable::default();
        args.insert("x-message-ttl".into(), AMQPValue::LongInt(ttl));
        args.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(self.exchange.clone().into()));
        args.insert("x-dead-letter-routing-key".into(), AMQPValue::LongString(self.routing_key.clone().into()));
        Ok(args)
    }

    /// Arguments of the main queue: rejected or expired messages go to the DLX.
    pub fn main_queue_arguments(&self) -> FieldTable {
        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(self.dead_letter_exchange.clone().into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(self.dead_letter_routing_key.clone().into()),
        );
        args
    }

    /// Declares both exchanges, all three queues and their bindings.
    ///
    /// Every declaration is idempotent as long as the arguments match what the
    /// broker already holds. Errors are returned as-is; callers treat them as fatal.
    pub async fn declare(&self, channel: &Channel) -> Result<(), WorkerError> {
        let retry_arguments = self.retry_queue_arguments()?;
        let durable_exchange = ExchangeDeclareOptions { durable: true, ..Default::default() };
        let durable_queue = QueueDeclareOptions { durable: true, ..Default::default() };

        for exchange in [&self.exchange, &self.dead_letter_exchange] {
            channel
                .exchange_declare(exchange, ExchangeKind::Direct, durable_exchange, FieldTable::default())
                .await?;
        }

        // Dead-letter queue
        channel
            .queue_declare(&self.dead_letter_queue, durable_queue, FieldTable::default())
            .await?;
        channel
            .queue_bind(
                &self.dead_letter_queue,
                &self.dead_letter_exchange,
                &self.dead_letter_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        // Retry queue, never consumed and only reached through the default exchange
        channel
            .queue_declare(&self.retry_queue, durable_queue, retry_arguments)
            .await?;

        channel
            .queue_declare(&self.main_queue, durable_queue, self.main_queue_arguments())
            .await?;
        channel
            .queue_bind(
                &self.main_queue,
                &self.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        log::info!(
            "Topology declared: exchange '{}' -> queue '{}' (retry '{}' after {:?}, DLQ '{}')",
            self.exchange,
            self.main_queue,
            self.retry_queue,
            self.retry_delay,
            self.dead_letter_queue
        );
        Ok(())
    }
}
