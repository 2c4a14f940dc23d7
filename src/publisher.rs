//! Publishing order events onto the main exchange.

use crate::error::WorkerError;
use crate::topology::Topology;
use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, BasicProperties, Channel};
use serde::Serialize;

/// AMQP delivery mode for messages that survive a broker restart.
pub const PERSISTENT: u8 = 2;

/// Sends serialized events to the broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an already serialized JSON body with the given routing key.
    async fn publish_bytes(&self, routing_key: &str, body: Vec<u8>) -> Result<(), WorkerError>;

    /// Serializes `message` to JSON and publishes it.
    async fn publish_json<T: Serialize + Sync>(&self, routing_key: &str, message: &T) -> Result<(), WorkerError>
    where
        Self: Sized,
    {
        let body = serde_json::to_vec(message)?;
        self.publish_bytes(routing_key, body).await
    }
}

/// Properties attached to every published event.
pub fn publish_properties() -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(PERSISTENT)
        .with_content_type("application/json".into())
}

/// Publishes onto the topology's main exchange over a lapin channel.
///
/// Publisher confirms are not requested, so a successful return only means the
/// frame was handed to the connection.
#[derive(Clone)]
pub struct AmqpPublisher {
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    pub fn new(channel: Channel, topology: &Topology) -> Self {
        Self {
            channel,
            exchange: topology.exchange.clone(),
        }
    }
}

#[async_trait]
impl EventPublisher for AmqpPublisher {
    async fn publish_bytes(&self, routing_key: &str, body: Vec<u8>) -> Result<(), WorkerError> {
        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                publish_properties(),
            )
            .await?;

        log::debug!("Published {} bytes to '{}' with routing key '{}'", body.len(), self.exchange, routing_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl EventPublisher for Recording {
        async fn publish_bytes(&self, routing_key: &str, body: Vec<u8>) -> Result<(), WorkerError> {
            self.published.lock().unwrap().push((routing_key.to_string(), body));
            Ok(())
        }
    }

    #[test]
    fn messages_are_persistent_json() {
        let props = publish_properties();
        assert_eq!(*props.delivery_mode(), Some(PERSISTENT));
        assert_eq!(props.content_type().as_ref().map(|c| c.as_str()), Some("application/json"));
    }

    #[tokio::test]
    async fn publish_json_serializes_before_delegating() {
        let publisher = Recording::default();
        let event = crate::event::OrderCreatedEvent::demo();

        publisher.publish_json("orders.created", &event).await.unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "orders.created");
        assert_eq!(published[0].1, event.to_json_bytes().unwrap());
    }
}
