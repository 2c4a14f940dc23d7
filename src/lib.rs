//! # Order messaging
//! Publishes `OrderCreatedEvent`s to RabbitMQ and consumes them with manual
//! acknowledgement, a TTL-delayed retry queue and a dead-letter queue.

pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod event;
pub mod http;
pub mod processor;
pub mod publisher;
pub mod retry;
pub mod topology;

// Re-export key components for easy access
pub use connection::BrokerConnection;
pub use consumer::{ConsumerConfig, DeliveryActions, Disposition, OrderConsumer};
pub use error::WorkerError;
pub use event::OrderCreatedEvent;
pub use processor::{FaultInjection, OrderProcessor, SimulatedWork};
pub use publisher::{AmqpPublisher, EventPublisher};
pub use retry::RetryPolicy;
pub use topology::Topology;
