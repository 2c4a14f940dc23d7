use order_messaging::config::ProcessorOptions;
use order_messaging::connection::redact_url;
use order_messaging::{
    BrokerConnection, ConsumerConfig, FaultInjection, OrderConsumer, OrderProcessor, SimulatedWork, WorkerError,
};
use std::sync::Arc;
use structopt::StructOpt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = ProcessorOptions::from_args();
    options.broker.init_logging();

    log::info!("Using RabbitMQ at {}", redact_url(&options.broker.amqp_url));

    // Connection or topology failures end the process.
    let broker = BrokerConnection::open(&options.broker.amqp_url).await?;
    let config = options.consumer_config();
    config.topology.declare(broker.channel()).await?;

    let work = SimulatedWork::new(options.processing_delay);
    if options.fault_injection {
        log::warn!(
            "Fault injection enabled: orders above {} fail with probability {}",
            options.fault_threshold,
            options.fault_probability
        );
        let processor = FaultInjection::with_settings(work, options.fault_threshold, options.fault_probability);
        consume(processor, config, &broker).await?;
    } else {
        consume(work, config, &broker).await?;
    }

    broker.close().await?;
    log::info!("Application has shut down.");
    Ok(())
}

async fn consume<P: OrderProcessor + 'static>(
    processor: P,
    config: ConsumerConfig,
    broker: &BrokerConnection,
) -> Result<(), WorkerError> {
    let consumer = Arc::new(OrderConsumer::new(Arc::new(processor), config));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl+C received. Shutting down.");
            Ok(())
        },
        result = consumer.run(broker.channel().clone()) => {
            if let Err(ref e) = result {
                log::error!("Consumer failed: {}", e);
            }
            result
        }
    }
}
