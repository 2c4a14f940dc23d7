use order_messaging::config::ApiOptions;
use order_messaging::connection::redact_url;
use order_messaging::{http, AmqpPublisher, BrokerConnection};
use std::sync::Arc;
use structopt::StructOpt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = ApiOptions::from_args();
    options.broker.init_logging();

    log::info!("Using RabbitMQ at {}", redact_url(&options.broker.amqp_url));

    // Connection or topology failures end the process.
    let broker = BrokerConnection::open(&options.broker.amqp_url).await?;
    let topology = options.broker.topology();
    topology.declare(broker.channel()).await?;

    let publisher = Arc::new(AmqpPublisher::new(broker.channel().clone(), &topology));
    let app = http::router(publisher, topology.routing_key.clone());

    http::serve(app, options.listen, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
        }
        log::info!("Ctrl+C received. Shutting down.");
    })
    .await?;

    broker.close().await?;
    log::info!("Application has shut down.");
    Ok(())
}
