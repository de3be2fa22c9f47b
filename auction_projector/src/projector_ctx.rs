use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_lite::stream::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, Consumer, ExchangeKind};
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::configuration::BrokerConfig;
use crate::errors::BrokerError;
use crate::events::{AuctionEvent, AUCTION_CLOSED_TOPIC, AUCTION_OPENED_TOPIC};
use crate::projections::AuctionProjection;
use crate::prometheus::PrometheusExporter;
use crate::register::Register;
use crate::repeat_until_ok;
use crate::storages::redis_cache::RedisMetadataCache;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct LifecycleProjectingCtx {
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl LifecycleProjectingCtx {
    pub async fn setup_and_run(register: &Register) -> Result<Self> {
        PrometheusExporter::run(register).await?;

        let cache_config = register.config.get_metadata_cache_config();
        let cache = RedisMetadataCache::new(cache_config).await?;
        let projection = AuctionProjection::new(
            Arc::new(cache),
            Duration::from_secs(cache_config.ttl_buffer_secs),
            Duration::from_secs(cache_config.closed_retention_secs),
        );

        let broker_config = register.config.get_broker_config().clone();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(Self::lifecycle_worker(
            broker_config,
            projection,
            shutdown_rx,
        ));

        Ok(Self { shutdown, worker })
    }

    /// Flips the shutdown flag and lets the worker drain its in-flight
    /// delivery.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, self.worker).await.is_err() {
            error!("Lifecycle worker did not stop within the grace period");
        }
    }

    async fn lifecycle_worker(
        config: BrokerConfig,
        projection: AuctionProjection,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let mut consumer = repeat_until_ok!(Self::create_consumer(&config).await, 5);

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("Lifecycle worker stopping");
                        return;
                    }
                    delivery = consumer.next() => match delivery {
                        None => {
                            error!("Broker channel closed, reconnecting");
                            break;
                        }
                        Some(Err(err)) => {
                            error!("Cannot consume message from broker: {:#?}", err);
                            break;
                        }
                        Some(Ok(delivery)) => {
                            Self::handle_delivery(&projection, delivery).await;
                        }
                    }
                }
            }
        }
    }

    async fn create_consumer(config: &BrokerConfig) -> Result<Consumer, BrokerError> {
        let connection =
            Connection::connect(&config.broker_url, ConnectionProperties::default()).await?;

        info!("Connection to broker has been established");

        let channel = connection.create_channel().await?;
        // one unacknowledged delivery at a time keeps the stream ordered
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &config.lifecycle_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        // Both lifecycle topics flow into one queue, so opened/closed of one
        // auction keep their relative order.
        for topic in [AUCTION_OPENED_TOPIC, AUCTION_CLOSED_TOPIC] {
            channel
                .queue_bind(
                    &config.lifecycle_queue,
                    &config.exchange,
                    &format!("{}.#", topic),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let consumer = channel
            .basic_consume(
                &config.lifecycle_queue,
                "AuctionProjector_LifecycleConsumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!("Lifecycle consumer created");

        Ok(consumer)
    }

    async fn handle_delivery(projection: &AuctionProjection, delivery: Delivery) {
        let routing_key = delivery.routing_key.as_str().to_string();

        let event = match resolve_topic(&routing_key) {
            None => Err(crate::errors::DecodeError::UnknownTopic(routing_key.clone())),
            Some(topic) => AuctionEvent::decode(topic, &delivery.data),
        };

        let event = match event {
            Err(err) => {
                // poison messages must not stall the queue
                warn!("Skipping poison message on {}: {}", routing_key, err);
                crate::prometheus::POISON_MESSAGES_COUNT.inc();
                ack(delivery).await;
                return;
            }
            Ok(event) => event,
        };

        let applied = match &event {
            AuctionEvent::Opened(opened) => projection.on_auction_opened(opened).await,
            AuctionEvent::Closed(closed) => projection.on_auction_closed(closed).await,
        };

        match applied {
            Ok(applied) => {
                if applied {
                    crate::prometheus::EVENTS_PROJECTED_COUNT
                        .with_label_values(&[event_label(&event)])
                        .inc();
                } else {
                    crate::prometheus::STALE_EVENTS_COUNT.inc();
                }
                ack(delivery).await;
            }
            Err(err) => {
                // transient cache failure: leave the message uncommitted
                error!("Projection failed on {}: {}", routing_key, err);
                crate::prometheus::PROJECTION_RETRIES_COUNT.inc();
                nack(delivery).await;
            }
        }
    }
}

fn resolve_topic(routing_key: &str) -> Option<&'static str> {
    for topic in [AUCTION_OPENED_TOPIC, AUCTION_CLOSED_TOPIC] {
        if routing_key == topic || routing_key.starts_with(&format!("{}.", topic)) {
            return Some(topic);
        }
    }
    None
}

fn event_label(event: &AuctionEvent) -> &'static str {
    match event {
        AuctionEvent::Opened(_) => "auction.opened",
        AuctionEvent::Closed(_) => "auction.closed",
    }
}

async fn ack(delivery: Delivery) {
    if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
        error!("Cannot ack message: {:#?}", err);
    }
}

async fn nack(delivery: Delivery) {
    let options = BasicNackOptions {
        requeue: true,
        ..Default::default()
    };
    if let Err(err) = delivery.nack(options).await {
        error!("Cannot nack message: {:#?}", err);
    }
}
