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
use crate::events::{BidPlaced, BIDS_PLACED_TOPIC};
use crate::projections::BidHistoryProjection;
use crate::prometheus::PrometheusExporter;
use crate::register::Register;
use crate::repeat_until_ok;
use crate::storages::history_storage::{connect_history_storage, PgHistoryStorage};
use crate::storages::InsertOutcome;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct BidsProjectingCtx {
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl BidsProjectingCtx {
    pub async fn setup_and_run(register: &Register) -> Result<Self> {
        PrometheusExporter::run(register).await?;

        let storage_config = register.config.get_history_storage_config();
        let pool = connect_history_storage(storage_config).await?;
        let projection =
            BidHistoryProjection::new(Arc::new(PgHistoryStorage::new(pool, storage_config)));

        let broker_config = register.config.get_broker_config().clone();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(Self::bids_worker(broker_config, projection, shutdown_rx));

        Ok(Self { shutdown, worker })
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, self.worker).await.is_err() {
            error!("Bids worker did not stop within the grace period");
        }
    }

    async fn bids_worker(
        config: BrokerConfig,
        projection: BidHistoryProjection,
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
                        info!("Bids worker stopping");
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
                &config.bids_placed_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &config.bids_placed_queue,
                &config.exchange,
                &format!("{}.#", BIDS_PLACED_TOPIC),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let consumer = channel
            .basic_consume(
                &config.bids_placed_queue,
                "BidProjector_BidsPlacedConsumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!("Bids placed consumer created");

        Ok(consumer)
    }

    async fn handle_delivery(projection: &BidHistoryProjection, delivery: Delivery) {
        let routing_key = delivery.routing_key.as_str().to_string();

        let event = match resolve_topic(&routing_key) {
            None => Err(crate::errors::DecodeError::UnknownTopic(routing_key.clone())),
            Some(topic) => BidPlaced::decode(topic, &delivery.data),
        };

        let event = match event {
            Err(err) => {
                warn!("Skipping poison message on {}: {}", routing_key, err);
                crate::prometheus::POISON_MESSAGES_COUNT.inc();
                ack(delivery).await;
                return;
            }
            Ok(event) => event,
        };

        match projection.on_bid_placed(&event).await {
            Ok(outcome) => {
                if outcome == InsertOutcome::Duplicate {
                    crate::prometheus::DUPLICATE_BIDS_COUNT.inc();
                } else {
                    crate::prometheus::BIDS_PROJECTED_COUNT.inc();
                }
                ack(delivery).await;
            }
            Err(err) => {
                // leave uncommitted; the idempotent insert absorbs the replay
                error!(
                    "Projection failed for bid_id={} auction_id={}: {}",
                    event.bid_id, event.auction_id, err
                );
                crate::prometheus::PROJECTION_RETRIES_COUNT.inc();
                nack(delivery).await;
            }
        }
    }
}

fn resolve_topic(routing_key: &str) -> Option<&'static str> {
    if routing_key == BIDS_PLACED_TOPIC
        || routing_key.starts_with(&format!("{}.", BIDS_PLACED_TOPIC))
    {
        return Some(BIDS_PLACED_TOPIC);
    }
    None
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
