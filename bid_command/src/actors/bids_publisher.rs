use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use log::{info, warn};
use tokio::sync::{mpsc, oneshot};

use crate::configuration::BrokerConfig;
use crate::domain::events::BidPlaced;
use crate::errors::PublishError;
use crate::register::Register;

/// Port used by the command service to emit `bids.placed` after commit.
#[async_trait]
pub trait BidsPlacedPublisher: Send + Sync {
    async fn publish_bid_placed(&self, event: BidPlaced) -> Result<(), PublishError>;
}

struct BidsPublisher {
    receiver: mpsc::Receiver<BidsPublisherMessage>,
    channel: Channel,
    exchange: String,
    topic: String,
    publish_timeout_ms: u64,
}

enum BidsPublisherMessage {
    PublishBidPlaced {
        respond_to: oneshot::Sender<Result<(), PublishError>>,
        event: BidPlaced,
    },
    Ping {
        respond_to: oneshot::Sender<bool>,
    },
}

impl BidsPublisher {
    async fn new(
        config: &BrokerConfig,
        receiver: mpsc::Receiver<BidsPublisherMessage>,
    ) -> Result<Self, PublishError> {
        let connection =
            Connection::connect(&config.broker_url, ConnectionProperties::default()).await?;

        info!("Connection to broker has been established");

        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        // Declared on both ends so events published before any consumer
        // exists are retained in the queue.
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
                &config.bids_placed_topic,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &config.bids_placed_topic,
                &config.exchange,
                &format!("{}.#", config.bids_placed_topic),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(Self {
            receiver,
            channel,
            exchange: config.exchange.clone(),
            topic: config.bids_placed_topic.clone(),
            publish_timeout_ms: config.publish_timeout_ms,
        })
    }

    async fn publish(&self, event: &BidPlaced) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        // The routing key carries the auction id, so all events of one
        // auction flow through the binding as a single ordered stream.
        let routing_key = format!("{}.{}", self.topic, event.auction_id);

        let mut headers = FieldTable::default();
        headers.insert(
            "content-type".into(),
            AMQPValue::LongString("application/json".into()),
        );
        headers.insert(
            "schema".into(),
            AMQPValue::LongString(self.topic.as_str().into()),
        );
        headers.insert("schema-version".into(), AMQPValue::LongString("1".into()));

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_headers(headers);

        let publish = async {
            let confirm = self
                .channel
                .basic_publish(
                    &self.exchange,
                    &routing_key,
                    BasicPublishOptions::default(),
                    &payload,
                    properties,
                )
                .await?;
            confirm.await?;
            Ok::<_, lapin::Error>(())
        };

        tokio::time::timeout(Duration::from_millis(self.publish_timeout_ms), publish)
            .await
            .map_err(|_| PublishError::Timeout(self.publish_timeout_ms))??;

        Ok(())
    }

    async fn handle_message(&mut self, msg: BidsPublisherMessage) {
        match msg {
            BidsPublisherMessage::PublishBidPlaced { respond_to, event } => {
                let result = self.publish(&event).await;
                let _ = respond_to.send(result);
            }
            BidsPublisherMessage::Ping { respond_to } => {
                let _ = respond_to.send(self.channel.status().connected());
            }
        }
    }

    async fn run(&mut self) {
        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg).await;
        }
    }
}

#[derive(Clone)]
pub struct BidsPublisherHandle {
    sender: mpsc::Sender<BidsPublisherMessage>,
}

impl BidsPublisherHandle {
    pub async fn new(register: &Register) -> Result<Self, PublishError> {
        let (sender, receiver) = mpsc::channel(100);
        let mut publisher =
            BidsPublisher::new(register.config.get_broker_config(), receiver).await?;
        tokio::spawn(async move { publisher.run().await });

        Ok(Self { sender })
    }

    pub async fn ping(&self) -> bool {
        let (sender, receiver) = oneshot::channel();
        let msg = BidsPublisherMessage::Ping { respond_to: sender };

        if self.sender.send(msg).await.is_err() {
            warn!("Bids publisher task is gone");
            return false;
        }
        receiver.await.unwrap_or(false)
    }
}

#[async_trait]
impl BidsPlacedPublisher for BidsPublisherHandle {
    async fn publish_bid_placed(&self, event: BidPlaced) -> Result<(), PublishError> {
        let (sender, receiver) = oneshot::channel();
        let msg = BidsPublisherMessage::PublishBidPlaced {
            respond_to: sender,
            event,
        };

        self.sender
            .send(msg)
            .await
            .map_err(|_| PublishError::PublisherGone)?;
        receiver.await.map_err(|_| PublishError::PublisherGone)?
    }
}
