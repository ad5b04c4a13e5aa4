//! AMQP 0-9-1 broker via lapin.

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{acker::Acker, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info};

use crate::BoxFuture;

use super::broker::{Acknowledge, BrokerConnector, Delivery, MessageStream};
use super::error::TransportError;

/// Reply code sent when closing a connection normally.
const REPLY_SUCCESS: u16 = 200;

/// Connects to a RabbitMQ-compatible broker.
pub struct AmqpConnector {
    url: String,
    consumer_tag: String,
}

impl AmqpConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            consumer_tag: format!("reliefmap-{}", std::process::id()),
        }
    }

    async fn open(&self, queue: &str, prefetch: u16) -> Result<Box<dyn MessageStream>, TransportError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        let consumer = channel
            .basic_consume(
                queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))?;

        info!(queue = %queue, prefetch, "Connected to broker");
        let stream: Box<dyn MessageStream> = Box::new(AmqpStream {
            connection,
            consumer,
        });
        Ok(stream)
    }
}

impl BrokerConnector for AmqpConnector {
    fn connect<'a>(
        &'a self,
        queue: &'a str,
        prefetch: u16,
    ) -> BoxFuture<'a, Result<Box<dyn MessageStream>, TransportError>> {
        Box::pin(self.open(queue, prefetch))
    }
}

struct AmqpStream {
    connection: Connection,
    consumer: Consumer,
}

impl MessageStream for AmqpStream {
    fn next(&mut self) -> BoxFuture<'_, Option<Result<Delivery, TransportError>>> {
        Box::pin(async move {
            match self.consumer.next().await? {
                Ok(delivery) => Some(Ok(Delivery::new(
                    delivery.data,
                    delivery.redelivered,
                    Box::new(AmqpAcker(delivery.acker)),
                ))),
                Err(e) => Some(Err(TransportError::Consume(e.to_string()))),
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.connection.close(REPLY_SUCCESS, "worker stopping").await {
                debug!(error = %e, "Broker connection already closed");
            }
        })
    }
}

struct AmqpAcker(Acker);

impl Acknowledge for AmqpAcker {
    fn ack(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.0
                .ack(BasicAckOptions::default())
                .await
                .map(|_| ())
                .map_err(|e| TransportError::Acknowledge(e.to_string()))
        })
    }

    fn reject(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.0
                .reject(BasicRejectOptions { requeue: false })
                .await
                .map(|_| ())
                .map_err(|e| TransportError::Acknowledge(e.to_string()))
        })
    }
}
