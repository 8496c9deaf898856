use lapin::options::{BasicPublishOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::publisher::{BoxFuture, ChannelOptions, Connector, Publisher};
use crate::BenchError;

const CONTENT_TYPE: &str = "application/json";
/// AMQP delivery-mode 1: non-persistent.
const TRANSIENT: u8 = 1;
const REPLY_SUCCESS: u16 = 200;

// ═══════════════════════════════════════════════════════════════
//  Connector
// ═══════════════════════════════════════════════════════════════

/// AMQP 0-9-1 коннектор поверх lapin, исполняется на текущем tokio runtime.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    url: String,
}

impl AmqpConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn open(&self, opts: &ChannelOptions) -> Result<AmqpPublisher, BenchError> {
        let props = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        let conn = Connection::connect(&self.url, props)
            .await
            .map_err(|source| BenchError::Connect { url: self.url.clone(), source })?;

        let channel = match conn.create_channel().await {
            Ok(ch) => ch,
            Err(e) => {
                let _ = conn.close(REPLY_SUCCESS, "channel open failed").await;
                return Err(BenchError::Channel(e));
            }
        };

        let publisher = AmqpPublisher { conn, channel, queue: opts.queue.clone() };
        if let Err(e) = publisher.prepare(opts).await {
            let _ = publisher.shutdown().await;
            return Err(e);
        }
        Ok(publisher)
    }
}

impl Connector for AmqpConnector {
    fn name(&self) -> &str {
        "amqp"
    }

    fn connect<'a>(&'a self, opts: &'a ChannelOptions) -> BoxFuture<'a, Result<Box<dyn Publisher>, BenchError>> {
        Box::pin(async move {
            let publisher = self.open(opts).await?;
            Ok(Box::new(publisher) as Box<dyn Publisher>)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  Publisher
// ═══════════════════════════════════════════════════════════════

/// Соединение + канал одного воркера.
pub struct AmqpPublisher {
    conn: Connection,
    channel: Channel,
    queue: String,
}

impl AmqpPublisher {
    async fn prepare(&self, opts: &ChannelOptions) -> Result<(), BenchError> {
        if let Some(prefetch) = opts.prefetch {
            self.channel
                .basic_qos(prefetch, BasicQosOptions::default())
                .await
                .map_err(|source| BenchError::Qos { prefetch, source })?;
        }

        // durable/exclusive/auto_delete/nowait = false
        self.channel
            .queue_declare(&opts.queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|source| BenchError::QueueDeclare { queue: opts.queue.clone(), source })?;

        tracing::debug!(queue = %opts.queue, prefetch = ?opts.prefetch, "channel ready");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BenchError> {
        let channel = self.channel.close(REPLY_SUCCESS, "bye").await;
        let conn = self.conn.close(REPLY_SUCCESS, "bye").await;
        channel.and(conn).map_err(BenchError::Close)
    }
}

fn properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_type(CONTENT_TYPE.into())
        .with_delivery_mode(TRANSIENT)
}

impl Publisher for AmqpPublisher {
    fn publish<'a>(&'a self, body: &'a [u8]) -> BoxFuture<'a, Result<(), BenchError>> {
        Box::pin(async move {
            // Подтверждения не ждём: confirm-режим не включается.
            let _confirm = self
                .channel
                .basic_publish("", &self.queue, BasicPublishOptions::default(), body, properties())
                .await
                .map_err(BenchError::Publish)?;
            Ok(())
        })
    }

    fn select_transactions(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(async move {
            self.channel
                .tx_select()
                .await
                .map_err(|source| BenchError::Transaction { op: "select", source })
        })
    }

    fn commit(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(async move {
            self.channel
                .tx_commit()
                .await
                .map_err(|source| BenchError::Transaction { op: "commit", source })
        })
    }

    fn rollback(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(async move {
            self.channel
                .tx_rollback()
                .await
                .map_err(|source| BenchError::Transaction { op: "rollback", source })
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(self.shutdown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_are_transient_json() {
        let props = properties();
        assert_eq!(props.content_type().as_ref().map(|s| s.as_str()), Some(CONTENT_TYPE));
        assert_eq!(*props.delivery_mode(), Some(TRANSIENT));
    }
}
