use std::future::Future;
use std::pin::Pin;

use crate::BenchError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ═══════════════════════════════════════════════════════════════
//  Channel options
// ═══════════════════════════════════════════════════════════════

/// Параметры канала, который открывает каждый воркер.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Очередь (routing key на default exchange). Объявляется
    /// non-durable, non-exclusive, без auto-delete.
    pub queue: String,
    /// basic.qos prefetch count; при `None` не выставляется.
    pub prefetch: Option<u16>,
}

impl ChannelOptions {
    pub fn new(queue: impl Into<String>) -> Self {
        Self { queue: queue.into(), prefetch: None }
    }

    pub fn with_prefetch(mut self, prefetch: Option<u16>) -> Self {
        self.prefetch = prefetch;
        self
    }
}

// ═══════════════════════════════════════════════════════════════
//  Broker traits
// ═══════════════════════════════════════════════════════════════

/// Фабрика соединений с брокером. Один вызов `connect` = одно соединение
/// + один канал + объявленная очередь, принадлежащие одному воркеру.
pub trait Connector: Send + Sync {
    /// Короткое имя для логов ("amqp", "memory").
    fn name(&self) -> &str;

    fn connect<'a>(&'a self, opts: &'a ChannelOptions) -> BoxFuture<'a, Result<Box<dyn Publisher>, BenchError>>;
}

/// Канал публикации одного воркера.
///
/// `publish` не ждёт подтверждений: сообщения transient, content type
/// `application/json`, exchange по умолчанию.
pub trait Publisher: Send + Sync {
    fn publish<'a>(&'a self, body: &'a [u8]) -> BoxFuture<'a, Result<(), BenchError>>;

    /// Перевести канал в транзакционный режим (tx.select).
    fn select_transactions(&self) -> BoxFuture<'_, Result<(), BenchError>>;

    fn commit(&self) -> BoxFuture<'_, Result<(), BenchError>>;

    fn rollback(&self) -> BoxFuture<'_, Result<(), BenchError>>;

    /// Закрыть канал и соединение.
    fn close(&self) -> BoxFuture<'_, Result<(), BenchError>>;
}

/// Закрыть publisher, залогировав ошибку вместо её возврата.
pub(crate) async fn close_quietly(publisher: &dyn Publisher, worker: usize) {
    if let Err(e) = publisher.close().await {
        tracing::warn!(worker, error = %e, "close failed");
    }
}
