use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::message::BenchMessage;
use crate::publisher::{BoxFuture, ChannelOptions, Connector, Publisher};
use crate::BenchError;

/// Брокер в памяти процесса: `--dry-run` и тесты.
///
/// Хранит опубликованные тела по очередям, поддерживает транзакции
/// (буфер до commit, сброс при rollback) и умеет инжектировать отказы
/// connect/publish. В режиме `discarding_bodies` только считает сообщения.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<State>,
    max_connections: Option<usize>,
    fail_every: Option<u64>,
    discard_bodies: bool,
}

#[derive(Debug, Default)]
struct State {
    queues: Mutex<HashMap<String, QueueLog>>,
    connects: AtomicUsize,
    closes: AtomicUsize,
    publishes: AtomicU64,
}

impl State {
    fn queues(&self) -> MutexGuard<'_, HashMap<String, QueueLog>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Содержимое очереди или открытой транзакции.
#[derive(Debug, Default)]
struct QueueLog {
    count: u64,
    bodies: Vec<Vec<u8>>,
}

impl QueueLog {
    fn record(&mut self, body: &[u8], retain: bool) {
        self.count += 1;
        if retain {
            self.bodies.push(body.to_vec());
        }
    }

    fn absorb(&mut self, other: QueueLog) {
        self.count += other.count;
        self.bodies.extend(other.bodies);
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Соединения сверх `limit` отклоняются.
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.max_connections = Some(limit);
        self
    }

    /// Каждый `n`-й publish (по всем каналам) завершается ошибкой.
    pub fn failing_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n).filter(|n| *n > 0);
        self
    }

    /// Не хранить тела, только счётчики: для `--dry-run` на больших объёмах.
    pub fn discarding_bodies(mut self) -> Self {
        self.discard_bodies = true;
        self
    }

    pub fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state.queues().get(queue).map(|log| log.bodies.clone()).unwrap_or_default()
    }

    /// Число доставленных (закоммиченных) сообщений, в том числе без хранения тел.
    pub fn published_count(&self, queue: &str) -> u64 {
        self.state.queues().get(queue).map_or(0, |log| log.count)
    }

    /// Id всех сообщений очереди в порядке поступления.
    pub fn published_ids(&self, queue: &str) -> Result<Vec<u64>, BenchError> {
        self.state
            .queues()
            .get(queue)
            .map(|log| {
                log.bodies
                    .iter()
                    .map(|b| serde_json::from_slice::<BenchMessage>(b).map(|m| m.id))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map(Option::unwrap_or_default)
            .map_err(BenchError::from)
    }

    pub fn declared(&self, queue: &str) -> bool {
        self.state.queues().contains_key(queue)
    }

    /// Успешно открытые соединения.
    pub fn connections(&self) -> usize {
        self.state.connects.load(Ordering::Relaxed)
    }

    pub fn open_connections(&self) -> usize {
        self.connections() - self.state.closes.load(Ordering::Relaxed)
    }
}

impl Connector for MemoryBroker {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect<'a>(&'a self, opts: &'a ChannelOptions) -> BoxFuture<'a, Result<Box<dyn Publisher>, BenchError>> {
        Box::pin(async move {
            let admitted = self.state.connects.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                match self.max_connections {
                    Some(limit) if n >= limit => None,
                    _ => Some(n + 1),
                }
            });
            if admitted.is_err() {
                return Err(BenchError::Memory("connection refused".into()));
            }

            self.state.queues().entry(opts.queue.clone()).or_default();

            Ok(Box::new(MemoryPublisher {
                state: self.state.clone(),
                queue: opts.queue.clone(),
                fail_every: self.fail_every,
                retain: !self.discard_bodies,
                pending: Mutex::new(None),
            }) as Box<dyn Publisher>)
        })
    }
}

struct MemoryPublisher {
    state: Arc<State>,
    queue: String,
    fail_every: Option<u64>,
    retain: bool,
    /// `Some` в транзакционном режиме: сообщения, ждущие commit.
    pending: Mutex<Option<QueueLog>>,
}

impl MemoryPublisher {
    fn pending(&self) -> MutexGuard<'_, Option<QueueLog>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, body: &[u8]) -> Result<(), BenchError> {
        let n = self.state.publishes.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every.is_some_and(|every| n % every == 0) {
            return Err(BenchError::Memory(format!("injected failure on publish #{n}")));
        }

        if let Some(tx) = self.pending().as_mut() {
            tx.record(body, self.retain);
            return Ok(());
        }
        self.state.queues().entry(self.queue.clone()).or_default().record(body, self.retain);
        Ok(())
    }

    fn finish_tx(&self, commit: bool) -> Result<(), BenchError> {
        let mut pending = self.pending();
        let tx = pending
            .as_mut()
            .ok_or_else(|| BenchError::Memory("channel is not in transaction mode".into()))?;
        let batch = std::mem::take(tx);
        drop(pending);

        if commit {
            self.state.queues().entry(self.queue.clone()).or_default().absorb(batch);
        }
        Ok(())
    }
}

impl Publisher for MemoryPublisher {
    fn publish<'a>(&'a self, body: &'a [u8]) -> BoxFuture<'a, Result<(), BenchError>> {
        Box::pin(async move { self.push(body) })
    }

    fn select_transactions(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(async move {
            self.pending().get_or_insert_with(QueueLog::default);
            Ok(())
        })
    }

    fn commit(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(async move { self.finish_tx(true) })
    }

    fn rollback(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(async move { self.finish_tx(false) })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), BenchError>> {
        Box::pin(async move {
            self.state.closes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transaction_commit_and_rollback() {
        let broker = MemoryBroker::new();
        let opts = ChannelOptions::new("q");
        let p = broker.connect(&opts).await.unwrap();

        p.select_transactions().await.unwrap();
        p.publish(b"a").await.unwrap();
        assert!(broker.published("q").is_empty());
        p.commit().await.unwrap();
        assert_eq!(broker.published("q"), vec![b"a".to_vec()]);

        p.publish(b"b").await.unwrap();
        p.rollback().await.unwrap();
        assert_eq!(broker.published("q").len(), 1);
    }

    #[tokio::test]
    async fn commit_without_select_fails() {
        let broker = MemoryBroker::new();
        let p = broker.connect(&ChannelOptions::new("q")).await.unwrap();
        assert!(p.commit().await.is_err());
    }

    #[tokio::test]
    async fn connection_limit_and_close_tracking() {
        let broker = MemoryBroker::new().with_connection_limit(1);
        let opts = ChannelOptions::new("q");
        let p = broker.connect(&opts).await.unwrap();
        assert!(broker.connect(&opts).await.is_err());
        assert!(broker.declared("q"));
        assert_eq!(broker.open_connections(), 1);
        p.close().await.unwrap();
        assert_eq!(broker.open_connections(), 0);
    }

    #[tokio::test]
    async fn injected_publish_failures() {
        let broker = MemoryBroker::new().failing_every(3);
        let p = broker.connect(&ChannelOptions::new("q")).await.unwrap();
        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(p.publish(b"x").await.is_ok());
        }
        assert_eq!(results, vec![true, true, false, true, true, false]);
        assert_eq!(broker.published("q").len(), 4);
    }

    #[tokio::test]
    async fn discarding_bodies_keeps_only_counts() {
        let broker = MemoryBroker::new().discarding_bodies();
        let opts = ChannelOptions::new("q");
        let plain = broker.connect(&opts).await.unwrap();
        let tx = broker.connect(&opts).await.unwrap();

        plain.publish(b"a").await.unwrap();
        tx.select_transactions().await.unwrap();
        tx.publish(b"b").await.unwrap();
        tx.publish(b"c").await.unwrap();
        assert_eq!(broker.published_count("q"), 1);
        tx.commit().await.unwrap();
        tx.publish(b"d").await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(broker.published_count("q"), 3);
        assert!(broker.published("q").is_empty());
        assert_eq!(broker.published_ids("q").unwrap(), Vec::<u64>::new());
    }
}
