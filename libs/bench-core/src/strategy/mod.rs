mod batch;
mod pool;
mod single;
mod ultra_batch;
mod ultra_fast;

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::message::{BenchMessage, ENCODED_CAPACITY};
use crate::progress::DEFAULT_REPORT_EVERY;
use crate::publisher::{close_quietly, ChannelOptions, Connector, Publisher};
use crate::report::{RunReport, WorkerTally};
use crate::BenchError;

// ═══════════════════════════════════════════════════════════════
//  Strategy
// ═══════════════════════════════════════════════════════════════

/// Способ распределения нагрузки по воркерам.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Один цикл, одно соединение.
    Single,
    /// Пул воркеров, id раздаются через общий канал.
    Pool,
    /// Диапазон id делится между воркерами, публикация батчами.
    Batch,
    /// Переподписка (CPU × 2), соединения открываются заранее,
    /// преаллоцированные буферы кодирования.
    UltraFast,
    /// Как ultra-fast, но каждый батч идёт отдельной AMQP-транзакцией.
    UltraBatch,
}

impl Strategy {
    pub const ALL: [Strategy; 5] =
        [Strategy::Single, Strategy::Pool, Strategy::Batch, Strategy::UltraFast, Strategy::UltraBatch];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Single => "single",
            Strategy::Pool => "pool",
            Strategy::Batch => "batch",
            Strategy::UltraFast => "ultra-fast",
            Strategy::UltraBatch => "ultra-batch",
        }
    }

    /// Параметры по умолчанию для машины с `cpus` ядрами.
    pub fn defaults(self, cpus: usize) -> RunParams {
        let cpus = cpus.max(1);
        let (messages, workers, batch_size, with_timestamp, queue, prefetch) = match self {
            Strategy::Single => (50_000, 1, 1, true, "single_queue", None),
            Strategy::Pool => (50_000, cpus, 1, true, "worker_queue", None),
            Strategy::Batch => (50_000, cpus, 100, true, "batch_queue", None),
            Strategy::UltraFast => (500_000, cpus * 2, 100, true, "ultra_fast_queue", Some(1000)),
            Strategy::UltraBatch => (500_000, cpus, 1000, false, "ultra_batch_queue", Some(5000)),
        };
        RunParams {
            messages,
            workers,
            batch_size,
            with_timestamp,
            rate: None,
            progress_every: DEFAULT_REPORT_EVERY,
            channel: ChannelOptions::new(queue).with_prefetch(prefetch),
        }
    }

    fn batched(self) -> bool {
        matches!(self, Strategy::Batch | Strategy::UltraFast | Strategy::UltraBatch)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Run parameters
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    /// Сколько сообщений опубликовать: id `0..messages`.
    pub messages: u64,
    pub workers: usize,
    /// Размер батча (batch, ultra-fast, ultra-batch).
    pub batch_size: usize,
    /// Добавлять `timestamp` в каждое сообщение.
    pub with_timestamp: bool,
    /// Целевая скорость, msgs/sec (только single).
    pub rate: Option<f64>,
    /// Интервал строк прогресса; 0 отключает.
    pub progress_every: u64,
    pub channel: ChannelOptions,
}

impl RunParams {
    pub fn validate(&self, strategy: Strategy) -> Result<(), BenchError> {
        if self.workers == 0 {
            return Err(BenchError::Config("workers must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(BenchError::Config("batch size must be at least 1".into()));
        }
        if self.channel.queue.is_empty() {
            return Err(BenchError::Config("queue name must not be empty".into()));
        }
        match self.rate {
            Some(_) if strategy != Strategy::Single => Err(BenchError::Config(format!(
                "target rate is only supported by the single strategy, not {strategy}"
            ))),
            Some(rate) if !(rate.is_finite() && rate > 0.0) => {
                Err(BenchError::Config(format!("target rate must be positive, got {rate}")))
            }
            // Последнее сообщение должно уложиться в представимый Duration.
            Some(rate) if Duration::try_from_secs_f64(self.messages as f64 / rate).is_err() => Err(
                BenchError::Config(format!("target rate {rate} is too low for {} messages", self.messages)),
            ),
            _ => Ok(()),
        }
    }
}

/// Число ядер, доступных процессу.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1)
}

// ═══════════════════════════════════════════════════════════════
//  Dispatch
// ═══════════════════════════════════════════════════════════════

/// Прогнать одну стратегию против брокера `connector`.
pub async fn run(
    strategy: Strategy,
    connector: Arc<dyn Connector>,
    params: &RunParams,
) -> Result<RunReport, BenchError> {
    params.validate(strategy)?;

    tracing::info!(
        %strategy,
        broker = connector.name(),
        messages = params.messages,
        workers = if strategy == Strategy::Single { 1 } else { params.workers },
        batch_size = strategy.batched().then_some(params.batch_size),
        queue = %params.channel.queue,
        "starting run"
    );

    let report = match strategy {
        Strategy::Single => single::run(&*connector, params).await?,
        Strategy::Pool => pool::run(connector, params).await?,
        Strategy::Batch => batch::run(connector, params).await?,
        Strategy::UltraFast => ultra_fast::run(connector, params).await?,
        Strategy::UltraBatch => ultra_batch::run(connector, params).await?,
    };

    tracing::info!(
        %strategy,
        sent = report.sent,
        failed = report.failed,
        elapsed_s = format_args!("{:.2}", report.elapsed_secs),
        rate = format_args!("{:.0}", report.rate),
        "run complete"
    );
    Ok(report)
}

// ═══════════════════════════════════════════════════════════════
//  Shared worker helpers
// ═══════════════════════════════════════════════════════════════

/// Опубликовать готовое тело. Ошибка логируется и учитывается в `tally`.
async fn publish_body(publisher: &dyn Publisher, worker: usize, body: &[u8], tally: &mut WorkerTally) -> bool {
    match publisher.publish(body).await {
        Ok(()) => {
            tally.sent += 1;
            true
        }
        Err(e) => {
            tracing::warn!(worker, error = %e, "publish failed");
            tally.failed += 1;
            false
        }
    }
}

/// Собрать сообщение `id`, закодировать в `buf` и опубликовать.
async fn publish_message(
    publisher: &dyn Publisher,
    worker: usize,
    id: u64,
    with_timestamp: bool,
    buf: &mut Vec<u8>,
    tally: &mut WorkerTally,
) -> bool {
    if let Err(e) = BenchMessage::encode_id(id, with_timestamp, buf) {
        tracing::warn!(worker, id, error = %e, "encode failed");
        tally.failed += 1;
        return false;
    }
    publish_body(publisher, worker, buf, tally).await
}

/// Открыть `n` соединений заранее. Любой отказ закрывает уже открытые
/// и прерывает весь прогон.
async fn open_all(
    connector: &dyn Connector,
    opts: &ChannelOptions,
    n: usize,
) -> Result<Vec<Box<dyn Publisher>>, BenchError> {
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::with_capacity(n);
    for worker in 0..n {
        match connector.connect(opts).await {
            Ok(p) => publishers.push(p),
            Err(e) => {
                tracing::error!(worker, error = %e, "failed to create producer, aborting run");
                for (w, p) in publishers.iter().enumerate() {
                    close_quietly(&**p, w).await;
                }
                return Err(e);
            }
        }
    }
    tracing::info!(connections = n, "producers ready");
    Ok(publishers)
}

/// Барьер: дождаться всех воркеров и сложить их счётчики.
async fn join_workers(handles: Vec<JoinHandle<WorkerTally>>) -> Result<WorkerTally, BenchError> {
    let mut total = WorkerTally::default();
    for handle in handles {
        total += handle.await?;
    }
    Ok(total)
}

/// Буферы кодирования на один батч, аллоцируются один раз на воркера.
struct BatchBuffers {
    slots: Vec<Vec<u8>>,
    len: usize,
}

impl BatchBuffers {
    fn new(batch_size: usize) -> Self {
        Self {
            slots: (0..batch_size).map(|_| Vec::with_capacity(ENCODED_CAPACITY)).collect(),
            len: 0,
        }
    }

    /// Закодировать батч `ids` (не длиннее `batch_size`). Сообщения, которые
    /// не удалось закодировать, пропускаются и идут в `tally.failed`.
    fn fill(&mut self, ids: Range<u64>, with_timestamp: bool, worker: usize, tally: &mut WorkerTally) {
        self.len = 0;
        for id in ids {
            match BenchMessage::encode_id(id, with_timestamp, &mut self.slots[self.len]) {
                Ok(()) => self.len += 1,
                Err(e) => {
                    tracing::warn!(worker, id, error = %e, "encode failed");
                    tally.failed += 1;
                }
            }
        }
    }

    fn filled(&self) -> &[Vec<u8>] {
        &self.slots[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_cpu_count() {
        assert_eq!(Strategy::Single.defaults(8).workers, 1);
        assert_eq!(Strategy::Pool.defaults(8).workers, 8);
        assert_eq!(Strategy::UltraFast.defaults(8).workers, 16);
        assert_eq!(Strategy::UltraBatch.defaults(8).batch_size, 1000);
        assert_eq!(Strategy::UltraBatch.defaults(8).channel.prefetch, Some(5000));
        assert_eq!(Strategy::Batch.defaults(0).workers, 1);
    }

    #[test]
    fn rate_only_for_single() {
        let mut params = Strategy::Pool.defaults(2);
        params.rate = Some(100.0);
        assert!(matches!(params.validate(Strategy::Pool), Err(BenchError::Config(_))));

        let mut params = Strategy::Single.defaults(2);
        params.rate = Some(100.0);
        assert!(params.validate(Strategy::Single).is_ok());
        params.rate = Some(0.0);
        assert!(params.validate(Strategy::Single).is_err());
    }

    #[test]
    fn rate_too_low_for_message_count_rejected() {
        let mut params = Strategy::Single.defaults(1);
        params.messages = 1;
        params.rate = Some(1e-30);
        assert!(matches!(params.validate(Strategy::Single), Err(BenchError::Config(_))));

        // 1 сообщение в сутки: длинный, но представимый интервал.
        params.rate = Some(1.0 / 86_400.0);
        assert!(params.validate(Strategy::Single).is_ok());
    }

    #[test]
    fn zero_workers_or_batch_rejected() {
        let mut params = Strategy::Batch.defaults(2);
        params.workers = 0;
        assert!(params.validate(Strategy::Batch).is_err());
        let mut params = Strategy::Batch.defaults(2);
        params.batch_size = 0;
        assert!(params.validate(Strategy::Batch).is_err());
    }

    #[test]
    fn batch_buffers_reuse_slots() {
        let mut buffers = BatchBuffers::new(4);
        let mut tally = WorkerTally::default();
        buffers.fill(10..14, false, 0, &mut tally);
        assert_eq!(buffers.filled().len(), 4);
        buffers.fill(14..16, false, 0, &mut tally);
        assert_eq!(buffers.filled().len(), 2);
        assert_eq!(buffers.filled()[1], br#"{"id":15,"content":"Hello World #15"}"#);
        assert_eq!(tally, WorkerTally::default());
    }

    #[test]
    fn strategy_names_round_trip_through_serde() {
        for s in Strategy::ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.name()));
        }
    }
}
