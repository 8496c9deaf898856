/// Ошибки бенчмарка. Setup-ошибки (connect/channel/declare) завершают
/// воркер или весь прогон, ошибки publish только логируются вызывающим.
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("connect ({url}): {source}")]
    Connect { url: String, source: lapin::Error },

    #[error("channel open: {0}")]
    Channel(#[source] lapin::Error),

    #[error("queue declare ({queue}): {source}")]
    QueueDeclare { queue: String, source: lapin::Error },

    #[error("basic.qos ({prefetch}): {source}")]
    Qos { prefetch: u16, source: lapin::Error },

    #[error("publish: {0}")]
    Publish(#[source] lapin::Error),

    #[error("transaction {op}: {source}")]
    Transaction { op: &'static str, source: lapin::Error },

    #[error("close: {0}")]
    Close(#[source] lapin::Error),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    /// Ошибки in-memory брокера (dry-run, тесты).
    #[error("memory broker: {0}")]
    Memory(String),

    #[error("worker task: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
