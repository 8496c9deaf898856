#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Bench(#[from] bench_core::BenchError),

    #[error("report output: {0}")]
    Output(#[from] serde_json::Error),
}
