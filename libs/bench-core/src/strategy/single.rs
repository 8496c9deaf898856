use std::time::Duration;

use crate::message::ENCODED_CAPACITY;
use crate::progress::Progress;
use crate::publisher::{close_quietly, Connector};
use crate::report::{RunReport, WorkerTally};
use crate::BenchError;

use super::{publish_message, RunParams, Strategy};

/// Один цикл на одном соединении. Отказ setup прерывает прогон.
/// Таймер стартует после открытия канала.
pub(super) async fn run(connector: &dyn Connector, params: &RunParams) -> Result<RunReport, BenchError> {
    let publisher = connector.connect(&params.channel).await?;

    let progress = Progress::new(params.progress_every);
    let mut tally = WorkerTally::default();
    let mut buf = Vec::with_capacity(ENCODED_CAPACITY);

    for id in 0..params.messages {
        if publish_message(&*publisher, 0, id, params.with_timestamp, &mut buf, &mut tally).await {
            progress.add(1);
        }

        if let Some(rate) = params.rate {
            // Держим среднюю скорость: сообщение i должно уйти не раньше (i + 1) / rate.
            let due = Duration::try_from_secs_f64((id + 1) as f64 / rate).unwrap_or(Duration::ZERO);
            if let Some(wait) = due.checked_sub(progress.elapsed()) {
                tokio::time::sleep(wait).await;
            }
        }
    }

    let elapsed = progress.elapsed();
    close_quietly(&*publisher, 0).await;

    Ok(RunReport::new(Strategy::Single, 1, None, tally, elapsed))
}
