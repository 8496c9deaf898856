use std::sync::Arc;
use std::time::Instant;

use crate::partition::{batches, partition, Batches};
use crate::progress::Progress;
use crate::publisher::{close_quietly, Connector, Publisher};
use crate::report::{RunReport, WorkerTally};
use crate::BenchError;

use super::{join_workers, open_all, publish_body, BatchBuffers, RunParams, Strategy};

/// Все соединения открываются до старта воркеров (отказ любого прерывает
/// прогон). Воркер кодирует батч в свои преаллоцированные буферы и затем
/// публикует его целиком.
pub(super) async fn run(connector: Arc<dyn Connector>, params: &RunParams) -> Result<RunReport, BenchError> {
    let plans = partition(params.messages, params.workers)?
        .into_iter()
        .map(|range| batches(range, params.batch_size))
        .collect::<Result<Vec<_>, _>>()?;

    let started = Instant::now();
    let publishers = open_all(&*connector, &params.channel, params.workers).await?;
    let progress = Arc::new(Progress::starting_at(params.progress_every, started));

    let handles = publishers
        .into_iter()
        .zip(plans)
        .enumerate()
        .map(|(worker, (publisher, plan))| {
            let progress = progress.clone();
            let batch_size = params.batch_size;
            let with_timestamp = params.with_timestamp;
            tokio::spawn(async move {
                ultra_fast_worker(worker, publisher, plan, batch_size, with_timestamp, &progress).await
            })
        })
        .collect();

    let tally = join_workers(handles).await?;

    Ok(RunReport::new(Strategy::UltraFast, params.workers, Some(params.batch_size), tally, started.elapsed()))
}

async fn ultra_fast_worker(
    worker: usize,
    publisher: Box<dyn Publisher>,
    plan: Batches,
    batch_size: usize,
    with_timestamp: bool,
    progress: &Progress,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    let mut buffers = BatchBuffers::new(batch_size);

    for batch in plan {
        buffers.fill(batch, with_timestamp, worker, &mut tally);

        let before = tally.sent;
        for body in buffers.filled() {
            publish_body(&*publisher, worker, body, &mut tally).await;
        }
        progress.add(tally.sent - before);
    }

    close_quietly(&*publisher, worker).await;
    tally
}
