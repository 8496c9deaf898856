use std::sync::Arc;
use std::time::Instant;

use crate::partition::{batches, partition, Batches};
use crate::progress::Progress;
use crate::publisher::{close_quietly, Connector, Publisher};
use crate::report::{RunReport, WorkerTally};
use crate::BenchError;

use super::{join_workers, open_all, BatchBuffers, RunParams, Strategy};

/// Как ultra-fast, но канал каждого воркера в транзакционном режиме и
/// каждый батч фиксируется tx.commit. Ошибка publish откатывает батч,
/// ошибка commit тоже засчитывает весь батч как failed.
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
                ultra_batch_worker(worker, publisher, plan, batch_size, with_timestamp, &progress).await
            })
        })
        .collect();

    let tally = join_workers(handles).await?;

    Ok(RunReport::new(Strategy::UltraBatch, params.workers, Some(params.batch_size), tally, started.elapsed()))
}

async fn ultra_batch_worker(
    worker: usize,
    publisher: Box<dyn Publisher>,
    plan: Batches,
    batch_size: usize,
    with_timestamp: bool,
    progress: &Progress,
) -> WorkerTally {
    let mut tally = WorkerTally::default();

    if let Err(e) = publisher.select_transactions().await {
        tracing::error!(worker, error = %e, "tx.select failed, worker exits");
        tally.failed += plan.remaining();
        close_quietly(&*publisher, worker).await;
        return tally;
    }

    let mut buffers = BatchBuffers::new(batch_size);
    for batch in plan {
        buffers.fill(batch, with_timestamp, worker, &mut tally);
        let n = buffers.filled().len() as u64;

        if let Err(e) = publish_batch(&*publisher, buffers.filled()).await {
            tracing::warn!(worker, error = %e, "publish failed, rolling back batch");
            if let Err(e) = publisher.rollback().await {
                tracing::warn!(worker, error = %e, "rollback failed");
            }
            tally.failed += n;
            continue;
        }

        match publisher.commit().await {
            Ok(()) => {
                tally.sent += n;
                progress.add(n);
            }
            Err(e) => {
                tracing::warn!(worker, error = %e, "commit failed");
                tally.failed += n;
            }
        }
    }

    close_quietly(&*publisher, worker).await;
    tally
}

async fn publish_batch(publisher: &dyn Publisher, bodies: &[Vec<u8>]) -> Result<(), BenchError> {
    for body in bodies {
        publisher.publish(body).await?;
    }
    Ok(())
}
