use std::sync::Arc;
use std::time::Instant;

use crate::message::ENCODED_CAPACITY;
use crate::partition::{batches, partition, Batches};
use crate::progress::Progress;
use crate::publisher::{close_quietly, ChannelOptions, Connector};
use crate::report::{RunReport, WorkerTally};
use crate::BenchError;

use super::{join_workers, publish_message, RunParams, Strategy};

/// Диапазон id делится между воркерами; каждый со своим соединением
/// публикует свой кусок батчами по `batch_size`. Воркер, не сумевший
/// подключиться, выбывает, остальные продолжают.
pub(super) async fn run(connector: Arc<dyn Connector>, params: &RunParams) -> Result<RunReport, BenchError> {
    let plans = partition(params.messages, params.workers)?
        .into_iter()
        .map(|range| batches(range, params.batch_size))
        .collect::<Result<Vec<_>, _>>()?;

    let started = Instant::now();
    let progress = Arc::new(Progress::starting_at(params.progress_every, started));

    let handles = plans
        .into_iter()
        .enumerate()
        .map(|(worker, plan)| {
            let connector = connector.clone();
            let progress = progress.clone();
            let opts = params.channel.clone();
            let with_timestamp = params.with_timestamp;
            tokio::spawn(async move {
                batch_worker(worker, &*connector, &opts, plan, with_timestamp, &progress).await
            })
        })
        .collect();

    let tally = join_workers(handles).await?;

    Ok(RunReport::new(Strategy::Batch, params.workers, Some(params.batch_size), tally, started.elapsed()))
}

async fn batch_worker(
    worker: usize,
    connector: &dyn Connector,
    opts: &ChannelOptions,
    plan: Batches,
    with_timestamp: bool,
    progress: &Progress,
) -> WorkerTally {
    let mut tally = WorkerTally::default();

    let publisher = match connector.connect(opts).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(worker, skipped = plan.remaining(), error = %e, "failed to connect, worker exits");
            return tally;
        }
    };

    let mut buf = Vec::with_capacity(ENCODED_CAPACITY);
    for batch in plan {
        let before = tally.sent;
        for id in batch {
            publish_message(&*publisher, worker, id, with_timestamp, &mut buf, &mut tally).await;
        }
        progress.add(tally.sent - before);
    }

    close_quietly(&*publisher, worker).await;
    tally
}
