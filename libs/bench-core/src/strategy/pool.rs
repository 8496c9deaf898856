use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex};

use crate::message::ENCODED_CAPACITY;
use crate::progress::Progress;
use crate::publisher::{close_quietly, ChannelOptions, Connector};
use crate::report::{RunReport, WorkerTally};
use crate::BenchError;

use super::{join_workers, publish_message, RunParams, Strategy};

/// Ёмкость канала раздачи id.
const FEED_BUFFER: usize = 1000;

/// Пул воркеров: feeder кладёт id в ограниченный канал, каждый воркер со
/// своим соединением забирает их, пока канал не закроется.
pub(super) async fn run(connector: Arc<dyn Connector>, params: &RunParams) -> Result<RunReport, BenchError> {
    let started = Instant::now();
    let progress = Arc::new(Progress::starting_at(params.progress_every, started));

    let (tx, rx) = mpsc::channel::<u64>(FEED_BUFFER);
    let rx = Arc::new(Mutex::new(rx));

    let mut handles = Vec::with_capacity(params.workers);
    for worker in 0..params.workers {
        let connector = connector.clone();
        let rx = rx.clone();
        let progress = progress.clone();
        let opts = params.channel.clone();
        let with_timestamp = params.with_timestamp;
        handles.push(tokio::spawn(async move {
            pool_worker(worker, &*connector, &opts, &rx, &progress, with_timestamp).await
        }));
    }
    // Receiver живёт только у воркеров: когда все выйдут, send в feeder упадёт.
    drop(rx);

    let messages = params.messages;
    let feeder = tokio::spawn(async move {
        for id in 0..messages {
            if tx.send(id).await.is_err() {
                tracing::error!(fed = id, "no workers left, feeder stopped");
                break;
            }
        }
    });

    let tally = join_workers(handles).await?;
    feeder.await?;

    Ok(RunReport::new(Strategy::Pool, params.workers, None, tally, started.elapsed()))
}

async fn pool_worker(
    worker: usize,
    connector: &dyn Connector,
    opts: &ChannelOptions,
    rx: &Mutex<mpsc::Receiver<u64>>,
    progress: &Progress,
    with_timestamp: bool,
) -> WorkerTally {
    let mut tally = WorkerTally::default();

    let publisher = match connector.connect(opts).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(worker, error = %e, "failed to connect, worker exits");
            return tally;
        }
    };

    let mut buf = Vec::with_capacity(ENCODED_CAPACITY);
    loop {
        let next = rx.lock().await.recv().await;
        let Some(id) = next else { break };
        if publish_message(&*publisher, worker, id, with_timestamp, &mut buf, &mut tally).await {
            progress.add(1);
        }
    }

    close_quietly(&*publisher, worker).await;
    tally
}
