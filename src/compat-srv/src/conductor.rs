use std::io;

use async_std::stream::StreamExt;

use crate::scheduler::queue::{JobQueue, QueueEvent};
use crate::scheduler::sequence::TabSequence;

/// How long to wait between queue polls.
const TICK_DELAY_MS: u64 = 1_000;

/// One conductor tick: claim every available one-off job into the queue, run the queue to empty,
/// and persist whatever terminal events that produced.
async fn tick(store: &crate::store::Store, queue: &JobQueue<crate::farm::HttpFarm>) -> io::Result<()> {
  while let Some(record) = store.next_oneoff().await? {
    match record.job_details {
      Some(details) => queue.submit(&record.id, details).await,
      None => {
        log::warn!("one-off job '{}' has no details, marking invalid", record.id);
        store.mark_invalid(&record.id).await?;
      }
    }
  }

  queue.drain().await
}

/// Drains any terminal events produced during this tick into the store. Persistence failures are
/// logged and skipped; the job outcome itself is already decided.
async fn flush_events(store: &crate::store::Store, events: &async_std::channel::Receiver<QueueEvent>) {
  while let Ok(event) = events.try_recv() {
    let attempt = match &event {
      QueueEvent::Completed { id, result } => store.complete_job(id, result).await,
      QueueEvent::Failed { id, errors } => store.fail_job(id, errors).await,
    };

    if let Err(error) = attempt {
      log::warn!("unable to persist job outcome - {error}");
    }
  }
}

/// The conductor's main loop. Polls the store for one-off jobs on a fixed interval and runs each
/// through the scheduling core, recording outcomes as they land.
pub async fn run(config: crate::config::Configuration) -> io::Result<()> {
  let store = crate::store::Store::new(&config.mongo).await?;
  let sequence = TabSequence::from_config(&config.farm);
  let (queue, events) = JobQueue::new(sequence);

  let mut interval = async_std::stream::interval(std::time::Duration::from_millis(TICK_DELAY_MS));
  log::info!("conductor polling for one-off jobs");

  while interval.next().await.is_some() {
    if let Err(error) = tick(&store, &queue).await {
      log::error!("conductor tick failed - {error}");
    }

    flush_events(&store, &events).await;
  }

  Ok(())
}
