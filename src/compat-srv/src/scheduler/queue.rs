use std::collections::VecDeque;
use std::io;

use super::sequence::{SequenceOutcome, TabSequence};
use crate::farm::RenderFarm;
use crate::types::{JobDetails, RenderResult};

/// A job waiting for tab capacity. Queue state is in-memory only, by design; on restart, pending
/// work is re-derived from the persisted store.
#[derive(Debug, Clone)]
struct PendingJob {
  id: String,
  details: JobDetails,
}

/// The single terminal notification emitted for every submitted job.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
  /// The job's command sequence ran to completion.
  Completed {
    /// The submitted job id.
    id: String,
    /// The captured payload.
    result: RenderResult,
  },

  /// The job is permanently failed, either by exhausting its retry budget or by a hard
  /// allocation error.
  Failed {
    /// The submitted job id.
    id: String,
    /// Accumulated error messages, in chronological order.
    errors: Vec<String>,
  },
}

/// Fire-and-forget entry point into the scheduling core: a fifo of pending jobs consumed one at a
/// time, with exactly one `QueueEvent` sent per job on the channel handed out at construction.
pub struct JobQueue<F> {
  /// The underlying acquisition/retry state machine.
  sequence: TabSequence<F>,

  /// Pending jobs, fifo. Arrival order is the only fairness mechanism.
  pending: async_std::sync::Mutex<VecDeque<PendingJob>>,

  /// Where terminal outcomes are published.
  events: async_std::channel::Sender<QueueEvent>,
}

impl<F> JobQueue<F>
where
  F: RenderFarm,
{
  /// Builds the queue and hands back the receiving side of its event channel.
  pub fn new(sequence: TabSequence<F>) -> (Self, async_std::channel::Receiver<QueueEvent>) {
    let (events, receiver) = async_std::channel::unbounded();

    (
      Self {
        sequence,
        pending: async_std::sync::Mutex::new(VecDeque::new()),
        events,
      },
      receiver,
    )
  }

  /// Appends a job to the queue. Never dispatches inline; execution happens exclusively inside
  /// `drain`, which is what keeps admission single-file.
  pub async fn submit<S>(&self, id: S, details: JobDetails)
  where
    S: Into<String>,
  {
    let mut pending = self.pending.lock().await;
    pending.push_back(PendingJob {
      id: id.into(),
      details,
    });
    log::debug!("job queued, {} pending", pending.len());
  }

  /// Current queue depth.
  pub async fn len(&self) -> usize {
    self.pending.lock().await.len()
  }

  /// True when nothing is pending.
  pub async fn is_empty(&self) -> bool {
    self.pending.lock().await.is_empty()
  }

  /// Consumer loop: pops the fifo head and runs it to its terminal outcome, until the queue is
  /// empty. Hard allocation errors terminate the job as failed rather than silently dropping it;
  /// the error only propagates if the event channel itself is gone.
  pub async fn drain(&self) -> io::Result<()> {
    loop {
      let next = self.pending.lock().await.pop_front();

      let job = match next {
        Some(job) => job,
        None => return Ok(()),
      };

      let event = match self.sequence.execute(&job.id, &job.details).await {
        Ok(SequenceOutcome::Completed(result)) => QueueEvent::Completed { id: job.id, result },
        Ok(SequenceOutcome::Failed(errors)) => QueueEvent::Failed { id: job.id, errors },
        Err(error) => {
          log::error!("hard failure executing job '{}' - {error}", job.id);
          QueueEvent::Failed {
            id: job.id,
            errors: vec![error.to_string()],
          }
        }
      };

      self.events.send(event).await.map_err(|error| {
        log::error!("queue event channel closed - {error}");
        io::Error::new(io::ErrorKind::Other, "queue-event-channel-closed")
      })?;
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;
  use std::time::Duration;

  use super::{JobQueue, QueueEvent};
  use crate::scheduler::sequence::TabSequence;
  use crate::scheduler::support::{job_details, Allocation, ScriptedFarm};

  fn queue(
    script: Vec<Allocation>,
  ) -> (
    JobQueue<ScriptedFarm>,
    async_std::channel::Receiver<QueueEvent>,
    std::sync::Arc<crate::scheduler::support::Counters>,
  ) {
    let farm = ScriptedFarm::new(script);
    let counters = farm.counters.clone();
    let sequence = TabSequence::new(farm, Duration::from_millis(10), 2, true);
    let (queue, events) = JobQueue::new(sequence);
    (queue, events, counters)
  }

  #[async_std::test]
  async fn submit_enqueues_without_dispatching() {
    let (queue, _events, counters) = queue(vec![]);

    queue.submit("job-1", job_details()).await;
    queue.submit("job-2", job_details()).await;

    assert_eq!(queue.len().await, 2);
    assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 0);
  }

  #[async_std::test]
  async fn drain_emits_one_terminal_event_per_job() {
    let (queue, events, _counters) = queue(vec![
      Allocation::Working,
      Allocation::FailingFirstStep,
      Allocation::FailingFirstStep,
    ]);

    queue.submit("job-1", job_details()).await;
    queue.submit("job-2", job_details()).await;
    queue.drain().await.expect("drain failed");

    match events.try_recv().expect("missing first event") {
      QueueEvent::Completed { id, .. } => assert_eq!(id, "job-1"),
      other => panic!("unexpected event - {other:?}"),
    }

    match events.try_recv().expect("missing second event") {
      QueueEvent::Failed { id, errors } => {
        assert_eq!(id, "job-2");
        assert_eq!(errors.len(), 2);
      }
      other => panic!("unexpected event - {other:?}"),
    }

    assert!(events.try_recv().is_err());
    assert!(queue.is_empty().await);
  }

  #[async_std::test]
  async fn hard_errors_terminate_as_failed_instead_of_dropping() {
    let (queue, events, counters) = queue(vec![Allocation::Hard(404)]);

    queue.submit("job-1", job_details()).await;
    queue.drain().await.expect("drain failed");

    match events.try_recv().expect("missing event") {
      QueueEvent::Failed { id, errors } => {
        assert_eq!(id, "job-1");
        assert_eq!(errors.len(), 1);
      }
      other => panic!("unexpected event - {other:?}"),
    }

    // No retry for non-transient allocation failures.
    assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 1);
  }
}
