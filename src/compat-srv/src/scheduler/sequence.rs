use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::farm::{RenderFarm, Tab};
use crate::types::{JobDetails, RenderResult};

/// The terminal outcome of one executed job. Exactly one of these is produced per submitted job;
/// a job is never dropped silently and never finishes twice.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceOutcome {
  /// Every step of the command sequence succeeded.
  Completed(RenderResult),

  /// The retry budget was exhausted; carries every accumulated error message in chronological
  /// order, the last one describing the step that tipped the job over the ceiling.
  Failed(Vec<String>),
}

/// Drives one job at a time through tab acquisition and the fixed command sequence, serializing
/// acquisition so the farm's admission capacity is never exceeded.
pub struct TabSequence<F> {
  /// The farm sessions are leased from.
  farm: F,

  /// Fixed delay applied after capacity signals and between command-sequence retries.
  wait: std::time::Duration,

  /// How many command-sequence failures a job is allowed before it is surfaced as failed.
  retry_ceiling: u32,

  /// Whether leased tabs run with adblock.
  adblock: bool,

  /// Capacity-one guard around acquisition; holding the lock is what makes "at most one
  /// acquisition in flight" structural rather than flag-based.
  admission: async_std::sync::Mutex<()>,

  /// Set after the farm signals no capacity, cleared by the next successful acquisition.
  blocked: AtomicBool,
}

impl TabSequence<crate::farm::HttpFarm> {
  /// Builds a sequence around the http farm client described by configuration.
  pub fn from_config(config: &crate::config::FarmConfiguration) -> Self {
    TabSequence::new(
      crate::farm::HttpFarm::new(&config.url),
      std::time::Duration::from_millis(config.wait_timeout_ms.unwrap_or(crate::constants::DEFAULT_WAIT_TIMEOUT_MS)),
      config.retry_ceiling.unwrap_or(crate::constants::DEFAULT_RETRY_CEILING),
      config.adblock.unwrap_or(true),
    )
  }
}

impl<F> TabSequence<F>
where
  F: RenderFarm,
{
  /// Plain constructor; `wait` is both the capacity backoff and the delay between retries.
  pub fn new(farm: F, wait: std::time::Duration, retry_ceiling: u32, adblock: bool) -> Self {
    Self {
      farm,
      wait,
      retry_ceiling: std::cmp::max(retry_ceiling, 1),
      adblock,
      admission: async_std::sync::Mutex::new(()),
      blocked: AtomicBool::new(false),
    }
  }

  /// True while the farm's last acquisition answer was a capacity signal.
  pub fn is_blocked(&self) -> bool {
    self.blocked.load(Ordering::Relaxed)
  }

  /// Runs one job to its terminal outcome. Capacity signals are waited out indefinitely and never
  /// count against the job; command-step failures count toward the retry ceiling and always force
  /// a fresh acquisition, since a partially-failed session is assumed corrupted. Hard allocation
  /// errors propagate immediately - retrying a non-transient error forever helps nobody.
  pub async fn execute(&self, id: &str, details: &JobDetails) -> io::Result<SequenceOutcome> {
    let mut errors = Vec::new();

    loop {
      let mut tab = self.acquire(id, details).await?;

      match self.run_steps(&mut tab, details).await {
        Ok(result) => {
          log::debug!("tab sequence executed for '{id}'");
          return Ok(SequenceOutcome::Completed(result));
        }

        Err(step_error) => {
          errors.push(step_error.to_string());
          log::error!(
            "failed to execute tab sequence for '{id}' - {step_error} (failure count {})",
            errors.len()
          );

          // Best effort teardown; a failure here is logged and never escalated.
          if let Err(destroy_error) = tab.destroy().await {
            log::error!("failed to destroy tab after failure - {destroy_error}");
          }

          if errors.len() as u32 >= self.retry_ceiling {
            return Ok(SequenceOutcome::Failed(errors));
          }

          async_std::task::sleep(self.wait).await;
        }
      }
    }
  }

  /// Leases a session, holding the admission guard across the request so only one acquisition is
  /// ever outstanding process-wide.
  async fn acquire(&self, id: &str, details: &JobDetails) -> io::Result<Box<dyn Tab>> {
    loop {
      let guard = self.admission.lock().await;
      log::debug!("requesting new tab for '{id}' ({})", details.engine);

      match self.farm.acquire(&details.engine, self.adblock).await {
        Ok(tab) => {
          self.blocked.store(false, Ordering::Relaxed);
          drop(guard);
          return Ok(tab);
        }

        Err(error) if error.is_capacity() => {
          log::warn!("tab could not be allocated for '{id}' - {error}");
          self.blocked.store(true, Ordering::Relaxed);
          drop(guard);
          async_std::task::sleep(self.wait).await;
        }

        Err(error) => {
          log::error!("failed to obtain new tab for '{id}' - {error}");
          return Err(error.into());
        }
      }
    }
  }

  /// The fixed command sequence. Strictly ordered; the first failure aborts the rest. The final
  /// destroy is part of the sequence, so a tab that cannot be released counts as a step failure.
  async fn run_steps(&self, tab: &mut Box<dyn Tab>, details: &JobDetails) -> io::Result<RenderResult> {
    tab.set_user_agent(&details.user_agent).await?;
    tab.set_screen_size(&details.screen_size).await?;

    let status = tab.open(&details.target_uri, true).await?;
    log::info!("page opened with result - {status}");

    let screenshot = tab.screenshot().await?;
    let resources = tab.resources().await?;
    let console_log = tab.console_log().await?;
    let error_log = tab.error_log().await?;
    let plugin_results = tab.plugin_results().await?;
    let redirects = tab.redirects().await?;

    tab.destroy().await?;

    Ok(RenderResult {
      screenshot,
      resources,
      console_log,
      error_log,
      plugin_results,
      redirects,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;
  use std::sync::Arc;
  use std::time::{Duration, Instant};

  use super::{SequenceOutcome, TabSequence};
  use crate::scheduler::support::{job_details, Allocation, ScriptedFarm};

  fn sequence(farm: ScriptedFarm, wait_ms: u64, ceiling: u32) -> TabSequence<ScriptedFarm> {
    TabSequence::new(farm, Duration::from_millis(wait_ms), ceiling, true)
  }

  #[async_std::test]
  async fn completes_with_captured_payloads() {
    let farm = ScriptedFarm::new(vec![Allocation::Working]);
    let counters = farm.counters.clone();
    let sequence = sequence(farm, 10, 2);

    let outcome = sequence
      .execute("job-1", &job_details())
      .await
      .expect("sequence failed");

    match outcome {
      SequenceOutcome::Completed(result) => {
        assert_eq!(result.screenshot, "c29tZSBwbmc=");
        assert_eq!(result.resources, serde_json::json!({ "id": { "response": "test data" } }));
        assert_eq!(result.redirects, serde_json::json!({ "something": "to somewhere" }));
      }
      other => panic!("unexpected outcome - {other:?}"),
    }

    assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 1);
    assert_eq!(counters.destroys.load(Ordering::SeqCst), 1);
  }

  #[async_std::test]
  async fn capacity_signal_blocks_then_delays_retry() {
    let farm = ScriptedFarm::new(vec![Allocation::Capacity(503), Allocation::Working]);
    let counters = farm.counters.clone();
    let sequence = Arc::new(sequence(farm, 500, 2));

    let started = Instant::now();
    let handle = async_std::task::spawn({
      let sequence = sequence.clone();
      let details = job_details();
      async move { sequence.execute("job-1", &details).await }
    });

    // Observe the admission flag mid-wait.
    async_std::task::sleep(Duration::from_millis(100)).await;
    assert!(sequence.is_blocked());

    let outcome = handle.await.expect("sequence failed");
    let elapsed = started.elapsed();

    // Capacity signals delay acquisition by the configured wait and never count as failures.
    assert!(matches!(outcome, SequenceOutcome::Completed(_)));
    assert!(!sequence.is_blocked());
    assert!(elapsed >= Duration::from_millis(400), "retried too early - {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(700), "retried too late - {elapsed:?}");
    assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 2);
  }

  #[async_std::test]
  async fn internal_server_error_is_treated_as_capacity() {
    let farm = ScriptedFarm::new(vec![Allocation::Capacity(500), Allocation::Working]);
    let counters = farm.counters.clone();
    let sequence = sequence(farm, 10, 2);

    let outcome = sequence
      .execute("job-1", &job_details())
      .await
      .expect("sequence failed");

    assert!(matches!(outcome, SequenceOutcome::Completed(_)));
    assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 2);
  }

  #[async_std::test]
  async fn hard_allocation_error_propagates_immediately() {
    let farm = ScriptedFarm::new(vec![Allocation::Hard(404)]);
    let counters = farm.counters.clone();
    let sequence = sequence(farm, 10, 2);

    let result = sequence.execute("job-1", &job_details()).await;

    assert!(result.is_err());
    assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 1);
    assert_eq!(counters.destroys.load(Ordering::SeqCst), 0);
  }

  #[async_std::test]
  async fn step_failures_accumulate_until_ceiling() {
    let farm = ScriptedFarm::new(vec![Allocation::FailingFirstStep, Allocation::FailingFirstStep]);
    let counters = farm.counters.clone();
    let sequence = sequence(farm, 10, 2);

    let outcome = sequence
      .execute("job-1", &job_details())
      .await
      .expect("sequence failed");

    match outcome {
      SequenceOutcome::Failed(errors) => {
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|error| error.contains("setUserAgent")));
      }
      other => panic!("unexpected outcome - {other:?}"),
    }

    // A fresh session per attempt, torn down best-effort each time.
    assert_eq!(counters.acquisitions.load(Ordering::SeqCst), 2);
    assert_eq!(counters.destroys.load(Ordering::SeqCst), 2);
  }

  #[async_std::test]
  async fn recovers_below_the_ceiling() {
    let farm = ScriptedFarm::new(vec![Allocation::FailingFirstStep, Allocation::Working]);
    let counters = farm.counters.clone();
    let sequence = sequence(farm, 10, 2);

    let outcome = sequence
      .execute("job-1", &job_details())
      .await
      .expect("sequence failed");

    assert!(matches!(outcome, SequenceOutcome::Completed(_)));
    // One teardown after the failed attempt, one release after the successful one.
    assert_eq!(counters.destroys.load(Ordering::SeqCst), 2);
  }
}
