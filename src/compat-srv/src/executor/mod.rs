//! The campaign driver. One process claims one campaign at a time, expands it into jobs, drives
//! every job through the scheduling core sequentially, persists outcomes, compares the two most
//! recent runs, and then loops to the next eligible campaign. When no campaign is eligible the
//! process exits; an external scheduler (cron) is expected to start it again.

use std::collections::HashMap;
use std::io;

/// Cadence flooring for eligibility timestamps.
pub mod cadence;
pub use cadence::RunCadence;

use crate::farm::RenderFarm;
use crate::scheduler::{SequenceOutcome, TabSequence};
use crate::types::{Campaign, CampaignDetails, JobDetails, JobRecord, JobStatus};

/// Drives campaigns to completion, one at a time.
pub struct SerialExecutor<F> {
  /// Identity used when claiming campaigns; mutual exclusion across cooperating processes is the
  /// store's conditional update, not anything fancier.
  process_id: String,

  /// The campaign/job store.
  store: crate::store::Store,

  /// The scheduling core jobs are executed through.
  sequence: TabSequence<F>,

  /// The cadence-floored timestamp this process runs against. Campaigns whose `last_run` is at or
  /// past this cutoff are not eligible again until the next boundary.
  run_time: chrono::DateTime<chrono::Utc>,
}

impl<F> SerialExecutor<F>
where
  F: RenderFarm,
{
  /// Builds an executor pinned to the cadence boundary containing "now".
  pub fn new(process_id: String, store: crate::store::Store, sequence: TabSequence<F>, cadence: RunCadence) -> Self {
    Self {
      process_id,
      store,
      sequence,
      run_time: cadence.floor(chrono::Utc::now()),
    }
  }

  /// Claims and executes campaigns until none are eligible. A failed cycle propagates and leaves
  /// the campaign's run status unflipped, so the next eligibility check offers it again.
  pub async fn run(&self) -> io::Result<()> {
    loop {
      let campaign = match self.store.claim_for_running(&self.process_id, self.run_time).await? {
        Some(campaign) => campaign,
        None => {
          log::info!("no campaign eligible before {}", self.run_time);
          return Ok(());
        }
      };

      log::info!("claimed campaign '{}' for run {}", campaign.id, campaign.run_count);
      let started = std::time::Instant::now();

      self.create_jobs(&campaign).await?;
      self.execute_jobs(&campaign.id, campaign.run_count).await?;

      // Comparison produces derived data; a failure here is logged but does not hold the
      // campaign's cycle hostage.
      if let Err(error) = self.compare_previous_runs(&campaign).await {
        log::error!("comparison failed for campaign '{}' - {error}", campaign.id);
      }

      self.store.mark_done(&campaign.id).await?;
      log::info!("campaign '{}' cycle finished in {:?}", campaign.id, started.elapsed());
    }
  }

  /// Creates the full job fan-out for a claimed campaign. All jobs must exist before any of them
  /// executes; a partial job set is an invalid campaign state, so the first insert error aborts
  /// the whole cycle.
  async fn create_jobs(&self, campaign: &Campaign) -> io::Result<()> {
    let fan_out = expand_jobs(&campaign.details);

    for details in &fan_out {
      self
        .store
        .create_job(&campaign.id, campaign.run_count, details)
        .await
        .map_err(|error| {
          log::error!("failed to create jobs for campaign '{}' - {error}", campaign.id);
          error
        })?;
    }

    log::info!(
      "created {} jobs for campaign '{}' run {}",
      fan_out.len(),
      campaign.id,
      campaign.run_count
    );

    Ok(())
  }

  /// Executes every job of the run, strictly sequentially. Jobs that exhaust their retry budget
  /// are durably marked failed and the loop keeps going; hard allocation errors are also recorded
  /// against the job but additionally reported upward as an aggregate once the loop is done.
  async fn execute_jobs(&self, campaign_id: &str, run_number: u32) -> io::Result<()> {
    let jobs = self.store.jobs_for_run(campaign_id, run_number).await?;
    let mut hard_errors = Vec::new();

    for job in jobs {
      let details = match &job.job_details {
        Some(details) => details,
        None => {
          log::warn!("job '{}' has no details, marking invalid", job.id);
          self.store.mark_invalid(&job.id).await?;
          continue;
        }
      };

      match self.sequence.execute(&job.id, details).await {
        Ok(SequenceOutcome::Completed(result)) => {
          self.store.complete_job(&job.id, &result).await?;
        }

        Ok(SequenceOutcome::Failed(errors)) => {
          log::warn!("job '{}' exhausted its retry budget", job.id);
          self.store.fail_job(&job.id, &errors).await?;
        }

        Err(error) => {
          log::error!("job '{}' failed hard - {error}", job.id);
          self.store.fail_job(&job.id, &[error.to_string()]).await?;
          hard_errors.push(format!("{}: {error}", job.id));
        }
      }
    }

    if hard_errors.is_empty() {
      return Ok(());
    }

    Err(io::Error::new(
      io::ErrorKind::Other,
      format!("{} job(s) failed hard - {}", hard_errors.len(), hard_errors.join(", ")),
    ))
  }

  /// Compares the freshly completed run against the one before it, when the campaign opts in and
  /// both result sets are fully completed. Unknown analyzer names fail closed; individual
  /// analyzer errors are isolated from the others.
  async fn compare_previous_runs(&self, campaign: &Campaign) -> io::Result<()> {
    if !should_compare(campaign) {
      log::debug!("campaign '{}' is not comparable this cycle", campaign.id);
      return Ok(());
    }

    let current = self.store.jobs_for_run(&campaign.id, campaign.run_count).await?;
    let previous = self.store.jobs_for_run(&campaign.id, campaign.run_count - 1).await?;

    if !runs_comparable(&current, &previous) {
      log::info!(
        "skipping comparison for campaign '{}' - a job in run {} or {} did not complete",
        campaign.id,
        campaign.run_count,
        campaign.run_count - 1
      );
      return Ok(());
    }

    let results = collect_run_results(current.iter().chain(previous.iter()));
    let registry = crate::analyzers::registry();
    let mut verdicts = HashMap::with_capacity(campaign.auto_tests.len());

    for name in &campaign.auto_tests {
      let analyzer = match registry.get(name.as_str()) {
        Some(analyzer) => analyzer,
        None => {
          log::warn!("campaign '{}' requested unknown analyzer '{name}'", campaign.id);
          continue;
        }
      };

      match analyzer.analyze(campaign, &results) {
        Ok(verdict) => {
          verdicts.insert(name.clone(), verdict);
        }
        Err(error) => {
          log::warn!("analyzer '{name}' failed for campaign '{}' - {error}", campaign.id);
        }
      }
    }

    self
      .store
      .save_comparison(&campaign.id, campaign.run_count, campaign.run_count - 1, verdicts)
      .await
  }
}

/// The cartesian product of a campaign's engines and user agents, each with the viewport preset
/// selected by the campaign kind.
pub fn expand_jobs(details: &CampaignDetails) -> Vec<JobDetails> {
  let screen_size = details.kind.screen_size();
  let mut fan_out = Vec::with_capacity(details.engines.len() * details.user_agents.len());

  for engine in &details.engines {
    for user_agent in &details.user_agents {
      fan_out.push(JobDetails {
        engine: engine.clone(),
        user_agent: user_agent.clone(),
        screen_size,
        target_uri: details.target_uri.clone(),
      });
    }
  }

  fan_out
}

/// A campaign is comparable once it has two runs to compare and has opted into auto testing.
fn should_compare(campaign: &Campaign) -> bool {
  campaign.run_count >= 2 && campaign.auto_testable && !campaign.auto_tests.is_empty()
}

/// An incomplete run cannot be meaningfully diffed; every job in both sets must have completed.
fn runs_comparable(current: &[JobRecord], previous: &[JobRecord]) -> bool {
  current
    .iter()
    .chain(previous.iter())
    .all(|job| job.status == JobStatus::Completed)
}

/// Projects completed job records into the shape analyzers consume.
fn collect_run_results<'a, I>(records: I) -> Vec<crate::analyzers::RunResult>
where
  I: Iterator<Item = &'a JobRecord>,
{
  records
    .filter_map(|record| {
      let results = record.job_results.as_ref()?;

      Some(crate::analyzers::RunResult {
        run_number: record.run_number.unwrap_or_default(),
        plugin_results: results.result.plugin_results.clone(),
        redirects: results.result.redirects.clone(),
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::{expand_jobs, runs_comparable, should_compare};
  use crate::types::{
    Campaign, CampaignDetails, CampaignKind, JobRecord, JobStatus,
  };

  fn campaign(run_count: u32, auto_testable: bool, auto_tests: Vec<String>) -> Campaign {
    let mut campaign = Campaign::new(
      CampaignDetails {
        target_uri: "https://example.com".to_string(),
        kind: CampaignKind::Mobile,
        user_agents: vec!["some ua".to_string()],
        engines: vec!["webkit".to_string(), "gecko".to_string()],
      },
      auto_tests,
    );

    campaign.run_count = run_count;
    campaign.auto_testable = auto_testable;
    campaign
  }

  fn job(status: JobStatus) -> JobRecord {
    JobRecord {
      id: uuid::Uuid::new_v4().to_string(),
      campaign_id: Some("campaign".to_string()),
      run_number: Some(2),
      status,
      job_details: None,
      job_results: None,
      failure: None,
      created: chrono::Utc::now(),
    }
  }

  #[test]
  fn fan_out_is_the_engine_user_agent_product() {
    let campaign = campaign(13, true, vec![]);
    let jobs = expand_jobs(&campaign.details);

    assert_eq!(jobs.len(), 2);

    let engines = jobs.iter().map(|job| job.engine.as_str()).collect::<Vec<_>>();
    assert!(engines.contains(&"webkit"));
    assert!(engines.contains(&"gecko"));

    for job in &jobs {
      assert_eq!(job.user_agent, "some ua");
      assert_eq!(job.target_uri, "https://example.com");
      assert_eq!(job.screen_size.width, 640);
      assert_eq!(job.screen_size.height, 1136);
    }
  }

  #[test]
  fn comparison_guards_each_condition() {
    for (run_count, auto_testable, auto_tests, expected) in [
      (13, true, vec!["redirects".to_string()], true),
      (1, true, vec!["redirects".to_string()], false),
      (13, false, vec!["redirects".to_string()], false),
      (13, true, vec![], false),
    ] {
      let campaign = campaign(run_count, auto_testable, auto_tests);
      assert_eq!(should_compare(&campaign), expected, "run_count {run_count}");
    }
  }

  #[test]
  fn runs_with_any_incomplete_job_are_not_comparable() {
    let complete = vec![job(JobStatus::Completed), job(JobStatus::Completed)];
    let failed = vec![job(JobStatus::Completed), job(JobStatus::Failed)];

    assert!(runs_comparable(&complete, &complete.clone()));
    assert!(!runs_comparable(&complete, &failed));
    assert!(!runs_comparable(&failed, &complete));
  }
}
