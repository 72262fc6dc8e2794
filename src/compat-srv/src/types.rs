use serde::{Deserialize, Serialize};

/// The kind of device a campaign emulates; selects which viewport preset its jobs render with.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
  /// Rendered at the desktop viewport preset.
  Desktop,
  /// Rendered at the mobile viewport preset.
  Mobile,
}

impl CampaignKind {
  /// The viewport preset associated with this campaign kind.
  pub fn screen_size(&self) -> ScreenSize {
    let (width, height) = match self {
      CampaignKind::Desktop => crate::constants::DESKTOP_SCREEN_SIZE,
      CampaignKind::Mobile => crate::constants::MOBILE_SCREEN_SIZE,
    };

    ScreenSize { width, height }
  }
}

/// A viewport size, in pixels.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
  /// Width in pixels.
  pub width: u32,
  /// Height in pixels.
  pub height: u32,
}

/// The recurring comparison target owned by a campaign document.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CampaignDetails {
  /// The url every job of this campaign opens.
  pub target_uri: String,
  /// Which viewport preset jobs are created with.
  pub kind: CampaignKind,
  /// The user agents crossed with `engines` during fan-out.
  pub user_agents: Vec<String>,
  /// The engines crossed with `user_agents` during fan-out.
  pub engines: Vec<String>,
}

/// Whether a campaign is still a candidate for scheduling at all.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
  /// Eligible for scheduling.
  Open,
  /// Retired; never claimed again.
  Closed,
}

/// The per-cycle state of a campaign. `Running` doubles as the claim marker that provides mutual
/// exclusion between cooperating runner processes.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  /// No cycle in flight.
  Idle,
  /// A runner process has claimed this campaign.
  Running,
  /// The most recent cycle finished.
  Completed,
}

/// A recurring compatibility-check target with a run history.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Campaign {
  /// Caller-assigned, stable identity.
  pub id: String,
  /// Whether the campaign may be scheduled at all.
  pub status: CampaignStatus,
  /// Per-cycle claim state.
  pub run_status: RunStatus,
  /// Incremented once per claimed cycle; versions results and multiplies fan-out.
  pub run_count: u32,
  /// The cadence-floored timestamp of the last claimed cycle. Epoch for never-run campaigns so
  /// the eligibility comparison stays a plain `$lt`.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub last_run: chrono::DateTime<chrono::Utc>,
  /// The process that claimed the current cycle, if any.
  pub process_id: Option<String>,
  /// Whether completed runs should be compared automatically.
  pub auto_testable: bool,
  /// Names of the analyzers to run when comparing.
  pub auto_tests: Vec<String>,
  /// The target url and engine/user-agent matrix.
  pub details: CampaignDetails,
  /// When the campaign document was created.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub created: chrono::DateTime<chrono::Utc>,
}

impl Campaign {
  /// Constructor used by the cli; fresh campaigns are open, idle and never run.
  pub fn new(details: CampaignDetails, auto_tests: Vec<String>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      status: CampaignStatus::Open,
      run_status: RunStatus::Idle,
      run_count: 0,
      last_run: chrono::DateTime::<chrono::Utc>::MIN_UTC,
      process_id: None,
      auto_testable: !auto_tests.is_empty(),
      auto_tests,
      details,
      created: chrono::Utc::now(),
    }
  }
}

/// One (engine, user agent) variant's render-and-capture task.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct JobDetails {
  /// The engine a tab is leased for.
  pub engine: String,
  /// Applied to the tab before opening the target.
  pub user_agent: String,
  /// Applied to the tab before opening the target.
  pub screen_size: ScreenSize,
  /// The url to open.
  pub target_uri: String,
}

/// Lifecycle states of a job record. The store filters rely on the serialized names, so these are
/// load-bearing strings.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  /// Created, not yet executed.
  New,
  /// Claimed by the conductor; only used for one-off jobs.
  Running,
  /// Terminal; results captured.
  Completed,
  /// Terminal; retry budget exhausted, error history recorded.
  Failed,
  /// Terminal; the record was malformed (no details).
  Invalid,
}

/// The payload captured by a successful command sequence. Opaque json from the scheduler's
/// perspective; only the analyzers look inside.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct RenderResult {
  /// Base64 encoded png straight from the farm.
  pub screenshot: String,
  /// Resource timing table.
  pub resources: serde_json::Value,
  /// Console log entries.
  pub console_log: serde_json::Value,
  /// Error log entries.
  pub error_log: serde_json::Value,
  /// Per-plugin compatibility check output.
  pub plugin_results: serde_json::Value,
  /// Observed redirect chain, keyed by resource.
  pub redirects: serde_json::Value,
}

/// The persisted wrapper around a successful result.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct JobResults {
  /// When the result was recorded.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub date: chrono::DateTime<chrono::Utc>,
  /// The captured payload.
  pub result: RenderResult,
}

/// The persisted record of an exhausted retry budget.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct JobFailure {
  /// When the job was surfaced as permanently failed.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub date: chrono::DateTime<chrono::Utc>,
  /// The accumulated error messages, in chronological order.
  pub errors: Vec<String>,
}

/// The durable record of a job. Campaign jobs carry `campaign_id` + `run_number`; one-off jobs
/// submitted through the cli carry neither and are picked up by the conductor.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct JobRecord {
  /// Caller-assigned identity, stable across retries.
  pub id: String,
  /// The owning campaign, if any.
  pub campaign_id: Option<String>,
  /// The run this job belongs to, if campaign-owned.
  pub run_number: Option<u32>,
  /// Lifecycle state.
  pub status: JobStatus,
  /// What to render. Absent on malformed submissions, which are marked invalid.
  pub job_details: Option<JobDetails>,
  /// Captured payload once completed.
  pub job_results: Option<JobResults>,
  /// Error history once permanently failed.
  pub failure: Option<JobFailure>,
  /// When the record was created.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub created: chrono::DateTime<chrono::Utc>,
}

/// The run-number pair a comparison was produced from.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonVersions {
  /// The newer run.
  pub current: u32,
  /// The run immediately before it.
  pub previous: u32,
}

/// A persisted comparison between two completed runs.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ComparisonRecord {
  /// When the comparison ran.
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub date: chrono::DateTime<chrono::Utc>,
  /// Which runs were compared.
  pub versions: ComparisonVersions,
  /// Verdicts keyed by analyzer name.
  pub results: std::collections::HashMap<String, crate::analyzers::Verdict>,
}

#[cfg(test)]
mod tests {
  use super::{CampaignKind, JobStatus};

  #[test]
  fn job_status_serializes_to_store_literals() {
    for (status, expected) in [
      (JobStatus::New, "new"),
      (JobStatus::Running, "running"),
      (JobStatus::Completed, "completed"),
      (JobStatus::Failed, "failed"),
      (JobStatus::Invalid, "invalid"),
    ] {
      let value = serde_json::to_value(status).expect("failed serializing status");
      assert_eq!(value, serde_json::Value::String(expected.to_string()));
    }
  }

  #[test]
  fn campaign_kind_selects_preset() {
    assert_eq!(CampaignKind::Mobile.screen_size().width, 640);
    assert_eq!(CampaignKind::Mobile.screen_size().height, 1136);
    assert_eq!(CampaignKind::Desktop.screen_size().width, 1366);
    assert_eq!(CampaignKind::Desktop.screen_size().height, 768);
  }
}
