use std::collections::HashMap;
use std::io;

use crate::types::{Campaign, ComparisonRecord, ComparisonVersions, JobDetails, JobRecord, JobResults, JobStatus, RenderResult};

/// Maps a mongo driver error into our io error vocabulary, logging it on the way.
fn store_error<E>(context: &str) -> impl Fn(E) -> io::Error + '_
where
  E: std::fmt::Display,
{
  move |error| {
    log::warn!("{context} - {error}");
    io::Error::new(io::ErrorKind::Other, format!("{context} - {error}"))
  }
}

/// The campaign/job store. Wraps the mongo client with the collection configuration; all
/// cross-process coordination happens through conditional updates here, never through locks.
#[derive(Clone)]
pub struct Store {
  /// The actual mongodb client.
  client: mongodb::Client,
  /// Holds the database and collection names.
  config: crate::config::MongoConfiguration,
}

impl Store {
  /// Connects eagerly so configuration problems surface at startup rather than mid-cycle.
  pub async fn new(config: &crate::config::MongoConfiguration) -> io::Result<Self> {
    let options = mongodb::options::ClientOptions::parse(&config.url)
      .await
      .map_err(|error| io::Error::new(io::ErrorKind::Other, format!("failed mongodb connection - {error}")))?;

    let client = mongodb::Client::with_options(options)
      .map_err(|error| io::Error::new(io::ErrorKind::Other, format!("failed mongodb connection - {error}")))?;

    Ok(Self {
      client,
      config: config.clone(),
    })
  }

  /// The campaign collection.
  fn campaigns(&self) -> mongodb::Collection<Campaign> {
    self
      .client
      .database(&self.config.database)
      .collection(&self.config.collections.campaigns)
  }

  /// The job collection.
  fn jobs(&self) -> mongodb::Collection<JobRecord> {
    self
      .client
      .database(&self.config.database)
      .collection(&self.config.collections.jobs)
  }

  /// Claims the next campaign eligible before the cutoff for this process. The filter plus
  /// conditional update is the whole mutual-exclusion story: losing racers simply match nothing
  /// and are told to try the next campaign.
  pub async fn claim_for_running(
    &self,
    process_id: &str,
    run_time: chrono::DateTime<chrono::Utc>,
  ) -> io::Result<Option<Campaign>> {
    let filter = bson::doc! {
      "status": "open",
      "run_status": { "$ne": "running" },
      "last_run": { "$lt": run_time.timestamp_millis() },
    };

    let update = bson::doc! {
      "$set": {
        "run_status": "running",
        "process_id": process_id,
        "last_run": run_time.timestamp_millis(),
      },
      "$inc": { "run_count": 1 },
    };

    self
      .campaigns()
      .find_one_and_update(
        filter,
        update,
        Some(
          mongodb::options::FindOneAndUpdateOptions::builder()
            .return_document(mongodb::options::ReturnDocument::After)
            .build(),
        ),
      )
      .await
      .map_err(store_error("unable to claim campaign"))
  }

  /// Flips a campaign's run status once its cycle finished.
  pub async fn mark_done(&self, campaign_id: &str) -> io::Result<()> {
    self
      .campaigns()
      .update_one(
        bson::doc! { "id": campaign_id },
        bson::doc! { "$set": { "run_status": "completed" } },
        None,
      )
      .await
      .map_err(store_error("unable to mark campaign done"))?;

    Ok(())
  }

  /// Persists analyzer verdicts keyed by the run pair they were produced from.
  pub async fn save_comparison(
    &self,
    campaign_id: &str,
    current: u32,
    previous: u32,
    results: HashMap<String, crate::analyzers::Verdict>,
  ) -> io::Result<()> {
    let record = ComparisonRecord {
      date: chrono::Utc::now(),
      versions: ComparisonVersions { current, previous },
      results,
    };

    let serialized = bson::to_bson(&record).map_err(store_error("unable to serialize comparison"))?;

    self
      .campaigns()
      .update_one(
        bson::doc! { "id": campaign_id },
        bson::doc! { "$set": { (format!("comparisons.{current}-{previous}")): serialized } },
        None,
      )
      .await
      .map_err(store_error("unable to save comparison"))?;

    Ok(())
  }

  /// Inserts a campaign document; used by the cli.
  pub async fn create_campaign(&self, campaign: &Campaign) -> io::Result<()> {
    self
      .campaigns()
      .insert_one(campaign, None)
      .await
      .map_err(store_error("unable to create campaign"))?;

    Ok(())
  }

  /// Lists campaigns for the cli, newest first, bounded.
  pub async fn list_campaigns(&self, limit: i64) -> io::Result<Vec<Campaign>> {
    let mut cursor = self
      .campaigns()
      .find(
        None,
        Some(
          mongodb::options::FindOptions::builder()
            .sort(bson::doc! { "created": -1 })
            .limit(limit)
            .build(),
        ),
      )
      .await
      .map_err(store_error("failed campaign query"))?;

    let mut campaigns = Vec::new();

    while cursor.advance().await.map_err(store_error("unable to advance cursor"))? {
      match cursor.deserialize_current() {
        Ok(campaign) => campaigns.push(campaign),
        Err(error) => log::warn!("unable to deserialize campaign - {error}"),
      }
    }

    Ok(campaigns)
  }

  /// Creates one job record for a campaign run.
  pub async fn create_job(&self, campaign_id: &str, run_number: u32, details: &JobDetails) -> io::Result<String> {
    let record = JobRecord {
      id: uuid::Uuid::new_v4().to_string(),
      campaign_id: Some(campaign_id.to_string()),
      run_number: Some(run_number),
      status: JobStatus::New,
      job_details: Some(details.clone()),
      job_results: None,
      failure: None,
      created: chrono::Utc::now(),
    };

    self
      .jobs()
      .insert_one(&record, None)
      .await
      .map_err(store_error("unable to create job"))?;

    Ok(record.id)
  }

  /// Creates a one-off job record for the conductor to pick up.
  pub async fn create_oneoff(&self, details: &JobDetails) -> io::Result<String> {
    let record = JobRecord {
      id: uuid::Uuid::new_v4().to_string(),
      campaign_id: None,
      run_number: None,
      status: JobStatus::New,
      job_details: Some(details.clone()),
      job_results: None,
      failure: None,
      created: chrono::Utc::now(),
    };

    self
      .jobs()
      .insert_one(&record, None)
      .await
      .map_err(store_error("unable to create one-off job"))?;

    Ok(record.id)
  }

  /// Claims the oldest new one-off job, flipping it to running so cooperating conductors never
  /// double-execute it.
  pub async fn next_oneoff(&self) -> io::Result<Option<JobRecord>> {
    self
      .jobs()
      .find_one_and_update(
        bson::doc! { "campaign_id": bson::Bson::Null, "status": "new" },
        bson::doc! { "$set": { "status": "running" } },
        Some(
          mongodb::options::FindOneAndUpdateOptions::builder()
            .sort(bson::doc! { "created": 1 })
            .return_document(mongodb::options::ReturnDocument::After)
            .build(),
        ),
      )
      .await
      .map_err(store_error("unable to claim one-off job"))
  }

  /// Every job record belonging to one campaign run.
  pub async fn jobs_for_run(&self, campaign_id: &str, run_number: u32) -> io::Result<Vec<JobRecord>> {
    let mut cursor = self
      .jobs()
      .find(bson::doc! { "campaign_id": campaign_id, "run_number": run_number }, None)
      .await
      .map_err(store_error("failed job query"))?;

    let mut records = Vec::new();

    while cursor.advance().await.map_err(store_error("unable to advance cursor"))? {
      match cursor.deserialize_current() {
        Ok(record) => records.push(record),
        Err(error) => log::warn!("unable to deserialize job record - {error}"),
      }
    }

    Ok(records)
  }

  /// Marks a job completed with its captured payload.
  pub async fn complete_job(&self, id: &str, result: &RenderResult) -> io::Result<()> {
    let results = JobResults {
      date: chrono::Utc::now(),
      result: result.clone(),
    };

    let serialized = bson::to_bson(&results).map_err(store_error("unable to serialize job results"))?;

    self
      .jobs()
      .update_one(
        bson::doc! { "id": id },
        bson::doc! { "$set": { "status": "completed", "job_results": serialized } },
        None,
      )
      .await
      .map_err(store_error("unable to complete job"))?;

    Ok(())
  }

  /// Marks a job permanently failed with its accumulated error history.
  pub async fn fail_job(&self, id: &str, errors: &[String]) -> io::Result<()> {
    let failure = crate::types::JobFailure {
      date: chrono::Utc::now(),
      errors: errors.to_vec(),
    };

    let serialized = bson::to_bson(&failure).map_err(store_error("unable to serialize job failure"))?;

    self
      .jobs()
      .update_one(
        bson::doc! { "id": id },
        bson::doc! { "$set": { "status": "failed", "failure": serialized } },
        None,
      )
      .await
      .map_err(store_error("unable to fail job"))?;

    Ok(())
  }

  /// Marks a malformed job record so it is never offered again.
  pub async fn mark_invalid(&self, id: &str) -> io::Result<()> {
    self
      .jobs()
      .update_one(
        bson::doc! { "id": id },
        bson::doc! { "$set": { "status": "invalid" } },
        None,
      )
      .await
      .map_err(store_error("unable to mark job invalid"))?;

    Ok(())
  }
}
