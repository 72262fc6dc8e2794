use serde::Deserialize;

/// The collection names used by the store.
#[derive(Deserialize, Debug, Clone)]
pub struct MongoCollectionsConfiguration {
  /// Campaign documents.
  pub campaigns: String,
  /// Job records, both campaign-owned and one-off.
  pub jobs: String,
}

/// Where and how to reach mongo.
#[derive(Deserialize, Debug, Clone)]
pub struct MongoConfiguration {
  /// Connection string.
  pub url: String,
  /// Database name.
  pub database: String,
  /// Collection names.
  pub collections: MongoCollectionsConfiguration,
}

/// The remote render farm and the scheduling knobs around it.
#[derive(Deserialize, Debug, Clone)]
pub struct FarmConfiguration {
  /// Base url of the farm master, e.g. `http://master:6666`.
  pub url: String,
  /// Delay before retrying acquisition after a capacity signal. Defaults to thirty seconds.
  pub wait_timeout_ms: Option<u64>,
  /// Command sequence failures tolerated per job before it is surfaced as failed.
  pub retry_ceiling: Option<u32>,
  /// Whether leased tabs are requested with adblock enabled. Defaults to true.
  pub adblock: Option<bool>,
}

/// Settings for the campaign runner process.
#[derive(Deserialize, Debug, Clone)]
pub struct ExecutorConfiguration {
  /// Identity used when claiming campaigns. A random one is generated when absent.
  pub process_id: Option<String>,
  /// Run cadence; one of `1h`, `6h`, `1d`, `1w`. Defaults to weekly.
  pub cadence: Option<crate::executor::RunCadence>,
}

/// The publicly deserializable interface for the whole service configuration.
#[derive(Deserialize, Debug, Clone)]
pub struct Configuration {
  /// The mongo configuration.
  pub mongo: MongoConfiguration,
  /// The farm configuration.
  pub farm: FarmConfiguration,
  /// The campaign runner configuration.
  pub executor: ExecutorConfiguration,
}
