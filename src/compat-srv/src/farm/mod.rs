use std::io;

/// The surf-backed implementation of the farm contract.
pub mod client;
pub use client::HttpFarm;

/// An error produced while leasing a session from the farm master. The status code is what
/// separates "come back later" from "this will never work".
#[derive(Debug)]
pub struct FarmError {
  /// The http status returned by the master, when one was returned at all.
  pub status: Option<u16>,
  /// Human readable description, surfaced in job error histories.
  pub message: String,
}

impl FarmError {
  /// Constructor for failures that never reached the master (connection refused, bad payload).
  pub fn message<S>(message: S) -> Self
  where
    S: Into<String>,
  {
    Self {
      status: None,
      message: message.into(),
    }
  }

  /// True when the master signaled a transient capacity/availability problem. 503 means no tab
  /// could be allocated right now; 500 means the master itself is struggling and should not be
  /// hammered either.
  pub fn is_capacity(&self) -> bool {
    matches!(self.status, Some(503) | Some(500))
  }
}

impl std::fmt::Display for FarmError {
  fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
    match self.status {
      Some(status) => write!(formatter, "farm returned {status} - {}", self.message),
      None => write!(formatter, "{}", self.message),
    }
  }
}

impl std::error::Error for FarmError {}

impl From<FarmError> for io::Error {
  fn from(error: FarmError) -> Self {
    io::Error::new(io::ErrorKind::Other, format!("{error}"))
  }
}

/// A leased remote browser session. Commands are strictly ordered by the scheduler; every method
/// here maps onto one wire command. A failed session is assumed corrupted and is never resumed,
/// only destroyed.
#[async_trait::async_trait]
pub trait Tab: Send {
  /// Applies the job's user agent.
  async fn set_user_agent(&mut self, user_agent: &str) -> io::Result<()>;

  /// Applies the job's viewport.
  async fn set_screen_size(&mut self, size: &crate::types::ScreenSize) -> io::Result<()>;

  /// Navigates to the target, optionally waiting for network resources to settle.
  async fn open(&mut self, url: &str, wait_for_resources: bool) -> io::Result<serde_json::Value>;

  /// Captures the rendered page as base64 png data.
  async fn screenshot(&mut self) -> io::Result<String>;

  /// Captures the resource timing table.
  async fn resources(&mut self) -> io::Result<serde_json::Value>;

  /// Captures the console log.
  async fn console_log(&mut self) -> io::Result<serde_json::Value>;

  /// Captures the error log.
  async fn error_log(&mut self) -> io::Result<serde_json::Value>;

  /// Captures per-plugin compatibility check output.
  async fn plugin_results(&mut self) -> io::Result<serde_json::Value>;

  /// Captures the observed redirect chain.
  async fn redirects(&mut self) -> io::Result<serde_json::Value>;

  /// Releases the session back to the farm.
  async fn destroy(&mut self) -> io::Result<()>;
}

/// The capability of leasing transient render sessions. The scheduler only ever talks to the farm
/// through this seam, which is also what keeps the scheduling core testable.
#[async_trait::async_trait]
pub trait RenderFarm: Send + Sync {
  /// Leases a session for the given engine. May fail with a capacity signal, which callers are
  /// expected to retry after a delay.
  async fn acquire(&self, engine: &str, adblock: bool) -> Result<Box<dyn Tab>, FarmError>;
}
