//! The scheduling core. `TabSequence` serializes tab acquisition against the farm's admission
//! capacity and recovers from transient allocation failures and command-sequence failures;
//! `JobQueue` layers a fifo work queue with per-job terminal events on top of it for
//! fire-and-forget callers.

/// The fifo queue + consumer loop variant.
pub mod queue;

/// The per-job acquisition/retry state machine.
pub mod sequence;

pub use queue::{JobQueue, QueueEvent};
pub use sequence::{SequenceOutcome, TabSequence};

#[cfg(test)]
pub(crate) mod support {
  //! Scripted farm collaborators shared by the scheduler tests.

  use std::collections::VecDeque;
  use std::io;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  use crate::farm::{FarmError, RenderFarm, Tab};

  /// What the scripted farm should do for one acquisition attempt.
  #[derive(Clone, Copy)]
  pub enum Allocation {
    /// Fail with a capacity/availability status.
    Capacity(u16),
    /// Fail with a non-transient status.
    Hard(u16),
    /// Hand out a tab that completes every step.
    Working,
    /// Hand out a tab whose first command fails.
    FailingFirstStep,
  }

  /// Call counters observed by assertions after the fact.
  #[derive(Default)]
  pub struct Counters {
    pub acquisitions: AtomicUsize,
    pub destroys: AtomicUsize,
  }

  pub struct ScriptedFarm {
    script: Mutex<VecDeque<Allocation>>,
    pub counters: Arc<Counters>,
  }

  impl ScriptedFarm {
    pub fn new(script: Vec<Allocation>) -> Self {
      Self {
        script: Mutex::new(script.into_iter().collect()),
        counters: Arc::new(Counters::default()),
      }
    }
  }

  #[async_trait::async_trait]
  impl RenderFarm for ScriptedFarm {
    async fn acquire(&self, _engine: &str, _adblock: bool) -> Result<Box<dyn Tab>, FarmError> {
      self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);

      let next = self
        .script
        .lock()
        .expect("scripted farm lock poisoned")
        .pop_front()
        .unwrap_or(Allocation::Working);

      match next {
        Allocation::Capacity(status) => Err(FarmError {
          status: Some(status),
          message: "tab could not be allocated".into(),
        }),
        Allocation::Hard(status) => Err(FarmError {
          status: Some(status),
          message: "not found".into(),
        }),
        Allocation::Working => Ok(Box::new(ScriptedTab {
          fail_first_step: false,
          counters: self.counters.clone(),
        })),
        Allocation::FailingFirstStep => Ok(Box::new(ScriptedTab {
          fail_first_step: true,
          counters: self.counters.clone(),
        })),
      }
    }
  }

  pub struct ScriptedTab {
    fail_first_step: bool,
    counters: Arc<Counters>,
  }

  #[async_trait::async_trait]
  impl Tab for ScriptedTab {
    async fn set_user_agent(&mut self, _user_agent: &str) -> io::Result<()> {
      if self.fail_first_step {
        return Err(io::Error::new(
          io::ErrorKind::Other,
          "setUserAgent: tab failed and returned error status 500",
        ));
      }

      Ok(())
    }

    async fn set_screen_size(&mut self, _size: &crate::types::ScreenSize) -> io::Result<()> {
      Ok(())
    }

    async fn open(&mut self, _url: &str, _wait_for_resources: bool) -> io::Result<serde_json::Value> {
      Ok(serde_json::json!({ "success": true }))
    }

    async fn screenshot(&mut self) -> io::Result<String> {
      Ok("c29tZSBwbmc=".to_string())
    }

    async fn resources(&mut self) -> io::Result<serde_json::Value> {
      Ok(serde_json::json!({ "id": { "response": "test data" } }))
    }

    async fn console_log(&mut self) -> io::Result<serde_json::Value> {
      Ok(serde_json::json!([{ "msg": "something" }]))
    }

    async fn error_log(&mut self) -> io::Result<serde_json::Value> {
      Ok(serde_json::json!([]))
    }

    async fn plugin_results(&mut self) -> io::Result<serde_json::Value> {
      Ok(serde_json::json!({ "somePlugin": {} }))
    }

    async fn redirects(&mut self) -> io::Result<serde_json::Value> {
      Ok(serde_json::json!({ "something": "to somewhere" }))
    }

    async fn destroy(&mut self) -> io::Result<()> {
      self.counters.destroys.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  /// A representative job for the scripted farm.
  pub fn job_details() -> crate::types::JobDetails {
    crate::types::JobDetails {
      engine: "gecko".to_string(),
      user_agent: "some gecko ua".to_string(),
      screen_size: crate::types::ScreenSize {
        width: 1024,
        height: 1024,
      },
      target_uri: "https://example.com".to_string(),
    }
  }
}
