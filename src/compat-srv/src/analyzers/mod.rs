//! Run-over-run comparison. Analyzers are pure functions over the result sets of two runs; they
//! are resolved from a static registry by the name a campaign lists in `auto_tests`, and unknown
//! names fail closed at lookup time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Flags css breakage differences between runs.
mod css;

/// Flags resources whose redirect target changed between runs.
mod redirects;

pub use css::Css;
pub use redirects::Redirects;

/// What one analyzer concluded about a pair of runs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Verdict {
  /// True when the latest run looks healthy for this dimension.
  pub correct: bool,
  /// Analyzer-shaped description of what changed.
  pub diff: serde_json::Value,
}

/// The slice of one completed job handed to analyzers: which run it belongs to plus the payloads
/// analyzers actually read.
#[derive(Debug, Clone)]
pub struct RunResult {
  /// The run this result was captured in.
  pub run_number: u32,
  /// Per-plugin compatibility check output.
  pub plugin_results: serde_json::Value,
  /// Observed redirect chain, keyed by resource.
  pub redirects: serde_json::Value,
}

/// A named, pure comparison over an ordered result set.
pub trait Analyzer: Send + Sync {
  /// The name campaigns use to request this analyzer.
  fn name(&self) -> &'static str;

  /// Produces a verdict for the concatenated result set of the two runs being compared.
  fn analyze(&self, campaign: &crate::types::Campaign, results: &[RunResult]) -> anyhow::Result<Verdict>;
}

/// The full analyzer set, registered statically and resolved by name.
pub fn registry() -> HashMap<&'static str, Box<dyn Analyzer>> {
  let analyzers: Vec<Box<dyn Analyzer>> = vec![Box::new(Css), Box::new(Redirects)];

  let mut map = HashMap::with_capacity(analyzers.len());

  for analyzer in analyzers {
    log::debug!("registering analyzer '{}'", analyzer.name());
    map.insert(analyzer.name(), analyzer);
  }

  map
}

#[cfg(test)]
mod tests {
  use super::registry;

  #[test]
  fn registry_resolves_known_names() {
    let registry = registry();
    assert!(registry.contains_key("css"));
    assert!(registry.contains_key("redirects"));
    assert!(!registry.contains_key("somethingreallybogus"));
  }
}
