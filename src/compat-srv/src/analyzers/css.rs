use std::collections::HashMap;

use super::{Analyzer, RunResult, Verdict};

/// The plugin key the css compatibility checker writes its findings under.
const PLUGIN_KEY: &str = "css-analyzer";

/// Compares the css problem sets reported by the farm's css compatibility plugin. For every pair
/// of results the problems are diffed by selector in both directions, yielding problems that
/// appeared and problems that went away between the two run numbers.
pub struct Css;

impl Analyzer for Css {
  fn name(&self) -> &'static str {
    "css"
  }

  fn analyze(&self, campaign: &crate::types::Campaign, results: &[RunResult]) -> anyhow::Result<Verdict> {
    log::info!("css analyzer started for campaign '{}'", campaign.id);

    let mut diff = serde_json::Map::new();

    for (index, first) in results.iter().enumerate() {
      for second in results.iter().take(index) {
        let (newer, older) = if first.run_number > second.run_number {
          (first, second)
        } else {
          (second, first)
        };

        let new_problems = problem_changes(newer, older);
        let fixed_problems = problem_changes(older, newer);

        if new_problems.is_empty() && fixed_problems.is_empty() {
          continue;
        }

        diff.insert(
          format!("{}-{}", newer.run_number, older.run_number),
          serde_json::json!({
            "new_problems": new_problems,
            "fixed_problems": fixed_problems,
          }),
        );
      }
    }

    let correct = results
      .iter()
      .max_by_key(|result| result.run_number)
      .map(problem_free)
      .unwrap_or(true);

    log::info!("css analyzer finished for campaign '{}'", campaign.id);

    Ok(Verdict {
      correct,
      diff: serde_json::Value::Object(diff),
    })
  }
}

/// The problems `newer` reports that `older` does not, grouped by selector. Two problems match
/// when they agree on property and value.
fn problem_changes(newer: &RunResult, older: &RunResult) -> serde_json::Map<String, serde_json::Value> {
  let newer_problems = problems_by_selector(newer);
  let older_problems = problems_by_selector(older);

  let mut changes = serde_json::Map::new();

  for (selector, problems) in newer_problems {
    let known = older_problems.get(&selector);

    let appeared = problems
      .into_iter()
      .filter(|problem| {
        !known
          .map(|candidates| {
            candidates.iter().any(|candidate| {
              candidate.get("property") == problem.get("property") && candidate.get("value") == problem.get("value")
            })
          })
          .unwrap_or(false)
      })
      .collect::<Vec<_>>();

    if !appeared.is_empty() {
      changes.insert(selector, serde_json::Value::Array(appeared));
    }
  }

  changes
}

/// Indexes a result's css plugin findings by selector.
fn problems_by_selector(result: &RunResult) -> HashMap<String, Vec<serde_json::Value>> {
  result
    .plugin_results
    .get(PLUGIN_KEY)
    .and_then(serde_json::Value::as_array)
    .map(|entries| {
      entries
        .iter()
        .filter_map(|entry| {
          let selector = entry.get("selector")?.as_str()?.to_string();
          let problems = entry
            .get("problems")
            .and_then(serde_json::Value::as_array)
            .cloned()
            .unwrap_or_default();

          Some((selector, problems))
        })
        .collect()
    })
    .unwrap_or_default()
}

/// True when a result carries no css problems at all.
fn problem_free(result: &RunResult) -> bool {
  result
    .plugin_results
    .get(PLUGIN_KEY)
    .and_then(serde_json::Value::as_array)
    .map(|entries| {
      entries.iter().all(|entry| {
        entry
          .get("problems")
          .and_then(serde_json::Value::as_array)
          .map(|problems| problems.is_empty())
          .unwrap_or(true)
      })
    })
    .unwrap_or(true)
}
