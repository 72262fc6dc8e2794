use super::{Analyzer, RunResult, Verdict};

/// Compares the redirect chain captured by each result. A resource that resolved to different
/// targets in different results is surfaced with every target observed for it.
pub struct Redirects;

impl Analyzer for Redirects {
  fn name(&self) -> &'static str {
    "redirects"
  }

  fn analyze(&self, campaign: &crate::types::Campaign, results: &[RunResult]) -> anyhow::Result<Verdict> {
    log::info!("redirects analyzer started for campaign '{}'", campaign.id);

    let maps = results
      .iter()
      .filter_map(|result| result.redirects.as_object())
      .collect::<Vec<_>>();

    let mut diffs = serde_json::Map::new();

    for map in &maps {
      for (resource, target) in map.iter() {
        for other in &maps {
          // A resource missing entirely from the other result counts as a difference too.
          let other_target = other.get(resource).cloned().unwrap_or(serde_json::Value::Null);

          if other_target == *target {
            continue;
          }

          log::info!("resource '{resource}' resolved differently - {target} vs {other_target}");

          let entry = diffs
            .entry(resource.clone())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));

          if let Some(observed) = entry.as_array_mut() {
            for candidate in [target.clone(), other_target] {
              if !observed.contains(&candidate) {
                observed.push(candidate);
              }
            }
          }
        }
      }
    }

    let correct = diffs.is_empty();

    log::info!("redirects analyzer finished for campaign '{}'", campaign.id);

    Ok(Verdict {
      correct,
      diff: serde_json::Value::Object(diffs),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::super::{Analyzer, RunResult};
  use super::Redirects;
  use crate::types::{Campaign, CampaignDetails, CampaignKind};

  fn campaign() -> Campaign {
    Campaign::new(
      CampaignDetails {
        target_uri: "https://example.com".to_string(),
        kind: CampaignKind::Desktop,
        user_agents: vec!["some ua".to_string()],
        engines: vec!["gecko".to_string()],
      },
      vec!["redirects".to_string()],
    )
  }

  fn result(run_number: u32, redirects: serde_json::Value) -> RunResult {
    RunResult {
      run_number,
      plugin_results: serde_json::Value::Null,
      redirects,
    }
  }

  #[test]
  fn matching_chains_are_correct() {
    let results = vec![
      result(2, serde_json::json!({ "something": "url" })),
      result(1, serde_json::json!({ "something": "url" })),
    ];

    let verdict = Redirects.analyze(&campaign(), &results).expect("analyzer failed");

    assert!(verdict.correct);
    assert_eq!(verdict.diff, serde_json::json!({}));
  }

  #[test]
  fn diverging_chains_record_every_observed_target() {
    let results = vec![
      result(2, serde_json::json!({ "something": "url2" })),
      result(1, serde_json::json!({ "something": "url1" })),
    ];

    let verdict = Redirects.analyze(&campaign(), &results).expect("analyzer failed");

    assert!(!verdict.correct);

    let observed = verdict
      .diff
      .get("something")
      .and_then(serde_json::Value::as_array)
      .expect("missing diff entry");
    assert!(observed.contains(&serde_json::json!("url1")));
    assert!(observed.contains(&serde_json::json!("url2")));
  }

  #[test]
  fn missing_resource_counts_as_difference() {
    let results = vec![
      result(2, serde_json::json!({ "something": "url", "extra": "other" })),
      result(1, serde_json::json!({ "something": "url" })),
    ];

    let verdict = Redirects.analyze(&campaign(), &results).expect("analyzer failed");

    assert!(!verdict.correct);
    assert!(verdict.diff.get("extra").is_some());
    assert!(verdict.diff.get("something").is_none());
  }
}
