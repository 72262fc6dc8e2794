use chrono::{Datelike, TimeZone, Timelike};
use serde::Deserialize;

/// How often campaigns become eligible again. Eligibility is computed by flooring "now" to the
/// cadence-aligned boundary - a coarse, clock-aligned rate limiter, not a precise interval timer.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCadence {
  /// Every hour, on the hour.
  #[serde(rename = "1h")]
  Hourly,

  /// Every six hours, aligned to 00/06/12/18 utc.
  #[serde(rename = "6h")]
  SixHourly,

  /// Every day at midnight utc.
  #[serde(rename = "1d")]
  Daily,

  /// Every week, starting sunday midnight utc.
  #[serde(rename = "1w")]
  Weekly,
}

impl Default for RunCadence {
  fn default() -> Self {
    RunCadence::Weekly
  }
}

impl RunCadence {
  /// Clamps a timestamp down to the nearest cadence boundary at or before it.
  pub fn floor(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
    let (year, month, day) = (now.year(), now.month(), now.day());

    let floored = match self {
      RunCadence::Hourly => chrono::Utc.with_ymd_and_hms(year, month, day, now.hour(), 0, 0).single(),
      RunCadence::SixHourly => {
        let hour = now.hour() - now.hour() % 6;
        chrono::Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).single()
      }
      RunCadence::Daily => chrono::Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single(),
      RunCadence::Weekly => {
        let days_in = chrono::Duration::days(i64::from(now.weekday().num_days_from_sunday()));
        (now.date_naive() - days_in)
          .and_hms_opt(0, 0, 0)
          .map(|naive| chrono::Utc.from_utc_datetime(&naive))
      }
    };

    // The arithmetic above only removes precision, so this fallback should be unreachable for
    // any timestamp the clock can actually produce.
    floored.unwrap_or(now)
  }
}

#[cfg(test)]
mod tests {
  use super::RunCadence;
  use chrono::TimeZone;

  fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc
      .with_ymd_and_hms(year, month, day, hour, minute, second)
      .single()
      .expect("invalid test timestamp")
  }

  // 2025-03-19 is a wednesday.
  #[test]
  fn hourly_floors_to_start_of_hour() {
    assert_eq!(RunCadence::Hourly.floor(utc(2025, 3, 19, 14, 35, 7)), utc(2025, 3, 19, 14, 0, 0));
  }

  #[test]
  fn six_hourly_floors_to_six_hour_boundaries() {
    assert_eq!(
      RunCadence::SixHourly.floor(utc(2025, 3, 19, 14, 35, 7)),
      utc(2025, 3, 19, 12, 0, 0)
    );
    assert_eq!(RunCadence::SixHourly.floor(utc(2025, 3, 19, 5, 59, 59)), utc(2025, 3, 19, 0, 0, 0));
    assert_eq!(RunCadence::SixHourly.floor(utc(2025, 3, 19, 18, 0, 0)), utc(2025, 3, 19, 18, 0, 0));
  }

  #[test]
  fn daily_floors_to_midnight() {
    assert_eq!(RunCadence::Daily.floor(utc(2025, 3, 19, 14, 35, 7)), utc(2025, 3, 19, 0, 0, 0));
  }

  #[test]
  fn weekly_floors_to_sunday_midnight() {
    assert_eq!(RunCadence::Weekly.floor(utc(2025, 3, 19, 14, 35, 7)), utc(2025, 3, 16, 0, 0, 0));
    // A sunday floors to itself.
    assert_eq!(RunCadence::Weekly.floor(utc(2025, 3, 16, 8, 0, 0)), utc(2025, 3, 16, 0, 0, 0));
  }

  #[test]
  fn parses_from_configuration_literals() {
    for (literal, expected) in [
      ("1h", RunCadence::Hourly),
      ("6h", RunCadence::SixHourly),
      ("1d", RunCadence::Daily),
      ("1w", RunCadence::Weekly),
    ] {
      let parsed: RunCadence = serde_json::from_value(serde_json::Value::String(literal.to_string()))
        .expect("failed parsing cadence");
      assert_eq!(parsed, expected);
    }
  }
}
