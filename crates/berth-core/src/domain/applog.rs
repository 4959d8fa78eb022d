//! Application log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source used for messages the engine itself writes to an app's log.
pub const ENGINE_SOURCE: &str = "berth";

/// One line of an application's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applog {
    pub date: DateTime<Utc>,
    pub message: String,
    pub source: String,
    #[serde(rename = "app_name")]
    pub app: String,
}

/// Splits `message` into one record per line, dropping blank lines.
pub fn split_log_lines(app: &str, message: &str, source: &str, date: DateTime<Utc>) -> Vec<Applog> {
    message
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Applog {
            date,
            message: line.to_string(),
            source: source.to_string(),
            app: app.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[rstest]
    #[case("last log msg", 1)]
    #[case("first\nsecond\n", 2)]
    #[case("first\n\n   \nsecond", 2)]
    #[case("", 0)]
    #[case("\n\n", 0)]
    fn one_record_per_non_blank_line(#[case] message: &str, #[case] expected: usize) {
        assert_eq!(split_log_lines("myapp", message, "app", at()).len(), expected);
    }

    #[test]
    fn records_keep_source_and_app() {
        let logs = split_log_lines("myapp", "starting\nlistening on :8888", "web", at());

        assert_eq!(logs[0].message, "starting");
        assert_eq!(logs[1].message, "listening on :8888");
        assert!(logs.iter().all(|log| log.source == "web" && log.app == "myapp"));
    }

    #[test]
    fn serializes_with_app_name_field() {
        let log = &split_log_lines("myapp", "hello", "app", at())[0];

        let json = serde_json::to_value(log).unwrap();

        assert_eq!(json["app_name"], "myapp");
        assert_eq!(json["message"], "hello");
    }
}
