//! Typed check-suite payloads and their decoder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload decode failure.
///
/// Carries the parser message and position rather than the parser error
/// itself so that it can be stored in the status cache and cloned out.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid check-suites payload at line {line}, column {column}: {message}")]
pub struct DecodeError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self {
            message: e.to_string(),
            line: e.line(),
            column: e.column(),
        }
    }
}

/// Response of `GET /repos/{org}/{repo}/commits/{branch}/check-suites`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSuiteReport {
    pub total_count: i64,
    pub check_suites: Vec<CheckSuite>,
}

/// A single check suite for a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSuite {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SuiteStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    ActionRequired,
    Cancelled,
    Failure,
    Neutral,
    Success,
    Skipped,
    Stale,
    TimedOut,
}

impl Conclusion {
    /// Whether this conclusion should turn the light red.
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            Conclusion::ActionRequired
                | Conclusion::Cancelled
                | Conclusion::Failure
                | Conclusion::Stale
                | Conclusion::TimedOut
        )
    }
}

/// One-word verdict over every suite in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Summary {
    Unknown,
    Pending,
    Failing,
    Passing,
}

impl CheckSuiteReport {
    /// Fold all suites into a single light.
    ///
    /// Anything still queued or running wins over a failure, so a re-run
    /// in progress shows as pending rather than red.
    pub fn summary(&self) -> Summary {
        if self.check_suites.is_empty() {
            return Summary::Unknown;
        }

        let mut failing = false;
        for suite in &self.check_suites {
            if suite.status != Some(SuiteStatus::Completed) {
                return Summary::Pending;
            }
            if suite.conclusion.is_some_and(Conclusion::is_failing) {
                failing = true;
            }
        }

        if failing {
            Summary::Failing
        } else {
            Summary::Passing
        }
    }

    /// The most recent suite as listed by the API.
    pub fn latest(&self) -> Option<&CheckSuite> {
        self.check_suites.first()
    }
}

/// Decode a raw response body.
pub fn decode_report(body: &[u8]) -> Result<CheckSuiteReport, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_SUCCESS: &str = r#"{"total_count":1,"check_suites":[{"id":1,"url":"https://x","status":"completed","conclusion":"success"}]}"#;

    #[test]
    fn test_decode_minimal_suite() {
        let report = decode_report(SINGLE_SUCCESS.as_bytes()).unwrap();
        assert_eq!(report.total_count, 1);
        assert_eq!(report.check_suites.len(), 1);

        let suite = &report.check_suites[0];
        assert_eq!(suite.id, 1);
        assert_eq!(suite.url, "https://x");
        assert_eq!(suite.status, Some(SuiteStatus::Completed));
        assert_eq!(suite.conclusion, Some(Conclusion::Success));
        assert!(suite.head_sha.is_none());
        assert_eq!(report.summary(), Summary::Passing);
    }

    #[test]
    fn test_decode_full_suite_with_nulls() {
        let body = r#"{
            "total_count": 2,
            "check_suites": [
                {
                    "id": 5,
                    "node_id": "MDEwOkNoZWNrU3VpdGU1",
                    "head_branch": "main",
                    "head_sha": "d6fde92930d4715a2b49857d24b940956b26d2d3",
                    "status": "in_progress",
                    "conclusion": null,
                    "url": "https://api.github.com/repos/o/r/check-suites/5",
                    "before": "146e867f55c26428e5f9fade55a9bbf5e95a7912",
                    "after": "d6fde92930d4715a2b49857d24b940956b26d2d3",
                    "completed_at": null,
                    "app": {"id": 1}
                },
                {
                    "id": 4,
                    "url": "https://api.github.com/repos/o/r/check-suites/4",
                    "status": "completed",
                    "conclusion": "timed_out",
                    "completed_at": "2021-02-17T10:15:00Z"
                }
            ]
        }"#;

        let report = decode_report(body.as_bytes()).unwrap();
        assert_eq!(report.total_count, 2);
        assert_eq!(report.check_suites[0].status, Some(SuiteStatus::InProgress));
        assert!(report.check_suites[0].conclusion.is_none());
        assert_eq!(report.check_suites[0].head_branch.as_deref(), Some("main"));
        assert_eq!(
            report.check_suites[1].completed_at.map(|t| t.to_rfc3339()),
            Some("2021-02-17T10:15:00+00:00".to_string())
        );
        assert_eq!(report.latest().map(|s| s.id), Some(5));
        assert_eq!(report.summary(), Summary::Pending);
    }

    #[test]
    fn test_unknown_status_is_decode_error() {
        let body = r#"{"total_count":1,"check_suites":[{"id":1,"url":"https://x","status":"bogus"}]}"#;
        let err = decode_report(body.as_bytes()).unwrap_err();
        assert!(err.message.contains("bogus"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_unknown_conclusion_is_decode_error() {
        let body = r#"{"total_count":1,"check_suites":[{"id":1,"url":"https://x","status":"completed","conclusion":"meh"}]}"#;
        assert!(decode_report(body.as_bytes()).is_err());
    }

    #[test]
    fn test_missing_required_fields() {
        assert!(decode_report(br#"{"check_suites":[]}"#).is_err());
        assert!(decode_report(br#"{"total_count":0,"check_suites":[{"id":1}]}"#).is_err());
        assert!(decode_report(b"not json").is_err());
    }

    #[test]
    fn test_summary_failing_and_unknown() {
        let body = r#"{"total_count":2,"check_suites":[
            {"id":1,"url":"u","status":"completed","conclusion":"success"},
            {"id":2,"url":"u","status":"completed","conclusion":"failure"}
        ]}"#;
        let report = decode_report(body.as_bytes()).unwrap();
        assert_eq!(report.summary(), Summary::Failing);

        let empty = decode_report(br#"{"total_count":0,"check_suites":[]}"#).unwrap();
        assert_eq!(empty.summary(), Summary::Unknown);
        assert!(empty.latest().is_none());
    }

    #[test]
    fn test_suite_serializes_without_absent_fields() {
        let report = decode_report(SINGLE_SUCCESS.as_bytes()).unwrap();
        let json = serde_json::to_string(&report.check_suites[0]).unwrap();
        assert_eq!(
            json,
            r#"{"id":1,"status":"completed","conclusion":"success","url":"https://x"}"#
        );
    }
}
