//! Notarization submissions and the status tokens reported for them.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest wait representable in a submission deadline (ten years).
const MAX_WAIT_MS: u128 = 10 * 365 * 24 * 60 * 60 * 1000;

/// Opaque id handed back by the notarization authority on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(pub String);

impl TrackingId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TrackingId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TrackingId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One status reading for a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "token")]
pub enum NotarizationStatus {
    Success,
    /// Terminal refusal; keeps the token the authority used.
    Invalid(String),
    InProgress,
    /// Anything unrecognised. Never terminal.
    Other(String),
}

impl NotarizationStatus {
    /// Classify a raw status token, case-insensitively.
    pub fn parse(token: &str) -> Self {
        let trimmed = token.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "success" | "accepted" => NotarizationStatus::Success,
            "invalid" | "rejected" => NotarizationStatus::Invalid(trimmed.to_string()),
            "in progress" | "in_progress" | "inprogress" => NotarizationStatus::InProgress,
            _ => NotarizationStatus::Other(trimmed.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NotarizationStatus::Success | NotarizationStatus::Invalid(_)
        )
    }
}

impl fmt::Display for NotarizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotarizationStatus::Success => write!(f, "success"),
            NotarizationStatus::Invalid(token) => write!(f, "{token}"),
            NotarizationStatus::InProgress => write!(f, "in progress"),
            NotarizationStatus::Other(token) => write!(f, "{token}"),
        }
    }
}

/// A submitted archive awaiting its verdict.
#[derive(Debug, Clone, Serialize)]
pub struct NotarizationSubmission {
    pub tracking_id: TrackingId,
    pub submitted_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub last_status: Option<NotarizationStatus>,
    pub polls: u32,
}

impl NotarizationSubmission {
    pub fn new(tracking_id: TrackingId, timeout: Duration) -> Self {
        let submitted_at = Utc::now();
        let wait_ms = timeout.as_millis().min(MAX_WAIT_MS) as i64;
        Self {
            tracking_id,
            submitted_at,
            deadline: submitted_at + chrono::Duration::milliseconds(wait_ms),
            last_status: None,
            polls: 0,
        }
    }

    /// Time left before `deadline`, zero once it has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub(crate) fn record(&mut self, status: NotarizationStatus) {
        self.polls += 1;
        self.last_status = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("success", NotarizationStatus::Success)]
    #[case("Accepted", NotarizationStatus::Success)]
    #[case("In Progress", NotarizationStatus::InProgress)]
    #[case(" in progress ", NotarizationStatus::InProgress)]
    #[case("Invalid", NotarizationStatus::Invalid("Invalid".into()))]
    #[case("Rejected", NotarizationStatus::Invalid("Rejected".into()))]
    #[case("Queued", NotarizationStatus::Other("Queued".into()))]
    fn classifies_status_tokens(#[case] token: &str, #[case] expected: NotarizationStatus) {
        assert_eq!(NotarizationStatus::parse(token), expected);
    }

    #[test]
    fn only_success_and_invalid_are_terminal() {
        assert!(NotarizationStatus::Success.is_terminal());
        assert!(NotarizationStatus::Invalid("Invalid".into()).is_terminal());
        assert!(!NotarizationStatus::InProgress.is_terminal());
        assert!(!NotarizationStatus::Other("Queued".into()).is_terminal());
    }

    #[test]
    fn deadline_follows_timeout() {
        let submission =
            NotarizationSubmission::new(TrackingId::from("abc"), Duration::from_secs(1800));
        assert_eq!(
            submission.deadline - submission.submitted_at,
            chrono::Duration::seconds(1800)
        );
        assert_eq!(
            submission.remaining(submission.submitted_at),
            Duration::from_secs(1800)
        );
        assert_eq!(submission.remaining(submission.deadline), Duration::ZERO);
        assert_eq!(
            submission.remaining(submission.deadline + chrono::Duration::seconds(5)),
            Duration::ZERO
        );
    }

    #[test]
    fn record_counts_polls() {
        let mut submission =
            NotarizationSubmission::new(TrackingId::from("abc"), Duration::from_secs(1));
        submission.record(NotarizationStatus::InProgress);
        submission.record(NotarizationStatus::Success);
        assert_eq!(submission.polls, 2);
        assert_eq!(submission.last_status, Some(NotarizationStatus::Success));
    }
}
