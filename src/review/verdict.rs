use serde::{Deserialize, Serialize};

use crate::media::{COMMENTARY_FAILED, ModerationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewOutcome {
    #[serde(alias = "approved")]
    Approved,
    #[serde(alias = "flagged")]
    Flagged,
    #[serde(alias = "rejected")]
    Rejected,
    #[serde(other)]
    Unknown,
}

impl ReviewOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Flagged => "FLAGGED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn moderation_status(self) -> ModerationStatus {
        match self {
            Self::Approved => ModerationStatus::Approved,
            Self::Flagged => ModerationStatus::Flagged,
            Self::Rejected => ModerationStatus::Rejected,
            Self::Unknown => ModerationStatus::Unknown,
        }
    }
}

impl std::fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of one moderation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub outcome: ReviewOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ModerationVerdict {
    pub fn approved(description: impl Into<String>) -> Self {
        Self {
            outcome: ReviewOutcome::Approved,
            description: Some(description.into()),
            failure_reason: None,
        }
    }

    pub fn flagged(reason: impl Into<String>) -> Self {
        Self {
            outcome: ReviewOutcome::Flagged,
            description: None,
            failure_reason: Some(reason.into()),
        }
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            outcome: ReviewOutcome::Unknown,
            description: None,
            failure_reason: Some(reason.into()),
        }
    }

    /// Blank descriptions count as absent.
    pub fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .map(str::trim)
            .filter(|description| !description.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentaryResult {
    Text(String),
    Failed { reason: String },
}

impl CommentaryResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The value stored on the item: the model text verbatim, or the
    /// failure sentinel.
    pub fn into_commentary(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Failed { .. } => COMMENTARY_FAILED.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accepts_lowercase_and_unrecognized_values() -> serde_json::Result<()> {
        let approved: ReviewOutcome = serde_json::from_str("\"approved\"")?;
        assert_eq!(approved, ReviewOutcome::Approved);
        let odd: ReviewOutcome = serde_json::from_str("\"NEEDS_HUMAN\"")?;
        assert_eq!(odd, ReviewOutcome::Unknown);
        Ok(())
    }

    #[test]
    fn outcome_maps_onto_moderation_status() {
        assert_eq!(
            ReviewOutcome::Approved.moderation_status(),
            ModerationStatus::Approved
        );
        assert_eq!(
            ReviewOutcome::Unknown.moderation_status(),
            ModerationStatus::Unknown
        );
        assert!(ReviewOutcome::Rejected.moderation_status().is_terminal());
    }

    #[test]
    fn blank_description_reads_as_absent() {
        let mut verdict = ModerationVerdict::approved("  ");
        assert_eq!(verdict.description(), None);
        verdict.description = Some(" a cat photo ".to_string());
        assert_eq!(verdict.description(), Some("a cat photo"));
    }

    #[test]
    fn failed_commentary_becomes_sentinel() {
        let failed = CommentaryResult::Failed {
            reason: "empty model output".to_string(),
        };
        assert!(failed.is_failed());
        assert_eq!(failed.into_commentary(), "[REVIEW_FAILED]");
        assert_eq!(
            CommentaryResult::Text("ok".to_string()).into_commentary(),
            "ok"
        );
    }
}
