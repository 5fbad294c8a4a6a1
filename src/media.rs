use serde::{Deserialize, Serialize};

/// Written to [`MediaItem::commentary`] when commentary generation fails.
pub const COMMENTARY_FAILED: &str = "[REVIEW_FAILED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Image,
    Video,
    Text,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Approved,
    Flagged,
    Rejected,
    Unknown,
}

impl ModerationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Flagged => "FLAGGED",
            Self::Rejected => "REJECTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentStatus {
    #[default]
    Pending,
    Approved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub data_type: DataType,
    pub data_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderation_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub moderation_status: ModerationStatus,
    #[serde(default)]
    pub content_status: ContentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

impl MediaItem {
    /// A freshly ingested item: pending review, not yet published.
    pub fn new(id: impl Into<String>, data_type: DataType, data_content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_type,
            data_content: data_content.into(),
            moderation_description: None,
            rejection_reason: None,
            moderation_status: ModerationStatus::Pending,
            content_status: ContentStatus::Pending,
            commentary: None,
        }
    }

    pub fn image(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, DataType::Image, url)
    }

    pub fn awaits_moderation(&self) -> bool {
        self.data_type == DataType::Image && self.moderation_status == ModerationStatus::Pending
    }

    pub fn awaits_commentary(&self) -> bool {
        self.commentary.is_none()
            && self
                .moderation_description
                .as_deref()
                .is_some_and(|description| !description.trim().is_empty())
    }
}
