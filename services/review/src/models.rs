use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Review status of an image
///
/// Codes match the `annotation_status_id` column. Codes this service does not
/// know about are carried through as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ImageStatus {
    Todo,
    Rejected,
    Accepted,
    Other(i32),
}

impl From<i32> for ImageStatus {
    fn from(code: i32) -> Self {
        match code {
            1 => ImageStatus::Todo,
            2 => ImageStatus::Rejected,
            3 => ImageStatus::Accepted,
            other => ImageStatus::Other(other),
        }
    }
}

impl From<ImageStatus> for i32 {
    fn from(status: ImageStatus) -> Self {
        match status {
            ImageStatus::Todo => 1,
            ImageStatus::Rejected => 2,
            ImageStatus::Accepted => 3,
            ImageStatus::Other(code) => code,
        }
    }
}

/// Row of the `images` table as stored
#[derive(Debug, Clone, FromRow)]
pub struct ImageRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub created_time: DateTime<Utc>,
    pub annotation_status_id: i32,
}

/// An image queued for review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    /// Image ID, the pagination key
    pub id: i64,
    /// Display name
    pub name: String,
    /// Opaque storage locator of the image bytes
    pub locator: String,
    /// When the image was ingested
    pub created_time: DateTime<Utc>,
    /// Current review status
    pub status: ImageStatus,
}

impl From<ImageRecord> for Image {
    fn from(r: ImageRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            locator: r.url,
            created_time: r.created_time,
            status: r.annotation_status_id.into(),
        }
    }
}

/// A known label; `parent` is `None` for root labels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Label {
    pub id: i32,
    pub name: String,
    pub parent: Option<i32>,
}

/// Who produced an annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Entered by a reviewer
    Manual,
    /// Produced by the external labeling process
    Automatic,
}

impl Provenance {
    /// Value of the `auto_label` column
    pub fn is_automatic(self) -> bool {
        matches!(self, Provenance::Automatic)
    }
}

/// A label value on one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LabelValue {
    pub label_id: i32,
    pub value: bool,
}

impl LabelValue {
    pub fn new(label_id: i32, value: bool) -> Self {
        Self { label_id, value }
    }
}

/// Category filter applied to the review queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryFilter {
    /// No filtering
    All,
    /// Only images with a manual, true annotation for this label
    Label { name: String, label_id: i32 },
}

impl CategoryFilter {
    pub fn label_id(&self) -> Option<i32> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Label { label_id, .. } => Some(*label_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ImageStatus::from(1), ImageStatus::Todo);
        assert_eq!(ImageStatus::from(2), ImageStatus::Rejected);
        assert_eq!(ImageStatus::from(3), ImageStatus::Accepted);
        assert_eq!(ImageStatus::from(7), ImageStatus::Other(7));
        assert_eq!(i32::from(ImageStatus::Accepted), 3);
        assert_eq!(serde_json::to_string(&ImageStatus::Rejected).unwrap(), "2");
    }

    #[test]
    fn test_image_from_record() {
        let record = ImageRecord {
            id: 42,
            name: "shelf.jpg".to_string(),
            url: "s3://review-images/shelf.jpg".to_string(),
            created_time: Utc::now(),
            annotation_status_id: 1,
        };

        let image: Image = record.into();
        assert_eq!(image.id, 42);
        assert_eq!(image.locator, "s3://review-images/shelf.jpg");
        assert_eq!(image.status, ImageStatus::Todo);
    }
}
