use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::Analysis;
use crate::report::ReportSummary;

/// Downloaded image. `content` is never empty and `mime_type` is `image/*`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBytes {
    pub content: Bytes,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub base64_payload: String,
    pub mime_type: String,
}

/// Untrusted completion text from the vision model.
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelOutput {
    pub text: String,
}

/// Markdown report in the stored wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderedReport(pub String);

impl RenderedReport {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn title(&self) -> &str {
        self.0.lines().next().unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeRequest {
    pub image_url: String,
}

/// Response to an upload; `url` can be passed straight to `/api/analyze`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadedImage {
    pub name: String,
    pub url: String,
    pub mime_type: String,
    pub size: usize,
}

/// One stored analysis, owned by a single user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub image_url: String,
    pub analysis_result: RenderedReport,
    pub summary: ReportSummary,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(user_id: String, image_url: String, analysis: Analysis, model: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            image_url,
            summary: analysis.report.summary(),
            analysis_result: analysis.rendered,
            model: model.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
