use std::sync::Arc;

use tracing::{debug, info};

use crate::encoder::encode;
use crate::error::PipelineError;
use crate::extract::{extract_and_validate, SpanMode};
use crate::gemini::{VisionModel, ANALYSIS_PROMPT};
use crate::models::RenderedReport;
use crate::render::render;
use crate::report::AnalysisReport;
use crate::resolver::ImageSource;

/// Result of one successful run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub report: AnalysisReport,
    pub rendered: RenderedReport,
}

/// Image URL in, rendered report out: resolve, encode, analyze, extract,
/// render. Runs share nothing mutable, so one pipeline serves every request.
pub struct Pipeline {
    images: Arc<dyn ImageSource>,
    model: Arc<dyn VisionModel>,
    prompt: String,
    span_mode: SpanMode,
}

impl Pipeline {
    pub fn new(images: Arc<dyn ImageSource>, model: Arc<dyn VisionModel>) -> Self {
        Self {
            images,
            model,
            prompt: ANALYSIS_PROMPT.to_string(),
            span_mode: SpanMode::default(),
        }
    }

    pub fn with_span_mode(mut self, span_mode: SpanMode) -> Self {
        self.span_mode = span_mode;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    pub async fn run(&self, url: &str) -> Result<Analysis, PipelineError> {
        let image = self.images.resolve(url).await?;
        let encoded = encode(&image);
        debug!(mime = %encoded.mime_type, chars = encoded.base64_payload.len(), "image encoded");

        let raw = self.model.analyze(&encoded, &self.prompt).await?;
        let report = extract_and_validate(&raw, self.span_mode)?;
        let rendered = render(&report)?;

        info!("🧾 Rendered report for '{}'", rendered.title());
        Ok(Analysis { report, rendered })
    }
}
