use thiserror::Error;

use crate::report::Section;

/// Failures while turning an image URL into bytes.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("invalid image url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("image fetch failed with HTTP {status}")]
    Fetch { status: u16 },
    #[error("image unreachable: {0}")]
    Unreachable(String),
    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("not a usable image: {0}")]
    InvalidImage(String),
}

impl ResolveError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::InvalidUrl { .. } => "invalid_image_url",
            ResolveError::Fetch { .. } => "fetch",
            ResolveError::Unreachable(_) => "image_unreachable",
            ResolveError::TooLarge { .. } => "image_too_large",
            ResolveError::InvalidImage(_) => "invalid_image",
        }
    }
}

/// Failures talking to the vision model provider.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model transport error: {0}")]
    Transport(String),
    #[error("model provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model response contained no text")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output")]
    NoJsonFound,
    #[error("model output is not valid JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),
    #[error("model output is missing the '{field}' section")]
    MissingField { field: Section },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot render report: field '{field}' is missing or malformed")]
pub struct RenderError {
    pub field: String,
}

impl RenderError {
    pub fn at(section: Section, key: &str) -> Self {
        Self { field: format!("{}.{}", section.key(), key) }
    }
}

/// One failed analysis. Every stage fails fast into exactly one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("model invocation failed: {0}")]
    Model(#[from] ModelError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl PipelineError {
    /// Stable machine-readable tag, safe to hand to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Resolve(err) => err.kind(),
            PipelineError::Model(_) => "model_invocation",
            PipelineError::Extract(ExtractError::NoJsonFound) => "no_json_found",
            PipelineError::Extract(ExtractError::MalformedJson(_)) => "malformed_json",
            PipelineError::Extract(ExtractError::MissingField { .. }) => "missing_field",
            PipelineError::Render(_) => "render",
        }
    }

    /// True when the failure sits on the caller's side (bad or unreachable image).
    pub fn is_client_side(&self) -> bool {
        matches!(self, PipelineError::Resolve(_))
    }
}
