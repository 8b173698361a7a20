use axum::{
    async_trait,
    extract::{multipart::MultipartError, DefaultBodyLimit, FromRequestParts, Multipart, Path, State},
    http::{header, request::Parts, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::BytesMut;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::{PipelineError, ResolveError},
    history::QueryStore,
    models::{AnalyzeRequest, ErrorBody, QueryRecord, UploadedImage},
    pdf::generate_pdf,
    pipeline::Pipeline,
    rate_limit::{limit_requests, RateLimiter},
    resolver::essence,
    uploads::{public_url, ImageStore},
};

pub const ANALYSIS_FAILED_MESSAGE: &str = "Görsel analiz edilirken bir hata oluştu";

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: QueryStore,
    pub uploads: ImageStore,
    pub public_base_url: String,
    pub pipeline: Arc<Pipeline>,
    pub limiter: Arc<RateLimiter>,
}

pub fn app(state: AppState) -> Router {
    let limiter = state.limiter.clone();
    let upload_limit = state.uploads.max_bytes().saturating_add(MULTIPART_OVERHEAD);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/images", post(upload_image).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/api/images/:name", get(serve_image).delete(delete_image))
        .route("/api/analyze", post(analyze_image))
        .route("/api/queries", get(list_queries))
        .route("/api/queries/:id", get(get_query).delete(delete_query))
        .route("/api/queries/:id/pdf", get(export_pdf))
        .layer(middleware::from_fn_with_state(limiter, limit_requests))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .layer(security_header(header::X_FRAME_OPTIONS, "DENY"))
        .layer(security_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .layer(security_header(header::REFERRER_POLICY, "strict-origin-when-cross-origin"))
        .layer(security_header(
            HeaderName::from_static("permissions-policy"),
            "camera=(), microphone=(), geolocation=()",
        ))
        .layer(security_header(header::X_XSS_PROTECTION, "1; mode=block"))
        .with_state(state)
}

fn security_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

/// Caller identity as asserted by the upstream auth gateway.
pub struct UserId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound,
    ImageNotFound,
    Upload(ResolveError),
    UploadRead(MultipartError),
    Analysis(PipelineError),
    Export(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, kind) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Oturum bulunamadı".to_string(), None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Sorgu bulunamadı".to_string(), None),
            ApiError::ImageNotFound => (StatusCode::NOT_FOUND, "Görsel bulunamadı".to_string(), None),
            ApiError::Upload(err) => {
                let kind = Some(err.kind().to_string());
                match err {
                    ResolveError::TooLarge { limit, .. } => (
                        StatusCode::PAYLOAD_TOO_LARGE,
                        format!("Dosya boyutu {}MB'dan büyük olamaz", limit.div_ceil(1024 * 1024)),
                        kind,
                    ),
                    ResolveError::InvalidImage(_) => (
                        StatusCode::UNSUPPORTED_MEDIA_TYPE,
                        "Yalnızca görsel dosyaları yüklenebilir".to_string(),
                        kind,
                    ),
                    other => (StatusCode::BAD_REQUEST, other.to_string(), kind),
                }
            }
            ApiError::UploadRead(err) => (err.status(), err.body_text(), None),
            ApiError::Analysis(err) => {
                let status = if err.is_client_side() {
                    StatusCode::UNPROCESSABLE_ENTITY
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, ANALYSIS_FAILED_MESSAGE.to_string(), Some(err.kind().to_string()))
            }
            ApiError::Export(detail) => {
                warn!("PDF export failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Rapor dışa aktarılamadı".to_string(), None)
            }
        };
        (status, Json(ErrorBody { error, kind })).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "model": state.pipeline.model_name() }))
}

pub async fn upload_image(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedImage>), ApiError> {
    let limit = state.uploads.max_bytes();
    while let Some(mut field) = multipart.next_field().await.map_err(ApiError::UploadRead)? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(essence);

        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(ApiError::UploadRead)? {
            let size = buf.len() + chunk.len();
            if size > limit {
                warn!("❌ Upload from {} exceeds {} bytes", user_id, limit);
                return Err(ApiError::Upload(ResolveError::TooLarge { size, limit }));
            }
            buf.extend_from_slice(&chunk);
        }

        let stored = state
            .uploads
            .store(&user_id, buf.freeze(), content_type)
            .map_err(ApiError::Upload)?;
        info!("📤 Stored upload {} for user {}", stored.name, user_id);
        let url = public_url(&state.public_base_url, &stored.name);
        return Ok((
            StatusCode::CREATED,
            Json(UploadedImage {
                size: stored.image.content.len(),
                mime_type: stored.image.mime_type,
                name: stored.name,
                url,
            }),
        ));
    }
    Err(ApiError::BadRequest("file field is required".into()))
}

pub async fn serve_image(Path(name): Path<String>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let stored = state.uploads.get(&name).ok_or(ApiError::ImageNotFound)?;
    let content_type = HeaderValue::from_str(&stored.image.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, content_type)], stored.image.content).into_response())
}

pub async fn delete_image(
    Path(name): Path<String>,
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<StatusCode, ApiError> {
    if state.uploads.delete(&user_id, &name) {
        info!("🗑️ Deleted upload {}", name);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::ImageNotFound)
    }
}

pub async fn analyze_image(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<QueryRecord>), ApiError> {
    let image_url = body.image_url.trim().to_string();
    if image_url.is_empty() {
        return Err(ApiError::BadRequest("image_url is required".into()));
    }

    info!("🚀 Analyzing image for user {}: {}", user_id, image_url);

    let analysis = state.pipeline.run(&image_url).await.map_err(|err| {
        error!(kind = err.kind(), error = %err, "❌ Image analysis failed");
        ApiError::Analysis(err)
    })?;

    let record = QueryRecord::new(user_id, image_url, analysis, state.pipeline.model_name());
    state.store.insert(record.clone());
    info!("✅ Stored analysis {} ({})", record.id, record.analysis_result.title());
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_queries(State(state): State<AppState>, UserId(user_id): UserId) -> Json<Vec<QueryRecord>> {
    Json(state.store.list(&user_id))
}

pub async fn get_query(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<QueryRecord>, ApiError> {
    state.store.get(&user_id, id).map(Json).ok_or(ApiError::NotFound)
}

pub async fn delete_query(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<StatusCode, ApiError> {
    if state.store.delete(&user_id, id) {
        info!("🗑️ Deleted analysis {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn export_pdf(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Response, ApiError> {
    let record = state.store.get(&user_id, id).ok_or(ApiError::NotFound)?;
    let pdf_bytes = generate_pdf(&record).map_err(|e| ApiError::Export(e.to_string()))?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"analysis_{}.pdf\"", id))
        .map_err(|e| ApiError::Export(e.to_string()))?;
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((StatusCode::OK, headers, pdf_bytes).into_response())
}
