//! Management API for monitors.
//!
//! Intervals are accepted in minutes and reported in seconds. Ids that do not
//! parse are treated like ids that do not exist.

use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, delete, get, post, put, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use urlwatch_service::{Monitor, MonitorId, MonitorService, ServiceError};

macros_utils::routes! {
    route create_monitor,
    route list_monitors,
    route get_monitor,
    route update_monitor,
    route delete_monitor,
    route pause_monitor,
    route resume_monitor,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("monitor not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody { error: self.to_string() })
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(_) => ApiError::NotFound,
            ServiceError::Conflict(_) => ApiError::Conflict(e.to_string()),
            ServiceError::InvalidMonitor(invalid) => ApiError::BadRequest(invalid.to_string()),
            ServiceError::Storage(source) => {
                error!("Storage failure: {}", source);
                ApiError::Internal
            }
        }
    }
}

/// Malformed JSON bodies get the same error shape as every other failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

#[derive(Debug, Deserialize)]
pub struct MonitorRequest {
    pub url: String,
    /// Minutes between checks
    pub interval: u64,
}

impl MonitorRequest {
    fn interval(&self) -> Result<Duration, ApiError> {
        self.interval
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| ApiError::BadRequest("interval is too large".into()))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorView {
    pub id: MonitorId,
    pub url: String,
    pub interval_seconds: u64,
    pub is_active: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Monitor> for MonitorView {
    fn from(monitor: &Monitor) -> Self {
        Self {
            id: monitor.id(),
            url: monitor.url().to_string(),
            interval_seconds: monitor.interval().as_secs(),
            is_active: monitor.is_active(),
            last_checked: monitor.last_checked(),
            created_at: monitor.created_at(),
            updated_at: monitor.updated_at(),
        }
    }
}

fn parse_id(raw: &str) -> Result<MonitorId, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound)
}

#[post("/monitors")]
pub async fn create_monitor(
    service: web::Data<MonitorService>,
    body: web::Json<MonitorRequest>,
) -> Result<HttpResponse, ApiError> {
    let monitor = service.create(&body.url, body.interval()?).await?;
    Ok(HttpResponse::Created().json(MonitorView::from(&monitor)))
}

#[get("/monitors")]
pub async fn list_monitors(service: web::Data<MonitorService>) -> Result<HttpResponse, ApiError> {
    let monitors = service.list().await?;
    let views: Vec<MonitorView> = monitors.iter().map(MonitorView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[get("/monitors/{id}")]
pub async fn get_monitor(
    service: web::Data<MonitorService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let monitor = service.get(parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(MonitorView::from(&monitor)))
}

#[put("/monitors/{id}")]
pub async fn update_monitor(
    service: web::Data<MonitorService>,
    path: web::Path<String>,
    body: web::Json<MonitorRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_id(&path)?;
    let monitor = service.update(id, &body.url, body.interval()?).await?;
    Ok(HttpResponse::Ok().json(MonitorView::from(&monitor)))
}

#[delete("/monitors/{id}")]
pub async fn delete_monitor(
    service: web::Data<MonitorService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    if service.delete(parse_id(&path)?).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound)
    }
}

#[post("/monitors/{id}/pause")]
pub async fn pause_monitor(
    service: web::Data<MonitorService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let monitor = service.pause(parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(MonitorView::from(&monitor)))
}

#[post("/monitors/{id}/resume")]
pub async fn resume_monitor(
    service: web::Data<MonitorService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let monitor = service.resume(parse_id(&path)?).await?;
    Ok(HttpResponse::Ok().json(MonitorView::from(&monitor)))
}
