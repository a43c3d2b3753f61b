//! Health check endpoints for Kubernetes liveness and readiness probes

use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::service::PipelineOrchestrator;

#[derive(Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessStatus {
    pub status: String,
    pub version: String,
    pub provider: String,
    pub model: String,
}

/// Liveness probe endpoint
///
/// Always returns 200 OK if the service is running.
/// Used by Kubernetes to determine if the pod should be restarted.
#[utoipa::path(
    get,
    path = "/health/live",
    responses(
        (status = 200, description = "Service is alive", body = HealthStatus)
    ),
    tag = "health"
)]
#[get("/health/live")]
pub async fn liveness() -> impl Responder {
    HttpResponse::Ok().json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe endpoint
///
/// The API key is checked before the server starts, so a running service is
/// ready. Reports the configured provider and model.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessStatus)
    ),
    tag = "health"
)]
#[get("/health/ready")]
pub async fn readiness(orchestrator: web::Data<PipelineOrchestrator>) -> impl Responder {
    HttpResponse::Ok().json(ReadinessStatus {
        status: "ready".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: orchestrator.provider_name().to_string(),
        model: orchestrator.model().to_string(),
    })
}

/// Configure health check routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(liveness).service(readiness);
}
