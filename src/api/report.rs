//! REST API endpoint for pipeline runs

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};

use crate::api::error::ApiError;
use crate::api::health::{HealthStatus, ReadinessStatus};
use crate::model::{
    CostSummary, PipelineStats, Report, ReportTheme, ReportTopic, Stage, StepCost, TokenUsage,
};
use crate::service::comments::CommentStats;
use crate::service::run_log::StageRecord;
use crate::service::{PipelineOrchestrator, PipelineRequest};

/// Request body for a pipeline run
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportRequest {
    /// Free-text comments; blank entries are dropped
    pub comments: Vec<String>,
    pub run_name: Option<String>,
    pub exp_group: Option<String>,
    /// Pre-computed cost estimate in USD, used for accuracy reporting
    #[serde(default)]
    pub estimated_cost: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportResponse {
    pub report: Report,
    pub summary_line: String,
    pub comment_stats: CommentStats,
    /// Path of the saved structured document, when it could be written
    pub output_path: Option<String>,
    pub stages: Vec<StageRecord>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_report,
        crate::api::health::liveness,
        crate::api::health::readiness,
    ),
    components(schemas(
        ReportRequest,
        ReportResponse,
        Report,
        ReportTheme,
        ReportTopic,
        PipelineStats,
        CostSummary,
        StepCost,
        Stage,
        TokenUsage,
        StageRecord,
        CommentStats,
        HealthStatus,
        ReadinessStatus,
    )),
    tags(
        (name = "reports", description = "Comment taxonomy pipeline runs"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

/// Run the pipeline over a set of comments
///
/// Runs are synchronous and exclusive: a request made while another run is
/// active is rejected.
#[utoipa::path(
    post,
    path = "/v1/reports",
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Pipeline run completed", body = ReportResponse),
        (status = 400, description = "No usable comments"),
        (status = 409, description = "Another run is in progress"),
        (status = 502, description = "Text-generation service failed or answered unusably")
    ),
    tag = "reports"
)]
#[post("/v1/reports")]
pub async fn create_report(
    orchestrator: web::Data<PipelineOrchestrator>,
    body: web::Json<ReportRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    tracing::info!(
        comments = body.comments.len(),
        run_name = ?body.run_name,
        "Pipeline run requested"
    );

    let run = orchestrator
        .run(PipelineRequest {
            comments: body.comments,
            run_name: body.run_name,
            exp_group: body.exp_group,
            estimated_cost: body.estimated_cost,
        })
        .await?;

    Ok(HttpResponse::Ok().json(ReportResponse {
        summary_line: run.report.summary_line(),
        report: run.report,
        comment_stats: run.comment_stats,
        output_path: run.output_path.map(|p| p.display().to_string()),
        stages: run.summary.stages,
    }))
}

/// Configure report routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(create_report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test as actix_test};

    use crate::service::PipelineSettings;
    use crate::service::testing::ScriptedGenerator;

    fn orchestrator(generator: std::sync::Arc<ScriptedGenerator>) -> web::Data<PipelineOrchestrator> {
        web::Data::new(PipelineOrchestrator::new(
            generator,
            PipelineSettings {
                max_concurrent_calls: 1,
                default_run_name: "custom_comments_openrouter".to_string(),
                default_exp_group: "provider_comparison".to_string(),
            },
            None,
        ))
    }

    #[actix_web::test]
    async fn test_blank_comments_are_a_bad_request() {
        let generator = ScriptedGenerator::new(vec![]);
        let app = actix_test::init_service(
            App::new()
                .app_data(orchestrator(generator.clone()))
                .configure(configure),
        )
        .await;

        let request = actix_test::TestRequest::post()
            .uri("/v1/reports")
            .set_json(serde_json::json!({"comments": ["", "   "]}))
            .to_request();
        let response = actix_test::call_service(&app, request).await;

        assert_eq!(response.status(), 400);
        let body: serde_json::Value = actix_test::read_body_json(response).await;
        assert_eq!(body["error"], "bad_request");
        assert!(body["request_id"].is_string());
        assert_eq!(generator.calls(), 0);
    }

    #[actix_web::test]
    async fn test_unparsable_taxonomy_is_a_bad_gateway() {
        let generator = ScriptedGenerator::new(vec![Ok("no taxonomy here".to_string())]);
        let app = actix_test::init_service(
            App::new()
                .app_data(orchestrator(generator))
                .configure(configure),
        )
        .await;

        let request = actix_test::TestRequest::post()
            .uri("/v1/reports")
            .set_json(serde_json::json!({"comments": ["I love cats"]}))
            .to_request();
        let response = actix_test::call_service(&app, request).await;

        assert_eq!(response.status(), 502);
    }

    #[test]
    fn test_openapi_lists_report_path() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/v1/reports"));
        assert!(doc.paths.paths.contains_key("/health/ready"));
    }
}
