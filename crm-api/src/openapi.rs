//! OpenAPI document for the CRM pipeline API, generated by utoipa from the
//! route annotations and DTO schemas.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{health, opportunity, pipeline_stage};
use crate::types::*;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CRM Pipeline API",
        version = "0.1.0",
        description = "Sales pipeline with fractional-index ordering of stages and opportunities"
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Opportunities", description = "Deals, their order inside a stage, and stage changes"),
        (name = "Pipeline Stages", description = "Pipeline columns and their order"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        opportunity::create_opportunity,
        opportunity::get_opportunity,
        opportunity::delete_opportunity,
        opportunity::change_stage,
        opportunity::reorder_opportunity,

        pipeline_stage::create_stage,
        pipeline_stage::list_stages,
        pipeline_stage::get_stage,
        pipeline_stage::list_stage_opportunities,
        pipeline_stage::reorder_stage,
        pipeline_stage::rebalance_stages,
        pipeline_stage::rebalance_stage_opportunities,

        health::ping,
        health::liveness,
        health::readiness,

        crate::telemetry::metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError,
            ErrorCode,
            CreateOpportunityRequest,
            OpportunityResponse,
            ListOpportunitiesResponse,
            CreatePipelineStageRequest,
            PipelineStageResponse,
            ListPipelineStagesResponse,
            PositionAssignment,
            RebalanceResponse,
            ReorderRequest,
            ChangeStageRequest,
            health::HealthResponse,
            health::HealthStatus,
            health::HealthDetails,
            health::ComponentHealth,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the `api_key` and `bearer_auth` schemes used by the routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT Bearer token"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }

    #[cfg(feature = "openapi")]
    pub fn to_yaml() -> Result<String, String> {
        serde_yaml::to_string(&Self::openapi()).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() -> Result<(), String> {
        let openapi = ApiDoc::openapi();
        assert_eq!(openapi.info.title, "CRM Pipeline API");

        let tags = openapi.tags.as_ref().ok_or("OpenAPI tags missing")?;
        assert_eq!(tags.len(), 4);

        let components = openapi.components.as_ref().ok_or("components missing")?;
        assert!(components.security_schemes.contains_key("api_key"));
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("ReorderRequest"));
        Ok(())
    }

    #[test]
    fn test_reorder_paths_documented() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;
        assert!(paths.contains_key("/api/v1/opportunities/{id}/reorder"));
        assert!(paths.contains_key("/api/v1/opportunities/{id}/stage"));
        assert!(paths.contains_key("/api/v1/pipeline-stages/{id}/reorder"));
        assert!(paths.contains_key("/health/ready"));
    }

    #[test]
    fn test_to_json() -> Result<(), String> {
        let json = ApiDoc::to_json().map_err(|e| e.to_string())?;
        assert!(json.contains("\"openapi\""));
        assert!(json.contains("prevPosition"));
        Ok(())
    }
}
