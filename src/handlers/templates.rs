use crate::{
    services::{MaintenanceMatrix, ResolvedTemplate},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub brand_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MatrixQuery {
    pub brand_id: Uuid,
    pub model_id: Option<Uuid>,
}

/// Prices a template against the brand's catalog without creating a quote.
pub async fn resolve_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ResolveQuery>,
) -> ApiResult<ResolvedTemplate> {
    let resolved = state.services.resolver.resolve(id, query.brand_id).await?;
    Ok(Json(ApiResponse::success(resolved)))
}

pub async fn maintenance_matrix(
    State(state): State<AppState>,
    Query(query): Query<MatrixQuery>,
) -> ApiResult<MaintenanceMatrix> {
    let matrix = state
        .services
        .matrix
        .build(query.brand_id, query.model_id)
        .await?;
    Ok(Json(ApiResponse::success(matrix)))
}

pub fn template_routes() -> Router<AppState> {
    Router::new()
        .route("/templates/:id/resolve", get(resolve_template))
        .route("/matrix", get(maintenance_matrix))
}
