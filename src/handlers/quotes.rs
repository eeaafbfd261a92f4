use crate::{
    errors::{ApiError, ServiceError},
    handlers::common::validate_input,
    services::{
        AddQuoteItemInput, CreateQuoteInput, DiscountPreset, MaterializedQuote, QuoteDetails,
        SetQuoteDiscountInput, UniformDiscountInput, UpdateQuoteItemInput,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize)]
pub struct SetTaxRateRequest {
    /// Percentage, 20 means 20%
    pub tax_rate: Decimal,
}

/// Creates a DRAFT quote from a maintenance template.
///
/// Template items whose code has no catalog entry are returned in `gaps`
/// rather than failing the request.
pub async fn create_quote(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuoteInput>,
) -> Result<(StatusCode, Json<ApiResponse<MaterializedQuote>>), ApiError> {
    validate_input(&payload)?;

    let created = state
        .services
        .materializer
        .create_quote_from_template(payload)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn get_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QuoteDetails> {
    let details = state.services.quotes.get_quote(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn add_quote_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddQuoteItemInput>,
) -> Result<(StatusCode, Json<ApiResponse<QuoteDetails>>), ApiError> {
    validate_input(&payload)?;
    let details = state.services.line_items.add_item(id, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(details))))
}

pub async fn update_quote_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuoteItemInput>,
) -> ApiResult<QuoteDetails> {
    let details = state
        .services
        .line_items
        .update_item(id, item_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn remove_quote_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<QuoteDetails> {
    let details = state.services.line_items.remove_item(id, item_id).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn set_quote_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetQuoteDiscountInput>,
) -> ApiResult<QuoteDetails> {
    let details = state.services.quotes.set_quote_discount(id, payload).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn set_tax_rate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetTaxRateRequest>,
) -> ApiResult<QuoteDetails> {
    let details = state.services.quotes.set_tax_rate(id, payload.tax_rate).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn apply_uniform_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UniformDiscountInput>,
) -> ApiResult<QuoteDetails> {
    let details = state
        .services
        .bulk_discount
        .apply_uniform_discount(id, payload.parts_pct, payload.labor_pct)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn apply_preset(
    State(state): State<AppState>,
    Path((id, preset)): Path<(Uuid, String)>,
) -> ApiResult<QuoteDetails> {
    let preset = DiscountPreset::from_str(&preset)
        .map_err(|_| ServiceError::InvalidInput(format!("Unknown discount preset '{}'", preset)))?;
    let details = state.services.bulk_discount.apply_preset(id, preset).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn finalize_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QuoteDetails> {
    let details = state.services.quotes.finalize(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

pub async fn cancel_quote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<QuoteDetails> {
    let details = state.services.quotes.cancel(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Creates the router for quote endpoints
pub fn quote_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_quote))
        .route("/:id", get(get_quote))
        .route("/:id/items", post(add_quote_item))
        .route(
            "/:id/items/:item_id",
            put(update_quote_item).delete(remove_quote_item),
        )
        .route("/:id/discount", post(set_quote_discount))
        .route("/:id/tax-rate", post(set_tax_rate))
        .route("/:id/uniform-discount", post(apply_uniform_discount))
        .route("/:id/presets/:preset", post(apply_preset))
        .route("/:id/finalize", post(finalize_quote))
        .route("/:id/cancel", post(cancel_quote))
}
