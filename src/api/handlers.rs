use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::logic::mutations::{
    AddItem, ListService, MutationError, Outcome, SetQuantity, Undo,
};
use crate::logic::projection::{self, ItemFormView, ItemHistory, PlanView, ShopView, ViewError};
use crate::model::{FieldErrors, IdempotencyKey, Id, UserContext};
use crate::store::traits::Store;

pub type AppState<S> = Arc<S>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// Body of a 422 response
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldErrorsResponse {
    pub errors: FieldErrors,
}

#[derive(Debug, Deserialize)]
pub struct AddItemForm {
    pub product_id: Id,
    #[serde(default)]
    pub unit_id: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(rename = "_idempotency_key", default)]
    pub idempotency_key: String,
}

#[derive(Debug, Deserialize)]
pub struct QuantityForm {
    #[serde(default)]
    pub unit_id: String,
    #[serde(default)]
    pub quantity: String,
    #[serde(rename = "_idempotency_key", default)]
    pub idempotency_key: String,
}

/// Check and remove carry nothing but the key
#[derive(Debug, Deserialize)]
pub struct KeyForm {
    #[serde(rename = "_idempotency_key", default)]
    pub idempotency_key: String,
}

#[derive(Debug, Deserialize)]
pub struct UndoForm {
    #[serde(default)]
    pub old_state: String,
    #[serde(default)]
    pub new_state: String,
    #[serde(rename = "_idempotency_key", default)]
    pub idempotency_key: String,
}

pub async fn get_plan<S: Store>(
    State(store): State<AppState<S>>,
    _user: UserContext,
) -> Result<Json<PlanView>, ApiError> {
    projection::plan(&*store).await.map(Json).map_err(view_error)
}

pub async fn get_shop<S: Store>(
    State(store): State<AppState<S>>,
    _user: UserContext,
) -> Result<Json<ShopView>, ApiError> {
    projection::shop(&*store).await.map(Json).map_err(view_error)
}

pub async fn get_item_form<S: Store>(
    State(store): State<AppState<S>>,
    _user: UserContext,
    Path(item_id): Path<Id>,
) -> Result<Json<ItemFormView>, ApiError> {
    projection::item_form(&*store, item_id)
        .await
        .map(Json)
        .map_err(view_error)
}

pub async fn get_item_history<S: Store>(
    State(store): State<AppState<S>>,
    _user: UserContext,
    Path(item_id): Path<Id>,
) -> Result<Json<ItemHistory>, ApiError> {
    projection::item_history(&*store, item_id)
        .await
        .map(Json)
        .map_err(view_error)
}

pub async fn add_item<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    Form(form): Form<AddItemForm>,
) -> Result<Response, ApiError> {
    let key = parse_key(&form.idempotency_key)?;
    let request = AddItem {
        product_id: form.product_id,
        unit_id: parse_unit_id(&form.unit_id),
        quantity: form.quantity,
    };

    ListService::new(store)
        .add_item(&user, &key, request)
        .await
        .map(outcome_response)
        .map_err(mutation_error)
}

pub async fn set_quantity<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    Path(item_id): Path<Id>,
    Form(form): Form<QuantityForm>,
) -> Result<Response, ApiError> {
    let key = parse_key(&form.idempotency_key)?;
    let request = SetQuantity {
        item_id,
        unit_id: parse_unit_id(&form.unit_id),
        quantity: form.quantity,
    };

    ListService::new(store)
        .set_quantity(&user, &key, request)
        .await
        .map(outcome_response)
        .map_err(mutation_error)
}

pub async fn check_item<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    Path(item_id): Path<Id>,
    Form(form): Form<KeyForm>,
) -> Result<Response, ApiError> {
    let key = parse_key(&form.idempotency_key)?;

    ListService::new(store)
        .check_item(&user, &key, item_id)
        .await
        .map(outcome_response)
        .map_err(mutation_error)
}

pub async fn remove_item<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    Path(item_id): Path<Id>,
    Form(form): Form<KeyForm>,
) -> Result<Response, ApiError> {
    let key = parse_key(&form.idempotency_key)?;

    ListService::new(store)
        .remove_item(&user, &key, item_id)
        .await
        .map(outcome_response)
        .map_err(mutation_error)
}

pub async fn undo_item<S: Store>(
    State(store): State<AppState<S>>,
    user: UserContext,
    Path(item_id): Path<Id>,
    Form(form): Form<UndoForm>,
) -> Result<Response, ApiError> {
    let key = parse_key(&form.idempotency_key)?;
    let request = Undo {
        item_id,
        old_state: form.old_state,
        new_state: form.new_state,
    };

    ListService::new(store)
        .undo(&user, &key, request)
        .await
        .map(outcome_response)
        .map_err(mutation_error)
}

fn parse_key(value: &str) -> Result<IdempotencyKey, ApiError> {
    IdempotencyKey::parse(value)
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(&e.to_string()))))
}

/// Empty or non-numeric selections count as no unit chosen
fn parse_unit_id(value: &str) -> Option<Id> {
    value.trim().parse().ok()
}

fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Done { destination, .. } => Redirect::to(destination.path()).into_response(),
        Outcome::Rejected(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(FieldErrorsResponse { errors }),
        )
            .into_response(),
    }
}

fn mutation_error(e: MutationError) -> ApiError {
    let status = match &e {
        MutationError::NotFound { .. } => StatusCode::NOT_FOUND,
        MutationError::Conflict(_) => StatusCode::CONFLICT,
        // Stale client view: a hard error, not a field error
        MutationError::InvalidTransition { .. } | MutationError::NotOnList { .. } => {
            log::warn!("Rejected stale mutation: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        MutationError::Store(_) => {
            log::error!("Mutation failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ErrorResponse::new(&e.to_string())))
}

fn view_error(e: ViewError) -> ApiError {
    match e {
        ViewError::NotFound { .. } => (StatusCode::NOT_FOUND, Json(ErrorResponse::new(&e.to_string()))),
        ViewError::Store(_) => {
            log::error!("Read failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(&e.to_string())),
            )
        }
    }
}
