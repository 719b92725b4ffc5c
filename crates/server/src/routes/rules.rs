use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use writeoff_core::AutoCategorizeRule;
use writeoff_storage as storage;
use writeoff_sync::{apply_rules, compile_pattern, RuleRunSummary};

use crate::error::ApiError;
use crate::extract::OwnerId;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RulePayload {
    pub name: String,
    pub pattern: String,
    pub category_id: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

/// Both invariants checked before any write: the pattern must compile and
/// the category must resolve for this owner at this moment.
async fn validate(
    state: &AppState,
    owner: &str,
    payload: &RulePayload,
) -> Result<(), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }
    if let Err(e) = compile_pattern(&payload.pattern) {
        return Err(ApiError::Validation(format!("invalid pattern: {e}")));
    }
    if storage::get_category(&state.db, owner, payload.category_id)
        .await?
        .is_none()
    {
        return Err(ApiError::Validation(
            "category does not exist or is not yours".to_string(),
        ));
    }
    Ok(())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
) -> Result<Json<Vec<AutoCategorizeRule>>, ApiError> {
    Ok(Json(storage::list_rules(&state.db, &owner).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Json(input): Json<RulePayload>,
) -> Result<Json<AutoCategorizeRule>, ApiError> {
    validate(&state, &owner, &input).await?;

    let mut rule = AutoCategorizeRule::new(&owner, input.name.trim(), &input.pattern, input.category_id)
        .with_priority(input.priority);
    rule.enabled = input.enabled;

    let id = storage::insert_rule(&state.db, &rule).await?;
    let created = storage::get_rule(&state.db, &owner, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("rule not found".to_string()))?;
    Ok(Json(created))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<i64>,
    Json(input): Json<RulePayload>,
) -> Result<Json<AutoCategorizeRule>, ApiError> {
    storage::get_rule(&state.db, &owner, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("rule not found".to_string()))?;

    validate(&state, &owner, &input).await?;

    let mut rule = AutoCategorizeRule::new(&owner, input.name.trim(), &input.pattern, input.category_id)
        .with_priority(input.priority);
    rule.enabled = input.enabled;

    storage::update_rule(&state.db, &owner, id, &rule).await?;
    let updated = storage::get_rule(&state.db, &owner, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("rule not found".to_string()))?;
    Ok(Json(updated))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if storage::delete_rule(&state.db, &owner, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("rule not found".to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplyRequest {
    pub transaction_ids: Option<Vec<i64>>,
}

/// Run the owner's rules. Without ids: every uncategorized transaction.
/// With ids: exactly those, including re-categorizing ones that already
/// have a category.
pub async fn apply(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Json(input): Json<ApplyRequest>,
) -> Result<Json<RuleRunSummary>, ApiError> {
    let summary = apply_rules(&state.db, &owner, input.transaction_ids.as_deref()).await?;
    Ok(Json(summary))
}
