use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use writeoff_core::{Amount, Transaction, TransactionStatus};
use writeoff_storage as storage;

use crate::error::ApiError;
use crate::extract::OwnerId;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub uncategorized: bool,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let rows = storage::list_transactions(&state.db, &owner, params.uncategorized).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub merchant: Option<String>,
    pub category_id: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_deductible: bool,
}

/// Manual entry. If a later bank sync delivers the same event, the
/// reconciler links its external id onto this row instead of duplicating it.
pub async fn create(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Json(input): Json<CreateRequest>,
) -> Result<Json<Transaction>, ApiError> {
    let description = input.description.trim();
    if description.is_empty() {
        return Err(ApiError::Validation("description is required".to_string()));
    }
    let amount = Amount::from_decimal(input.amount)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if let Some(category_id) = input.category_id {
        if storage::get_category(&state.db, &owner, category_id)
            .await?
            .is_none()
        {
            return Err(ApiError::Validation(
                "category does not exist or is not yours".to_string(),
            ));
        }
    }

    let mut tx = Transaction::new(&owner, input.date, amount, description);
    tx.merchant = input.merchant;
    tx.category_id = input.category_id;
    tx.tags = input.tags;
    tx.notes = input.notes;
    tx.is_deductible = input.is_deductible;
    if tx.category_id.is_some() {
        tx.status = TransactionStatus::Categorized;
    }

    let id = storage::insert_transaction(&state.db, &tx).await?;
    let created = storage::get_transaction(&state.db, &owner, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("transaction not found".to_string()))?;
    Ok(Json(created))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if storage::delete_transaction(&state.db, &owner, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("transaction not found".to_string()))
    }
}
