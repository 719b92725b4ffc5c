use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use writeoff_core::Category;
use writeoff_storage as storage;
use writeoff_sync::suggest_category;

use crate::error::ApiError;
use crate::extract::OwnerId;
use crate::AppState;

pub async fn list(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(storage::list_categories(&state.db, &owner).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Json(input): Json<CreateRequest>,
) -> Result<Json<Category>, ApiError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name is required".to_string()));
    }

    let id = match storage::insert_category(&state.db, &owner, name).await {
        Ok(id) => id,
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
            return Err(ApiError::Conflict(format!(
                "a category named '{name}' already exists"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let created = storage::get_category(&state.db, &owner, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("category not found".to_string()))?;
    Ok(Json(created))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let category = storage::get_category(&state.db, &owner, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("category not found".to_string()))?;

    if category.is_default {
        return Err(ApiError::Validation(
            "default categories cannot be deleted".to_string(),
        ));
    }

    match storage::delete_category(&state.db, &owner, id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::NotFound("category not found".to_string())),
        Err(e) if e.as_database_error().is_some_and(|d| d.is_foreign_key_violation()) => {
            Err(ApiError::Conflict(
                "category is referenced by transactions or rules".to_string(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    pub text: String,
}

/// Match free text (e.g. a category name read off a receipt) against the
/// owner's categories. A null body means no suggestion fit.
pub async fn suggest(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Json(input): Json<SuggestRequest>,
) -> Result<Json<Option<Category>>, ApiError> {
    let categories = storage::list_categories(&state.db, &owner).await?;
    Ok(Json(suggest_category(&input.text, &categories).cloned()))
}
