use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use writeoff_core::BankConnection;
use writeoff_storage as storage;

use crate::error::ApiError;
use crate::extract::OwnerId;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub item_id: String,
    pub account_id: String,
    pub access_token: String,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    #[serde(default)]
    pub account_name: String,
    pub account_type: Option<String>,
    pub account_subtype: Option<String>,
    pub account_mask: Option<String>,
}

pub async fn link(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Json(input): Json<LinkRequest>,
) -> Result<Json<BankConnection>, ApiError> {
    if input.item_id.trim().is_empty()
        || input.account_id.trim().is_empty()
        || input.access_token.trim().is_empty()
    {
        return Err(ApiError::Validation(
            "item_id, account_id and access_token are required".to_string(),
        ));
    }

    let mut conn =
        BankConnection::new(&owner, &input.item_id, &input.account_id, &input.access_token);
    conn.institution_id = input.institution_id;
    conn.institution_name = input.institution_name;
    conn.account_name = input.account_name;
    conn.account_type = input.account_type;
    conn.account_subtype = input.account_subtype;
    conn.account_mask = input.account_mask;

    let id = match storage::insert_connection(&state.db, &conn).await {
        Ok(id) => id,
        Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
            return Err(ApiError::Conflict(
                "this account is already linked".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let created = storage::get_connection(&state.db, &owner, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("connection not found".to_string()))?;
    Ok(Json(created))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
) -> Result<Json<Vec<BankConnection>>, ApiError> {
    Ok(Json(storage::list_connections(&state.db, &owner).await?))
}

/// Soft disconnect: the row stays so its transactions keep their reference.
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if storage::disconnect_connection(&state.db, &owner, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("connection not found".to_string()))
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SyncSummary {
    pub added: u32,
    pub modified: u32,
    pub removed: u32,
}

/// Drives reconciliation passes until the provider reports no more pages.
/// The loop lives here, caller-side, so each pass stays short.
pub async fn sync(
    State(state): State<Arc<AppState>>,
    OwnerId(owner): OwnerId,
    Path(id): Path<i64>,
) -> Result<Json<SyncSummary>, ApiError> {
    let span = tracing::info_span!("connection_sync", run_id = %Uuid::new_v4(), connection_id = id);
    async move {
        let mut totals = SyncSummary::default();
        loop {
            let outcome = state.reconciler.sync_connection(&owner, id).await?;
            totals.added += outcome.added;
            totals.modified += outcome.modified;
            totals.removed += outcome.removed;
            if !outcome.has_more {
                break;
            }
        }
        Ok(Json(totals))
    }
    .instrument(span)
    .await
}
