use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use serde::Serialize;
use writeoff_core::{Amount, BankConnection, Transaction};
use writeoff_storage::{self as storage, DbPool};

use crate::dedup::{self, DuplicateMatch};
use crate::provider::{ProviderError, ProviderRecord, TransactionProvider};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Connection not found")]
    NotFound,
    #[error("Connection is disconnected")]
    ConnectionInactive,
    #[error("A sync for this connection is already running")]
    AlreadySyncing,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Counts for one reconciliation pass. `added` counts rows inserted or
/// linked by external-id backfill; records skipped as already-synced do not
/// count. `has_more=true` asks the caller to run another pass right away.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SyncOutcome {
    pub added: u32,
    pub modified: u32,
    pub removed: u32,
    pub has_more: bool,
}

/// Per-connection mutual exclusion. The `status=syncing` column is a UI
/// marker only; this gate is what actually keeps the dedup check-then-act
/// from racing itself. One slot per connection id, held for the process
/// lifetime.
#[derive(Default)]
pub struct SyncGate {
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A guard when no pass is in flight for this connection, else `None`.
    /// Contention is reported, not queued; the caller retries after the
    /// running pass finishes.
    pub async fn try_acquire(&self, connection_id: i64) -> Option<OwnedMutexGuard<()>> {
        let slot = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(connection_id).or_default())
        };
        slot.try_lock_owned().ok()
    }
}

/// Runs incremental reconciliation passes against the provider, one gated
/// pass at a time per connection.
pub struct SyncReconciler {
    pool: DbPool,
    provider: Arc<dyn TransactionProvider>,
    gate: SyncGate,
}

impl SyncReconciler {
    pub fn new(pool: DbPool, provider: Arc<dyn TransactionProvider>) -> Self {
        SyncReconciler {
            pool,
            provider,
            gate: SyncGate::new(),
        }
    }

    /// One reconciliation pass for one connection.
    ///
    /// On failure the error is written onto the connection row (status,
    /// code, message) *and* returned — the row is the durable status, the
    /// return value the immediate feedback. The cursor only moves on a
    /// fully applied pass, so a failed pass retries from the same point.
    /// Partial progress before the failure is not rolled back; every delta
    /// application is idempotent, so the retry converges.
    pub async fn sync_connection(
        &self,
        owner_id: &str,
        connection_id: i64,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(_guard) = self.gate.try_acquire(connection_id).await else {
            return Err(SyncError::AlreadySyncing);
        };

        // Read under the gate so the pass starts from the freshest cursor.
        let connection = storage::get_connection(&self.pool, owner_id, connection_id)
            .await?
            .ok_or(SyncError::NotFound)?;

        if !connection.status.can_begin_sync() {
            return Err(SyncError::ConnectionInactive);
        }

        storage::mark_connection_syncing(&self.pool, owner_id, connection_id).await?;

        match self.run_pass(owner_id, connection_id, &connection).await {
            Ok(outcome) => {
                tracing::info!(
                    connection_id,
                    added = outcome.added,
                    modified = outcome.modified,
                    removed = outcome.removed,
                    has_more = outcome.has_more,
                    "sync pass complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                let (code, message) = failure_fields(&err);
                if let Err(persist) =
                    storage::record_sync_failure(&self.pool, owner_id, connection_id, &code, &message)
                        .await
                {
                    tracing::warn!(
                        connection_id,
                        error = %persist,
                        "could not persist sync error state"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run_pass(
        &self,
        owner_id: &str,
        connection_id: i64,
        connection: &BankConnection,
    ) -> Result<SyncOutcome, SyncError> {
        let batch = self
            .provider
            .sync(&connection.access_token, connection.cursor.as_deref())
            .await?;

        let mut outcome = SyncOutcome {
            has_more: batch.has_more,
            ..Default::default()
        };

        // Fixed order: adds, then modifications, then removals. A provider
        // item can span several accounts; only records for this
        // connection's account apply.
        for record in batch
            .added
            .iter()
            .filter(|r| r.external_account_id == connection.account_id)
        {
            if self.apply_added(owner_id, connection_id, record).await? {
                outcome.added += 1;
            }
        }

        for record in batch
            .modified
            .iter()
            .filter(|r| r.external_account_id == connection.account_id)
        {
            let amount = record.amount_cents()?;
            let updated = storage::apply_modified_fields(
                &self.pool,
                owner_id,
                &record.external_transaction_id,
                record.date,
                amount,
                &record.description,
                record.merchant_name.as_deref(),
            )
            .await?;

            if updated {
                outcome.modified += 1;
            } else {
                // Probably filtered off an earlier page; a no-op, not a failure.
                tracing::warn!(
                    external_transaction_id = %record.external_transaction_id,
                    "modified delta for unknown transaction, skipped"
                );
            }
        }

        for removed in &batch.removed {
            if storage::delete_transaction_by_external_id(
                &self.pool,
                owner_id,
                &removed.external_transaction_id,
            )
            .await?
            {
                outcome.removed += 1;
            }
        }

        storage::record_sync_success(&self.pool, owner_id, connection_id, &batch.next_cursor)
            .await?;

        Ok(outcome)
    }

    /// Returns whether the record produced a visible change (insert or
    /// external-id backfill).
    async fn apply_added(
        &self,
        owner_id: &str,
        connection_id: i64,
        record: &ProviderRecord,
    ) -> Result<bool, SyncError> {
        let amount = record.amount_cents()?;
        let matched = dedup::classify(
            &self.pool,
            owner_id,
            connection_id,
            &record.external_transaction_id,
            record.date,
            amount,
            &record.description,
        )
        .await?;

        match matched {
            DuplicateMatch::Primary => Ok(false),
            DuplicateMatch::Secondary { transaction_id } => {
                storage::attach_external_ids(
                    &self.pool,
                    owner_id,
                    transaction_id,
                    &record.external_transaction_id,
                    &record.external_account_id,
                )
                .await?;
                Ok(true)
            }
            DuplicateMatch::NoMatch => {
                self.insert_new(owner_id, connection_id, record, amount).await
            }
        }
    }

    /// Losing the insert race to a concurrent writer trips the unique index
    /// on (owner, external id); that is a primary match discovered late and
    /// becomes a skip, not an error.
    async fn insert_new(
        &self,
        owner_id: &str,
        connection_id: i64,
        record: &ProviderRecord,
        amount: Amount,
    ) -> Result<bool, SyncError> {
        let mut tx = Transaction::new(owner_id, record.date, amount, &record.description);
        tx.merchant = record.merchant_name.clone();
        tx.external_transaction_id = Some(record.external_transaction_id.clone());
        tx.external_account_id = Some(record.external_account_id.clone());
        tx.connection_id = Some(connection_id);

        match storage::insert_transaction(&self.pool, &tx).await {
            Ok(_) => Ok(true),
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// What gets written onto the connection row when a pass fails. Provider
/// codes and messages pass through verbatim.
fn failure_fields(err: &SyncError) -> (String, String) {
    match err {
        SyncError::Provider(ProviderError::Api { code, message }) => (code.clone(), message.clone()),
        SyncError::Provider(p) => (p.code().to_string(), p.to_string()),
        SyncError::Database(e) => ("DATABASE_ERROR".to_string(), e.to_string()),
        other => ("SYNC_ERROR".to_string(), other.to_string()),
    }
}
