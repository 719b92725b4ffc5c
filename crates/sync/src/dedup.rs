use chrono::NaiveDate;

use writeoff_core::Amount;
use writeoff_storage::{self as storage, DbPool};

/// How an incoming external record relates to what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMatch {
    /// A row already carries this external id — synced before, skip.
    Primary,
    /// A row matches on connection + date + amount + description but has no
    /// external id: the same event entered through another path. Backfill
    /// the id instead of inserting.
    Secondary { transaction_id: i64 },
    /// Genuinely new.
    NoMatch,
}

/// Classify one incoming record against the owner's stored transactions.
/// Both lookups are owner-scoped; identical data under another owner is
/// invisible here. The check-then-act around this call is made safe by the
/// per-connection sync gate, with the unique index on
/// (owner, external_transaction_id) as the backstop.
pub async fn classify(
    pool: &DbPool,
    owner_id: &str,
    connection_id: i64,
    external_transaction_id: &str,
    date: NaiveDate,
    amount: Amount,
    description: &str,
) -> Result<DuplicateMatch, sqlx::Error> {
    if storage::find_transaction_by_external_id(pool, owner_id, external_transaction_id)
        .await?
        .is_some()
    {
        return Ok(DuplicateMatch::Primary);
    }

    if let Some(existing) = storage::find_unlinked_transaction_match(
        pool,
        owner_id,
        connection_id,
        date,
        amount,
        description,
    )
    .await?
    {
        if let Some(transaction_id) = existing.id {
            return Ok(DuplicateMatch::Secondary { transaction_id });
        }
    }

    Ok(DuplicateMatch::NoMatch)
}
