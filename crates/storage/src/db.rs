use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;

use writeoff_core::{
    Amount, AutoCategorizeRule, BankConnection, Category, ConnectionStatus, Transaction,
    TransactionStatus, DEFAULT_CATEGORIES,
};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT,
            name TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            schedule_c_line TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Default categories have a NULL owner; COALESCE keeps their names
    // unique alongside per-owner names.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_owner_name
            ON categories(COALESCE(owner_id, ''), name)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_connections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            account_id TEXT NOT NULL,
            access_token TEXT NOT NULL,
            institution_id TEXT,
            institution_name TEXT,
            account_name TEXT NOT NULL DEFAULT '',
            account_type TEXT,
            account_subtype TEXT,
            account_mask TEXT,
            status TEXT NOT NULL DEFAULT 'connected',
            cursor TEXT,
            last_sync_date TEXT,
            error_code TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(owner_id, account_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            date TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            description TEXT NOT NULL,
            merchant TEXT,
            category_id INTEGER REFERENCES categories(id),
            tags TEXT NOT NULL DEFAULT '[]',
            notes TEXT,
            is_deductible INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            external_transaction_id TEXT,
            external_account_id TEXT,
            connection_id INTEGER REFERENCES bank_connections(id),
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Backstop for the sync dedup check-then-act: at most one synced row
    // per (owner, external transaction) regardless of interleaving.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_owner_external
            ON transactions(owner_id, external_transaction_id)
            WHERE external_transaction_id IS NOT NULL
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auto_categorize_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            pattern TEXT NOT NULL,
            category_id INTEGER NOT NULL REFERENCES categories(id),
            enabled INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed_default_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (name, schedule_c_line) in DEFAULT_CATEGORIES {
        sqlx::query(
            "INSERT OR IGNORE INTO categories (owner_id, name, is_default, schedule_c_line) VALUES (NULL, ?, 1, ?)",
        )
        .bind(name)
        .bind(schedule_c_line)
        .execute(pool)
        .await?;
    }

    Ok(())
}

// ── Bank connections ──────────────────────────────────────────────────────────

type ConnectionRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
);

const CONNECTION_COLUMNS: &str = "id, owner_id, item_id, account_id, access_token, \
     institution_id, institution_name, account_name, account_type, account_subtype, \
     account_mask, status, cursor, last_sync_date, error_code, error_message";

fn connection_from_row(r: ConnectionRow) -> BankConnection {
    BankConnection {
        id: Some(r.0),
        owner_id: r.1,
        item_id: r.2,
        account_id: r.3,
        access_token: r.4,
        institution_id: r.5,
        institution_name: r.6,
        account_name: r.7,
        account_type: r.8,
        account_subtype: r.9,
        account_mask: r.10,
        status: r.11.parse().unwrap_or(ConnectionStatus::Error),
        cursor: r.12,
        last_sync_date: r.13,
        error_code: r.14,
        error_message: r.15,
    }
}

pub async fn insert_connection(pool: &DbPool, conn: &BankConnection) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bank_connections
            (owner_id, item_id, account_id, access_token, institution_id, institution_name,
             account_name, account_type, account_subtype, account_mask, status, cursor)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&conn.owner_id)
    .bind(&conn.item_id)
    .bind(&conn.account_id)
    .bind(&conn.access_token)
    .bind(&conn.institution_id)
    .bind(&conn.institution_name)
    .bind(&conn.account_name)
    .bind(&conn.account_type)
    .bind(&conn.account_subtype)
    .bind(&conn.account_mask)
    .bind(conn.status.as_str())
    .bind(&conn.cursor)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn get_connection(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<Option<BankConnection>, sqlx::Error> {
    let row = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {CONNECTION_COLUMNS} FROM bank_connections WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(connection_from_row))
}

pub async fn list_connections(
    pool: &DbPool,
    owner_id: &str,
) -> Result<Vec<BankConnection>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
        "SELECT {CONNECTION_COLUMNS} FROM bank_connections WHERE owner_id = ? ORDER BY id"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(connection_from_row).collect())
}

/// Persist the advisory `syncing` marker so concurrent readers see the pass.
pub async fn mark_connection_syncing(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE bank_connections SET status = 'syncing' WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Advance the cursor and clear any prior error. Only called after a pass
/// fully applied its deltas; a failed pass leaves the cursor untouched.
pub async fn record_sync_success(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
    next_cursor: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE bank_connections
        SET status = 'connected', cursor = ?, last_sync_date = ?,
            error_code = NULL, error_message = NULL
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(next_cursor)
    .bind(Utc::now())
    .bind(id)
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_sync_failure(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
    error_code: &str,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE bank_connections
        SET status = 'error', error_code = ?, error_message = ?
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(error_code)
    .bind(error_message)
    .bind(id)
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Soft-terminate: the row is kept for transaction history.
pub async fn disconnect_connection(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE bank_connections SET status = 'disconnected' WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

// ── Transactions ──────────────────────────────────────────────────────────────

type TransactionRow = (
    i64,
    String,
    NaiveDate,
    i64,
    String,
    Option<String>,
    Option<i64>,
    String,
    Option<String>,
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<i64>,
);

const TRANSACTION_COLUMNS: &str = "id, owner_id, date, amount_cents, description, merchant, \
     category_id, tags, notes, is_deductible, status, external_transaction_id, \
     external_account_id, connection_id";

fn transaction_from_row(r: TransactionRow) -> Transaction {
    Transaction {
        id: Some(r.0),
        owner_id: r.1,
        date: r.2,
        amount: Amount::from_cents(r.3),
        description: r.4,
        merchant: r.5,
        category_id: r.6,
        tags: serde_json::from_str(&r.7).unwrap_or_default(),
        notes: r.8,
        is_deductible: r.9 != 0,
        status: r.10.parse().unwrap_or(TransactionStatus::Pending),
        external_transaction_id: r.11,
        external_account_id: r.12,
        connection_id: r.13,
    }
}

pub async fn insert_transaction(pool: &DbPool, tx: &Transaction) -> Result<i64, sqlx::Error> {
    let tags = serde_json::to_string(&tx.tags).unwrap_or_else(|_| "[]".to_string());

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO transactions
            (owner_id, date, amount_cents, description, merchant, category_id, tags, notes,
             is_deductible, status, external_transaction_id, external_account_id, connection_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&tx.owner_id)
    .bind(tx.date)
    .bind(tx.amount.to_cents())
    .bind(&tx.description)
    .bind(&tx.merchant)
    .bind(tx.category_id)
    .bind(tags)
    .bind(&tx.notes)
    .bind(tx.is_deductible)
    .bind(tx.status.as_str())
    .bind(&tx.external_transaction_id)
    .bind(&tx.external_account_id)
    .bind(tx.connection_id)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

pub async fn get_transaction(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(transaction_from_row))
}

pub async fn list_transactions(
    pool: &DbPool,
    owner_id: &str,
    only_uncategorized: bool,
) -> Result<Vec<Transaction>, sqlx::Error> {
    let filter = if only_uncategorized {
        " AND category_id IS NULL"
    } else {
        ""
    };
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE owner_id = ?{filter} \
         ORDER BY date DESC, id DESC"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(transaction_from_row).collect())
}

/// Primary dedup lookup: a row already carrying this external id.
pub async fn find_transaction_by_external_id(
    pool: &DbPool,
    owner_id: &str,
    external_transaction_id: &str,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions \
         WHERE owner_id = ? AND external_transaction_id = ?"
    ))
    .bind(owner_id)
    .bind(external_transaction_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(transaction_from_row))
}

/// Secondary dedup lookup: same business fields on the same connection but
/// no external id yet (manual entry or file import of the same event).
pub async fn find_unlinked_transaction_match(
    pool: &DbPool,
    owner_id: &str,
    connection_id: i64,
    date: NaiveDate,
    amount: Amount,
    description: &str,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions \
         WHERE owner_id = ? AND connection_id = ? AND date = ? AND amount_cents = ? \
           AND description = ? AND external_transaction_id IS NULL \
         LIMIT 1"
    ))
    .bind(owner_id)
    .bind(connection_id)
    .bind(date)
    .bind(amount.to_cents())
    .bind(description)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(transaction_from_row))
}

/// Backfill provider identifiers onto a row created through another path.
pub async fn attach_external_ids(
    pool: &DbPool,
    owner_id: &str,
    transaction_id: i64,
    external_transaction_id: &str,
    external_account_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE transactions SET external_transaction_id = ?, external_account_id = ? \
         WHERE id = ? AND owner_id = ?",
    )
    .bind(external_transaction_id)
    .bind(external_account_id)
    .bind(transaction_id)
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite the provider-owned fields on a `modified` delta. Returns false
/// when no row carries the external id (soft anomaly, caller logs it).
pub async fn apply_modified_fields(
    pool: &DbPool,
    owner_id: &str,
    external_transaction_id: &str,
    date: NaiveDate,
    amount: Amount,
    description: &str,
    merchant: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE transactions SET date = ?, amount_cents = ?, description = ?, merchant = ? \
         WHERE owner_id = ? AND external_transaction_id = ?",
    )
    .bind(date)
    .bind(amount.to_cents())
    .bind(description)
    .bind(merchant)
    .bind(owner_id)
    .bind(external_transaction_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_transaction(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM transactions WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Hard delete on a `removed` delta. Absence is not an error.
pub async fn delete_transaction_by_external_id(
    pool: &DbPool,
    owner_id: &str,
    external_transaction_id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM transactions WHERE owner_id = ? AND external_transaction_id = ?")
            .bind(owner_id)
            .bind(external_transaction_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_transaction_category(
    pool: &DbPool,
    owner_id: &str,
    transaction_id: i64,
    category_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE transactions SET category_id = ?, status = 'categorized' \
         WHERE id = ? AND owner_id = ?",
    )
    .bind(category_id)
    .bind(transaction_id)
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn uncategorized_transaction_ids(
    pool: &DbPool,
    owner_id: &str,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM transactions WHERE owner_id = ? AND category_id IS NULL ORDER BY id",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

// ── Categories ────────────────────────────────────────────────────────────────

type CategoryRow = (i64, Option<String>, String, i64, Option<String>);

fn category_from_row(r: CategoryRow) -> Category {
    Category {
        id: Some(r.0),
        owner_id: r.1,
        name: r.2,
        is_default: r.3 != 0,
        schedule_c_line: r.4,
    }
}

/// Defaults plus the owner's custom categories.
pub async fn list_categories(pool: &DbPool, owner_id: &str) -> Result<Vec<Category>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, owner_id, name, is_default, schedule_c_line FROM categories \
         WHERE is_default = 1 OR owner_id = ? ORDER BY name",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(category_from_row).collect())
}

/// Resolve a category reference the way rule validation does: a default
/// or one owned by this user. Someone else's category reads as absent.
pub async fn get_category(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<Option<Category>, sqlx::Error> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, owner_id, name, is_default, schedule_c_line FROM categories \
         WHERE id = ? AND (is_default = 1 OR owner_id = ?)",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(category_from_row))
}

pub async fn insert_category(
    pool: &DbPool,
    owner_id: &str,
    name: &str,
) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO categories (owner_id, name, is_default) VALUES (?, ?, 0) RETURNING id",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Deletes a custom category. Defaults never match the filter; a category
/// still referenced by a transaction or rule fails the FK constraint.
pub async fn delete_category(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM categories WHERE id = ? AND owner_id = ? AND is_default = 0")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

// ── Auto-categorize rules ─────────────────────────────────────────────────────

type RuleRow = (i64, String, String, String, i64, i64, i64);

fn rule_from_row(r: RuleRow) -> AutoCategorizeRule {
    AutoCategorizeRule {
        id: Some(r.0),
        owner_id: r.1,
        name: r.2,
        pattern: r.3,
        category_id: r.4,
        enabled: r.5 != 0,
        priority: r.6 as i32,
    }
}

const RULE_COLUMNS: &str = "id, owner_id, name, pattern, category_id, enabled, priority";

pub async fn insert_rule(pool: &DbPool, rule: &AutoCategorizeRule) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO auto_categorize_rules (owner_id, name, pattern, category_id, enabled, priority) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&rule.owner_id)
    .bind(&rule.name)
    .bind(&rule.pattern)
    .bind(rule.category_id)
    .bind(rule.enabled)
    .bind(rule.priority)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

pub async fn update_rule(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
    rule: &AutoCategorizeRule,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE auto_categorize_rules SET name = ?, pattern = ?, category_id = ?, enabled = ?, \
         priority = ? WHERE id = ? AND owner_id = ?",
    )
    .bind(&rule.name)
    .bind(&rule.pattern)
    .bind(rule.category_id)
    .bind(rule.enabled)
    .bind(rule.priority)
    .bind(id)
    .bind(owner_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_rule(pool: &DbPool, owner_id: &str, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM auto_categorize_rules WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_rule(
    pool: &DbPool,
    owner_id: &str,
    id: i64,
) -> Result<Option<AutoCategorizeRule>, sqlx::Error> {
    let row = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM auto_categorize_rules WHERE id = ? AND owner_id = ?"
    ))
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(rule_from_row))
}

pub async fn list_rules(
    pool: &DbPool,
    owner_id: &str,
) -> Result<Vec<AutoCategorizeRule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM auto_categorize_rules WHERE owner_id = ? \
         ORDER BY priority DESC, id"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(rule_from_row).collect())
}

/// Rules the engine evaluates: enabled only, priority descending, creation
/// order breaking ties.
pub async fn enabled_rules(
    pool: &DbPool,
    owner_id: &str,
) -> Result<Vec<AutoCategorizeRule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RuleRow>(&format!(
        "SELECT {RULE_COLUMNS} FROM auto_categorize_rules WHERE owner_id = ? AND enabled = 1 \
         ORDER BY priority DESC, id"
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(rule_from_row).collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
