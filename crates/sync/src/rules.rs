use regex::{Regex, RegexBuilder};
use serde::Serialize;

use writeoff_core::AutoCategorizeRule;
use writeoff_storage::{self as storage, DbPool};

/// Compile a stored rule pattern. Matching is a case-insensitive *search*
/// (not a full match). The size limit bounds hostile patterns at validation
/// time; the regex engine itself matches in linear time.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(1 << 20)
        .build()
}

/// A rule paired with its compiled pattern. Patterns are validated when the
/// rule is stored, so a compile failure here means the stored data went bad;
/// such a rule never matches and the rest keep working.
struct CompiledRule {
    rule: AutoCategorizeRule,
    regex: Option<Regex>,
}

pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<AutoCategorizeRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .filter(|r| r.enabled)
            .map(|rule| {
                let regex = compile_pattern(&rule.pattern).ok();
                CompiledRule { rule, regex }
            })
            .collect();
        // Highest priority first; the sort is stable, so equal priorities
        // keep their incoming (creation) order.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Self { rules: compiled }
    }

    /// The first rule, in priority order, whose pattern matches anywhere in
    /// `text`. `None` when nothing matches — not an error.
    pub fn first_match(&self, text: &str) -> Option<&AutoCategorizeRule> {
        self.rules
            .iter()
            .find(|cr| cr.regex.as_ref().is_some_and(|re| re.is_match(text)))
            .map(|cr| &cr.rule)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleMatchDetail {
    pub transaction_id: i64,
    pub category_id: i64,
    pub rule_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleRunSummary {
    pub categorized_count: u32,
    pub total_processed: u32,
    pub details: Vec<RuleMatchDetail>,
}

/// Run the owner's enabled rules over a set of transactions and persist the
/// winning category per transaction.
///
/// With no explicit id list, targets are the owner's transactions that have
/// no category yet. An explicit list is taken as-is and may re-categorize
/// rows that already have one — deliberate asymmetry, kept from the original
/// product behavior.
///
/// A write failure on one transaction is logged and counted against the
/// summary; it never aborts the rest of the batch.
pub async fn apply_rules(
    pool: &DbPool,
    owner_id: &str,
    transaction_ids: Option<&[i64]>,
) -> Result<RuleRunSummary, sqlx::Error> {
    let engine = RuleEngine::new(storage::enabled_rules(pool, owner_id).await?);

    let target_ids: Vec<i64> = match transaction_ids {
        Some(ids) => ids.to_vec(),
        None => storage::uncategorized_transaction_ids(pool, owner_id).await?,
    };

    let mut summary = RuleRunSummary::default();

    for id in target_ids {
        let Some(tx) = storage::get_transaction(pool, owner_id, id).await? else {
            // Unknown or foreign id in an explicit list: skip silently.
            continue;
        };
        summary.total_processed += 1;

        if engine.is_empty() {
            continue;
        }

        let Some(rule) = engine.first_match(&tx.search_text()) else {
            continue;
        };

        match storage::set_transaction_category(pool, owner_id, id, rule.category_id).await {
            Ok(true) => {
                summary.categorized_count += 1;
                summary.details.push(RuleMatchDetail {
                    transaction_id: id,
                    category_id: rule.category_id,
                    rule_name: rule.name.clone(),
                });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(transaction_id = id, error = %e, "rule write failed; continuing");
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use writeoff_core::{Amount, Transaction, TransactionStatus};

    fn rule(name: &str, pattern: &str, category_id: i64, priority: i32) -> AutoCategorizeRule {
        AutoCategorizeRule::new("u1", name, pattern, category_id).with_priority(priority)
    }

    // ── Engine ────────────────────────────────────────────────────────────────

    #[test]
    fn higher_priority_wins_when_both_match() {
        let engine = RuleEngine::new(vec![
            rule("shopping", "amazon", 1, 10),
            rule("office", "amazon|staples", 2, 5),
        ]);
        let hit = engine.first_match("Amazon purchase").unwrap();
        assert_eq!(hit.name, "shopping");
    }

    #[test]
    fn match_is_case_insensitive() {
        let engine = RuleEngine::new(vec![rule("coffee", "starbucks", 1, 0)]);
        assert!(engine.first_match("STARBUCKS #4521").is_some());
    }

    #[test]
    fn match_is_a_search_not_a_full_match() {
        let engine = RuleEngine::new(vec![rule("coffee", "starbucks", 1, 0)]);
        assert!(engine.first_match("POS DEBIT STARBUCKS STORE 4521").is_some());
    }

    #[test]
    fn invalid_pattern_is_isolated() {
        let engine = RuleEngine::new(vec![
            rule("broken", "([unclosed", 1, 99),
            rule("works", "staples", 2, 1),
        ]);
        // The corrupted rule never matches and never panics; lower-priority
        // valid rules still apply.
        let hit = engine.first_match("STAPLES STORE").unwrap();
        assert_eq!(hit.name, "works");
        assert!(engine.first_match("([unclosed").is_none());
    }

    #[test]
    fn priority_ties_keep_creation_order() {
        let engine = RuleEngine::new(vec![
            rule("first", "acme", 1, 5),
            rule("second", "acme", 2, 5),
        ]);
        assert_eq!(engine.first_match("ACME CORP").unwrap().name, "first");
    }

    #[test]
    fn disabled_rules_never_match() {
        let mut off = rule("off", "acme", 1, 99);
        off.enabled = false;
        let engine = RuleEngine::new(vec![off, rule("on", "acme", 2, 1)]);
        assert_eq!(engine.first_match("ACME CORP").unwrap().name, "on");
    }

    #[test]
    fn no_match_is_none() {
        let engine = RuleEngine::new(vec![rule("coffee", "starbucks", 1, 0)]);
        assert!(engine.first_match("WHOLE FOODS").is_none());
    }

    #[test]
    fn compile_pattern_rejects_oversized() {
        assert!(compile_pattern("(?:a{1000}){1000}").is_err());
        assert!(compile_pattern("starbucks").is_ok());
    }

    // ── Database-backed runs ──────────────────────────────────────────────────

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = storage::create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn insert_tx(pool: &DbPool, owner: &str, desc: &str) -> i64 {
        let tx = Transaction::new(owner, date(2024, 1, 15), Amount::from_cents(500), desc);
        storage::insert_transaction(pool, &tx).await.unwrap()
    }

    #[tokio::test]
    async fn automatic_run_targets_only_uncategorized() {
        let (_dir, pool) = test_db().await;
        let cat = storage::insert_category(&pool, "u1", "Coffee").await.unwrap();
        let other = storage::insert_category(&pool, "u1", "Other").await.unwrap();
        storage::insert_rule(&pool, &rule("coffee", "starbucks", cat, 1))
            .await
            .unwrap();

        let fresh = insert_tx(&pool, "u1", "STARBUCKS #1").await;
        let done = insert_tx(&pool, "u1", "STARBUCKS #2").await;
        storage::set_transaction_category(&pool, "u1", done, other)
            .await
            .unwrap();

        let summary = apply_rules(&pool, "u1", None).await.unwrap();
        assert_eq!(summary.total_processed, 1);
        assert_eq!(summary.categorized_count, 1);
        assert_eq!(summary.details[0].transaction_id, fresh);
        assert_eq!(summary.details[0].rule_name, "coffee");

        // The already-categorized row kept its category.
        let kept = storage::get_transaction(&pool, "u1", done).await.unwrap().unwrap();
        assert_eq!(kept.category_id, Some(other));
    }

    #[tokio::test]
    async fn explicit_run_overwrites_existing_category() {
        let (_dir, pool) = test_db().await;
        let cat = storage::insert_category(&pool, "u1", "Coffee").await.unwrap();
        let other = storage::insert_category(&pool, "u1", "Other").await.unwrap();
        storage::insert_rule(&pool, &rule("coffee", "starbucks", cat, 1))
            .await
            .unwrap();

        let id = insert_tx(&pool, "u1", "STARBUCKS #1").await;
        storage::set_transaction_category(&pool, "u1", id, other)
            .await
            .unwrap();

        let summary = apply_rules(&pool, "u1", Some(&[id])).await.unwrap();
        assert_eq!(summary.categorized_count, 1);

        let tx = storage::get_transaction(&pool, "u1", id).await.unwrap().unwrap();
        assert_eq!(tx.category_id, Some(cat));
        assert_eq!(tx.status, TransactionStatus::Categorized);
    }

    #[tokio::test]
    async fn unmatched_transactions_are_left_alone() {
        let (_dir, pool) = test_db().await;
        let cat = storage::insert_category(&pool, "u1", "Coffee").await.unwrap();
        storage::insert_rule(&pool, &rule("coffee", "starbucks", cat, 1))
            .await
            .unwrap();

        let id = insert_tx(&pool, "u1", "WHOLE FOODS").await;
        let summary = apply_rules(&pool, "u1", None).await.unwrap();

        assert_eq!(summary.total_processed, 1);
        assert_eq!(summary.categorized_count, 0);
        let tx = storage::get_transaction(&pool, "u1", id).await.unwrap().unwrap();
        assert!(tx.category_id.is_none());
        assert_eq!(tx.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn merchant_participates_in_matching() {
        let (_dir, pool) = test_db().await;
        let cat = storage::insert_category(&pool, "u1", "Coffee").await.unwrap();
        storage::insert_rule(&pool, &rule("coffee", "starbucks", cat, 1))
            .await
            .unwrap();

        let mut tx = Transaction::new("u1", date(2024, 1, 15), Amount::from_cents(500), "POS DEBIT 4521");
        tx.merchant = Some("Starbucks".to_string());
        let id = storage::insert_transaction(&pool, &tx).await.unwrap();

        let summary = apply_rules(&pool, "u1", None).await.unwrap();
        assert_eq!(summary.categorized_count, 1);
        assert_eq!(summary.details[0].transaction_id, id);
    }

    #[tokio::test]
    async fn explicit_run_never_touches_foreign_rows() {
        let (_dir, pool) = test_db().await;
        let cat = storage::insert_category(&pool, "u1", "Coffee").await.unwrap();
        storage::insert_rule(&pool, &rule("coffee", "starbucks", cat, 1))
            .await
            .unwrap();

        let theirs = insert_tx(&pool, "u2", "STARBUCKS #1").await;
        let summary = apply_rules(&pool, "u1", Some(&[theirs])).await.unwrap();

        assert_eq!(summary.total_processed, 0);
        assert_eq!(summary.categorized_count, 0);
        let tx = storage::get_transaction(&pool, "u2", theirs).await.unwrap().unwrap();
        assert!(tx.category_id.is_none());
    }
}
