use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use thiserror::Error;

use writeoff_core::Amount;

/// One transaction in a delta batch, as the provider reports it. Amounts are
/// decimal at this boundary; they become integer cents before touching the
/// database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    #[serde(rename = "transaction_id")]
    pub external_transaction_id: String,
    #[serde(rename = "account_id")]
    pub external_account_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(rename = "name")]
    pub description: String,
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub payment_channel: String,
}

impl ProviderRecord {
    /// Sign is preserved exactly as received; only the representation changes.
    pub fn amount_cents(&self) -> Result<Amount, ProviderError> {
        Amount::from_decimal(self.amount).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedRecord {
    #[serde(rename = "transaction_id")]
    pub external_transaction_id: String,
}

/// One page of an incremental sync: three disjoint delta lists plus the
/// cursor to resume from and whether more pages are waiting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaBatch {
    #[serde(default)]
    pub added: Vec<ProviderRecord>,
    #[serde(default)]
    pub modified: Vec<ProviderRecord>,
    #[serde(default)]
    pub removed: Vec<RemovedRecord>,
    pub next_cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The provider answered with an error payload; code and message are
    /// kept verbatim for diagnostics.
    #[error("Provider error {code}: {message}")]
    Api { code: String, message: String },
    #[error("Provider returned a malformed payload: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn code(&self) -> &str {
        match self {
            ProviderError::Transport(_) => "PROVIDER_UNREACHABLE",
            ProviderError::Api { code, .. } => code,
            ProviderError::Malformed(_) => "PROVIDER_MALFORMED_RESPONSE",
        }
    }
}

/// The incremental-sync boundary. `cursor=None` requests history from
/// scratch; any other value resumes where the previous batch left off.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn sync(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<DeltaBatch, ProviderError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SyncRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_code: String,
    error_message: String,
}

/// JSON-over-HTTPS client for the transaction provider's sync endpoint.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
}

impl HttpProvider {
    pub fn new(base_url: &str, client_id: &str, secret: &str) -> Self {
        HttpProvider {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            secret: secret.to_string(),
        }
    }
}

#[async_trait]
impl TransactionProvider for HttpProvider {
    async fn sync(
        &self,
        access_token: &str,
        cursor: Option<&str>,
    ) -> Result<DeltaBatch, ProviderError> {
        let response = self
            .client
            .post(format!("{}/transactions/sync", self.base_url))
            .json(&SyncRequest {
                client_id: &self.client_id,
                secret: &self.secret,
                access_token,
                cursor,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => Err(ProviderError::Api {
                    code: err.error_code,
                    message: err.error_message,
                }),
                Err(_) => Err(ProviderError::Malformed(format!(
                    "HTTP {status} with undecodable error body"
                ))),
            };
        }

        let batch: DeltaBatch = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        // Reject bad amounts here so nothing past this boundary has to.
        for record in batch.added.iter().chain(batch.modified.iter()) {
            record.amount_cents()?;
        }

        Ok(batch)
    }
}

// ── Scripted provider ─────────────────────────────────────────────────────────

enum ScriptedResponse {
    Batch(DeltaBatch),
    Error { code: String, message: String },
}

/// Replays queued responses in order and records the cursor each call
/// arrived with. Backs the reconciler tests.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    cursors_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        ScriptedProvider {
            responses: Mutex::new(VecDeque::new()),
            cursors_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn push_batch(&self, batch: DeltaBatch) {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::Batch(batch));
    }

    pub fn push_error(&self, code: &str, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::Error {
                code: code.to_string(),
                message: message.to_string(),
            });
    }

    /// The cursor argument of each `sync` call, in call order.
    pub fn cursors_seen(&self) -> Vec<Option<String>> {
        self.cursors_seen.lock().unwrap().clone()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionProvider for ScriptedProvider {
    async fn sync(
        &self,
        _access_token: &str,
        cursor: Option<&str>,
    ) -> Result<DeltaBatch, ProviderError> {
        self.cursors_seen
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));

        match self.responses.lock().unwrap().pop_front() {
            Some(ScriptedResponse::Batch(batch)) => Ok(batch),
            Some(ScriptedResponse::Error { code, message }) => {
                Err(ProviderError::Api { code, message })
            }
            None => Err(ProviderError::Malformed(
                "scripted provider exhausted".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(id: &str, amount: &str) -> ProviderRecord {
        ProviderRecord {
            external_transaction_id: id.to_string(),
            external_account_id: "acct-1".to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: "Staples".to_string(),
            merchant_name: None,
            pending: false,
            payment_channel: "in store".to_string(),
        }
    }

    #[test]
    fn record_deserializes_provider_field_names() {
        let json = r#"{
            "transaction_id": "tx_1",
            "account_id": "acct-1",
            "amount": 42.5,
            "date": "2024-03-01",
            "name": "Staples",
            "merchant_name": null,
            "pending": false,
            "payment_channel": "in store"
        }"#;
        let r: ProviderRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.external_transaction_id, "tx_1");
        assert_eq!(r.description, "Staples");
        assert_eq!(r.amount_cents().unwrap(), Amount::from_cents(4250));
    }

    #[test]
    fn batch_defaults_empty_lists() {
        let json = r#"{"next_cursor": "c1"}"#;
        let b: DeltaBatch = serde_json::from_str(json).unwrap();
        assert!(b.added.is_empty() && b.modified.is_empty() && b.removed.is_empty());
        assert!(!b.has_more);
    }

    #[test]
    fn amount_sign_is_preserved() {
        let r = record("tx_1", "-12.34");
        assert_eq!(r.amount_cents().unwrap(), Amount::from_cents(-1234));
    }

    #[tokio::test]
    async fn scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new();
        provider.push_batch(DeltaBatch {
            added: vec![record("tx_1", "10.00")],
            next_cursor: "c1".to_string(),
            ..Default::default()
        });
        provider.push_error("ITEM_LOGIN_REQUIRED", "relink");

        let first = provider.sync("tok", None).await.unwrap();
        assert_eq!(first.next_cursor, "c1");

        let second = provider.sync("tok", Some("c1")).await;
        assert!(matches!(second, Err(ProviderError::Api { ref code, .. }) if code == "ITEM_LOGIN_REQUIRED"));

        assert_eq!(
            provider.cursors_seen(),
            vec![None, Some("c1".to_string())]
        );
    }
}
