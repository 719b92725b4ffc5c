use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::money::Amount;

/// Review lifecycle of a transaction. `Pending` rows are fresh (synced or
/// imported, not yet looked at), `Categorized` rows have a category assigned
/// by a rule run or bulk action, `Reviewed` is set by an explicit user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Categorized,
    Reviewed,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Categorized => "categorized",
            TransactionStatus::Reviewed => "reviewed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "categorized" => Ok(TransactionStatus::Categorized),
            "reviewed" => Ok(TransactionStatus::Reviewed),
            other => Err(format!("Unknown transaction status: '{other}'")),
        }
    }
}

/// A financial event owned by one user. May originate from a bank sync
/// (then `external_transaction_id` is set and unique per owner), from a file
/// import, or from manual entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Option<i64>,
    pub owner_id: String,
    pub date: NaiveDate,
    pub amount: Amount,
    pub description: String,
    pub merchant: Option<String>,
    pub category_id: Option<i64>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub is_deductible: bool,
    pub status: TransactionStatus,
    pub external_transaction_id: Option<String>,
    pub external_account_id: Option<String>,
    pub connection_id: Option<i64>,
}

impl Transaction {
    /// A bare row ready for insertion; callers fill in the optional fields.
    pub fn new(owner_id: &str, date: NaiveDate, amount: Amount, description: &str) -> Self {
        Transaction {
            id: None,
            owner_id: owner_id.to_string(),
            date,
            amount,
            description: description.to_string(),
            merchant: None,
            category_id: None,
            tags: Vec::new(),
            notes: None,
            is_deductible: false,
            status: TransactionStatus::Pending,
            external_transaction_id: None,
            external_account_id: None,
            connection_id: None,
        }
    }

    /// The text a categorization rule is evaluated against.
    pub fn search_text(&self) -> String {
        match &self.merchant {
            Some(m) => format!("{} {}", self.description, m),
            None => self.description.clone(),
        }
    }
}
