use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sync state of a linked bank account.
///
/// Legal progression: `Connected` → `Syncing` → `Connected` or `Error`;
/// an errored connection may sync again. `Disconnected` is terminal — the
/// row is kept for transaction history but no further sync is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Syncing,
    Error,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Syncing => "syncing",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    /// Whether a reconciliation pass may begin from this state.
    /// `Syncing` is allowed here — it is an advisory UI marker, not a lock;
    /// mutual exclusion is the sync gate's job.
    pub fn can_begin_sync(self) -> bool {
        self != ConnectionStatus::Disconnected
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionStatus::Disconnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(ConnectionStatus::Connected),
            "syncing" => Ok(ConnectionStatus::Syncing),
            "error" => Ok(ConnectionStatus::Error),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            other => Err(format!("Unknown connection status: '{other}'")),
        }
    }
}

/// One linked external bank account. A provider item may span several
/// accounts; a connection row is per-account, so `(owner_id, account_id)`
/// is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankConnection {
    pub id: Option<i64>,
    pub owner_id: String,
    /// Provider-issued item identifier (one per linked institution login).
    pub item_id: String,
    /// Provider-issued account identifier this connection tracks.
    pub account_id: String,
    /// Opaque credential for provider calls. Never serialized to callers.
    #[serde(skip_serializing, default)]
    pub access_token: String,
    pub institution_id: Option<String>,
    pub institution_name: Option<String>,
    pub account_name: String,
    pub account_type: Option<String>,
    pub account_subtype: Option<String>,
    pub account_mask: Option<String>,
    pub status: ConnectionStatus,
    /// Provider pagination token. Replaced wholesale by each successful
    /// pass's next_cursor; never merged, never rewound.
    pub cursor: Option<String>,
    pub last_sync_date: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl BankConnection {
    pub fn new(owner_id: &str, item_id: &str, account_id: &str, access_token: &str) -> Self {
        BankConnection {
            id: None,
            owner_id: owner_id.to_string(),
            item_id: item_id.to_string(),
            account_id: account_id.to_string(),
            access_token: access_token.to_string(),
            institution_id: None,
            institution_name: None,
            account_name: String::new(),
            account_type: None,
            account_subtype: None,
            account_mask: None,
            status: ConnectionStatus::Connected,
            cursor: None,
            last_sync_date: None,
            error_code: None,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            ConnectionStatus::Connected,
            ConnectionStatus::Syncing,
            ConnectionStatus::Error,
            ConnectionStatus::Disconnected,
        ] {
            assert_eq!(status.as_str().parse::<ConnectionStatus>(), Ok(status));
        }
    }

    #[test]
    fn disconnected_is_terminal() {
        assert!(ConnectionStatus::Disconnected.is_terminal());
        assert!(!ConnectionStatus::Disconnected.can_begin_sync());
    }

    #[test]
    fn errored_connection_may_retry() {
        assert!(ConnectionStatus::Error.can_begin_sync());
    }

    #[test]
    fn syncing_marker_does_not_block() {
        // status=syncing is advisory; the gate enforces single-flight.
        assert!(ConnectionStatus::Syncing.can_begin_sync());
    }

    #[test]
    fn access_token_never_serialized() {
        let conn = BankConnection::new("u1", "item-1", "acct-1", "secret-token");
        let json = serde_json::to_string(&conn).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("access_token"));
    }
}
