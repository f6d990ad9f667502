use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity record held by the Skills backend, keyed by wallet address.
///
/// The wallet address is immutable once the record exists; the backend is
/// authoritative for every field and returned records replace local copies
/// wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub wallet_address: String,
    #[serde(default)]
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// Address plus signed proof handed back by the wallet agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WalletAuth {
    pub address: String,
    pub proof: String,
}

/// Durable mirror of an authenticated session.
///
/// Field names match the storage keys the web client used, so a session
/// written by either client restores in the other. Both keys live in one
/// document and are written and cleared together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(rename = "stellar_wallet")]
    pub wallet_address: String,
    #[serde(rename = "stellar_user")]
    pub user: UserRecord,
}
