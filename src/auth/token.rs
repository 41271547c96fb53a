use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::secret::Secret;

/// Persisted provider session for one user.
///
/// `token` is opaque to this crate; only the provider's client understands
/// it. Records are always replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: String,
    pub token: Secret,
    pub created_at: DateTime<Utc>,
}
