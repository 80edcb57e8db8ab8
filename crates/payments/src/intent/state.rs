use serde::{Deserialize, Serialize};

/// Lifecycle of a payment intent.
///
/// ```text
/// CREATED ──┬──► VERIFIED
///           ├──► FAILED
///           ├──► CANCELLED
///           └──► EXPIRED
/// ```
///
/// Every status other than `CREATED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    #[default]
    Created,
    Verified,
    Failed,
    Cancelled,
    Expired,
}

impl IntentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IntentStatus::Created)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Created => "CREATED",
            IntentStatus::Verified => "VERIFIED",
            IntentStatus::Failed => "FAILED",
            IntentStatus::Cancelled => "CANCELLED",
            IntentStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
