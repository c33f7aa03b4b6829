//! User-facing settlement notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::market::{MarketId, Outcome, UserId};

/// What happened to the user's position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    MarketResolved { outcome: Outcome, payout: f64 },
    MarketCancelled { refund: f64 },
}

/// One notification, written in the same batch as the credit it describes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub question: String,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        market_id: MarketId,
        question: String,
        kind: NotificationKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id,
            question,
            kind,
            created_at,
        }
    }
}
