//! Immutable trade ledger and wallets.
//!
//! Ledger entries are a closed BUY/SELL × YES/NO record. Sign conventions
//! are validated at construction and at deserialization:
//! - BUY:  `amount > 0` (cost paid), `shares >= 0` (acquired)
//! - SELL: `amount <= 0` (payout received), `shares < 0` (liquidated)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{EngineError, EngineResult};
use super::market::{Market, MarketId, Outcome, ScopeId, UserId, scope_label};

/// BUY or SELL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// One committed trade. Never mutated after creation except for the
/// `refunded` void marker set by cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LedgerEntryRecord")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub market_id: MarketId,
    pub scope_id: Option<ScopeId>,
    pub side: Outcome,
    #[serde(rename = "type")]
    pub kind: TradeKind,
    /// Positive = cost paid, negative = payout received.
    pub amount: f64,
    /// Positive = acquired, negative = liquidated.
    pub shares: f64,
    /// YES price after the trade.
    pub probability: f64,
    pub created_at: DateTime<Utc>,
    /// Set once the entry's contribution has been refunded.
    pub refunded: bool,
}

impl LedgerEntry {
    /// Record a buy of `shares` for `amount`.
    pub fn buy(
        user_id: UserId,
        market: &Market,
        side: Outcome,
        amount: f64,
        shares: f64,
        probability: f64,
        created_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id: market.id.clone(),
            scope_id: market.scope_id.clone(),
            side,
            kind: TradeKind::Buy,
            amount,
            shares,
            probability,
            created_at,
            refunded: false,
        }
        .validated()
    }

    /// Record a sale of `shares` (positive count) for `payout`.
    pub fn sell(
        user_id: UserId,
        market: &Market,
        side: Outcome,
        payout: f64,
        shares: f64,
        probability: f64,
        created_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id: market.id.clone(),
            scope_id: market.scope_id.clone(),
            side,
            kind: TradeKind::Sell,
            amount: -payout,
            shares: -shares,
            probability,
            created_at,
            refunded: false,
        }
        .validated()
    }

    fn validated(self) -> EngineResult<Self> {
        for (what, value) in [
            ("amount", self.amount),
            ("shares", self.shares),
            ("probability", self.probability),
        ] {
            if !value.is_finite() {
                return Err(EngineError::NumericFault(format!(
                    "ledger entry {} has non-finite {what}",
                    self.id
                )));
            }
        }
        let signs_ok = match self.kind {
            TradeKind::Buy => self.amount > 0.0 && self.shares >= 0.0,
            TradeKind::Sell => self.amount <= 0.0 && self.shares < 0.0,
        };
        if !signs_ok {
            return Err(EngineError::invalid(format!(
                "{} entry {} has amount {} and shares {}",
                self.kind, self.id, self.amount, self.shares
            )));
        }
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(EngineError::invalid(format!(
                "ledger entry {} has probability {} outside [0, 1]",
                self.id, self.probability
            )));
        }
        Ok(self)
    }
}

/// Wire shape of a ledger entry before sign validation.
#[derive(Deserialize)]
struct LedgerEntryRecord {
    id: Uuid,
    user_id: UserId,
    market_id: MarketId,
    scope_id: Option<ScopeId>,
    side: Outcome,
    #[serde(rename = "type")]
    kind: TradeKind,
    amount: f64,
    shares: f64,
    probability: f64,
    created_at: DateTime<Utc>,
    #[serde(default)]
    refunded: bool,
}

impl TryFrom<LedgerEntryRecord> for LedgerEntry {
    type Error = EngineError;

    fn try_from(r: LedgerEntryRecord) -> Result<Self, Self::Error> {
        Self {
            id: r.id,
            user_id: r.user_id,
            market_id: r.market_id,
            scope_id: r.scope_id,
            side: r.side,
            kind: r.kind,
            amount: r.amount,
            shares: r.shares,
            probability: r.probability,
            created_at: r.created_at,
            refunded: r.refunded,
        }
        .validated()
    }
}

/// Wallet address: a user's global wallet or one community-scoped wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletKey {
    pub user_id: UserId,
    pub scope_id: Option<ScopeId>,
}

impl WalletKey {
    pub fn new(user_id: impl Into<UserId>, scope_id: Option<ScopeId>) -> Self {
        Self {
            user_id: user_id.into(),
            scope_id,
        }
    }

    /// The wallet a trade on `market` debits and credits.
    pub fn for_market(user_id: &str, market: &Market) -> Self {
        Self::new(user_id, market.scope_id.clone())
    }
}

impl std::fmt::Display for WalletKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, scope_label(self.scope_id.as_ref()))
    }
}

/// Play-money balance. Never negative between trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub key: WalletKey,
    pub balance: f64,
    /// Idempotency marker for scheduled top-ups.
    pub last_top_up: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub const fn new(key: WalletKey, balance: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            balance,
            last_top_up: None,
            created_at,
        }
    }

    /// Fail unless the balance covers `amount`.
    pub fn ensure_covers(&self, amount: f64) -> EngineResult<()> {
        if self.balance + f64::EPSILON >= amount {
            Ok(())
        } else {
            Err(EngineError::InsufficientBalance {
                needed: amount,
                available: self.balance,
            })
        }
    }

    pub fn debit(&mut self, amount: f64) -> EngineResult<()> {
        self.ensure_covers(amount)?;
        self.balance = (self.balance - amount).max(0.0);
        Ok(())
    }

    pub fn credit(&mut self, amount: f64) -> EngineResult<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(EngineError::invalid(format!(
                "credit to {} must be finite and >= 0, got {amount}",
                self.key
            )));
        }
        self.balance += amount;
        Ok(())
    }

    /// Whether a scheduled top-up is due at `now` given the minimum interval.
    pub fn top_up_due(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        self.last_top_up.is_none_or(|last| now - last >= interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market() -> Market {
        Market::try_new(
            "m1".to_string(),
            "q?",
            "creator".to_string(),
            100.0,
            Some("club".to_string()),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_buy_and_sell_sign_conventions() {
        let m = market();
        let buy = LedgerEntry::buy("u".into(), &m, Outcome::Yes, 10.0, 18.5, 0.55, Utc::now()).unwrap();
        assert_eq!(buy.kind, TradeKind::Buy);
        assert_eq!(buy.scope_id.as_deref(), Some("club"));

        let sell = LedgerEntry::sell("u".into(), &m, Outcome::Yes, 9.0, 18.5, 0.5, Utc::now()).unwrap();
        assert_eq!(sell.amount, -9.0);
        assert_eq!(sell.shares, -18.5);
    }

    #[test]
    fn test_rejects_wrong_signs() {
        let m = market();
        assert!(LedgerEntry::buy("u".into(), &m, Outcome::No, -1.0, 2.0, 0.4, Utc::now()).is_err());
        assert!(LedgerEntry::sell("u".into(), &m, Outcome::No, 1.0, 0.0, 0.4, Utc::now()).is_err());
        assert!(matches!(
            LedgerEntry::buy("u".into(), &m, Outcome::No, 1.0, f64::NAN, 0.4, Utc::now()),
            Err(EngineError::NumericFault(_))
        ));
    }

    #[test]
    fn test_deserialization_validates() {
        let m = market();
        let entry = LedgerEntry::buy("u".into(), &m, Outcome::Yes, 5.0, 9.0, 0.52, Utc::now()).unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"type\":\"BUY\""));
        let back: LedgerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);

        let tampered = json.replace("\"amount\":5.0", "\"amount\":-5.0");
        assert!(serde_json::from_str::<LedgerEntry>(&tampered).is_err());
    }

    #[test]
    fn test_wallet_debit_never_negative() {
        let mut w = Wallet::new(WalletKey::new("u", None), 20.0, Utc::now());
        assert!(matches!(
            w.debit(20.01),
            Err(EngineError::InsufficientBalance { .. })
        ));
        w.debit(20.0).unwrap();
        assert_eq!(w.balance, 0.0);
        w.credit(3.5).unwrap();
        assert_eq!(w.balance, 3.5);
        assert!(w.credit(-1.0).is_err());
    }

    #[test]
    fn test_wallet_key_for_market_uses_scope() {
        let key = WalletKey::for_market("bob", &market());
        assert_eq!(key.to_string(), "bob@club");
    }

    #[test]
    fn test_top_up_due() {
        let now = Utc::now();
        let mut w = Wallet::new(WalletKey::new("u", None), 0.0, now);
        let week = chrono::Duration::days(7);
        assert!(w.top_up_due(now, week));
        w.last_top_up = Some(now - chrono::Duration::days(3));
        assert!(!w.top_up_due(now, week));
        w.last_top_up = Some(now - chrono::Duration::days(7));
        assert!(w.top_up_due(now, week));
    }
}
