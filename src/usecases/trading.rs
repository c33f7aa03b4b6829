//! Trading Use Case - Bets and Sales against the Market Maker
//!
//! Every trade is one store transaction over the market, the caller's
//! wallet for the market's scope and (for sales) the caller's ledger on
//! that market. All preconditions are re-checked against the state read
//! inside the transaction; a failed check aborts before anything is
//! written, so a rejected trade leaves market, wallet and ledger untouched.
//!
//! Trade flow:
//! 1. Validate the request shape (no store access)
//! 2. Read-only quote against current state (fast rejection)
//! 3. Transaction: re-read, re-validate, size, debit/credit, append entry
//! 4. Return the committed receipt

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::caller::Caller;
use crate::domain::error::{EngineError, EngineResult};
use crate::domain::ledger::{LedgerEntry, Wallet, WalletKey};
use crate::domain::market::{Market, MarketId, Outcome, Pool, ScopeId};
use crate::domain::position::fold_position;
use crate::domain::sizing::{
  BuyQuote, SellQuote, SizingParams, TradeSizer, round_currency, round_shares,
};
use crate::ports::clock::Clock;
use crate::ports::store::{Store, Transaction};

/// Spend `amount` on `side` of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRequest {
  pub market_id: MarketId,
  pub side: Outcome,
  pub amount: f64,
  /// Scope the client believes the market is in.
  pub scope_id: Option<ScopeId>,
}

/// Liquidate `shares` of `side` back to the market maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellRequest {
  pub market_id: MarketId,
  pub side: Outcome,
  pub shares: f64,
  /// Scope the client believes the market is in.
  pub scope_id: Option<ScopeId>,
}

/// Committed buy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetReceipt {
  pub entry_id: Uuid,
  pub market_id: MarketId,
  pub side: Outcome,
  pub amount: f64,
  pub shares: f64,
  /// YES price after the trade.
  pub new_probability: f64,
  pub new_pool: Pool,
  /// Wallet balance after the debit.
  pub balance: f64,
}

/// Committed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellReceipt {
  pub entry_id: Uuid,
  pub market_id: MarketId,
  pub side: Outcome,
  pub shares: f64,
  pub payout: f64,
  /// YES price after the trade.
  pub new_probability: f64,
  pub new_pool: Pool,
  /// Wallet balance after the credit.
  pub balance: f64,
}

/// Places bets and sales for asserted callers.
pub struct TradeService<S: Store, C: Clock> {
  store: Arc<S>,
  clock: Arc<C>,
  params: SizingParams,
}

impl<S: Store, C: Clock> TradeService<S, C> {
  /// Create a trade service.
  pub fn new(store: Arc<S>, clock: Arc<C>, params: SizingParams) -> Self {
    Self {
      store,
      clock,
      params,
    }
  }

  /// Sizing parameters in force.
  pub const fn params(&self) -> SizingParams {
    self.params
  }

  /// Size a bet against current state without committing it.
  ///
  /// Runs the same checks as [`TradeService::place_bet`]; a successful
  /// quote is not a guarantee, since the market may move before the bet.
  pub async fn quote_bet(&self, caller: &Caller, request: &BetRequest) -> EngineResult<BuyQuote> {
    caller.ensure_eligible()?;
    let amount = validated_amount(request.amount)?;
    let market = self.load_market(&request.market_id).await?;
    let key = WalletKey::for_market(&caller.user_id, &market);
    let wallet = self.store.wallet(&key).await?;
    self.price_bet(&market, request.scope_id.as_ref(), wallet.as_ref(), &key, request.side, amount)
  }

  /// Price a sale against current state without committing it.
  pub async fn quote_sale(&self, caller: &Caller, request: &SellRequest) -> EngineResult<SellQuote> {
    caller.ensure_eligible()?;
    let shares = validated_shares(request.shares)?;
    let market = self.load_market(&request.market_id).await?;
    let entries = self.store.user_ledger(&caller.user_id).await?;
    self.price_sale(
      &market,
      request.scope_id.as_ref(),
      &caller.user_id,
      &entries,
      request.side,
      shares,
    )
  }

  /// Spend `request.amount` on one side of a market.
  ///
  /// # Errors
  /// - `NotEligible` for callers that failed the eligibility policy
  /// - `InvalidParameter` for a non-finite or non-positive amount
  /// - `MarketNotTradeable` / `ScopeMismatch` when the client view is stale
  /// - `InsufficientBalance`, `ConvergenceFailure`
  /// - `Store` when the transaction could not commit
  #[instrument(
    skip(self, caller, request),
    fields(user = %caller.user_id, market = %request.market_id, side = %request.side, amount = request.amount)
  )]
  pub async fn place_bet(&self, caller: &Caller, request: BetRequest) -> EngineResult<BetReceipt> {
    let quote = self.quote_bet(caller, &request).await?;
    debug!(shares = quote.shares, "Pre-check passed");

    let amount = quote.amount;
    let now = self.clock.now();
    let receipt = self
      .store
      .transact(|tx| {
        let mut market = require_market(tx, &request.market_id)?;
        let key = WalletKey::for_market(&caller.user_id, &market);
        let mut wallet = tx.wallet(&key)?;
        let quote = self.price_bet(
          &market,
          request.scope_id.as_ref(),
          wallet.as_ref(),
          &key,
          request.side,
          amount,
        )?;
        let wallet = wallet.as_mut().ok_or_else(|| wallet_not_found(&key))?;
        wallet.debit(quote.amount)?;
        market.apply_trade(quote.pool_after, quote.probability_after, quote.amount)?;
        market.check_invariants()?;

        let entry = LedgerEntry::buy(
          caller.user_id.clone(),
          &market,
          request.side,
          quote.amount,
          quote.shares,
          quote.probability_after,
          now,
        )?;
        let receipt = BetReceipt {
          entry_id: entry.id,
          market_id: market.id.clone(),
          side: request.side,
          amount: quote.amount,
          shares: quote.shares,
          new_probability: quote.probability_after,
          new_pool: quote.pool_after,
          balance: wallet.balance,
        };
        tx.put_wallet(wallet.clone());
        tx.put_market(market);
        tx.append_ledger(entry);
        Ok(receipt)
      })
      .await?;

    info!(
      entry_id = %receipt.entry_id,
      shares = receipt.shares,
      probability = receipt.new_probability,
      "Bet committed"
    );
    Ok(receipt)
  }

  /// Sell `request.shares` of one side back to the market maker.
  ///
  /// # Errors
  /// As [`TradeService::place_bet`], plus `InsufficientShares`,
  /// `LiquidityExceeded` and `UnsafeSellBounds`.
  #[instrument(
    skip(self, caller, request),
    fields(user = %caller.user_id, market = %request.market_id, side = %request.side, shares = request.shares)
  )]
  pub async fn sell_shares(&self, caller: &Caller, request: SellRequest) -> EngineResult<SellReceipt> {
    let quote = self.quote_sale(caller, &request).await?;
    debug!(payout = quote.payout, "Pre-check passed");

    let shares = quote.shares;
    let now = self.clock.now();
    let receipt = self
      .store
      .transact(|tx| {
        let mut market = require_market(tx, &request.market_id)?;
        let key = WalletKey::for_market(&caller.user_id, &market);
        let mut wallet = tx.wallet(&key)?.ok_or_else(|| wallet_not_found(&key))?;
        let entries = tx.user_market_ledger(&caller.user_id, &market.id)?;
        let quote = self.price_sale(
          &market,
          request.scope_id.as_ref(),
          &caller.user_id,
          &entries,
          request.side,
          shares,
        )?;
        wallet.credit(quote.payout)?;
        market.apply_trade(quote.pool_after, quote.probability_after, quote.payout)?;
        market.check_invariants()?;

        let entry = LedgerEntry::sell(
          caller.user_id.clone(),
          &market,
          request.side,
          quote.payout,
          quote.shares,
          quote.probability_after,
          now,
        )?;
        let receipt = SellReceipt {
          entry_id: entry.id,
          market_id: market.id.clone(),
          side: request.side,
          shares: quote.shares,
          payout: quote.payout,
          new_probability: quote.probability_after,
          new_pool: quote.pool_after,
          balance: wallet.balance,
        };
        tx.put_wallet(wallet);
        tx.put_market(market);
        tx.append_ledger(entry);
        Ok(receipt)
      })
      .await?;

    info!(
      entry_id = %receipt.entry_id,
      payout = receipt.payout,
      probability = receipt.new_probability,
      "Sale committed"
    );
    Ok(receipt)
  }

  fn sizer(&self, market: &Market) -> EngineResult<TradeSizer> {
    Ok(TradeSizer::new(market.model()?, self.params))
  }

  /// Buy-side checks shared by the quote and the transaction.
  fn price_bet(
    &self,
    market: &Market,
    requested_scope: Option<&ScopeId>,
    wallet: Option<&Wallet>,
    key: &WalletKey,
    side: Outcome,
    amount: f64,
  ) -> EngineResult<BuyQuote> {
    market.ensure_tradeable(requested_scope)?;
    wallet.ok_or_else(|| wallet_not_found(key))?.ensure_covers(amount)?;
    self.sizer(market)?.quote_buy(market.pool, side, amount)
  }

  /// Sell-side checks shared by the quote and the transaction.
  ///
  /// `entries` may hold the caller's entries on other markets; only those
  /// on `market` are folded.
  fn price_sale(
    &self,
    market: &Market,
    requested_scope: Option<&ScopeId>,
    user_id: &str,
    entries: &[LedgerEntry],
    side: Outcome,
    shares: f64,
  ) -> EngineResult<SellQuote> {
    market.ensure_tradeable(requested_scope)?;

    let held = round_shares(fold_position(user_id, &market.id, entries).net_shares(side))?;
    if shares > held {
      return Err(EngineError::InsufficientShares {
        requested: shares,
        held,
      });
    }
    let available = market.pool.get(side);
    if shares > available {
      return Err(EngineError::LiquidityExceeded {
        requested: shares,
        available,
      });
    }
    self.sizer(market)?.quote_sell(market.pool, side, shares)
  }

  async fn load_market(&self, id: &MarketId) -> EngineResult<Market> {
    self.store.market(id).await?.ok_or_else(|| market_not_found(id))
  }
}

/// Read a market inside a transaction, failing if it does not exist.
pub(crate) fn require_market(tx: &mut dyn Transaction, id: &MarketId) -> EngineResult<Market> {
  tx.market(id)?.ok_or_else(|| market_not_found(id))
}

pub(crate) fn market_not_found(id: &MarketId) -> EngineError {
  EngineError::NotFound {
    kind: "market",
    id: id.clone(),
  }
}

fn wallet_not_found(key: &WalletKey) -> EngineError {
  EngineError::NotFound {
    kind: "wallet",
    id: key.to_string(),
  }
}

/// Round to currency precision; must stay strictly positive.
fn validated_amount(amount: f64) -> EngineResult<f64> {
  if !amount.is_finite() || amount <= 0.0 {
    return Err(EngineError::invalid(format!(
      "amount must be finite and > 0, got {amount}"
    )));
  }
  let rounded = round_currency(amount)?;
  if rounded <= 0.0 {
    return Err(EngineError::invalid(format!(
      "amount {amount} rounds to zero"
    )));
  }
  Ok(rounded)
}

fn validated_shares(shares: f64) -> EngineResult<f64> {
  if !shares.is_finite() || shares <= 0.0 {
    return Err(EngineError::invalid(format!(
      "shares must be finite and > 0, got {shares}"
    )));
  }
  let rounded = round_shares(shares)?;
  if rounded <= 0.0 {
    return Err(EngineError::invalid(format!(
      "shares {shares} round to zero"
    )));
  }
  Ok(rounded)
}
