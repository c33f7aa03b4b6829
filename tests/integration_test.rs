//! Integration Tests - End-to-end Engine Flows
//!
//! Drives the use cases against the in-memory store with a mocked clock.
//! Uses mockall for the clock and tokio::test for async tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use mockall::mock;
use tokio_test::{assert_err, assert_ok};

use lmsr_exchange::adapters::persistence::{InMemoryStore, StoreSnapshot};
use lmsr_exchange::domain::notification::NotificationKind;
use lmsr_exchange::domain::{
    Caller, Claim, EngineError, LedgerEntry, Market, MarketStatus, Outcome, SettlementKind,
    SettlementRecord, SizingParams, TradeSizer, Wallet, WalletKey,
};
use lmsr_exchange::ports::store::{Store, WriteOp};
use lmsr_exchange::usecases::leaderboard::Leaderboard;
use lmsr_exchange::usecases::lifecycle::{MarketLifecycle, NewMarket};
use lmsr_exchange::usecases::portfolio::PortfolioService;
use lmsr_exchange::usecases::settlement::SettlementService;
use lmsr_exchange::usecases::trading::{BetRequest, SellRequest, TradeService};
use lmsr_exchange::usecases::wallet_manager::{WalletManager, WalletPolicy};

// ---- Mock Definitions ----

mock! {
    pub Clock {}

    impl lmsr_exchange::ports::clock::Clock for Clock {
        fn now(&self) -> DateTime<Utc>;
    }
}

// ---- Helpers ----

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn clock_at(at: DateTime<Utc>) -> Arc<MockClock> {
    let mut clock = MockClock::new();
    clock.expect_now().return_const(at);
    Arc::new(clock)
}

fn policy() -> WalletPolicy {
    WalletPolicy {
        initial_balance: 1000.0,
        top_up_amount: 100.0,
        top_up_interval: Duration::days(7),
    }
}

fn admin() -> Caller {
    Caller::new("admin", true, vec![Claim::Verified, Claim::Admin])
}

fn member(user: &str) -> Caller {
    Caller::new(user, true, vec![Claim::Verified])
}

struct Engine {
    store: Arc<InMemoryStore>,
    trades: Arc<TradeService<InMemoryStore, MockClock>>,
    wallets: WalletManager<InMemoryStore, MockClock>,
    lifecycle: MarketLifecycle<InMemoryStore, MockClock>,
    settlement: SettlementService<InMemoryStore, MockClock>,
    portfolio: PortfolioService<InMemoryStore>,
    leaderboard: Leaderboard<InMemoryStore>,
}

impl Engine {
    fn new(store: Arc<InMemoryStore>, at: DateTime<Utc>) -> Self {
        let clock = clock_at(at);
        Self {
            trades: Arc::new(TradeService::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                SizingParams::default(),
            )),
            wallets: WalletManager::new(Arc::clone(&store), Arc::clone(&clock), policy()),
            lifecycle: MarketLifecycle::new(Arc::clone(&store), Arc::clone(&clock), 100.0),
            settlement: SettlementService::new(Arc::clone(&store), clock),
            portfolio: PortfolioService::new(Arc::clone(&store)),
            leaderboard: Leaderboard::new(Arc::clone(&store)),
            store,
        }
    }

    fn fresh() -> Self {
        Self::new(Arc::new(InMemoryStore::new(10, 50)), t0())
    }

    async fn market(&self, scope: Option<&str>) -> Market {
        self.lifecycle
            .create_market(
                &admin(),
                NewMarket {
                    question: "Will the library open on Sunday?".into(),
                    liquidity: Some(100.0),
                    scope_id: scope.map(str::to_string),
                },
            )
            .await
            .unwrap()
    }

    async fn bet(&self, who: &Caller, market: &Market, side: Outcome, amount: f64) -> f64 {
        self.trades
            .place_bet(who, bet(market, side, amount))
            .await
            .unwrap()
            .shares
    }

    async fn balance(&self, who: &Caller) -> f64 {
        self.wallets.balance(who, None).await.unwrap().balance
    }
}

fn bet(market: &Market, side: Outcome, amount: f64) -> BetRequest {
    BetRequest {
        market_id: market.id.clone(),
        side,
        amount,
        scope_id: market.scope_id.clone(),
    }
}

fn sale(market: &Market, side: Outcome, shares: f64) -> SellRequest {
    SellRequest {
        market_id: market.id.clone(),
        side,
        shares,
        scope_id: market.scope_id.clone(),
    }
}

/// A market with the given pool and ledger, restored from a snapshot.
fn seeded_store(market: Market, wallets: Vec<Wallet>, ledger: Vec<LedgerEntry>) -> Arc<InMemoryStore> {
    let snapshot = StoreSnapshot {
        markets: vec![market],
        wallets,
        ledger,
        ..StoreSnapshot::default()
    };
    Arc::new(InMemoryStore::from_snapshot(snapshot, 10, 50))
}

fn seeded_market() -> Market {
    Market::try_new("m-seeded".into(), "Will it snow?", "admin".into(), 100.0, None, t0()).unwrap()
}

fn empty_wallet(user: &str) -> Wallet {
    Wallet::new(WalletKey::new(user, None), 0.0, t0())
}

// ---- Trading ----

#[tokio::test]
async fn test_fifty_dollar_bet_moves_price_and_sells_back() {
    let engine = Engine::fresh();
    let alice = member("alice");
    assert_ok!(engine.wallets.open_wallet(&alice, None).await);
    let market = engine.market(None).await;

    let receipt = engine
        .trades
        .place_bet(&alice, bet(&market, Outcome::Yes, 50.0))
        .await
        .unwrap();
    assert!(receipt.new_probability > 0.5);
    assert!(receipt.shares > 0.0);
    assert!((receipt.balance - 950.0).abs() < 1e-9);

    let sold = engine
        .trades
        .sell_shares(&alice, sale(&market, Outcome::Yes, receipt.shares))
        .await
        .unwrap();
    assert!((sold.payout - 50.0).abs() <= 0.05, "payout {}", sold.payout);
    assert!((engine.balance(&alice).await - 1000.0).abs() <= 0.05);

    let after = engine.lifecycle.market(&market.id).await.unwrap();
    assert!(after.pool.yes.abs() < 1e-9);
    assert!((after.current_price().unwrap() - 0.5).abs() < 1e-9);
    assert!((after.volume - 50.0 - sold.payout).abs() < 1e-9);
}

#[tokio::test]
async fn test_quote_matches_committed_bet() {
    let engine = Engine::fresh();
    let alice = member("alice");
    engine.wallets.open_wallet(&alice, None).await.unwrap();
    let market = engine.market(None).await;

    let quote = engine
        .trades
        .quote_bet(&alice, &bet(&market, Outcome::No, 20.0))
        .await
        .unwrap();
    let receipt = engine
        .trades
        .place_bet(&alice, bet(&market, Outcome::No, 20.0))
        .await
        .unwrap();
    assert_eq!(quote.shares, receipt.shares);
    assert_eq!(quote.probability_after, receipt.new_probability);
}

#[tokio::test]
async fn test_rejected_trades_leave_state_untouched() {
    let engine = Engine::fresh();
    let alice = member("alice");
    engine.wallets.open_wallet(&alice, None).await.unwrap();
    let market = engine.market(None).await;
    engine.bet(&alice, &market, Outcome::Yes, 10.0).await;
    let before = engine.store.snapshot();

    let err = engine
        .trades
        .place_bet(&alice, bet(&market, Outcome::Yes, 5000.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));

    let err = engine
        .trades
        .sell_shares(&alice, sale(&market, Outcome::No, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientShares { .. }));

    let err = engine
        .trades
        .place_bet(&alice, bet(&market, Outcome::Yes, -3.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter(_)));

    let after = engine.store.snapshot();
    assert_eq!(before.markets, after.markets);
    assert_eq!(before.wallets, after.wallets);
    assert_eq!(before.ledger, after.ledger);
}

#[tokio::test]
async fn test_sale_beyond_side_liquidity_is_rejected() {
    // Restored state where alice's ledger claims more YES than the pool holds.
    let mut market = seeded_market();
    market.pool.yes = 5.0;
    let entry = LedgerEntry::buy("alice".into(), &market, Outcome::Yes, 6.0, 10.0, 0.52, t0()).unwrap();
    let wallet = Wallet::new(WalletKey::new("alice", None), 100.0, t0());
    let store = seeded_store(market.clone(), vec![wallet], vec![entry]);
    let engine = Engine::new(store, t0());

    let err = engine
        .trades
        .sell_shares(&member("alice"), sale(&market, Outcome::Yes, 8.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::LiquidityExceeded { requested, available } if requested == 8.0 && available == 5.0
    ));
    assert_eq!(engine.balance(&member("alice")).await, 100.0);
}

#[tokio::test]
async fn test_stale_scope_and_locked_market_are_rejected() {
    let engine = Engine::fresh();
    let alice = Caller::new(
        "alice",
        true,
        vec![Claim::Verified, Claim::ScopeMember("chess".into())],
    );
    let bob = member("bob");
    engine.wallets.open_wallet(&alice, Some("chess".into())).await.unwrap();
    let market = engine.market(Some("chess")).await;

    let mut stale = bet(&market, Outcome::Yes, 10.0);
    stale.scope_id = None;
    let err = engine.trades.place_bet(&alice, stale).await.unwrap_err();
    assert!(matches!(err, EngineError::ScopeMismatch { .. }));
    assert!(err.is_stale_state());

    assert!(matches!(
        engine.wallets.open_wallet(&bob, Some("chess".into())).await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        engine.lifecycle.set_locked(&bob, &market.id, true).await,
        Err(EngineError::Forbidden(_))
    ));

    let locked = engine.lifecycle.set_locked(&admin(), &market.id, true).await.unwrap();
    assert_eq!(locked.status, MarketStatus::Locked);
    let err = engine
        .trades
        .place_bet(&alice, bet(&market, Outcome::Yes, 10.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MarketNotTradeable { .. }));

    engine.lifecycle.set_locked(&admin(), &market.id, false).await.unwrap();
    let receipt = assert_ok!(
        engine
            .trades
            .place_bet(&alice, bet(&market, Outcome::Yes, 10.0))
            .await
    );
    let wallet = engine.wallets.balance(&alice, Some("chess".into())).await.unwrap();
    assert_eq!(wallet.balance, receipt.balance);
}

#[tokio::test]
async fn test_ineligible_caller_cannot_trade() {
    let engine = Engine::fresh();
    let market = engine.market(None).await;
    let guest = Caller::new("guest", false, vec![]);
    assert_err!(engine.wallets.open_wallet(&guest, None).await);
    let err = engine
        .trades
        .place_bet(&guest, bet(&market, Outcome::Yes, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotEligible(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bets_keep_pool_consistent() {
    let engine = Engine::fresh();
    let market = engine.market(None).await;
    let users: Vec<Caller> = (0..8).map(|i| member(&format!("user-{i}"))).collect();
    for user in &users {
        engine.wallets.open_wallet(user, None).await.unwrap();
    }

    let mut handles = Vec::new();
    for (i, user) in users.iter().cloned().enumerate() {
        let trades = Arc::clone(&engine.trades);
        let request = bet(&market, Outcome::Yes, 5.0 + i as f64);
        handles.push(tokio::spawn(async move { trades.place_bet(&user, request).await }));
    }
    let mut total_shares = 0.0;
    for handle in handles {
        total_shares += handle.await.unwrap().unwrap().shares;
    }

    let after = engine.lifecycle.market(&market.id).await.unwrap();
    assert!((after.pool.yes - total_shares).abs() < 1e-6);
    assert_eq!(engine.store.market_ledger(&market.id).await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_selling_in_small_chunks_returns_no_more_than_the_stake() {
    let engine = Engine::fresh();
    let alice = member("alice");
    engine.wallets.open_wallet(&alice, None).await.unwrap();
    let market = engine.market(None).await;
    let start = engine.balance(&alice).await;

    let mut left = engine.bet(&alice, &market, Outcome::Yes, 1.0).await;
    let chunk = 0.0101;
    while left >= chunk {
        let sold = engine
            .trades
            .sell_shares(&alice, sale(&market, Outcome::Yes, chunk))
            .await
            .unwrap();
        left -= sold.shares;
    }
    if left >= 1e-6 {
        assert_ok!(
            engine
                .trades
                .sell_shares(&alice, sale(&market, Outcome::Yes, left))
                .await
        );
    }

    let end = engine.balance(&alice).await;
    assert!(end <= start + 1e-9, "started with {start}, ended with {end}");
    let after = engine.lifecycle.market(&market.id).await.unwrap();
    assert!(after.pool.yes.abs() < 1e-6);
}

#[tokio::test]
async fn test_interleaved_trades_never_pay_out_more_than_was_spent() {
    let engine = Engine::fresh();
    let (alice, bob) = (member("alice"), member("bob"));
    for who in [&alice, &bob] {
        engine.wallets.open_wallet(who, None).await.unwrap();
    }
    let market = engine.market(None).await;

    let a_yes = engine.bet(&alice, &market, Outcome::Yes, 30.0).await;
    let b_no = engine.bet(&bob, &market, Outcome::No, 12.5).await;
    let a_no = engine.bet(&alice, &market, Outcome::No, 7.25).await;
    for (who, side, shares) in [
        (&alice, Outcome::Yes, a_yes / 3.0),
        (&bob, Outcome::No, b_no / 2.0),
        (&alice, Outcome::No, a_no),
        (&alice, Outcome::Yes, a_yes / 3.0),
    ] {
        assert_ok!(engine.trades.sell_shares(who, sale(&market, side, shares)).await);
    }
    engine.bet(&bob, &market, Outcome::Yes, 4.0).await;

    let net = engine.balance(&alice).await + engine.balance(&bob).await - 2000.0;
    let after = engine.lifecycle.market(&market.id).await.unwrap();
    let sizer = TradeSizer::new(after.model().unwrap(), engine.trades.params());
    let mut pool = after.pool;
    let mut residual = 0.0;
    for side in [Outcome::Yes, Outcome::No] {
        let shares = pool.get(side);
        if shares > 1e-6 {
            let quote = sizer.quote_sell(pool, side, shares).unwrap();
            residual += quote.payout;
            pool = quote.pool_after;
        }
    }
    assert!(net + residual <= 0.01, "traders net {net} plus residual {residual}");
}

// ---- Settlement ----

#[tokio::test]
async fn test_cancellation_refunds_net_positive_contributions() {
    let market = seeded_market();
    let ledger = vec![
        LedgerEntry::buy("a".into(), &market, Outcome::Yes, 40.0, 70.0, 0.6, t0()).unwrap(),
        LedgerEntry::buy("b".into(), &market, Outcome::No, 20.0, 35.0, 0.55, t0()).unwrap(),
        LedgerEntry::sell("b".into(), &market, Outcome::No, 30.0, 35.0, 0.6, t0()).unwrap(),
    ];
    let store = seeded_store(market.clone(), vec![empty_wallet("a"), empty_wallet("b")], ledger);
    let engine = Engine::new(Arc::clone(&store), t0() + Duration::hours(1));

    let report = engine.settlement.cancel_market(&admin(), &market.id).await.unwrap();
    assert_eq!(report.status, MarketStatus::Cancelled);
    assert_eq!(report.kind, SettlementKind::Refund);
    assert_eq!(report.credited, 1);
    assert_eq!(report.amount_credited, 40.0);
    assert!(!report.resumed);

    assert_eq!(engine.balance(&member("a")).await, 40.0);
    assert_eq!(engine.balance(&member("b")).await, 0.0);

    let a_notes = engine.portfolio.notifications(&member("a")).await.unwrap();
    assert_eq!(a_notes.len(), 1);
    assert_eq!(a_notes[0].kind, NotificationKind::MarketCancelled { refund: 40.0 });
    assert!(engine.portfolio.notifications(&member("b")).await.unwrap().is_empty());

    let refunded: Vec<bool> = store
        .market_ledger(&market.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.user_id == "a")
        .map(|e| e.refunded)
        .collect();
    assert_eq!(refunded, vec![true]);

    let stamped = engine.lifecycle.market(&market.id).await.unwrap();
    assert!(stamped.settled_at.is_some());
    assert!(matches!(
        engine.settlement.cancel_market(&admin(), &market.id).await,
        Err(EngineError::AlreadyTerminal { .. })
    ));
    assert_eq!(engine.balance(&member("a")).await, 40.0);
}

#[tokio::test]
async fn test_resolution_pays_winning_shares() {
    let engine = Engine::fresh();
    let (alice, bob) = (member("alice"), member("bob"));
    engine.wallets.open_wallet(&alice, None).await.unwrap();
    engine.wallets.open_wallet(&bob, None).await.unwrap();
    let market = engine.market(None).await;

    let alice_shares = engine.bet(&alice, &market, Outcome::Yes, 50.0).await;
    engine.bet(&bob, &market, Outcome::No, 30.0).await;

    assert!(matches!(
        engine.settlement.resolve_market(&bob, &market.id, Outcome::No).await,
        Err(EngineError::Forbidden(_))
    ));
    let report = engine
        .settlement
        .resolve_market(&admin(), &market.id, Outcome::Yes)
        .await
        .unwrap();
    assert_eq!(report.resolution, Some(Outcome::Yes));
    assert_eq!(report.credited, 1);

    let expected = (alice_shares * 100.0).round() / 100.0;
    assert!((engine.balance(&alice).await - (950.0 + expected)).abs() < 1e-6);
    assert!((engine.balance(&bob).await - 970.0).abs() < 1e-9);

    let notes = engine.portfolio.notifications(&alice).await.unwrap();
    assert!(matches!(
        notes[0].kind,
        NotificationKind::MarketResolved { outcome: Outcome::Yes, .. }
    ));

    let err = engine
        .trades
        .place_bet(&alice, bet(&market, Outcome::Yes, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MarketNotTradeable { .. }));
    assert!(matches!(
        engine.settlement.resolve_market(&admin(), &market.id, Outcome::Yes).await,
        Err(EngineError::AlreadyTerminal { .. })
    ));
    assert!(matches!(
        engine.settlement.cancel_market(&admin(), &market.id).await,
        Err(EngineError::AlreadyTerminal { .. })
    ));
}

#[tokio::test]
async fn test_unfinished_sweep_resumes_without_double_paying() {
    // Resolved to YES, alice already paid, bob still owed, not yet stamped.
    let mut market = seeded_market();
    market.pool.yes = 30.0;
    market.resolve(Outcome::Yes, t0()).unwrap();
    let ledger = vec![
        LedgerEntry::buy("alice".into(), &market, Outcome::Yes, 10.0, 20.0, 0.55, t0()).unwrap(),
        LedgerEntry::buy("bob".into(), &market, Outcome::Yes, 5.0, 10.0, 0.6, t0()).unwrap(),
    ];
    let mut paid = empty_wallet("alice");
    paid.balance = 20.0;
    let snapshot = StoreSnapshot {
        markets: vec![market.clone()],
        wallets: vec![paid, empty_wallet("bob")],
        ledger,
        settlements: vec![SettlementRecord {
            market_id: market.id.clone(),
            user_id: "alice".into(),
            wallet: WalletKey::new("alice", None),
            kind: SettlementKind::Payout,
            amount: 20.0,
            settled_at: t0(),
        }],
        ..StoreSnapshot::default()
    };
    let store = Arc::new(InMemoryStore::from_snapshot(snapshot, 10, 50));
    let engine = Engine::new(store, t0() + Duration::minutes(5));

    assert!(matches!(
        engine.settlement.resolve_market(&admin(), &market.id, Outcome::No).await,
        Err(EngineError::AlreadyTerminal { .. })
    ));

    let report = engine
        .settlement
        .resolve_market(&admin(), &market.id, Outcome::Yes)
        .await
        .unwrap();
    assert!(report.resumed);
    assert_eq!(report.credited, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(engine.balance(&member("alice")).await, 20.0);
    assert_eq!(engine.balance(&member("bob")).await, 10.0);

    assert!(matches!(
        engine.settlement.resolve_market(&admin(), &market.id, Outcome::Yes).await,
        Err(EngineError::AlreadyTerminal { .. })
    ));
}

#[tokio::test]
async fn test_small_batches_settle_every_user() {
    let store = Arc::new(InMemoryStore::new(10, 2));
    let engine = Engine::new(Arc::clone(&store), t0());
    let market = engine.market(None).await;
    let users: Vec<Caller> = (0..5).map(|i| member(&format!("user-{i}"))).collect();
    for user in &users {
        engine.wallets.open_wallet(user, None).await.unwrap();
        engine.bet(user, &market, Outcome::No, 10.0).await;
    }

    let report = engine.settlement.cancel_market(&admin(), &market.id).await.unwrap();
    assert_eq!(report.credited, 5);
    assert!((report.amount_credited - 50.0).abs() < 1e-9);
    for user in &users {
        assert!((engine.balance(user).await - 1000.0).abs() < 1e-9);
    }
    assert_eq!(store.settlement_records(&market.id).await.unwrap().len(), 5);
}

// ---- Wallets ----

#[tokio::test]
async fn test_open_wallet_is_idempotent() {
    let engine = Engine::fresh();
    let alice = member("alice");
    let first = engine.wallets.open_wallet(&alice, None).await.unwrap();
    let market = engine.market(None).await;
    engine.bet(&alice, &market, Outcome::Yes, 25.0).await;

    let again = engine.wallets.open_wallet(&alice, None).await.unwrap();
    assert_eq!(first.balance, 1000.0);
    assert_eq!(again.balance, 975.0);
    assert!(matches!(
        engine.wallets.balance(&member("nobody"), None).await,
        Err(EngineError::NotFound { kind: "wallet", .. })
    ));
}

#[tokio::test]
async fn test_top_ups_respect_interval() {
    let store = Arc::new(InMemoryStore::new(10, 50));
    let day0 = Engine::new(Arc::clone(&store), t0());
    let alice = member("alice");
    day0.wallets.open_wallet(&alice, None).await.unwrap();

    let report = day0.wallets.run_top_ups().await.unwrap();
    assert_eq!(report.credited, 1);
    assert_eq!(day0.balance(&alice).await, 1100.0);

    let rerun = day0.wallets.run_top_ups().await.unwrap();
    assert_eq!(rerun.wallets_due, 0);
    assert_eq!(day0.balance(&alice).await, 1100.0);

    let day3 = Engine::new(Arc::clone(&store), t0() + Duration::days(3));
    assert_eq!(day3.wallets.run_top_ups().await.unwrap().credited, 0);

    let day7 = Engine::new(Arc::clone(&store), t0() + Duration::days(7));
    let report = day7.wallets.run_top_ups().await.unwrap();
    assert_eq!(report.credited, 1);
    assert_eq!(report.amount_credited, 100.0);
    assert_eq!(day7.balance(&alice).await, 1200.0);
}

#[tokio::test]
async fn test_replayed_top_up_batch_is_skipped() {
    let engine = Engine::fresh();
    let alice = member("alice");
    engine.wallets.open_wallet(&alice, None).await.unwrap();

    let op = WriteOp::TopUp {
        wallet: WalletKey::new("alice", None),
        amount: 100.0,
        at: t0(),
        not_since: t0() - Duration::days(7),
    };
    let first = engine.store.commit_batch(vec![op.clone()]).await.unwrap();
    let replay = engine.store.commit_batch(vec![op]).await.unwrap();
    assert_eq!((first.applied, first.skipped), (1, 0));
    assert_eq!((replay.applied, replay.skipped), (0, 1));
    assert_eq!(engine.balance(&alice).await, 1100.0);
}

// ---- Portfolio & Leaderboard ----

#[tokio::test]
async fn test_portfolio_values_open_positions() {
    let engine = Engine::fresh();
    let alice = member("alice");
    engine.wallets.open_wallet(&alice, None).await.unwrap();
    let open = engine.market(None).await;
    let exited = engine.market(None).await;

    let shares = engine.bet(&alice, &open, Outcome::Yes, 40.0).await;
    let gone = engine.bet(&alice, &exited, Outcome::No, 10.0).await;
    engine
        .trades
        .sell_shares(&alice, sale(&exited, Outcome::No, gone))
        .await
        .unwrap();

    let portfolio = engine.portfolio.portfolio(&alice).await.unwrap();
    assert_eq!(portfolio.positions.len(), 1);
    let view = &portfolio.positions[0];
    assert_eq!(view.market_id, open.id);
    assert_eq!(view.yes_shares, shares);
    assert!((view.avg_yes_price.unwrap() - 40.0 / shares).abs() < 1e-9);
    assert!(view.avg_no_price.is_none());

    let price = engine.lifecycle.market(&open.id).await.unwrap().current_price().unwrap();
    assert!((view.valuation.value - shares * price).abs() < 1e-9);
    assert_eq!(view.valuation.cost_basis, 40.0);
    assert!((portfolio.unrealized_pnl - (view.valuation.value - 40.0)).abs() < 1e-9);
}

#[tokio::test]
async fn test_leaderboard_rewards_early_contrarian() {
    let engine = Engine::fresh();
    let (early, late) = (member("early"), member("late"));
    engine.wallets.open_wallet(&early, None).await.unwrap();
    engine.wallets.open_wallet(&late, None).await.unwrap();
    let market = engine.market(None).await;

    engine.bet(&early, &market, Outcome::Yes, 50.0).await;
    engine.bet(&late, &market, Outcome::Yes, 50.0).await;
    assert!(engine.leaderboard.top(10).await.unwrap().is_empty());

    engine
        .settlement
        .resolve_market(&admin(), &market.id, Outcome::Yes)
        .await
        .unwrap();

    let board = engine.leaderboard.top(10).await.unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].user_id, "early");
    assert!(board[0].score > board[1].score);
    assert_eq!(engine.leaderboard.top(1).await.unwrap().len(), 1);
}
