//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Pricing tolerances, starting balances, store limits and the identity
//! policy are externalized here - nothing is hardcoded in the domain layer.

pub mod loader;

use serde::Deserialize;

use crate::domain::caller::Claim;
use crate::domain::sizing::SizingParams;

/// Top-level engine configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the engine starts serving.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and HTTP binding.
  pub server: ServerConfig,
  /// Market-maker pricing and sizing parameters.
  #[serde(default)]
  pub engine: EngineConfig,
  /// Wallet starting balance and top-up schedule.
  #[serde(default)]
  pub wallets: WalletsConfig,
  /// Store transaction and batch limits.
  #[serde(default)]
  pub store: StoreConfig,
  /// Eligibility policy and static credentials.
  #[serde(default)]
  pub identity: IdentityConfig,
  /// Snapshot persistence.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// HTTP bind address for the API, health and metrics routes.
  #[serde(default = "default_bind_addr")]
  pub bind_address: String,
}

/// Market-maker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Liquidity parameter (b) for markets created without one.
  #[serde(default = "default_liquidity")]
  pub default_liquidity: f64,
  /// Bisection step budget for buy sizing.
  #[serde(default = "default_max_iterations")]
  pub max_search_iterations: u32,
  /// Early-exit tolerance of the sizing search.
  #[serde(default = "default_search_tolerance")]
  pub search_tolerance: f64,
  /// Residual beyond which a buy fails with a convergence error.
  #[serde(default = "default_convergence_tolerance")]
  pub convergence_tolerance: f64,
  /// Sales may not push a side below `-sell_bound_multiple * b`.
  #[serde(default = "default_sell_bound_multiple")]
  pub sell_bound_multiple: f64,
}

impl EngineConfig {
  /// Sizing parameters for the trade service.
  pub const fn sizing_params(&self) -> SizingParams {
    SizingParams {
      max_iterations: self.max_search_iterations,
      search_tolerance: self.search_tolerance,
      convergence_tolerance: self.convergence_tolerance,
      sell_bound_multiple: self.sell_bound_multiple,
    }
  }
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_liquidity: default_liquidity(),
      max_search_iterations: default_max_iterations(),
      search_tolerance: default_search_tolerance(),
      convergence_tolerance: default_convergence_tolerance(),
      sell_bound_multiple: default_sell_bound_multiple(),
    }
  }
}

/// Wallet configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletsConfig {
  /// Balance credited when a wallet is opened.
  #[serde(default = "default_initial_balance")]
  pub initial_balance: f64,
  /// Amount credited per scheduled top-up (0 disables top-ups).
  #[serde(default)]
  pub top_up_amount: f64,
  /// Minimum days between two top-ups of one wallet.
  #[serde(default = "default_top_up_interval_days")]
  pub top_up_interval_days: u32,
  /// How often the top-up job looks for due wallets (seconds).
  #[serde(default = "default_top_up_check")]
  pub top_up_check_seconds: u64,
}

impl Default for WalletsConfig {
  fn default() -> Self {
    Self {
      initial_balance: default_initial_balance(),
      top_up_amount: 0.0,
      top_up_interval_days: default_top_up_interval_days(),
      top_up_check_seconds: default_top_up_check(),
    }
  }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// Attempts per transaction before a conflict becomes an error.
  #[serde(default = "default_max_attempts")]
  pub max_transaction_attempts: u32,
  /// Writes allowed in one atomic batch.
  #[serde(default = "default_max_batch_size")]
  pub max_batch_size: usize,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      max_transaction_attempts: default_max_attempts(),
      max_batch_size: default_max_batch_size(),
    }
  }
}

/// Identity and eligibility configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
  /// E-mail domains whose verified users may trade. Empty allows any domain.
  #[serde(default)]
  pub allowed_email_domains: Vec<String>,
  /// Users eligible regardless of e-mail verification.
  #[serde(default)]
  pub bypass_users: Vec<String>,
  /// Static bearer tokens served by the built-in identity provider.
  #[serde(default)]
  pub tokens: Vec<TokenConfig>,
}

/// One static credential.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
  /// Bearer token value.
  pub token: String,
  /// User the token asserts.
  pub user_id: String,
  /// Verified e-mail of that user.
  #[serde(default)]
  pub email: Option<String>,
  /// Claims asserted alongside the identity.
  #[serde(default)]
  pub claims: Vec<Claim>,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory holding the store snapshot.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// State snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_seconds: u64,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      snapshot_interval_seconds: default_snapshot_interval(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export on `/metrics`.
  #[serde(default = "default_true")]
  pub enabled: bool,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self { enabled: true }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_bind_addr() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
  true
}

fn default_liquidity() -> f64 {
  100.0
}

fn default_max_iterations() -> u32 {
  100
}

fn default_search_tolerance() -> f64 {
  1e-4
}

fn default_convergence_tolerance() -> f64 {
  1e-2
}

fn default_sell_bound_multiple() -> f64 {
  20.0
}

fn default_initial_balance() -> f64 {
  1000.0
}

fn default_top_up_interval_days() -> u32 {
  7
}

fn default_top_up_check() -> u64 {
  3600
}

fn default_max_attempts() -> u32 {
  5
}

fn default_max_batch_size() -> usize {
  500
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}
